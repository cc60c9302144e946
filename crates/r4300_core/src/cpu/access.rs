//! Byte merging for the unaligned load and store instructions. Memory is always accessed through
//! the aligned word or doubleword containing the address, and these combine it with the register.
//!
//! The CPU is big endian, so the "left" instructions work on the most significant bytes of the
//! register and the "right" instructions on the least significant.

use r4300_util::SignExtend;

/// Mask of the `bits` lowest bits. `bits` may be the full width.
fn below(bits: u32) -> u64 {
    1_u64.checked_shl(bits).map_or(!0, |v| v - 1)
}

/// Mask of everything but the `bits` lowest bits.
fn above(bits: u32) -> u64 {
    !below(bits)
}

/// LWL. `word` is the aligned word containing `addr`.
pub fn load_word_left(reg: u64, word: u32, addr: u32) -> u64 {
    let shift = (addr & 3) * 8;
    let keep = reg as u32 & below(shift) as u32;
    (keep | word << shift).sign_extend()
}

/// LWR. `word` is the aligned word containing `addr`.
pub fn load_word_right(reg: u64, word: u32, addr: u32) -> u64 {
    let offset = addr & 3;
    if offset == 3 {
        return word.sign_extend();
    }
    let keep = reg as u32 & above((offset + 1) * 8) as u32;
    (keep | word >> ((3 - offset) * 8)).sign_extend()
}

/// LDL. `dword` is the aligned doubleword containing `addr`.
pub fn load_dword_left(reg: u64, dword: u64, addr: u32) -> u64 {
    let shift = (addr & 7) * 8;
    (reg & below(shift)) | dword << shift
}

/// LDR. `dword` is the aligned doubleword containing `addr`.
pub fn load_dword_right(reg: u64, dword: u64, addr: u32) -> u64 {
    let offset = addr & 7;
    if offset == 7 {
        return dword;
    }
    (reg & above((offset + 1) * 8)) | dword >> ((7 - offset) * 8)
}

/// SWL. Returns the new aligned word given the old one.
pub fn store_word_left(old: u32, reg: u64, addr: u32) -> u32 {
    let offset = addr & 3;
    let reg = reg as u32;
    if offset == 0 {
        return reg;
    }
    (old & above((4 - offset) * 8) as u32) | reg >> (offset * 8)
}

/// SWR. Returns the new aligned word given the old one.
pub fn store_word_right(old: u32, reg: u64, addr: u32) -> u32 {
    let offset = addr & 3;
    let reg = reg as u32;
    if offset == 3 {
        return reg;
    }
    (old & below((3 - offset) * 8) as u32) | reg << ((3 - offset) * 8)
}

/// SDL. Returns the new aligned doubleword given the old one.
pub fn store_dword_left(old: u64, reg: u64, addr: u32) -> u64 {
    let offset = addr & 7;
    if offset == 0 {
        return reg;
    }
    (old & above((8 - offset) * 8)) | reg >> (offset * 8)
}

/// SDR. Returns the new aligned doubleword given the old one.
pub fn store_dword_right(old: u64, reg: u64, addr: u32) -> u64 {
    let offset = addr & 7;
    if offset == 7 {
        return reg;
    }
    (old & below((7 - offset) * 8)) | reg << ((7 - offset) * 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lwl_lwr_pair_loads_unaligned_word() {
        // Memory: 00 11 22 33 | 44 55 66 77, load word at offset 1.
        let (first, second) = (0x0011_2233, 0x4455_6677);
        let reg = load_word_left(0xdead_beef, first, 1);
        let reg = load_word_right(reg, second, 4);
        assert_eq!(reg, 0x1122_3344);
    }

    #[test]
    fn ldl_ldr_pair_loads_unaligned_dword() {
        let (first, second) = (0x0011_2233_4455_6677, 0x8899_aabb_ccdd_eeff);
        let reg = load_dword_left(0, first, 3);
        let reg = load_dword_right(reg, second, 10);
        assert_eq!(reg, 0x3344_5566_7788_99aa);
    }

    #[test]
    fn lwl_keeps_low_bytes() {
        assert_eq!(load_word_left(0x1122_3344, 0xaabb_ccdd, 2), 0xffff_ffff_ccdd_3344);
        assert_eq!(load_word_left(0x1122_3344, 0x00bb_ccdd, 0), 0x00bb_ccdd);
    }

    #[test]
    fn lwr_keeps_high_bytes() {
        assert_eq!(load_word_right(0x1122_3344, 0xaabb_ccdd, 1), 0x1122_aabb);
        assert_eq!(load_word_right(0x8122_3344, 0xaabb_ccdd, 0), 0xffff_ffff_8122_33aa);
    }

    #[test]
    fn swl_swr_merge() {
        assert_eq!(store_word_left(0xaabb_ccdd, 0x1122_3344, 1), 0xaa11_2233);
        assert_eq!(store_word_right(0xaabb_ccdd, 0x1122_3344, 1), 0x3344_ccdd);
        assert_eq!(store_word_right(0xaabb_ccdd, 0x1122_3344, 3), 0x1122_3344);
    }

    #[test]
    fn partial_round_trips() {
        let reg: u64 = 0xffff_ffff_9abc_def0;
        let old = 0x5555_5555;
        for addr in 0..4 {
            let mem = store_word_left(old, reg, addr);
            assert_eq!(load_word_left(reg, mem, addr), reg);
            let mem = store_word_right(old, reg, addr);
            assert_eq!(load_word_right(reg, mem, addr), reg);
        }

        let reg: u64 = 0x0123_4567_89ab_cdef;
        let old = 0x5555_5555_5555_5555;
        for addr in 0..8 {
            let mem = store_dword_left(old, reg, addr);
            assert_eq!(load_dword_left(reg, mem, addr), reg);
            let mem = store_dword_right(old, reg, addr);
            assert_eq!(load_dword_right(reg, mem, addr), reg);
        }
    }
}
