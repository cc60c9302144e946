use crate::bus::{Byte, Word};
use crate::cpu::cop0::{
    BAD_VADDR, CAUSE, ENTRY_HI, ENTRY_LO0, ENTRY_LO1, EPC, INDEX, PAGE_MASK,
};
use crate::cpu::Register;
use super::asm::*;
use super::{load_code, new_cpu, run_code, start_code, CODE_START};

/// Data used by the tests lives at physical address 0x10000.
const DATA: u32 = 0x1_0000;

/// Exception code field of the cause register.
fn exception_code(cause: u32) -> u32 {
    (cause >> 2) & 0x1f
}

#[test]
fn load_extension() {
    let cpu = run_code(&[
        lui(Register::T0, 0x8001),
        lui(Register::T1, 0x8081),
        ori(Register::T1, Register::T1, 0x7fff),
        sw(Register::T1, 0, Register::T0),
        lb(Register::V0, 0, Register::T0),
        lbu(Register::V1, 0, Register::T0),
        lh(Register::A0, 0, Register::T0),
        lhu(Register::A1, 2, Register::T0),
        lw(Register::A2, 0, Register::T0),
        lwu(Register::A3, 0, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.read_reg(Register::V0), 0xffff_ffff_ffff_ff80);
    assert_eq!(cpu.read_reg(Register::V1), 0x80);
    assert_eq!(cpu.read_reg(Register::A0), 0xffff_ffff_ffff_8081);
    assert_eq!(cpu.read_reg(Register::A1), 0x7fff);
    assert_eq!(cpu.read_reg(Register::A2), 0xffff_ffff_8081_7fff);
    assert_eq!(cpu.read_reg(Register::A3), 0x8081_7fff);
}

#[test]
fn doubleword_store_is_big_endian() {
    let cpu = run_code(&[
        lui(Register::T0, 0x8001),
        lui(Register::T1, 0x1234),
        ori(Register::T1, Register::T1, 0x5678),
        dsll32(Register::T1, Register::T1, 0),
        ori(Register::T1, Register::T1, 0x9abc),
        sd(Register::T1, 8, Register::T0),
        ld(Register::V0, 8, Register::T0),
        lw(Register::V1, 8, Register::T0),
        lw(Register::A0, 12, Register::T0),
        sb(Register::T1, 3, Register::T0),
        sh(Register::T1, 6, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.read_reg(Register::V0), 0x1234_5678_0000_9abc);
    assert_eq!(cpu.read_reg(Register::V1), 0x1234_5678);
    assert_eq!(cpu.read_reg(Register::A0), 0x9abc);

    let ram = cpu.bus().ram();
    assert_eq!(ram.load::<Word>(DATA), 0x0000_00bc);
    assert_eq!(ram.load::<Word>(DATA + 4), 0x0000_9abc);
}

const UNALIGNED: [u8; 16] = [
    0x88, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77,
    0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x01,
];

#[test]
fn unaligned_word_access() {
    for offset in 0..4_i16 {
        let mut cpu = new_cpu();
        cpu.bus_mut().ram_mut().write_bytes(DATA, &UNALIGNED);
        start_code(&mut cpu, &[
            lui(Register::T0, 0x8001),
            lwl(Register::T1, offset, Register::T0),
            lwr(Register::T1, offset + 3, Register::T0),
            swl(Register::T1, 0x100 + offset, Register::T0),
            swr(Register::T1, 0x103 + offset, Register::T0),
            brk(),
        ]);

        let start = offset as usize;
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&UNALIGNED[start..start + 4]);
        let expected = u32::from_be_bytes(bytes);
        assert_eq!(cpu.read_reg(Register::T1), expected as i32 as i64 as u64);

        let ram = cpu.bus().ram();
        for i in 0..8 {
            let addr = DATA + 0x100 + i as u32;
            let byte = ram.load::<Byte>(addr) as u8;
            if (start..start + 4).contains(&i) {
                assert_eq!(byte, UNALIGNED[i], "offset {offset}, byte {i}");
            } else {
                assert_eq!(byte, 0, "offset {offset}, byte {i}");
            }
        }
    }
}

#[test]
fn unaligned_doubleword_access() {
    for offset in 0..8_i16 {
        let mut cpu = new_cpu();
        cpu.bus_mut().ram_mut().write_bytes(DATA, &UNALIGNED);
        start_code(&mut cpu, &[
            lui(Register::T0, 0x8001),
            ldl(Register::T1, offset, Register::T0),
            ldr(Register::T1, offset + 7, Register::T0),
            sdl(Register::T1, 0x100 + offset, Register::T0),
            sdr(Register::T1, 0x107 + offset, Register::T0),
            brk(),
        ]);

        let start = offset as usize;
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&UNALIGNED[start..start + 8]);
        assert_eq!(cpu.read_reg(Register::T1), u64::from_be_bytes(bytes));

        let ram = cpu.bus().ram();
        for i in 0..16 {
            let addr = DATA + 0x100 + i as u32;
            let byte = ram.load::<Byte>(addr) as u8;
            if (start..start + 8).contains(&i) {
                assert_eq!(byte, UNALIGNED[i], "offset {offset}, byte {i}");
            } else {
                assert_eq!(byte, 0, "offset {offset}, byte {i}");
            }
        }
    }
}

#[test]
fn partial_load_keeps_register_bytes() {
    let mut cpu = new_cpu();
    cpu.bus_mut().ram_mut().write_bytes(DATA, &UNALIGNED);
    start_code(&mut cpu, &[
        lui(Register::T0, 0x8001),
        lui(Register::T1, 0x0102),
        ori(Register::T1, Register::T1, 0x0304),
        or(Register::T2, Register::T1, Register::ZERO),
        lwl(Register::T1, 2, Register::T0),
        lwr(Register::T2, 1, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.read_reg(Register::T1), 0x2233_0304);
    assert_eq!(cpu.read_reg(Register::T2), 0x0102_8811);
}

#[test]
fn load_linked_store_conditional() {
    let cpu = run_code(&[
        lui(Register::T0, 0x8001),
        addiu(Register::T1, Register::ZERO, 7),
        ll(Register::T2, 0, Register::T0),
        sc(Register::T1, 0, Register::T0),
        addiu(Register::T3, Register::ZERO, 9),
        sc(Register::T3, 0, Register::T0),
        lw(Register::V0, 0, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.read_reg(Register::T1), 1);
    assert_eq!(cpu.read_reg(Register::T3), 0);
    assert_eq!(cpu.read_reg(Register::V0), 7);
    assert!(!cpu.ll_bit());
}

#[test]
fn store_invalidates_compiled_page() {
    let mut cpu = new_cpu();
    cpu.code_cache_mut().mark_compiled(0x8_0010);
    cpu.code_cache_mut().mark_compiled(0x8_0011);
    start_code(&mut cpu, &[
        lui(Register::T0, 0x8001),
        sw(Register::ZERO, 0x10, Register::T0),
        brk(),
    ]);
    assert!(cpu.code_cache().is_invalid(0x8_0010));
    assert!(!cpu.code_cache().is_invalid(0x8_0011));
}

#[test]
fn unaligned_load_exception() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, 0x8000_0180, &[brk()]);
    start_code(&mut cpu, &[
        lui(Register::T0, 0x8000),
        lw(Register::T1, 2, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.pc(), 0x8000_0180);
    assert_eq!(exception_code(cpu.cop0().reg(CAUSE)), 0x4);
    assert_eq!(cpu.cop0().reg(BAD_VADDR), 0x8000_0002);
    assert_eq!(cpu.cop0().reg(EPC), CODE_START + 4);
}

#[test]
fn unaligned_store_exception() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, 0x8000_0180, &[brk()]);
    start_code(&mut cpu, &[
        lui(Register::T0, 0x8000),
        sh(Register::T1, 1, Register::T0),
        brk(),
    ]);
    assert_eq!(exception_code(cpu.cop0().reg(CAUSE)), 0x5);
    assert_eq!(cpu.cop0().reg(BAD_VADDR), 0x8000_0001);
}

#[test]
fn bus_error_on_unmapped_address() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, 0x8000_0180, &[brk()]);
    start_code(&mut cpu, &[
        lui(Register::T0, 0xa800),
        lw(Register::T1, 0, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.pc(), 0x8000_0180);
    assert_eq!(exception_code(cpu.cop0().reg(CAUSE)), 0x7);
}

/// Number of instructions in ['with_tlb_setup'] before the test code.
const TLB_SETUP_LEN: u32 = 11;

/// Prepend code installing a TLB entry at index 5, mapping virtual 0x10000 to physical 0x10000
/// (dirty) and 0x11000 to physical 0x11000 (clean). Leaves 0x10000 in t0.
fn with_tlb_setup(code: &[u32]) -> Vec<u32> {
    let setup = [
        lui(Register::T0, 0x0001),
        mtc0(Register::T0, ENTRY_HI),
        addiu(Register::T1, Register::ZERO, 0x407),
        mtc0(Register::T1, ENTRY_LO0),
        addiu(Register::T1, Register::ZERO, 0x443),
        mtc0(Register::T1, ENTRY_LO1),
        mtc0(Register::ZERO, PAGE_MASK),
        addiu(Register::T2, Register::ZERO, 5),
        mtc0(Register::T2, INDEX),
        tlbwi(),
        nop(),
    ];
    debug_assert_eq!(setup.len() as u32, TLB_SETUP_LEN);
    setup.iter().chain(code).copied().collect()
}

#[test]
fn tlb_write_read_and_translate() {
    let cpu = run_code(&with_tlb_setup(&[
        mtc0(Register::ZERO, 10),
        mtc0(Register::ZERO, 2),
        mtc0(Register::ZERO, 3),
        tlbr(),
        mfc0(Register::S0, 10),
        mfc0(Register::S1, 2),
        mfc0(Register::A0, 3),
        addiu(Register::T3, Register::ZERO, 0x55),
        sw(Register::T3, 0x10, Register::T0),
        lw(Register::V0, 0x10, Register::T0),
        lw(Register::V1, 0x1000, Register::T0),
        brk(),
    ]));
    assert_eq!(cpu.read_reg(Register::S0), 0x1_0000);
    assert_eq!(cpu.read_reg(Register::S1), 0x407);
    assert_eq!(cpu.read_reg(Register::A0), 0x443);
    assert_eq!(cpu.read_reg(Register::V0), 0x55);
    assert_eq!(cpu.read_reg(Register::V1), 0);
    assert_eq!(cpu.bus().ram().load::<Word>(DATA + 0x10), 0x55);

    let entry = cpu.tlb().entry(5);
    assert!(entry.global);
    assert_eq!(entry.even.start, 0x1_0000);
    assert_eq!(entry.odd.end, 0x1_1fff);
}

#[test]
fn tlb_probe() {
    let cpu = run_code(&with_tlb_setup(&[
        tlbp(),
        mfc0(Register::V0, 0),
        lui(Register::T1, 0x0003),
        mtc0(Register::T1, 10),
        tlbp(),
        mfc0(Register::V1, 0),
        brk(),
    ]));
    assert_eq!(cpu.read_reg(Register::V0), 5);
    assert_eq!(cpu.read_reg(Register::V1), 0xffff_ffff_8000_0005);
}

#[test]
fn random_write_respects_wired() {
    let cpu = run_code(&[
        addiu(Register::T0, Register::ZERO, 30),
        mtc0(Register::T0, 6),
        lui(Register::T1, 0x0001),
        mtc0(Register::T1, ENTRY_HI),
        addiu(Register::T2, Register::ZERO, 0x407),
        mtc0(Register::T2, ENTRY_LO0),
        tlbwr(),
        mfc0(Register::V0, 1),
        brk(),
    ]);
    let index = cpu.read_reg(Register::V0) as usize;
    assert!((30..=31).contains(&index));
    assert_eq!(cpu.tlb().entry(index).vpn2, 0x1_0000 >> 13);
}

#[test]
fn random_write_clamps_wired() {
    let cpu = run_code(&[
        // Masked to 0x28, which is past the last entry.
        addiu(Register::T0, Register::ZERO, 0x1e8),
        mtc0(Register::T0, 6),
        mfc0(Register::V1, 6),
        lui(Register::T1, 0x0002),
        mtc0(Register::T1, ENTRY_HI),
        addiu(Register::T2, Register::ZERO, 0x407),
        mtc0(Register::T2, ENTRY_LO0),
        tlbwr(),
        mfc0(Register::V0, 1),
        brk(),
    ]);
    assert_eq!(cpu.read_reg(Register::V1), 0x28);
    assert_eq!(cpu.read_reg(Register::V0), 31);
    assert_eq!(cpu.tlb().entry(31).vpn2, 0x2_0000 >> 13);
}

#[test]
fn store_to_clean_page_is_modification() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, 0x8000_0180, &[brk()]);
    start_code(&mut cpu, &with_tlb_setup(&[
        sw(Register::T1, 0x1004, Register::T0),
        brk(),
    ]));
    assert_eq!(cpu.pc(), 0x8000_0180);
    assert_eq!(exception_code(cpu.cop0().reg(CAUSE)), 0x1);
    assert_eq!(cpu.cop0().reg(BAD_VADDR), 0x1_1004);
    assert_eq!(cpu.cop0().reg(EPC), CODE_START + 4 * TLB_SETUP_LEN);
}

#[test]
fn tlb_miss_uses_refill_vector() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, 0x8000_0000, &[brk()]);
    start_code(&mut cpu, &[
        lui(Register::T0, 0x0040),
        lw(Register::T1, 8, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.pc(), 0x8000_0000);
    assert_eq!(exception_code(cpu.cop0().reg(CAUSE)), 0x2);
    assert_eq!(cpu.cop0().reg(BAD_VADDR), 0x40_0008);
    assert_eq!(cpu.cop0().reg(ENTRY_HI), 0x40_0000);
}

#[test]
fn invalid_entry_uses_general_vector() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, 0x8000_0180, &[brk()]);
    start_code(&mut cpu, &[
        lui(Register::T0, 0x0002),
        mtc0(Register::T0, 10),
        mtc0(Register::ZERO, 2),
        mtc0(Register::ZERO, 3),
        mtc0(Register::ZERO, 0),
        tlbwi(),
        sw(Register::T0, 0, Register::T0),
        brk(),
    ]);
    assert_eq!(cpu.pc(), 0x8000_0180);
    assert_eq!(exception_code(cpu.cop0().reg(CAUSE)), 0x3);
}

#[test]
fn execute_from_mapped_page() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, 0x8001_0000, &[
        addiu(Register::V0, Register::ZERO, 42),
        brk(),
    ]);
    start_code(&mut cpu, &with_tlb_setup(&[
        jr(Register::T0),
        nop(),
    ]));
    assert_eq!(cpu.pc(), 0x1_0004);
    assert_eq!(cpu.read_reg(Register::V0), 42);
}
