//! Integer, branch and load/store instructions.
//!
//! 32-bit instructions work on the low word of the registers and sign extend the result. None of
//! the arithmetic instructions raise overflow exceptions.

use r4300_util::SignExtend;
use crate::bus::{AddrUnit, Byte, DoubleWord, HalfWord, Word};
use crate::Debugger;
use super::access;
use super::opcode::{Opcode, Register};
use super::{Cpu, Halt, OpResult};

/// Unsigned 128-bit product, returned as (hi, lo). Summed from four 32x32 partial products.
fn mul_wide(lhs: u64, rhs: u64) -> (u64, u64) {
    let (lhs_lo, lhs_hi) = (lhs & 0xffff_ffff, lhs >> 32);
    let (rhs_lo, rhs_hi) = (rhs & 0xffff_ffff, rhs >> 32);

    let lo_lo = lhs_lo * rhs_lo;
    let lo_hi = (lo_lo >> 32) + lhs_lo * rhs_hi;
    let hi_lo = lhs_hi * rhs_lo;
    let hi_hi = (hi_lo >> 32) + lhs_hi * rhs_hi;

    let mid = lo_hi + (hi_lo & 0xffff_ffff);

    let lo = (lo_lo & 0xffff_ffff) | mid << 32;
    let hi = (mid >> 32) + hi_hi;

    (hi, lo)
}

/// Signed 128-bit product, returned as (hi, lo).
fn mul_wide_signed(lhs: i64, rhs: i64) -> (u64, u64) {
    let (hi, lo) = mul_wide(lhs.unsigned_abs(), rhs.unsigned_abs());
    if (lhs < 0) == (rhs < 0) {
        return (hi, lo);
    }
    if lo == 0 {
        ((!hi).wrapping_add(1), 0)
    } else {
        (!hi, (!lo).wrapping_add(1))
    }
}

/// Split a 64-bit product of a 32-bit multiply into sign extended (hi, lo).
fn split_product(val: u64) -> (u64, u64) {
    (((val >> 32) as u32).sign_extend(), (val as u32).sign_extend())
}

/// CPU opcode implementation.
impl Cpu {
    /// SLL - Shift left logical.
    pub(super) fn op_sll(&mut self, op: Opcode) -> OpResult {
        let val = (self.read_reg(op.rt()) as u32) << op.shift();
        self.set_reg(op.rd(), val.sign_extend());
        Ok(())
    }

    /// SRL - Shift right logical. Same as SRA, but unsigned.
    pub(super) fn op_srl(&mut self, op: Opcode) -> OpResult {
        let val = (self.read_reg(op.rt()) as u32) >> op.shift();
        self.set_reg(op.rd(), val.sign_extend());
        Ok(())
    }

    /// SRA - Shift right arithmetic.
    pub(super) fn op_sra(&mut self, op: Opcode) -> OpResult {
        let val = (self.read_reg(op.rt()) as i32) >> op.shift();
        self.set_reg(op.rd(), (val as u32).sign_extend());
        Ok(())
    }

    /// SLLV - Shift left logical variable.
    pub(super) fn op_sllv(&mut self, op: Opcode) -> OpResult {
        let shift = self.read_reg(op.rs()) & 0x1f;
        let val = (self.read_reg(op.rt()) as u32) << shift;
        self.set_reg(op.rd(), val.sign_extend());
        Ok(())
    }

    /// SRLV - Shift right logical variable.
    pub(super) fn op_srlv(&mut self, op: Opcode) -> OpResult {
        let shift = self.read_reg(op.rs()) & 0x1f;
        let val = (self.read_reg(op.rt()) as u32) >> shift;
        self.set_reg(op.rd(), val.sign_extend());
        Ok(())
    }

    /// SRAV - Shift right arithmetic variable.
    pub(super) fn op_srav(&mut self, op: Opcode) -> OpResult {
        let shift = self.read_reg(op.rs()) & 0x1f;
        let val = (self.read_reg(op.rt()) as i32) >> shift;
        self.set_reg(op.rd(), (val as u32).sign_extend());
        Ok(())
    }

    /// DSLLV - Doubleword shift left logical variable.
    pub(super) fn op_dsllv(&mut self, op: Opcode) -> OpResult {
        let shift = self.read_reg(op.rs()) & 0x3f;
        self.set_reg(op.rd(), self.read_reg(op.rt()) << shift);
        Ok(())
    }

    /// DSRLV - Doubleword shift right logical variable.
    pub(super) fn op_dsrlv(&mut self, op: Opcode) -> OpResult {
        let shift = self.read_reg(op.rs()) & 0x3f;
        self.set_reg(op.rd(), self.read_reg(op.rt()) >> shift);
        Ok(())
    }

    /// DSRAV - Doubleword shift right arithmetic variable.
    pub(super) fn op_dsrav(&mut self, op: Opcode) -> OpResult {
        let shift = self.read_reg(op.rs()) & 0x3f;
        let val = self.read_reg(op.rt()) as i64 >> shift;
        self.set_reg(op.rd(), val as u64);
        Ok(())
    }

    /// DSLL - Doubleword shift left logical.
    pub(super) fn op_dsll(&mut self, op: Opcode) -> OpResult {
        self.set_reg(op.rd(), self.read_reg(op.rt()) << op.shift());
        Ok(())
    }

    /// DSRL - Doubleword shift right logical.
    pub(super) fn op_dsrl(&mut self, op: Opcode) -> OpResult {
        self.set_reg(op.rd(), self.read_reg(op.rt()) >> op.shift());
        Ok(())
    }

    /// DSRA - Doubleword shift right arithmetic.
    pub(super) fn op_dsra(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rt()) as i64 >> op.shift();
        self.set_reg(op.rd(), val as u64);
        Ok(())
    }

    /// DSLL32 - Doubleword shift left logical plus 32.
    pub(super) fn op_dsll32(&mut self, op: Opcode) -> OpResult {
        self.set_reg(op.rd(), self.read_reg(op.rt()) << (op.shift() + 32));
        Ok(())
    }

    /// DSRL32 - Doubleword shift right logical plus 32.
    pub(super) fn op_dsrl32(&mut self, op: Opcode) -> OpResult {
        self.set_reg(op.rd(), self.read_reg(op.rt()) >> (op.shift() + 32));
        Ok(())
    }

    /// DSRA32 - Doubleword shift right arithmetic plus 32.
    pub(super) fn op_dsra32(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rt()) as i64 >> (op.shift() + 32);
        self.set_reg(op.rd(), val as u64);
        Ok(())
    }

    /// JR - Jump register.
    pub(super) fn op_jr(&mut self, op: Opcode) -> OpResult {
        let target = self.read_reg(op.rs()) as u32;
        self.branch(true, target, Register::ZERO, false);
        Ok(())
    }

    /// JALR - Jump and link register.
    pub(super) fn op_jalr(&mut self, op: Opcode) -> OpResult {
        let target = self.read_reg(op.rs()) as u32;
        self.branch(true, target, op.rd(), false);
        Ok(())
    }

    /// MFHI - Move from high.
    pub(super) fn op_mfhi(&mut self, op: Opcode) -> OpResult {
        self.set_reg(op.rd(), self.hi);
        Ok(())
    }

    /// MTHI - Move to high.
    pub(super) fn op_mthi(&mut self, op: Opcode) -> OpResult {
        self.hi = self.read_reg(op.rs());
        Ok(())
    }

    /// MFLO - Move from low.
    pub(super) fn op_mflo(&mut self, op: Opcode) -> OpResult {
        self.set_reg(op.rd(), self.lo);
        Ok(())
    }

    /// MTLO - Move to low.
    pub(super) fn op_mtlo(&mut self, op: Opcode) -> OpResult {
        self.lo = self.read_reg(op.rs());
        Ok(())
    }

    /// MULT - Signed multiplication.
    pub(super) fn op_mult(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as i32 as i64;
        let rhs = self.read_reg(op.rt()) as i32 as i64;
        (self.hi, self.lo) = split_product(lhs.wrapping_mul(rhs) as u64);
        Ok(())
    }

    /// MULTU - Unsigned multiplication.
    pub(super) fn op_multu(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as u32 as u64;
        let rhs = self.read_reg(op.rt()) as u32 as u64;
        (self.hi, self.lo) = split_product(lhs * rhs);
        Ok(())
    }

    /// # DIV - Signed division
    ///
    /// Dividing by zero leaves hi and lo untouched.
    pub(super) fn op_div(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as i32;
        let rhs = self.read_reg(op.rt()) as i32;
        if rhs == 0 {
            warn!("DIV by 0 at {:08x}", self.last_pc);
        } else {
            self.lo = (lhs.wrapping_div(rhs) as u32).sign_extend();
            self.hi = (lhs.wrapping_rem(rhs) as u32).sign_extend();
        }
        Ok(())
    }

    /// DIVU - Unsigned division.
    pub(super) fn op_divu(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as u32;
        let rhs = self.read_reg(op.rt()) as u32;
        if rhs == 0 {
            warn!("DIVU by 0 at {:08x}", self.last_pc);
        } else {
            self.lo = (lhs / rhs).sign_extend();
            self.hi = (lhs % rhs).sign_extend();
        }
        Ok(())
    }

    /// DMULT - Doubleword signed multiplication.
    pub(super) fn op_dmult(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as i64;
        let rhs = self.read_reg(op.rt()) as i64;
        (self.hi, self.lo) = mul_wide_signed(lhs, rhs);
        Ok(())
    }

    /// DMULTU - Doubleword unsigned multiplication.
    pub(super) fn op_dmultu(&mut self, op: Opcode) -> OpResult {
        (self.hi, self.lo) = mul_wide(self.read_reg(op.rs()), self.read_reg(op.rt()));
        Ok(())
    }

    /// DDIV - Doubleword signed division.
    pub(super) fn op_ddiv(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as i64;
        let rhs = self.read_reg(op.rt()) as i64;
        if rhs == 0 {
            warn!("DDIV by 0 at {:08x}", self.last_pc);
        } else {
            self.lo = lhs.wrapping_div(rhs) as u64;
            self.hi = lhs.wrapping_rem(rhs) as u64;
        }
        Ok(())
    }

    /// DDIVU - Doubleword unsigned division.
    pub(super) fn op_ddivu(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs());
        let rhs = self.read_reg(op.rt());
        if rhs == 0 {
            warn!("DDIVU by 0 at {:08x}", self.last_pc);
        } else {
            self.lo = lhs / rhs;
            self.hi = lhs % rhs;
        }
        Ok(())
    }

    /// ADD and ADDU - Add word.
    pub(super) fn op_addu(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as u32;
        let rhs = self.read_reg(op.rt()) as u32;
        self.set_reg(op.rd(), lhs.wrapping_add(rhs).sign_extend());
        Ok(())
    }

    /// SUB and SUBU - Subtract word.
    pub(super) fn op_subu(&mut self, op: Opcode) -> OpResult {
        let lhs = self.read_reg(op.rs()) as u32;
        let rhs = self.read_reg(op.rt()) as u32;
        self.set_reg(op.rd(), lhs.wrapping_sub(rhs).sign_extend());
        Ok(())
    }

    /// DADD and DADDU - Add doubleword.
    pub(super) fn op_daddu(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()).wrapping_add(self.read_reg(op.rt()));
        self.set_reg(op.rd(), val);
        Ok(())
    }

    /// DSUB and DSUBU - Subtract doubleword.
    pub(super) fn op_dsubu(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()).wrapping_sub(self.read_reg(op.rt()));
        self.set_reg(op.rd(), val);
        Ok(())
    }

    /// AND - Bitwise and.
    pub(super) fn op_and(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) & self.read_reg(op.rt());
        self.set_reg(op.rd(), val);
        Ok(())
    }

    /// OR - Bitwise or.
    pub(super) fn op_or(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) | self.read_reg(op.rt());
        self.set_reg(op.rd(), val);
        Ok(())
    }

    /// XOR - Bitwise exclusive or.
    pub(super) fn op_xor(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) ^ self.read_reg(op.rt());
        self.set_reg(op.rd(), val);
        Ok(())
    }

    /// NOR - Bitwise not or.
    pub(super) fn op_nor(&mut self, op: Opcode) -> OpResult {
        let val = !(self.read_reg(op.rs()) | self.read_reg(op.rt()));
        self.set_reg(op.rd(), val);
        Ok(())
    }

    /// SLT - Set if less than.
    pub(super) fn op_slt(&mut self, op: Opcode) -> OpResult {
        let val = (self.read_reg(op.rs()) as i64) < self.read_reg(op.rt()) as i64;
        self.set_reg(op.rd(), val as u64);
        Ok(())
    }

    /// SLTU - Set if less than unsigned.
    pub(super) fn op_sltu(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) < self.read_reg(op.rt());
        self.set_reg(op.rd(), val as u64);
        Ok(())
    }

    /// TGE, TGEU, TLT, TLTU, TEQ and TNE - Trap if the registers satisfy `cond`. Traps aren't
    /// emulated, so the CPU halts.
    pub(super) fn op_trap(&mut self, op: Opcode, cond: impl FnOnce(u64, u64) -> bool) -> OpResult {
        if cond(self.read_reg(op.rs()), self.read_reg(op.rt())) {
            self.halt(Halt::Trap(self.last_pc));
        }
        Ok(())
    }

    /// The immediate forms of the trap instructions.
    pub(super) fn op_trap_imm(
        &mut self,
        op: Opcode,
        cond: impl FnOnce(u64, u64) -> bool,
    ) -> OpResult {
        if cond(self.read_reg(op.rs()), op.signed_imm()) {
            self.halt(Halt::Trap(self.last_pc));
        }
        Ok(())
    }

    /// # BCONDZ - Compare with zero and branch
    ///
    /// Used by BLTZ, BGEZ, BLEZ and BGTZ and their likely and linking forms.
    pub(super) fn op_bcondz(
        &mut self,
        op: Opcode,
        cond: impl FnOnce(i64) -> bool,
        link: Register,
        likely: bool,
    ) -> OpResult {
        let cond = cond(self.read_reg(op.rs()) as i64);
        self.branch(cond, self.branch_target(op), link, likely);
        Ok(())
    }

    /// J - Jump.
    pub(super) fn op_j(&mut self, op: Opcode) -> OpResult {
        let target = (self.pc & 0xf000_0000) | (op.target() << 2);
        self.branch(true, target, Register::ZERO, false);
        Ok(())
    }

    /// JAL - Jump and link.
    pub(super) fn op_jal(&mut self, op: Opcode) -> OpResult {
        let target = (self.pc & 0xf000_0000) | (op.target() << 2);
        self.branch(true, target, Register::RA, false);
        Ok(())
    }

    /// BEQ and BEQL - Branch if equal.
    pub(super) fn op_beq(&mut self, op: Opcode, likely: bool) -> OpResult {
        let cond = self.read_reg(op.rs()) == self.read_reg(op.rt());
        self.branch(cond, self.branch_target(op), Register::ZERO, likely);
        Ok(())
    }

    /// BNE and BNEL - Branch if not equal.
    pub(super) fn op_bne(&mut self, op: Opcode, likely: bool) -> OpResult {
        let cond = self.read_reg(op.rs()) != self.read_reg(op.rt());
        self.branch(cond, self.branch_target(op), Register::ZERO, likely);
        Ok(())
    }

    /// # ADDI and ADDIU - Add immediate
    ///
    /// The word result is sign extended, and never traps on overflow.
    pub(super) fn op_addiu(&mut self, op: Opcode) -> OpResult {
        let val = (self.read_reg(op.rs()) as u32).wrapping_add(op.signed_imm() as u32);
        self.set_reg(op.rt(), val.sign_extend());
        Ok(())
    }

    /// DADDI and DADDIU - Add immediate doubleword.
    pub(super) fn op_daddiu(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// SLTI - Set if less than immediate signed.
    pub(super) fn op_slti(&mut self, op: Opcode) -> OpResult {
        let val = (self.read_reg(op.rs()) as i64) < op.signed_imm() as i64;
        self.set_reg(op.rt(), val as u64);
        Ok(())
    }

    /// SLTIU - Set if less than sign extended immediate, compared unsigned.
    pub(super) fn op_sltiu(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) < op.signed_imm();
        self.set_reg(op.rt(), val as u64);
        Ok(())
    }

    /// ANDI - Bitwise and immediate.
    pub(super) fn op_andi(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) & op.imm() as u64;
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// ORI - Bitwise or immediate.
    pub(super) fn op_ori(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) | op.imm() as u64;
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// XORI - Bitwise exclusive or immediate.
    pub(super) fn op_xori(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rs()) ^ op.imm() as u64;
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LUI - Load upper immediate.
    pub(super) fn op_lui(&mut self, op: Opcode) -> OpResult {
        self.set_reg(op.rt(), (op.imm() << 16).sign_extend());
        Ok(())
    }

    /// LB - Load byte.
    pub(super) fn op_lb(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<Byte>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), (val as u8).sign_extend());
        Ok(())
    }

    /// LBU - Load byte unsigned.
    pub(super) fn op_lbu(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<Byte>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LH - Load half word.
    pub(super) fn op_lh(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<HalfWord>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), (val as u16).sign_extend());
        Ok(())
    }

    /// LHU - Load half word unsigned.
    pub(super) fn op_lhu(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<HalfWord>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LW - Load word.
    pub(super) fn op_lw(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<Word>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), (val as u32).sign_extend());
        Ok(())
    }

    /// LWU - Load word unsigned.
    pub(super) fn op_lwu(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<Word>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LD - Load doubleword.
    pub(super) fn op_ld(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<DoubleWord>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LWL - Load word left.
    pub(super) fn op_lwl(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let addr = self.addr(op);
        let word = self.data_load::<Word>(dbg, addr & !3)?;
        let val = access::load_word_left(self.read_reg(op.rt()), word as u32, addr);
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LWR - Load word right.
    pub(super) fn op_lwr(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let addr = self.addr(op);
        let word = self.data_load::<Word>(dbg, addr & !3)?;
        let val = access::load_word_right(self.read_reg(op.rt()), word as u32, addr);
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LDL - Load doubleword left.
    pub(super) fn op_ldl(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let addr = self.addr(op);
        let dword = self.data_load::<DoubleWord>(dbg, addr & !7)?;
        let val = access::load_dword_left(self.read_reg(op.rt()), dword, addr);
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// LDR - Load doubleword right.
    pub(super) fn op_ldr(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let addr = self.addr(op);
        let dword = self.data_load::<DoubleWord>(dbg, addr & !7)?;
        let val = access::load_dword_right(self.read_reg(op.rt()), dword, addr);
        self.set_reg(op.rt(), val);
        Ok(())
    }

    /// SB - Store byte.
    pub(super) fn op_sb(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.data_store::<Byte>(dbg, self.addr(op), self.read_reg(op.rt()))
    }

    /// SH - Store half word.
    pub(super) fn op_sh(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.data_store::<HalfWord>(dbg, self.addr(op), self.read_reg(op.rt()))
    }

    /// SW - Store word.
    pub(super) fn op_sw(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.data_store::<Word>(dbg, self.addr(op), self.read_reg(op.rt()))
    }

    /// SD - Store doubleword.
    pub(super) fn op_sd(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.data_store::<DoubleWord>(dbg, self.addr(op), self.read_reg(op.rt()))
    }

    /// SWL - Store word left.
    pub(super) fn op_swl(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let (addr, reg) = (self.addr(op), self.read_reg(op.rt()));
        self.data_merge::<Word>(dbg, addr, |old| {
            access::store_word_left(old as u32, reg, addr) as u64
        })
    }

    /// SWR - Store word right.
    pub(super) fn op_swr(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let (addr, reg) = (self.addr(op), self.read_reg(op.rt()));
        self.data_merge::<Word>(dbg, addr, |old| {
            access::store_word_right(old as u32, reg, addr) as u64
        })
    }

    /// SDL - Store doubleword left.
    pub(super) fn op_sdl(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let (addr, reg) = (self.addr(op), self.read_reg(op.rt()));
        self.data_merge::<DoubleWord>(dbg, addr, |old| access::store_dword_left(old, reg, addr))
    }

    /// SDR - Store doubleword right.
    pub(super) fn op_sdr(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let (addr, reg) = (self.addr(op), self.read_reg(op.rt()));
        self.data_merge::<DoubleWord>(dbg, addr, |old| access::store_dword_right(old, reg, addr))
    }

    /// Rewrite the aligned unit containing `addr` with the result of `merge`, which is given the
    /// current content.
    fn data_merge<T: AddrUnit>(
        &mut self,
        dbg: &mut impl Debugger,
        addr: u32,
        merge: impl FnOnce(u64) -> u64,
    ) -> OpResult {
        let aligned = addr & !(T::WIDTH as u32 - 1);
        dbg.data_store(aligned);

        let phys = self.translate(aligned, true)?;
        let old = self.bus.load::<T>(phys)?;
        self.bus.store::<T>(phys, merge(old))?;

        self.code_cache.notify_store(aligned);
        Ok(())
    }

    /// LL - Load linked.
    pub(super) fn op_ll(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        let val = self.data_load::<Word>(dbg, self.addr(op))?;
        self.set_reg(op.rt(), (val as u32).sign_extend());
        self.ll_bit = true;
        Ok(())
    }

    /// SC - Store conditional. Only stores if the link bit is set, which is always cleared.
    pub(super) fn op_sc(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        if !self.ll_bit {
            self.set_reg(op.rt(), 0);
            return Ok(());
        }
        self.ll_bit = false;
        self.data_store::<Word>(dbg, self.addr(op), self.read_reg(op.rt()))?;
        self.set_reg(op.rt(), 1);
        Ok(())
    }
}
