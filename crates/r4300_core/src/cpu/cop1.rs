//! # Coprocessor 1
//!
//! The floating point register file and the FPU instructions.
//!
//! The register file is 32 64-bit slots. With the FR bit of the status register set, every slot is
//! an independent register. With FR clear the CPU sees 32 single precision registers packed in
//! pairs into the first 16 slots, and a double precision register `n` is slot `n / 2`. The high
//! halves of the 64-bit values are parked in the last 16 slots while FR is clear, so switching mode
//! back and forth loses nothing.

use r4300_util::{Bit, BitSet, SignExtend};
use crate::bus::{Word, DoubleWord};
use crate::Debugger;
use super::cop0::Exception;
use super::fpu::{FpuKernel, RoundingMode};
use super::opcode::{Opcode, Fmt, Register};
use super::{Cpu, Halt, OpResult};

/// FPU implementation and revision.
pub const FCR0: u32 = 0x0000_0511;

/// Bit of the comparison result in FCR31.
const FCR31_CONDITION: usize = 23;

/// Enable bit of the divide by zero exception in FCR31.
const FCR31_DIV_ZERO_ENABLE: usize = 10;

pub struct Cop1 {
    fgr: [u64; 32],
    fr: bool,
    fcr31: u32,
    pub(super) kernel: FpuKernel,
}

impl Cop1 {
    pub fn new(fr: bool) -> Self {
        Self {
            fgr: [0; 32],
            fr,
            fcr31: 0,
            kernel: FpuKernel::default(),
        }
    }

    pub fn fr(&self) -> bool {
        self.fr
    }

    pub fn fcr31(&self) -> u32 {
        self.fcr31
    }

    pub fn set_fcr31(&mut self, val: u32) {
        self.fcr31 = val;
        self.kernel.set_rounding_mode(RoundingMode::from_fcr31(val));
    }

    pub fn condition(&self) -> bool {
        self.fcr31.bit(FCR31_CONDITION)
    }

    fn set_condition(&mut self, val: bool) {
        self.fcr31 = self.fcr31.set_bit(FCR31_CONDITION, val);
    }

    /// Read register `idx` as a single precision bit pattern.
    pub fn read_single(&self, idx: usize) -> u32 {
        if self.fr {
            self.fgr[idx] as u32
        } else {
            half(self.fgr[idx >> 1], idx & 1 == 1)
        }
    }

    pub fn write_single(&mut self, idx: usize, val: u32) {
        if self.fr {
            self.fgr[idx] = set_half(self.fgr[idx], false, val);
        } else {
            let slot = &mut self.fgr[idx >> 1];
            *slot = set_half(*slot, idx & 1 == 1, val);
        }
    }

    /// Read register `idx` as a double precision bit pattern.
    pub fn read_double(&self, idx: usize) -> u64 {
        if self.fr {
            self.fgr[idx]
        } else {
            self.fgr[idx >> 1]
        }
    }

    pub fn write_double(&mut self, idx: usize, val: u64) {
        if self.fr {
            self.fgr[idx] = val;
        } else {
            self.fgr[idx >> 1] = val;
        }
    }

    fn single(&self, idx: usize) -> f32 {
        f32::from_bits(self.read_single(idx))
    }

    fn set_single(&mut self, idx: usize, val: f32) {
        self.write_single(idx, val.to_bits());
    }

    fn double(&self, idx: usize) -> f64 {
        f64::from_bits(self.read_double(idx))
    }

    fn set_double(&mut self, idx: usize, val: f64) {
        self.write_double(idx, val.to_bits());
    }

    /// Switch register mode, moving the bit patterns to where the new mode expects them.
    pub fn set_fr(&mut self, fr: bool) {
        if fr == self.fr {
            return;
        }
        let old = self.fgr;
        if fr {
            for i in 0..32 {
                let low = half(old[i >> 1], i & 1 == 1);
                let high = half(old[16 + (i >> 1)], i & 1 == 1);
                self.fgr[i] = (high as u64) << 32 | low as u64;
            }
        } else {
            for i in 0..16 {
                let (even, odd) = (old[i * 2], old[i * 2 + 1]);
                self.fgr[i] = (odd as u32 as u64) << 32 | even as u32 as u64;
                self.fgr[16 + i] = (odd >> 32) << 32 | even >> 32;
            }
        }
        self.fr = fr;
    }
}

fn half(slot: u64, high: bool) -> u32 {
    if high {
        (slot >> 32) as u32
    } else {
        slot as u32
    }
}

fn set_half(slot: u64, high: bool, val: u32) -> u64 {
    if high {
        (slot & 0xffff_ffff) | (val as u64) << 32
    } else {
        (slot & !0xffff_ffff) | val as u64
    }
}

/// FPU instructions.
impl Cpu {
    /// Abort the instruction with a coprocessor unusable exception if COP1 is disabled.
    pub(super) fn check_cop1(&self) -> OpResult {
        if self.cop0.cop1_usable() {
            Ok(())
        } else {
            Err(Exception::CopUnusable(1))
        }
    }

    /// LWC1 - Load word to coprocessor 1.
    pub(super) fn op_lwc1(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.check_cop1()?;
        let val = self.data_load::<Word>(dbg, self.addr(op))?;
        self.cop1.write_single(op.ft(), val as u32);
        Ok(())
    }

    /// LDC1 - Load doubleword to coprocessor 1.
    pub(super) fn op_ldc1(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.check_cop1()?;
        let val = self.data_load::<DoubleWord>(dbg, self.addr(op))?;
        self.cop1.write_double(op.ft(), val);
        Ok(())
    }

    /// SWC1 - Store word from coprocessor 1.
    pub(super) fn op_swc1(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.check_cop1()?;
        let val = self.cop1.read_single(op.ft());
        self.data_store::<Word>(dbg, self.addr(op), val as u64)
    }

    /// SDC1 - Store doubleword from coprocessor 1.
    pub(super) fn op_sdc1(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        self.check_cop1()?;
        let val = self.cop1.read_double(op.ft());
        self.data_store::<DoubleWord>(dbg, self.addr(op), val)
    }

    /// MFC1 - Move word from coprocessor 1.
    pub(super) fn op_mfc1(&mut self, op: Opcode) -> OpResult {
        self.check_cop1()?;
        self.set_reg(op.rt(), self.cop1.read_single(op.fs()).sign_extend());
        Ok(())
    }

    /// DMFC1 - Move doubleword from coprocessor 1.
    pub(super) fn op_dmfc1(&mut self, op: Opcode) -> OpResult {
        self.check_cop1()?;
        self.set_reg(op.rt(), self.cop1.read_double(op.fs()));
        Ok(())
    }

    /// CFC1 - Move control word from coprocessor 1. Only FCR0 and FCR31 exist.
    pub(super) fn op_cfc1(&mut self, op: Opcode) -> OpResult {
        self.check_cop1()?;
        match op.fs() {
            0 => self.set_reg(op.rt(), FCR0.sign_extend()),
            31 => self.set_reg(op.rt(), self.cop1.fcr31().sign_extend()),
            _ => {}
        }
        Ok(())
    }

    /// MTC1 - Move word to coprocessor 1.
    pub(super) fn op_mtc1(&mut self, op: Opcode) -> OpResult {
        self.check_cop1()?;
        self.cop1.write_single(op.fs(), self.read_reg(op.rt()) as u32);
        Ok(())
    }

    /// DMTC1 - Move doubleword to coprocessor 1.
    pub(super) fn op_dmtc1(&mut self, op: Opcode) -> OpResult {
        self.check_cop1()?;
        self.cop1.write_double(op.fs(), self.read_reg(op.rt()));
        Ok(())
    }

    /// CTC1 - Move control word to coprocessor 1.
    pub(super) fn op_ctc1(&mut self, op: Opcode) -> OpResult {
        self.check_cop1()?;
        if op.fs() == 31 {
            self.cop1.set_fcr31(self.read_reg(op.rt()) as u32);
        }
        Ok(())
    }

    /// BC1F, BC1T, BC1FL and BC1TL - Branch on the FPU condition.
    pub(super) fn op_bc1(&mut self, op: Opcode, on_true: bool, likely: bool) -> OpResult {
        self.check_cop1()?;
        let cond = self.cop1.condition() == on_true;
        self.branch(cond, self.branch_target(op), Register::ZERO, likely);
        Ok(())
    }

    pub(super) fn fpu_binary(
        &mut self,
        op: Opcode,
        fmt: Fmt,
        single: fn(&FpuKernel, f32, f32) -> f32,
        double: fn(&FpuKernel, f64, f64) -> f64,
    ) -> OpResult {
        self.check_cop1()?;
        let (fs, ft) = (op.fs(), op.ft());
        if fmt == Fmt::S {
            let val = single(&self.cop1.kernel, self.cop1.single(fs), self.cop1.single(ft));
            self.cop1.set_single(op.fd(), val);
        } else {
            let val = double(&self.cop1.kernel, self.cop1.double(fs), self.cop1.double(ft));
            self.cop1.set_double(op.fd(), val);
        }
        Ok(())
    }

    pub(super) fn fpu_unary(
        &mut self,
        op: Opcode,
        fmt: Fmt,
        single: fn(&FpuKernel, f32) -> f32,
        double: fn(&FpuKernel, f64) -> f64,
    ) -> OpResult {
        self.check_cop1()?;
        if fmt == Fmt::S {
            let val = single(&self.cop1.kernel, self.cop1.single(op.fs()));
            self.cop1.set_single(op.fd(), val);
        } else {
            let val = double(&self.cop1.kernel, self.cop1.double(op.fs()));
            self.cop1.set_double(op.fd(), val);
        }
        Ok(())
    }

    /// DIV.fmt - Divide. Dividing by zero is only reported.
    pub(super) fn op_fdiv(&mut self, op: Opcode, fmt: Fmt) -> OpResult {
        self.check_cop1()?;
        let zero = match fmt {
            Fmt::S => self.cop1.single(op.ft()) == 0.0,
            _ => self.cop1.double(op.ft()) == 0.0,
        };
        if zero && self.cop1.fcr31().bit(FCR31_DIV_ZERO_ENABLE) {
            warn!("DIV.{fmt} by 0 at {:08x}", self.last_pc);
        }
        self.fpu_binary(op, fmt, FpuKernel::div_s, FpuKernel::div_d)
    }

    /// MOV.fmt - Move the raw bit pattern.
    pub(super) fn op_fmov(&mut self, op: Opcode, fmt: Fmt) -> OpResult {
        self.check_cop1()?;
        if fmt == Fmt::S {
            self.cop1.write_single(op.fd(), self.cop1.read_single(op.fs()));
        } else {
            self.cop1.write_double(op.fd(), self.cop1.read_double(op.fs()));
        }
        Ok(())
    }

    /// ROUND, TRUNC, CEIL, FLOOR and CVT to W or L.
    pub(super) fn op_fto_int(
        &mut self,
        op: Opcode,
        from: Fmt,
        to: Fmt,
        mode: Option<RoundingMode>,
    ) -> OpResult {
        self.check_cop1()?;
        let val = match from {
            Fmt::S => self.cop1.single(op.fs()) as f64,
            _ => self.cop1.double(op.fs()),
        };
        if to == Fmt::W {
            let val = self.cop1.kernel.to_w(val, mode);
            self.cop1.write_single(op.fd(), val as u32);
        } else {
            let val = self.cop1.kernel.to_l(val, mode);
            self.cop1.write_double(op.fd(), val as u64);
        }
        Ok(())
    }

    /// CVT.S and CVT.D. Narrowing conversions round in the current mode.
    pub(super) fn op_fto_float(&mut self, op: Opcode, from: Fmt, to: Fmt) -> OpResult {
        self.check_cop1()?;
        let fs = op.fs();
        match to {
            Fmt::S => {
                let kernel = &self.cop1.kernel;
                let val = match from {
                    Fmt::D => kernel.cvt_s_d(self.cop1.double(fs)),
                    Fmt::W => kernel.cvt_s_w(self.cop1.read_single(fs) as i32),
                    _ => kernel.cvt_s_l(self.cop1.read_double(fs) as i64),
                };
                self.cop1.set_single(op.fd(), val);
            }
            _ => {
                let val = match from {
                    Fmt::S => self.cop1.single(fs) as f64,
                    Fmt::W => self.cop1.read_single(fs) as i32 as f64,
                    _ => self.cop1.kernel.cvt_d_l(self.cop1.read_double(fs) as i64),
                };
                self.cop1.set_double(op.fd(), val);
            }
        }
        Ok(())
    }

    /// C.cond.fmt - Compare and set the condition bit. Unordered operands in the signaling
    /// comparisons halt the CPU.
    pub(super) fn op_fcmp(&mut self, op: Opcode, fmt: Fmt, cond: u8) -> OpResult {
        self.check_cop1()?;
        let (a, b) = match fmt {
            Fmt::S => (self.cop1.single(op.fs()) as f64, self.cop1.single(op.ft()) as f64),
            _ => (self.cop1.double(op.fs()), self.cop1.double(op.ft())),
        };
        if cond & 0x8 != 0 && (a.is_nan() || b.is_nan()) {
            self.halt(Halt::InvalidFpuCompare(self.last_pc));
        }
        let result = self.cop1.kernel.compare(cond, a, b);
        self.cop1.set_condition(result);
        Ok(())
    }
}
