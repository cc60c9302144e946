//! # Coprocessor 0
//!
//! System control: exceptions, the timer, interrupt masking and the TLB staging registers.

use r4300_util::{Bit, BitSet, SignExtend};
use super::tlb::TlbStage;
use super::{Cpu, Halt, OpResult};
use super::opcode::Opcode;
use crate::schedule::Event;

pub const INDEX: usize = 0;
pub const RANDOM: usize = 1;
pub const ENTRY_LO0: usize = 2;
pub const ENTRY_LO1: usize = 3;
pub const CONTEXT: usize = 4;
pub const PAGE_MASK: usize = 5;
pub const WIRED: usize = 6;
pub const BAD_VADDR: usize = 8;
pub const COUNT: usize = 9;
pub const ENTRY_HI: usize = 10;
pub const COMPARE: usize = 11;
pub const STATUS: usize = 12;
pub const CAUSE: usize = 13;
pub const EPC: usize = 14;
pub const PRID: usize = 15;
pub const CONFIG: usize = 16;
pub const WATCH_LO: usize = 18;
pub const WATCH_HI: usize = 19;
pub const TAG_LO: usize = 28;
pub const TAG_HI: usize = 29;

/// Status register bits.
pub const STATUS_IE: u32 = 1 << 0;
pub const STATUS_EXL: u32 = 1 << 1;
pub const STATUS_ERL: u32 = 1 << 2;
pub const STATUS_FR: u32 = 1 << 26;
pub const STATUS_CU1: u32 = 1 << 29;

/// Cause bit of the timer interrupt.
pub const CAUSE_IP7: u32 = 1 << 15;
/// Cause bit of the MI interrupt line.
pub const CAUSE_IP2: u32 = 1 << 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// An interrupt has occured.
    Interrupt,
    /// Storing to a TLB mapped page which isn't dirty.
    TlbModification,
    /// TLB miss when loading data or instructions. `refill` is set if no entry spans the address.
    TlbLoad { refill: bool },
    /// TLB miss when storing data.
    TlbStore { refill: bool },
    /// Loading data or instructions at an unaligned address.
    AddressLoad,
    /// Storing data at an unaligned address.
    AddressStore,
    /// Trying to load an instruction from an invalid address.
    BusInstruction,
    /// Trying to load or store data at an invalid address.
    BusData,
    /// Thrown via SYSCALL.
    Syscall,
    /// Thrown via BREAK.
    Breakpoint,
    /// Using a coprocessor which isn't enabled in the status register.
    CopUnusable(u8),
}

impl Exception {
    /// The exception code stored in the cause register.
    pub fn code(self) -> u32 {
        match self {
            Exception::Interrupt => 0x0,
            Exception::TlbModification => 0x1,
            Exception::TlbLoad { .. } => 0x2,
            Exception::TlbStore { .. } => 0x3,
            Exception::AddressLoad => 0x4,
            Exception::AddressStore => 0x5,
            Exception::BusInstruction => 0x6,
            Exception::BusData => 0x7,
            Exception::Syscall => 0x8,
            Exception::Breakpoint => 0x9,
            Exception::CopUnusable(..) => 0xb,
        }
    }
}

pub struct Cop0 {
    regs: [u32; 32],
}

impl Cop0 {
    pub fn new() -> Self {
        let mut regs = [0; 32];
        regs[RANDOM] = 31;
        regs[STATUS] = 0x3400_0000;
        regs[PRID] = 0x0000_0b00;
        regs[CONFIG] = 0x0006_e463;
        Self { regs }
    }

    pub fn reg(&self, idx: usize) -> u32 {
        self.regs[idx]
    }

    pub(super) fn set_reg(&mut self, idx: usize, val: u32) {
        self.regs[idx] = val;
    }

    pub fn status(&self) -> u32 {
        self.regs[STATUS]
    }

    pub fn cause(&self) -> u32 {
        self.regs[CAUSE]
    }

    pub fn epc(&self) -> u32 {
        self.regs[EPC]
    }

    pub fn cop1_usable(&self) -> bool {
        self.regs[STATUS] & STATUS_CU1 != 0
    }

    /// Set or clear an interrupt pending bit in cause.
    pub(super) fn set_cause_ip(&mut self, bit: u32, pending: bool) {
        if pending {
            self.regs[CAUSE] |= bit;
        } else {
            self.regs[CAUSE] &= !bit;
        }
    }

    /// If an interrupt should be taken at the next instruction boundary.
    pub fn irq_pending(&self) -> bool {
        let status = self.regs[STATUS];
        status & (STATUS_IE | STATUS_EXL | STATUS_ERL) == STATUS_IE
            && status & self.regs[CAUSE] & 0xff00 != 0
    }

    pub(super) fn tlb_stage(&self) -> TlbStage {
        TlbStage {
            page_mask: self.regs[PAGE_MASK],
            entry_hi: self.regs[ENTRY_HI],
            entry_lo0: self.regs[ENTRY_LO0],
            entry_lo1: self.regs[ENTRY_LO1],
        }
    }

    pub(super) fn set_tlb_stage(&mut self, stage: TlbStage) {
        self.regs[PAGE_MASK] = stage.page_mask;
        self.regs[ENTRY_HI] = stage.entry_hi;
        self.regs[ENTRY_LO0] = stage.entry_lo0;
        self.regs[ENTRY_LO1] = stage.entry_lo1;
    }

    /// Record the address of a failed TLB translation.
    pub(super) fn set_tlb_fault(&mut self, addr: u32) {
        self.regs[BAD_VADDR] = addr;
        self.regs[CONTEXT] = (self.regs[CONTEXT] & 0xff80_000f) | ((addr >> 9) & 0x007f_fff0);
        self.regs[ENTRY_HI] = (addr & 0xffff_e000) | (self.regs[ENTRY_HI] & 0xff);
    }

    /// Start handling an exception. Sets the exception code and coprocessor number in cause, and
    /// if not already handling an exception, stores the return address in EPC and sets EXL. The
    /// return address is `pc`, or the branch before it if `pc` is in a delay slot, which is also
    /// recorded in bit 31 of cause.
    ///
    /// # Returns
    ///
    /// The address of the exception handler.
    pub fn enter_exception(&mut self, pc: u32, in_delay: bool, ex: Exception) -> u32 {
        let exl = self.regs[STATUS] & STATUS_EXL != 0;

        let cop = match ex {
            Exception::CopUnusable(cop) => cop as u32,
            _ => 0,
        };

        self.regs[CAUSE] = self.regs[CAUSE]
            .set_bit_range(2, 6, ex.code())
            .set_bit_range(28, 29, cop);

        if !exl {
            self.regs[EPC] = if in_delay { pc.wrapping_sub(4) } else { pc };
            self.regs[CAUSE] = self.regs[CAUSE].set_bit(31, in_delay);
            self.regs[STATUS] |= STATUS_EXL;
        }

        match ex {
            Exception::TlbLoad { refill: true } | Exception::TlbStore { refill: true } if !exl => {
                0x8000_0000
            }
            _ => 0x8000_0180,
        }
    }
}

/// COP0 instructions.
impl Cpu {
    /// MFC0 - Move from coprocessor 0.
    pub(super) fn op_mfc0(&mut self, op: Opcode) -> OpResult {
        let val = match op.rd().0 as usize {
            COUNT => self.bus.schedule.count(),
            reg => self.cop0.reg(reg),
        };
        self.set_reg(op.rt(), val.sign_extend());
        Ok(())
    }

    /// MTC0 - Move to coprocessor 0.
    pub(super) fn op_mtc0(&mut self, op: Opcode) -> OpResult {
        let val = self.read_reg(op.rt()) as u32;
        let reg = op.rd().0 as usize;
        match reg {
            INDEX => {
                if val.bit_range(0, 5) > 31 {
                    self.halt(Halt::TlbIndex(val.bit_range(0, 5)));
                }
                self.cop0.set_reg(INDEX, val & 0x8000_003f);
            }
            RANDOM | BAD_VADDR | PRID => {}
            ENTRY_LO0 | ENTRY_LO1 => self.cop0.set_reg(reg, val & 0x3fff_ffff),
            CONTEXT => {
                let old = self.cop0.reg(CONTEXT);
                self.cop0.set_reg(CONTEXT, (val & 0xff80_0000) | (old & 0x007f_fff0));
            }
            PAGE_MASK => self.cop0.set_reg(PAGE_MASK, val & 0x01ff_e000),
            WIRED => {
                self.cop0.set_reg(WIRED, val & 0x3f);
                self.cop0.set_reg(RANDOM, 31);
            }
            COUNT => self.write_count(val),
            ENTRY_HI => self.cop0.set_reg(ENTRY_HI, val & 0xffff_e0ff),
            COMPARE => self.write_compare(val),
            STATUS => self.write_status(val),
            CAUSE => {
                if val != 0 {
                    self.halt(Halt::CauseWrite(val));
                } else {
                    self.cop0.set_reg(CAUSE, 0);
                }
            }
            EPC | CONFIG | WATCH_LO | WATCH_HI => self.cop0.set_reg(reg, val),
            TAG_LO => self.cop0.set_reg(TAG_LO, val & 0x0fff_ffc0),
            TAG_HI => self.cop0.set_reg(TAG_HI, 0),
            _ => self.halt(Halt::UnknownCop0Register(reg as u8)),
        }
        Ok(())
    }

    /// Rewrite Count. Interrupts already due are delivered first, then every pending event is
    /// moved along with the counter and the timer is rescheduled.
    fn write_count(&mut self, val: u32) {
        self.run_events();
        self.bus.schedule.set_count(val);
        self.bus.schedule.unschedule(Event::Compare);
        self.bus.schedule.schedule_at_count(self.cop0.reg(COMPARE), Event::Compare);
    }

    fn write_compare(&mut self, val: u32) {
        self.bus.schedule.unschedule(Event::Compare);
        self.bus.schedule.schedule_at_count(val, Event::Compare);
        self.cop0.set_reg(COMPARE, val);
        self.cop0.set_cause_ip(CAUSE_IP7, false);
    }

    /// Write the status register. Changing the FR bit reshuffles the FPU registers. The new status
    /// may unmask an interrupt, which is taken right away with EPC pointing at the next
    /// instruction.
    fn write_status(&mut self, val: u32) {
        let old = self.cop0.status();
        if (old ^ val) & STATUS_FR != 0 {
            self.cop1.set_fr(val & STATUS_FR != 0);
        }
        self.cop0.set_reg(STATUS, val);
        self.check_interrupt();
        self.run_events();
    }

    /// TLBR - Read indexed TLB entry.
    pub(super) fn op_tlbr(&mut self) -> OpResult {
        let index = self.cop0.reg(INDEX).bit_range(0, 4) as usize;
        let stage = self.tlb.read(index);
        self.cop0.set_tlb_stage(stage);
        Ok(())
    }

    /// TLBWI - Write indexed TLB entry.
    pub(super) fn op_tlbwi(&mut self) -> OpResult {
        let index = self.cop0.reg(INDEX).bit_range(0, 4) as usize;
        self.tlb_write(index);
        Ok(())
    }

    /// TLBWR - Write random TLB entry.
    ///
    /// Random is derived from Count, and is always between Wired and 31.
    pub(super) fn op_tlbwr(&mut self) -> OpResult {
        let wired = self.cop0.reg(WIRED).min(31);
        let random = (self.bus.schedule.count() / 2) % (32 - wired) + wired;
        self.cop0.set_reg(RANDOM, random);
        self.tlb_write(random as usize);
        Ok(())
    }

    fn tlb_write(&mut self, index: usize) {
        let stage = self.cop0.tlb_stage();
        self.tlb.write(index, stage, self.bus.ram(), &mut self.code_cache);
    }

    /// TLBP - Probe TLB for matching entry.
    pub(super) fn op_tlbp(&mut self) -> OpResult {
        let entry_hi = self.cop0.reg(ENTRY_HI);
        let index = match self.tlb.probe(entry_hi) {
            Some(index) => index as u32,
            None => self.cop0.reg(INDEX) | 0x8000_0000,
        };
        debug!("TLB probe for {entry_hi:08x}: {index:08x}");
        self.cop0.set_reg(INDEX, index);
        Ok(())
    }

    /// ERET - Return from exception.
    pub(super) fn op_eret(&mut self) -> OpResult {
        if self.cop0.status() & STATUS_ERL != 0 {
            self.halt(Halt::EretErrorLevel(self.last_pc));
            return Ok(());
        }
        let status = self.cop0.status() & !STATUS_EXL;
        self.cop0.set_reg(STATUS, status);

        let epc = self.cop0.epc();
        self.pc = epc;
        self.next_pc = epc.wrapping_add(4);

        self.ll_bit = false;
        self.check_interrupt();
        self.run_events();
        Ok(())
    }
}
