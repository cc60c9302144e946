use r4300_util::Bit;
use crate::bus::BusMap;
use crate::schedule::{Event, Schedule};

use std::fmt;

/// The different kind of interrupts routed through the MIPS interface. The value is the nth bit
/// that represents the interrupts in the interrupt and mask register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Irq {
    /// Signal processor.
    Sp = 0,
    /// Serial interface. Raised when the PIF is done with a command.
    Si = 1,
    /// Audio interface.
    Ai = 2,
    /// Video interface.
    Vi = 3,
    /// Peripheral interface.
    Pi = 4,
    /// Display processor.
    Dp = 5,
}

impl fmt::Display for Irq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match *self {
            Irq::Sp => "SP",
            Irq::Si => "SI",
            Irq::Ai => "AI",
            Irq::Vi => "VI",
            Irq::Pi => "PI",
            Irq::Dp => "DP",
        })
    }
}

const MI_VERSION: u32 = 0x0202_0102;

/// The interrupt registers of the MIPS interface. Any active and unmasked interrupt drives the
/// IP2 line of the CPU.
pub struct IrqState {
    pub status: u32,
    pub mask: u32,
    mode: u32,
}

impl IrqState {
    pub fn new() -> Self {
        Self {
            status: 0,
            mask: 0,
            mode: 0,
        }
    }

    /// Trigger interrupt. This doesn't make the CPU do anything on it's own, since the CPU
    /// doesn't check for new active interrupts unless it's forced to.
    pub fn trigger(&mut self, irq: Irq) {
        self.status |= 1 << irq as u32;
        if self.is_masked(irq) {
            trace!("Triggered irq of type {}", irq);
        }
    }

    /// Acknowledge an interrupt.
    pub fn clear(&mut self, irq: Irq) {
        self.status &= !(1 << irq as u32);
    }

    /// Check if there are any active interrupts. Even if this is true, the CPU may not acknowledge
    /// them, since interrupts can be disabled by the COP0.
    pub fn active(&self) -> bool {
        self.status & self.mask != 0
    }

    pub fn is_triggered(&self, irq: Irq) -> bool {
        self.status.bit(irq as usize)
    }

    /// Check if a specific type of interrupt is masked, meaning if it's enabled.
    pub fn is_masked(&self, irq: Irq) -> bool {
        self.mask.bit(irq as usize)
    }

    /// Store to interrupt registers.
    ///
    /// The mask register is written as pairs of clear/set bits, one pair for each interrupt.
    /// Writing bit 11 of the mode register acknowledges the DP interrupt.
    pub fn store(&mut self, schedule: &mut Schedule, offset: u32, val: u32) {
        schedule.schedule_now(Event::IrqCheck);
        match offset {
            0x0 => {
                self.mode = val & 0x7f;
                if val.bit(11) {
                    self.clear(Irq::Dp);
                }
            }
            0xc => {
                for irq in 0..6 {
                    if val.bit(irq * 2) {
                        self.mask &= !(1 << irq);
                    }
                    if val.bit(irq * 2 + 1) {
                        self.mask |= 1 << irq;
                    }
                }
            }
            _ => warn!("Ignored MI store at offset {offset:#x}"),
        }
    }

    /// Load from interrupt registers.
    pub fn load(&self, offset: u32) -> u32 {
        match offset {
            0x0 => self.mode,
            0x4 => MI_VERSION,
            0x8 => self.status,
            0xc => self.mask,
            _ => 0,
        }
    }
}

impl BusMap for IrqState {
    const BUS_BEGIN: u32 = 0x0430_0000;
    const BUS_END: u32 = Self::BUS_BEGIN + 16 - 1;
}
