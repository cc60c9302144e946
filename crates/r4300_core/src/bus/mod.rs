//! The physical memory map of the console, as far as the CPU core cares.

pub mod pif;
pub mod ram;

use crate::cpu::{Irq, IrqState, cop0::Exception};
use crate::schedule::Schedule;

use pif::{Pif, PifProtocol};
use ram::Ram;

pub struct Bus {
    pub irq_state: IrqState,
    pub schedule: Schedule,
    ram: Ram,
    pif: Pif,
}

impl Bus {
    pub fn new(protocol: Box<dyn PifProtocol>) -> Self {
        Self {
            irq_state: IrqState::new(),
            schedule: Schedule::new(),
            ram: Ram::new(),
            pif: Pif::new(protocol),
        }
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    pub fn pif(&self) -> &Pif {
        &self.pif
    }

    /// Read a word from RAM without any side effects. Returns `None` outside of RAM.
    pub fn peek(&self, addr: u32) -> Option<u32> {
        match addr {
            Ram::BUS_BEGIN..=Ram::BUS_END if Word::is_aligned(addr) => {
                Some(self.ram.load::<Word>(addr) as u32)
            }
            _ => None,
        }
    }

    /// Load from a physical address. The value is zero extended.
    pub fn load<T: AddrUnit>(&mut self, addr: u32) -> Result<u64, Exception> {
        match addr {
            Ram::BUS_BEGIN..=Ram::BUS_END => {
                Ok(self.ram.load::<T>(addr))
            }
            Pif::BUS_BEGIN..=Pif::BUS_END => {
                Ok(self.pif.load::<T>(addr - Pif::BUS_BEGIN))
            }
            IrqState::BUS_BEGIN..=IrqState::BUS_END => {
                Ok(self.irq_state.load(addr - IrqState::BUS_BEGIN) as u64)
            }
            SiStatus::BUS_BEGIN..=SiStatus::BUS_END => {
                Ok(SiStatus::load(&self.irq_state) as u64)
            }
            _ => {
                warn!("BUS data error when loading at address {addr:08x}");
                Err(Exception::BusData)
            }
        }
    }

    /// Store to a physical address. Only the low `T::WIDTH` bytes of `val` are used.
    pub fn store<T: AddrUnit>(&mut self, addr: u32, val: u64) -> Result<(), Exception> {
        match addr {
            Ram::BUS_BEGIN..=Ram::BUS_END => {
                self.ram.store::<T>(addr, val)
            }
            Pif::BUS_BEGIN..=Pif::BUS_END => {
                self.pif.store::<T>(&mut self.schedule, addr - Pif::BUS_BEGIN, val)
            }
            IrqState::BUS_BEGIN..=IrqState::BUS_END => {
                self.irq_state.store(
                    &mut self.schedule,
                    addr - IrqState::BUS_BEGIN,
                    val as u32,
                );
            }
            SiStatus::BUS_BEGIN..=SiStatus::BUS_END => {
                SiStatus::store(&mut self.irq_state, &mut self.schedule);
            }
            _ => {
                warn!("BUS data error when storing at address {addr:08x}");
                return Err(Exception::BusData);
            }
        }
        Ok(())
    }
}

pub trait BusMap {
    /// The first address in the range.
    const BUS_BEGIN: u32;
    /// The last address included in the range.
    const BUS_END: u32;
}

/// The status register of the serial interface. Only the interrupt flag is modelled, since the
/// serial protocol itself lives in the PIF collaborator.
struct SiStatus;

impl SiStatus {
    fn load(irq_state: &IrqState) -> u32 {
        (irq_state.is_triggered(Irq::Si) as u32) << 12
    }

    /// Any write acknowledges the SI interrupt.
    fn store(irq_state: &mut IrqState, schedule: &mut Schedule) {
        irq_state.clear(Irq::Si);
        schedule.schedule_now(crate::schedule::Event::IrqCheck);
    }
}

impl BusMap for SiStatus {
    const BUS_BEGIN: u32 = 0x0480_0018;
    const BUS_END: u32 = Self::BUS_BEGIN + 4 - 1;
}

pub trait AddrUnit {
    const WIDTH: usize;

    fn is_aligned(address: u32) -> bool {
        address % Self::WIDTH as u32 == 0
    }
}

pub struct Byte;

impl AddrUnit for Byte {
    const WIDTH: usize = 1;
}

pub struct HalfWord;

impl AddrUnit for HalfWord {
    const WIDTH: usize = 2;
}

pub struct Word;

impl AddrUnit for Word {
    const WIDTH: usize = 4;
}

pub struct DoubleWord;

impl AddrUnit for DoubleWord {
    const WIDTH: usize = 8;
}
