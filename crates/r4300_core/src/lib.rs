#[macro_use]
extern crate log;

#[cfg(test)]
mod test;

pub mod bus;
pub mod code_cache;
pub mod cpu;
pub mod schedule;

pub use bus::pif::PifProtocol;
pub use cpu::{Cpu, Halt};

use bus::Bus;
use serde::{Deserialize, Serialize};

/// Used to represent an absolute number of COP0 Count ticks since startup. This will never
/// overflow.
pub type Cycle = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Count ticks for each instruction executed.
    pub count_per_op: u32,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self { count_per_op: 2 }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The CPU is halted.
    Halted,
    /// All steps have been run.
    Steps,
    /// The debugger asked to stop.
    Break,
}

pub trait Debugger {
    /// Called when loading an instruction.
    fn instruction_load(&mut self, addr: u32);
    /// Called when loading data.
    fn data_load(&mut self, addr: u32);
    /// Called when storing data.
    fn data_store(&mut self, addr: u32);
    /// Called after every instruction. The ['System'] will stop if it returns true.
    fn should_stop(&mut self) -> bool;
}

// Implement debugger for unit type to easily use no debugger.
impl Debugger for () {
    fn instruction_load(&mut self, _: u32) {}

    fn data_load(&mut self, _: u32) {}

    fn data_store(&mut self, _: u32) {}

    fn should_stop(&mut self) -> bool {
        false
    }
}

/// The CPU together with everything it's connected to.
pub struct System {
    pub cpu: Box<Cpu>,
}

impl System {
    pub fn new(config: &CpuConfig, protocol: Box<dyn PifProtocol>) -> Self {
        Self { cpu: Cpu::new(config, Bus::new(protocol)) }
    }

    /// Copy a raw big endian image into RDRAM at physical address `addr`.
    pub fn load_image(&mut self, addr: u32, image: &[u8]) {
        debug!("Loading {} bytes at {addr:08x}", image.len());
        self.cpu.bus_mut().ram_mut().write_bytes(addr, image);
    }

    /// Run up to `steps` instructions.
    pub fn run(&mut self, steps: u64, dbg: &mut impl Debugger) -> StopReason {
        for _ in 0..steps {
            if !self.cpu.step(dbg) {
                return StopReason::Halted;
            }
            if dbg.should_stop() {
                return StopReason::Break;
            }
        }
        StopReason::Steps
    }
}
