use crate::schedule::{Event, Schedule};
use crate::cpu::Irq;
use super::{AddrUnit, BusMap};

pub const PIF_RAM_SIZE: usize = 64;

/// Offset of the PIF command byte.
const CONTROL: usize = 0x3f;

/// Cycles until the SI interrupt fires after the PIF has been kicked.
const SI_DELAY: u64 = 0x900;

/// The serial protocol run by the PIF on its RAM (controllers, EEPROM, memory packs and the CIC
/// challenge). The core only hands over the RAM when a command has been written.
pub trait PifProtocol {
    fn process(&mut self, ram: &mut [u8; PIF_RAM_SIZE]);
}

// No peripherals attached.
impl PifProtocol for () {
    fn process(&mut self, _: &mut [u8; PIF_RAM_SIZE]) {}
}

pub struct Pif {
    ram: [u8; PIF_RAM_SIZE],
    protocol: Box<dyn PifProtocol>,
}

impl Pif {
    pub fn new(protocol: Box<dyn PifProtocol>) -> Self {
        Self { ram: [0; PIF_RAM_SIZE], protocol }
    }

    pub fn ram(&self) -> &[u8; PIF_RAM_SIZE] {
        &self.ram
    }

    pub fn load<T: AddrUnit>(&self, offset: u32) -> u64 {
        let offset = offset as usize;
        (0..T::WIDTH).fold(0, |value, byte| {
            let byte = self.ram.get(offset + byte).copied().unwrap_or(0);
            (value << 8) | byte as u64
        })
    }

    pub fn store<T: AddrUnit>(&mut self, schedule: &mut Schedule, offset: u32, val: u64) {
        let offset = offset as usize;
        for i in 0..T::WIDTH {
            if let Some(byte) = self.ram.get_mut(offset + i) {
                *byte = (val >> (8 * (T::WIDTH - 1 - i))) as u8;
            }
        }
        if offset > CONTROL || offset + T::WIDTH <= CONTROL {
            return;
        }
        if self.ram[CONTROL] == 0x08 {
            self.ram[CONTROL] = 0;
            schedule.schedule_in(SI_DELAY, Event::IrqTrigger(Irq::Si));
        } else {
            self.protocol.process(&mut self.ram);
        }
    }
}

impl BusMap for Pif {
    const BUS_BEGIN: u32 = 0x1fc0_07c0;
    const BUS_END: u32 = Self::BUS_BEGIN + PIF_RAM_SIZE as u32 - 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Byte, Word};

    struct Echo(u32);

    impl PifProtocol for Echo {
        fn process(&mut self, ram: &mut [u8; PIF_RAM_SIZE]) {
            self.0 += 1;
            ram[0] = 0xaa;
        }
    }

    #[test]
    fn control_byte_schedules_si() {
        let mut schedule = Schedule::new();
        let mut pif = Pif::new(Box::new(()));

        pif.store::<Word>(&mut schedule, 0x3c, 0x0000_0008);
        assert_eq!(pif.ram()[CONTROL], 0);

        schedule.tick(SI_DELAY - 1);
        assert_eq!(schedule.pop_event(), None);
        schedule.tick(1);
        assert_eq!(schedule.pop_event(), Some(Event::IrqTrigger(Irq::Si)));
    }

    #[test]
    fn other_commands_go_to_protocol() {
        let mut schedule = Schedule::new();
        let mut pif = Pif::new(Box::new(Echo(0)));

        pif.store::<Byte>(&mut schedule, 0x3f, 0x01);
        assert_eq!(pif.load::<Byte>(0), 0xaa);
        assert_eq!(schedule.pop_event(), None);

        // Not touching the control byte.
        pif.store::<Byte>(&mut schedule, 0x0, 0x11);
        assert_eq!(pif.load::<Byte>(0), 0x11);
    }
}
