use crate::cpu::Irq;
use crate::Cycle;

use std::collections::BinaryHeap;
use std::collections::binary_heap::Iter as BinaryHeapIter;
use std::cmp::Ordering;
use std::fmt;

/// This is reponsible to handling events and timing of the system in general.
///
/// The cycle counter runs in units of COP0 Count ticks, so the low 32 bits of ['Schedule::cycle']
/// are the value of the Count register.
pub struct Schedule {
    /// The absolute cycle number. It's used for timing events and allow the devices on ['Bus'] to
    /// pick an absolute cycle to run an event.
    cycle: Cycle,
    /// Event queue. Events are sorted in the binary queue such that the next event to run is the
    /// root item.
    events: BinaryHeap<EventEntry>,
    /// The cycle when the next event is ready.
    next_event: Cycle,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            cycle: 0,
            next_event: Cycle::MAX,
            events: BinaryHeap::with_capacity(16),
        }
    }

    fn update_next_event(&mut self) {
       self.next_event = self.events
           .peek()
           .map(|entry| entry.0)
           .unwrap_or(Cycle::MAX);
    }

    /// Returns iter of all event entries in the event heap in arbitary order.
    pub fn iter(&self) -> BinaryHeapIter<'_, EventEntry> {
        self.events.iter()
    }

    /// Schedule an ['Event'] at a given absolute cycle.
    pub fn schedule_at(&mut self, cycle: Cycle, event: Event) {
        trace!("Scheduled {event} at cycle {cycle}");
        self.events.push(EventEntry(cycle, event));
        self.update_next_event();
    }

    /// Schedule an ['Event'] in a given number of cycles.
    pub fn schedule_in(&mut self, cycles: Cycle, event: Event) {
        self.schedule_at(self.cycle + cycles, event);
    }

    /// Schedule an ['Event'] to run the next time the Count register reads `count`. If it's
    /// equal to the current count, the event is scheduled one full wrap later.
    pub fn schedule_at_count(&mut self, count: u32, event: Event) {
        let now = self.cycle as u32;
        let delta = match count.wrapping_sub(now) {
            0 => 1 << 32,
            delta => delta as Cycle,
        };
        self.schedule_in(delta, event);
    }

    /// Schedule an ['Event'] to be executed as soon as possible.
    pub fn schedule_now(&mut self, event: Event) {
        self.schedule_at(self.cycle, event);
    }

    /// Returns an event if any is ready.
    pub fn pop_event(&mut self) -> Option<Event> {
        if self.next_event <= self.cycle {
            let event = self.events.pop().map(|entry| entry.1);
            self.update_next_event();
            event
        } else {
            None
        }
    }

    /// Returns true if any event is ready to run.
    pub fn event_ready(&self) -> bool {
        self.next_event <= self.cycle
    }

    /// Remove all events of a given kind.
    pub fn unschedule(&mut self, event: Event) {
        self.events.retain(|entry| entry.1 != event);
        self.update_next_event();
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// The value of the COP0 Count register.
    pub fn count(&self) -> u32 {
        self.cycle as u32
    }

    /// Move a given amount of cycles forward.
    pub fn tick(&mut self, cycles: Cycle) {
        self.cycle += cycles;
    }

    /// Rewrite the low 32 bits of the cycle counter, which happens when the Count register is
    /// written. All pending events keep their distance to the current cycle.
    pub fn set_count(&mut self, count: u32) {
        let old = self.cycle;
        let new = (old & !0xffff_ffff) | count as Cycle;

        self.events = self.events
            .drain()
            .map(|EventEntry(at, event)| {
                EventEntry(at.saturating_sub(old) + new, event)
            })
            .collect();

        self.cycle = new;
        self.update_next_event();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Count has reached Compare.
    Compare,
    /// Raise an interrupt on the MI interrupt controller.
    IrqTrigger(Irq),
    /// Force the CPU to check if it should take an interrupt.
    IrqCheck,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Event::Compare => {
                write!(f, "Compare timer")
            }
            Event::IrqTrigger(irq) => {
                write!(f, "Trigger IRQ of type: {}", irq)
            }
            Event::IrqCheck => {
                write!(f, "Check IRQ status")
            }
        }
    }
}

pub struct EventEntry(pub Cycle, pub Event);

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))  
    }
}

impl Ord for EventEntry {
    /// Sort smallest to largest cycle.
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}
