mod cop0;
mod mem;

use crate::bus::Bus;
use crate::cpu::opcode::Ins;
use crate::{Cpu, CpuConfig};

/// Where test programs are placed. It's in KSEG0 so no TLB entries are needed.
const CODE_START: u32 = 0x8000_1000;

/// Give up on programs that never reach a break.
const STEP_LIMIT: usize = 100_000;

fn new_cpu() -> Box<Cpu> {
    Cpu::new(&CpuConfig::default(), Bus::new(Box::new(())))
}

/// Write `code` to the physical address behind the direct mapped address `addr`.
fn load_code(cpu: &mut Cpu, addr: u32, code: &[u32]) {
    let bytes: Vec<u8> = code.iter().flat_map(|word| word.to_be_bytes()).collect();
    cpu.bus_mut().ram_mut().write_bytes(addr & 0x1fff_ffff, &bytes);
}

/// Step until the CPU is about to execute a break instruction or halts.
fn run_cpu(cpu: &mut Cpu) {
    for _ in 0..STEP_LIMIT {
        // Stop if the current instruction is break.
        if cpu.curr_ins().decode() == Ins::Break {
            return;
        }
        if !cpu.step(&mut ()) {
            return;
        }
    }
    panic!("program didn't reach a break at {:08x}", cpu.pc());
}

/// Start executing `code` at ['CODE_START'] on a fresh CPU.
fn start_code(cpu: &mut Cpu, code: &[u32]) {
    load_code(cpu, CODE_START, code);
    cpu.set_pc(CODE_START);
    run_cpu(cpu);
}

pub fn run_code(code: &[u32]) -> Box<Cpu> {
    let mut cpu = new_cpu();
    start_code(&mut cpu, code);
    cpu
}
