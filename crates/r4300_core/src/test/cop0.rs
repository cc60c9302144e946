use crate::cpu::cop0::{CAUSE, COMPARE, COUNT, EPC, INDEX, STATUS, STATUS_EXL};
use crate::cpu::{Halt, Irq, Register};
use super::asm::*;
use super::{load_code, new_cpu, run_code, start_code, CODE_START};

const VECTOR: u32 = 0x8000_0180;

fn exception_code(cause: u32) -> u32 {
    (cause >> 2) & 0x1f
}

#[test]
fn syscall_exception() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[brk()]);
    start_code(&mut cpu, &[nop(), syscall(), brk()]);

    assert_eq!(cpu.pc(), VECTOR);
    assert_eq!(exception_code(cpu.cop0().cause()), 0x8);
    assert_eq!(cpu.cop0().epc(), CODE_START + 4);
    assert_ne!(cpu.cop0().status() & STATUS_EXL, 0);
}

#[test]
fn break_exception() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, CODE_START, &[brk()]);
    cpu.set_pc(CODE_START);

    assert!(cpu.step(&mut ()));
    assert_eq!(cpu.pc(), VECTOR);
    assert_eq!(exception_code(cpu.cop0().cause()), 0x9);
}

#[test]
fn exception_in_delay_slot() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[brk()]);
    start_code(&mut cpu, &[
        beq(Register::ZERO, Register::ZERO, 2),
        syscall(),
        nop(),
        brk(),
    ]);

    assert_eq!(cpu.pc(), VECTOR);
    assert_eq!(cpu.cop0().epc(), CODE_START);
    assert_ne!(cpu.cop0().cause() & 0x8000_0000, 0);
}

#[test]
fn return_from_exception() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[
        mfc0(Register::K0, EPC),
        addiu(Register::K0, Register::K0, 4),
        mtc0(Register::K0, EPC),
        eret(),
    ]);
    start_code(&mut cpu, &[
        lui(Register::T0, 0x8001),
        ll(Register::T1, 0, Register::T0),
        syscall(),
        addiu(Register::V0, Register::ZERO, 1),
        brk(),
    ]);

    assert_eq!(cpu.pc(), CODE_START + 16);
    assert_eq!(cpu.read_reg(Register::V0), 1);
    assert_eq!(cpu.cop0().status() & STATUS_EXL, 0);
    assert!(!cpu.ll_bit());
}

#[test]
fn return_with_error_level_halts() {
    let cpu = run_code(&[
        lui(Register::T0, 0x3400),
        ori(Register::T0, Register::T0, 0x4),
        mtc0(Register::T0, STATUS),
        eret(),
        brk(),
    ]);
    assert_eq!(cpu.halted(), Some(&Halt::EretErrorLevel(CODE_START + 12)));
}

#[test]
fn cause_write_halts() {
    let cpu = run_code(&[
        mtc0(Register::ZERO, CAUSE),
        addiu(Register::T0, Register::ZERO, 0x100),
        mtc0(Register::T0, CAUSE),
        brk(),
    ]);
    assert_eq!(cpu.halted(), Some(&Halt::CauseWrite(0x100)));
}

#[test]
fn index_out_of_range_halts() {
    let cpu = run_code(&[
        addiu(Register::T0, Register::ZERO, 32),
        mtc0(Register::T0, INDEX),
        brk(),
    ]);
    assert_eq!(cpu.halted(), Some(&Halt::TlbIndex(32)));
}

#[test]
fn unknown_register_halts() {
    let cpu = run_code(&[
        mtc0(Register::T0, 7),
        brk(),
    ]);
    assert_eq!(cpu.halted(), Some(&Halt::UnknownCop0Register(7)));
}

#[test]
fn register_write_masks() {
    let cpu = run_code(&[
        addiu(Register::T0, Register::ZERO, -1),
        mtc0(Register::T0, 10),
        mfc0(Register::V0, 10),
        mtc0(Register::T0, 5),
        mfc0(Register::V1, 5),
        mtc0(Register::T0, 6),
        mfc0(Register::A0, 6),
        mtc0(Register::T0, 1),
        mfc0(Register::A1, 1),
        mtc0(Register::T0, 4),
        mfc0(Register::A2, 4),
        mtc0(Register::T0, 2),
        mfc0(Register::A3, 2),
        mtc0(Register::T0, 28),
        mfc0(Register::S0, 28),
        mtc0(Register::T0, 29),
        mfc0(Register::S1, 29),
        brk(),
    ]);
    // Values read back are sign extended.
    assert_eq!(cpu.read_reg(Register::V0), 0xffff_ffff_ffff_e0ff);
    assert_eq!(cpu.read_reg(Register::V1), 0x01ff_e000);
    assert_eq!(cpu.read_reg(Register::A0), 0x3f);
    assert_eq!(cpu.read_reg(Register::A1), 31);
    assert_eq!(cpu.read_reg(Register::A2), 0xffff_ffff_ff80_0000);
    assert_eq!(cpu.read_reg(Register::A3), 0x3fff_ffff);
    assert_eq!(cpu.read_reg(Register::S0), 0x0fff_ffc0);
    assert_eq!(cpu.read_reg(Register::S1), 0);
}

#[test]
fn count_follows_instructions() {
    let cpu = run_code(&[
        nop(),
        nop(),
        mfc0(Register::V0, COUNT),
        addiu(Register::T0, Register::ZERO, 100),
        mtc0(Register::T0, COUNT),
        mfc0(Register::V1, COUNT),
        brk(),
    ]);
    assert_eq!(cpu.read_reg(Register::V0), 4);
    assert_eq!(cpu.read_reg(Register::V1), 102);
}

#[test]
fn timer_interrupt() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[mfc0(Register::K0, CAUSE), brk()]);
    start_code(&mut cpu, &[
        addiu(Register::T0, Register::ZERO, 20),
        mtc0(Register::T0, COMPARE),
        lui(Register::T1, 0x3400),
        ori(Register::T1, Register::T1, 0x8001),
        mtc0(Register::T1, STATUS),
        addiu(Register::V0, Register::V0, 1),
        beq(Register::ZERO, Register::ZERO, -2),
        nop(),
    ]);

    let cause = cpu.read_reg(Register::K0) as u32;
    assert_ne!(cause & 0x8000, 0);
    assert_eq!(exception_code(cause), 0);
    assert_ne!(cpu.read_reg(Register::V0), 0);

    // Taken in the delay slot of the loop branch.
    assert_eq!(cpu.cop0().epc(), CODE_START + 24);
    assert_ne!(cause & 0x8000_0000, 0);
}

#[test]
fn masked_timer_sets_pending_bit() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[brk()]);
    start_code(&mut cpu, &[
        addiu(Register::T1, Register::ZERO, 10),
        mtc0(Register::T1, COMPARE),
        addiu(Register::T0, Register::ZERO, 20),
        addiu(Register::T0, Register::T0, -1),
        bne(Register::T0, Register::ZERO, -2),
        nop(),
        mfc0(Register::V0, CAUSE),
        lui(Register::T2, 0x3400),
        ori(Register::T2, Register::T2, 0x8001),
        mtc0(Register::T2, STATUS),
        addiu(Register::V1, Register::ZERO, 1),
        brk(),
    ]);

    assert_ne!(cpu.read_reg(Register::V0) & 0x8000, 0);

    // Unmasking takes the interrupt right after the status write.
    assert_eq!(cpu.pc(), VECTOR);
    assert_eq!(cpu.cop0().epc(), CODE_START + 40);
    assert_eq!(cpu.read_reg(Register::V1), 0);
}

#[test]
fn count_write_retimes_timer() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[
        mfc0(Register::K0, CAUSE),
        mfc0(Register::K1, COUNT),
        brk(),
    ]);
    start_code(&mut cpu, &[
        addiu(Register::T0, Register::ZERO, 1000),
        mtc0(Register::T0, COMPARE),
        // Only a few instructions away from Compare now.
        addiu(Register::T1, Register::ZERO, 990),
        mtc0(Register::T1, COUNT),
        lui(Register::T2, 0x3400),
        ori(Register::T2, Register::T2, 0x8001),
        mtc0(Register::T2, STATUS),
        addiu(Register::V0, Register::V0, 1),
        beq(Register::ZERO, Register::ZERO, -2),
        nop(),
    ]);

    let cause = cpu.read_reg(Register::K0) as u32;
    assert_ne!(cause & 0x8000, 0);
    assert_eq!(exception_code(cause), 0);
    assert!(cpu.read_reg(Register::V0) < 4);

    let count = cpu.read_reg(Register::K1) as u32;
    assert!((1000..1010).contains(&count), "count was {count}");
}

#[test]
fn count_written_past_compare_delays_timer() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[brk()]);
    start_code(&mut cpu, &[
        addiu(Register::T0, Register::ZERO, 100),
        mtc0(Register::T0, COMPARE),
        lui(Register::T1, 0x3400),
        ori(Register::T1, Register::T1, 0x8001),
        mtc0(Register::T1, STATUS),
        // Count has already passed Compare, so the timer waits for a wrap.
        addiu(Register::T2, Register::ZERO, 200),
        mtc0(Register::T2, COUNT),
        addiu(Register::T3, Register::ZERO, 200),
        addiu(Register::T3, Register::T3, -1),
        bne(Register::T3, Register::ZERO, -2),
        nop(),
        mfc0(Register::V0, CAUSE),
        mfc0(Register::V1, COUNT),
        brk(),
    ]);

    assert_eq!(cpu.pc(), CODE_START + 52);
    assert_eq!(cpu.read_reg(Register::V0) & 0x8000, 0);
    assert!(cpu.read_reg(Register::V1) > 1200);
}

#[test]
fn compare_write_acknowledges_timer() {
    let cpu = run_code(&[
        addiu(Register::T1, Register::ZERO, 6),
        mtc0(Register::T1, COMPARE),
        nop(),
        nop(),
        nop(),
        mfc0(Register::V0, CAUSE),
        mtc0(Register::T1, COMPARE),
        mfc0(Register::V1, CAUSE),
        brk(),
    ]);
    assert_ne!(cpu.read_reg(Register::V0) & 0x8000, 0);
    assert_eq!(cpu.read_reg(Register::V1) & 0x8000, 0);
}

#[test]
fn serial_interrupt_from_pif() {
    let mut cpu = new_cpu();
    load_code(&mut cpu, VECTOR, &[
        mfc0(Register::K0, CAUSE),
        lui(Register::K1, 0xa480),
        sw(Register::ZERO, 0x18, Register::K1),
        brk(),
    ]);
    start_code(&mut cpu, &[
        // Unmask SI in the MIPS interface.
        lui(Register::T2, 0xa430),
        addiu(Register::T3, Register::ZERO, 0x8),
        sw(Register::T3, 0xc, Register::T2),
        // Enable IP2.
        lui(Register::T1, 0x3400),
        ori(Register::T1, Register::T1, 0x0401),
        mtc0(Register::T1, STATUS),
        // Kick the PIF.
        lui(Register::T0, 0xbfc0),
        addiu(Register::T4, Register::ZERO, 0x8),
        sb(Register::T4, 0x7ff, Register::T0),
        beq(Register::ZERO, Register::ZERO, -1),
        nop(),
    ]);

    let cause = cpu.read_reg(Register::K0) as u32;
    assert_ne!(cause & 0x400, 0);
    assert_eq!(exception_code(cause), 0);
    assert_eq!(cpu.bus().pif().ram()[0x3f], 0);
    assert!(!cpu.bus().irq_state.is_triggered(Irq::Si));
}
