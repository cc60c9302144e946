//! Emulation of the NEC VR4300, the 64-bit MIPS III CPU of the Nintendo 64.
//!
//! The CPU runs one instruction per ['Cpu::step']. Events on the schedule, such as the timer
//! interrupt and interrupts from the MIPS interface, are handled at instruction boundaries.

mod access;
mod ops;

pub mod cop0;
pub mod cop1;
pub mod fpu;
pub mod irq;
pub mod opcode;
pub mod tlb;

use crate::bus::{AddrUnit, Bus, Word};
use crate::code_cache::CodeCache;
use crate::schedule::Event;
use crate::{CpuConfig, Cycle, Debugger};

use cop0::{Cop0, BAD_VADDR, CAUSE_IP2, CAUSE_IP7, COMPARE, STATUS_FR};
use cop1::Cop1;
use fpu::FpuKernel;
use opcode::Ins;
use tlb::Tlb;

use r4300_util::SignExtend;
use thiserror::Error;

pub use cop0::Exception;
pub use irq::{Irq, IrqState};
pub use opcode::{Opcode, Register};

/// Result of executing an instruction. An error is an exception which is taken before the next
/// instruction.
pub(crate) type OpResult = Result<(), Exception>;

/// Guest states the emulator can't or won't continue from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    #[error("unimplemented instruction '{op}' at {pc:08x}")]
    Unimplemented { pc: u32, op: Opcode },
    #[error("reserved instruction '{op}' at {pc:08x}")]
    Reserved { pc: u32, op: Opcode },
    #[error("write to unknown COP0 register {0}")]
    UnknownCop0Register(u8),
    #[error("TLB index {0} out of range")]
    TlbIndex(u32),
    #[error("non-zero write to cause register: {0:08x}")]
    CauseWrite(u32),
    #[error("trap at {0:08x}")]
    Trap(u32),
    #[error("ERET with ERL set at {0:08x}")]
    EretErrorLevel(u32),
    #[error("invalid operation in FPU compare at {0:08x}")]
    InvalidFpuCompare(u32),
}

pub struct Cpu {
    /// At the start of each instruction, this points to the last instruction executed. During
    /// the instruction, it points to the current instruction.
    last_pc: u32,
    /// Points to the instruction about to be executed at the start of each step. During the
    /// instruction it points at the next one, which is the delay slot of a branch.
    pc: u32,
    /// Always one step ahead of 'pc'. Branches write this instead of 'pc', which gives the
    /// delay slot for free.
    next_pc: u32,
    /// Set if the current instruction is in a branch delay slot.
    in_branch_delay: bool,
    /// Set when the current instruction is a branch. Becomes 'in_branch_delay' at the next step.
    branched: bool,
    hi: u64,
    lo: u64,
    /// # Registers
    ///
    /// | Number  | Name    | Usage                 |
    /// |---------|---------|-----------------------|
    /// | r0      | $zero   | Always 0              |
    /// | r1      | $at     | Reserved by assembler |
    /// | r2-r3   | $v0-$v1 | Results               |
    /// | r4-r7   | $a0-$a3 | Arguments             |
    /// | r8-r15  | $t0-$t7 | Temporaries           |
    /// | r16-r23 | $s0-$s7 | Storing               |
    /// | r24-r25 | $t8-$t9 | Temporaries           |
    /// | r26-r27 | $k0-$k1 | Reserved by kernel    |
    /// | r28     | $gp     | Global pointer        |
    /// | r29     | $sp     | Stack pointer         |
    /// | r30     | $fp     | Frame pointer         |
    /// | r31     | $ra     | Return address        |
    ///
    registers: [u64; 32],
    /// Set by LL, cleared by SC and ERET.
    ll_bit: bool,
    halt: Option<Halt>,
    /// Set while events are being handled, so that COP0 writes done by the handlers don't run
    /// the event loop again.
    in_irq_eval: bool,
    count_per_op: Cycle,
    pub(crate) bus: Bus,
    cop0: Cop0,
    cop1: Cop1,
    tlb: Tlb,
    code_cache: CodeCache,
}

/// The reset vector in the PIF ROM.
const PC_START_ADDRESS: u32 = 0xbfc0_0000;

impl Cpu {
    pub fn new(config: &CpuConfig, bus: Bus) -> Box<Self> {
        let cop0 = Cop0::new();
        let cop1 = Cop1::new(cop0.status() & STATUS_FR != 0);

        let mut cpu = Box::new(Cpu {
            last_pc: 0,
            pc: PC_START_ADDRESS,
            next_pc: PC_START_ADDRESS + 4,
            in_branch_delay: false,
            branched: false,
            hi: 0,
            lo: 0,
            registers: [0; 32],
            ll_bit: false,
            halt: None,
            in_irq_eval: false,
            count_per_op: config.count_per_op as Cycle,
            bus,
            cop0,
            cop1,
            tlb: Tlb::new(),
            code_cache: CodeCache::new(),
        });

        cpu.bus.schedule.schedule_at_count(0, Event::Compare);
        cpu
    }

    pub fn read_reg(&self, reg: Register) -> u64 {
        self.registers[reg.0 as usize]
    }

    pub fn set_reg(&mut self, reg: Register, val: u64) {
        self.registers[reg.0 as usize] = val;
        self.registers[0] = 0;
    }

    pub fn hi(&self) -> u64 {
        self.hi
    }

    pub fn lo(&self) -> u64 {
        self.lo
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Continue execution from `pc`, outside of any delay slot.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc.wrapping_add(4);
        self.branched = false;
    }

    pub fn ll_bit(&self) -> bool {
        self.ll_bit
    }

    pub fn cop0(&self) -> &Cop0 {
        &self.cop0
    }

    pub fn cop1(&self) -> &Cop1 {
        &self.cop1
    }

    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    pub fn code_cache(&self) -> &CodeCache {
        &self.code_cache
    }

    pub fn code_cache_mut(&mut self) -> &mut CodeCache {
        &mut self.code_cache
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// The reason the CPU halted, if it has.
    pub fn halted(&self) -> Option<&Halt> {
        self.halt.as_ref()
    }

    /// Stop execution. Only the first reason is kept.
    fn halt(&mut self, reason: Halt) {
        error!("CPU halted: {reason}");
        if self.halt.is_none() {
            self.halt = Some(reason);
        }
    }

    /// The instruction at 'pc', without side effects. Returns an invalid opcode if 'pc' doesn't
    /// point into RAM.
    pub fn curr_ins(&self) -> Opcode {
        let phys = match self.pc {
            0x8000_0000..=0xbfff_ffff => Some(self.pc & 0x1fff_ffff),
            pc => self.tlb.translate(pc, false),
        };
        Opcode::new(phys.and_then(|phys| self.bus.peek(phys)).unwrap_or(0xffff_ffff))
    }

    /// Move the program counter to the next instruction. Returns the address of the next
    /// instruction to be executed.
    fn next_pc(&mut self) -> u32 {
        self.last_pc = self.pc;
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);
        self.in_branch_delay = self.branched;
        self.branched = false;
        self.last_pc
    }

    /// Fetch and execute the next instruction. Returns false if the CPU is halted.
    pub fn step(&mut self, dbg: &mut impl Debugger) -> bool {
        if self.halt.is_some() {
            return false;
        }

        if self.bus.schedule.event_ready() {
            self.run_events();
        }

        let addr = self.next_pc();
        dbg.instruction_load(addr);

        let result = self.fetch(addr).and_then(|op| self.exec(dbg, op));
        if let Err(ex) = result {
            self.throw_exception(ex);
        }

        self.bus.schedule.tick(self.count_per_op);
        self.halt.is_none()
    }

    /// Execute opcode.
    fn exec(&mut self, dbg: &mut impl Debugger, op: Opcode) -> OpResult {
        match op.decode() {
            Ins::Sll => self.op_sll(op),
            Ins::Srl => self.op_srl(op),
            Ins::Sra => self.op_sra(op),
            Ins::Sllv => self.op_sllv(op),
            Ins::Srlv => self.op_srlv(op),
            Ins::Srav => self.op_srav(op),
            Ins::Jr => self.op_jr(op),
            Ins::Jalr => self.op_jalr(op),
            Ins::Syscall => Err(Exception::Syscall),
            Ins::Break => Err(Exception::Breakpoint),
            Ins::Sync | Ins::Cache => Ok(()),
            Ins::Mfhi => self.op_mfhi(op),
            Ins::Mthi => self.op_mthi(op),
            Ins::Mflo => self.op_mflo(op),
            Ins::Mtlo => self.op_mtlo(op),
            Ins::Dsllv => self.op_dsllv(op),
            Ins::Dsrlv => self.op_dsrlv(op),
            Ins::Dsrav => self.op_dsrav(op),
            Ins::Mult => self.op_mult(op),
            Ins::Multu => self.op_multu(op),
            Ins::Div => self.op_div(op),
            Ins::Divu => self.op_divu(op),
            Ins::Dmult => self.op_dmult(op),
            Ins::Dmultu => self.op_dmultu(op),
            Ins::Ddiv => self.op_ddiv(op),
            Ins::Ddivu => self.op_ddivu(op),
            Ins::Add | Ins::Addu => self.op_addu(op),
            Ins::Sub | Ins::Subu => self.op_subu(op),
            Ins::And => self.op_and(op),
            Ins::Or => self.op_or(op),
            Ins::Xor => self.op_xor(op),
            Ins::Nor => self.op_nor(op),
            Ins::Slt => self.op_slt(op),
            Ins::Sltu => self.op_sltu(op),
            Ins::Dadd | Ins::Daddu => self.op_daddu(op),
            Ins::Dsub | Ins::Dsubu => self.op_dsubu(op),
            Ins::Tge => self.op_trap(op, |rs, rt| rs as i64 >= rt as i64),
            Ins::Tgeu => self.op_trap(op, |rs, rt| rs >= rt),
            Ins::Tlt => self.op_trap(op, |rs, rt| (rs as i64) < rt as i64),
            Ins::Tltu => self.op_trap(op, |rs, rt| rs < rt),
            Ins::Teq => self.op_trap(op, |rs, rt| rs == rt),
            Ins::Tne => self.op_trap(op, |rs, rt| rs != rt),
            Ins::Dsll => self.op_dsll(op),
            Ins::Dsrl => self.op_dsrl(op),
            Ins::Dsra => self.op_dsra(op),
            Ins::Dsll32 => self.op_dsll32(op),
            Ins::Dsrl32 => self.op_dsrl32(op),
            Ins::Dsra32 => self.op_dsra32(op),

            Ins::Bltz => self.op_bcondz(op, |v| v < 0, Register::ZERO, false),
            Ins::Bgez => self.op_bcondz(op, |v| v >= 0, Register::ZERO, false),
            Ins::Bltzl => self.op_bcondz(op, |v| v < 0, Register::ZERO, true),
            Ins::Bgezl => self.op_bcondz(op, |v| v >= 0, Register::ZERO, true),
            Ins::Bltzal => self.op_bcondz(op, |v| v < 0, Register::RA, false),
            Ins::Bgezal => self.op_bcondz(op, |v| v >= 0, Register::RA, false),
            Ins::Bltzall => self.op_bcondz(op, |v| v < 0, Register::RA, true),
            Ins::Bgezall => self.op_bcondz(op, |v| v >= 0, Register::RA, true),
            Ins::Tgei => self.op_trap_imm(op, |rs, imm| rs as i64 >= imm as i64),
            Ins::Tgeiu => self.op_trap_imm(op, |rs, imm| rs >= imm),
            Ins::Tlti => self.op_trap_imm(op, |rs, imm| (rs as i64) < imm as i64),
            Ins::Tltiu => self.op_trap_imm(op, |rs, imm| rs < imm),
            Ins::Teqi => self.op_trap_imm(op, |rs, imm| rs == imm),
            Ins::Tnei => self.op_trap_imm(op, |rs, imm| rs != imm),

            Ins::J => self.op_j(op),
            Ins::Jal => self.op_jal(op),
            Ins::Beq => self.op_beq(op, false),
            Ins::Bne => self.op_bne(op, false),
            Ins::Blez => self.op_bcondz(op, |v| v <= 0, Register::ZERO, false),
            Ins::Bgtz => self.op_bcondz(op, |v| v > 0, Register::ZERO, false),
            Ins::Beql => self.op_beq(op, true),
            Ins::Bnel => self.op_bne(op, true),
            Ins::Blezl => self.op_bcondz(op, |v| v <= 0, Register::ZERO, true),
            Ins::Bgtzl => self.op_bcondz(op, |v| v > 0, Register::ZERO, true),
            Ins::Addi | Ins::Addiu => self.op_addiu(op),
            Ins::Slti => self.op_slti(op),
            Ins::Sltiu => self.op_sltiu(op),
            Ins::Andi => self.op_andi(op),
            Ins::Ori => self.op_ori(op),
            Ins::Xori => self.op_xori(op),
            Ins::Lui => self.op_lui(op),
            Ins::Daddi | Ins::Daddiu => self.op_daddiu(op),

            Ins::Ldl => self.op_ldl(dbg, op),
            Ins::Ldr => self.op_ldr(dbg, op),
            Ins::Lb => self.op_lb(dbg, op),
            Ins::Lh => self.op_lh(dbg, op),
            Ins::Lwl => self.op_lwl(dbg, op),
            Ins::Lw => self.op_lw(dbg, op),
            Ins::Lbu => self.op_lbu(dbg, op),
            Ins::Lhu => self.op_lhu(dbg, op),
            Ins::Lwr => self.op_lwr(dbg, op),
            Ins::Lwu => self.op_lwu(dbg, op),
            Ins::Ld => self.op_ld(dbg, op),
            Ins::Sb => self.op_sb(dbg, op),
            Ins::Sh => self.op_sh(dbg, op),
            Ins::Swl => self.op_swl(dbg, op),
            Ins::Sw => self.op_sw(dbg, op),
            Ins::Sdl => self.op_sdl(dbg, op),
            Ins::Sdr => self.op_sdr(dbg, op),
            Ins::Swr => self.op_swr(dbg, op),
            Ins::Sd => self.op_sd(dbg, op),
            Ins::Ll => self.op_ll(dbg, op),
            Ins::Sc => self.op_sc(dbg, op),
            Ins::Lwc1 => self.op_lwc1(dbg, op),
            Ins::Ldc1 => self.op_ldc1(dbg, op),
            Ins::Swc1 => self.op_swc1(dbg, op),
            Ins::Sdc1 => self.op_sdc1(dbg, op),

            Ins::Mfc0 => self.op_mfc0(op),
            Ins::Mtc0 => self.op_mtc0(op),
            Ins::Tlbr => self.op_tlbr(),
            Ins::Tlbwi => self.op_tlbwi(),
            Ins::Tlbwr => self.op_tlbwr(),
            Ins::Tlbp => self.op_tlbp(),
            Ins::Eret => self.op_eret(),

            Ins::Mfc1 => self.op_mfc1(op),
            Ins::Dmfc1 => self.op_dmfc1(op),
            Ins::Cfc1 => self.op_cfc1(op),
            Ins::Mtc1 => self.op_mtc1(op),
            Ins::Dmtc1 => self.op_dmtc1(op),
            Ins::Ctc1 => self.op_ctc1(op),
            Ins::Bc1f => self.op_bc1(op, false, false),
            Ins::Bc1t => self.op_bc1(op, true, false),
            Ins::Bc1fl => self.op_bc1(op, false, true),
            Ins::Bc1tl => self.op_bc1(op, true, true),
            Ins::FAdd(fmt) => self.fpu_binary(op, fmt, FpuKernel::add_s, FpuKernel::add_d),
            Ins::FSub(fmt) => self.fpu_binary(op, fmt, FpuKernel::sub_s, FpuKernel::sub_d),
            Ins::FMul(fmt) => self.fpu_binary(op, fmt, FpuKernel::mul_s, FpuKernel::mul_d),
            Ins::FDiv(fmt) => self.op_fdiv(op, fmt),
            Ins::FSqrt(fmt) => self.fpu_unary(op, fmt, FpuKernel::sqrt_s, FpuKernel::sqrt_d),
            Ins::FAbs(fmt) => self.fpu_unary(op, fmt, FpuKernel::abs_s, FpuKernel::abs_d),
            Ins::FNeg(fmt) => self.fpu_unary(op, fmt, FpuKernel::neg_s, FpuKernel::neg_d),
            Ins::FMov(fmt) => self.op_fmov(op, fmt),
            Ins::FToInt { from, to, mode } => self.op_fto_int(op, from, to, mode),
            Ins::FToFloat { from, to } => self.op_fto_float(op, from, to),
            Ins::FCmp(fmt, cond) => self.op_fcmp(op, fmt, cond),

            Ins::Unimplemented => {
                self.halt(Halt::Unimplemented { pc: self.last_pc, op });
                Ok(())
            }
            Ins::Reserved => {
                self.halt(Halt::Reserved { pc: self.last_pc, op });
                Ok(())
            }
        }
    }

    /// Handle every event which is due. Interrupts are taken with EPC pointing at 'pc'.
    fn run_events(&mut self) {
        if self.in_irq_eval {
            return;
        }
        self.in_irq_eval = true;

        while let Some(event) = self.bus.schedule.pop_event() {
            trace!("Running event {event}");
            match event {
                Event::Compare => {
                    self.cop0.set_cause_ip(CAUSE_IP7, true);
                    self.bus.schedule.schedule_at_count(self.cop0.reg(COMPARE), Event::Compare);
                    self.check_interrupt();
                }
                Event::IrqTrigger(irq) => {
                    self.bus.irq_state.trigger(irq);
                    self.check_interrupt();
                }
                Event::IrqCheck => {
                    self.cop0.set_cause_ip(CAUSE_IP2, self.bus.irq_state.active());
                    if self.cop0.irq_pending() {
                        self.enter_interrupt();
                    }
                }
            }
        }

        self.in_irq_eval = false;
    }

    /// Make sure interrupts are checked as soon as possible.
    fn check_interrupt(&mut self) {
        self.bus.schedule.unschedule(Event::IrqCheck);
        self.bus.schedule.schedule_now(Event::IrqCheck);
    }

    fn enter_interrupt(&mut self) {
        debug!("Interrupt taken at {:08x}, cause {:08x}", self.pc, self.cop0.cause());
        let vector = self.cop0.enter_exception(self.pc, self.branched, Exception::Interrupt);
        self.set_pc(vector);
    }

    /// Start handling an exception caused by the current instruction.
    fn throw_exception(&mut self, ex: Exception) {
        debug!("Exception thrown at {:08x}: {ex:?}", self.last_pc);
        let vector = self.cop0.enter_exception(self.last_pc, self.in_branch_delay, ex);
        self.set_pc(vector);
    }

    /// Translate a virtual address to a physical address. KSEG0 and KSEG1 are direct mapped,
    /// everything else goes through the TLB.
    fn translate(&mut self, vaddr: u32, write: bool) -> Result<u32, Exception> {
        if let 0x8000_0000..=0xbfff_ffff = vaddr {
            return Ok(vaddr & 0x1fff_ffff);
        }

        if let Some(phys) = self.tlb.translate(vaddr, write) {
            return Ok(phys);
        }

        self.cop0.set_tlb_fault(vaddr);

        if write && self.tlb.translate(vaddr, false).is_some() {
            return Err(Exception::TlbModification);
        }

        let refill = !self.tlb.covers(vaddr);
        Err(if write {
            Exception::TlbStore { refill }
        } else {
            Exception::TlbLoad { refill }
        })
    }

    /// Load an instruction from memory.
    fn fetch(&mut self, addr: u32) -> Result<Opcode, Exception> {
        if !Word::is_aligned(addr) {
            self.cop0.set_reg(BAD_VADDR, addr);
            return Err(Exception::AddressLoad);
        }
        let phys = self.translate(addr, false)?;
        self.bus
            .load::<Word>(phys)
            .map(|word| Opcode::new(word as u32))
            .map_err(|_| Exception::BusInstruction)
    }

    /// Load data from memory. The value is zero extended.
    fn data_load<T: AddrUnit>(&mut self, dbg: &mut impl Debugger, addr: u32) -> Result<u64, Exception> {
        if !T::is_aligned(addr) {
            self.cop0.set_reg(BAD_VADDR, addr);
            return Err(Exception::AddressLoad);
        }
        dbg.data_load(addr);
        let phys = self.translate(addr, false)?;
        self.bus.load::<T>(phys)
    }

    fn data_store<T: AddrUnit>(
        &mut self,
        dbg: &mut impl Debugger,
        addr: u32,
        val: u64,
    ) -> OpResult {
        if !T::is_aligned(addr) {
            self.cop0.set_reg(BAD_VADDR, addr);
            return Err(Exception::AddressStore);
        }
        dbg.data_store(addr);
        let phys = self.translate(addr, true)?;
        self.bus.store::<T>(phys, val)?;
        self.code_cache.notify_store(addr);
        Ok(())
    }

    /// The effective address of load and store instructions.
    fn addr(&self, op: Opcode) -> u32 {
        (self.read_reg(op.rs()) as u32).wrapping_add(op.signed_imm() as u32)
    }

    /// Target of a PC relative branch.
    fn branch_target(&self, op: Opcode) -> u32 {
        self.pc.wrapping_add((op.signed_imm() as u32) << 2)
    }

    /// Resolve a branch or jump. The return address is always written to `link`, which is the zero
    /// register for instructions that don't link. A likely branch which isn't taken skips the
    /// delay slot.
    fn branch(&mut self, cond: bool, target: u32, link: Register, likely: bool) {
        self.set_reg(link, self.last_pc.wrapping_add(8).sign_extend());
        if cond {
            self.next_pc = target;
            self.branched = true;
        } else if likely {
            self.skip_delay_slot();
        } else {
            self.branched = true;
        }
    }

    fn skip_delay_slot(&mut self) {
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);
        self.bus.schedule.tick(self.count_per_op);
    }
}
