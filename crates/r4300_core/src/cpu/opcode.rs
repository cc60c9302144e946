//! Decoding of MIPS III opcodes.
//!
//! All opcodes are encoded in 32 bits, using three main layouts:
//! - Immediate: 6-bit op, 5-bit source register, 5-bit target register and 16-bit immediate.
//! - Jump: 6-bit op and 26-bit target index.
//! - Register: 6-bit op, three 5-bit registers, 5-bit shift and 6-bit function field.
//!
//! Decoding is split in two. ['Opcode'] extracts fields, ['Opcode::decode'] maps the opcode to an
//! ['Ins'] which the CPU dispatches on.

use r4300_util::Bit;
use super::fpu::RoundingMode;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register(pub u8);

impl From<u32> for Register {
    fn from(val: u32) -> Self {
        Register(val as u8)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [&str; 32] = [
            "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5",
            "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1",
            "gp", "sp", "fp", "ra",
        ];
        f.write_str(NAMES[self.0 as usize & 31])
    }
}

impl Register {
    pub const ZERO: Register = Register(0);
    pub const AT: Register = Register(1);
    pub const V0: Register = Register(2);
    pub const V1: Register = Register(3);
    pub const A0: Register = Register(4);
    pub const A1: Register = Register(5);
    pub const A2: Register = Register(6);
    pub const A3: Register = Register(7);
    pub const T0: Register = Register(8);
    pub const T1: Register = Register(9);
    pub const T2: Register = Register(10);
    pub const T3: Register = Register(11);
    pub const T4: Register = Register(12);
    pub const S0: Register = Register(16);
    pub const S1: Register = Register(17);
    pub const K0: Register = Register(26);
    pub const K1: Register = Register(27);
    pub const SP: Register = Register(29);
    pub const RA: Register = Register(31);
}

/// Floating point format of COP1 operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fmt {
    /// Single precision.
    S,
    /// Double precision.
    D,
    /// 32-bit integer.
    W,
    /// 64-bit integer.
    L,
}

impl Fmt {
    fn from_cop_op(op: u32) -> Option<Self> {
        match op {
            16 => Some(Fmt::S),
            17 => Some(Fmt::D),
            20 => Some(Fmt::W),
            21 => Some(Fmt::L),
            _ => None,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, Fmt::S | Fmt::D)
    }
}

impl fmt::Display for Fmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Fmt::S => "s",
            Fmt::D => "d",
            Fmt::W => "w",
            Fmt::L => "l",
        })
    }
}

/// Every instruction the CPU can run, plus the two ways decoding can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ins {
    Sll, Srl, Sra, Sllv, Srlv, Srav,
    Jr, Jalr,
    Syscall, Break, Sync,
    Mfhi, Mthi, Mflo, Mtlo,
    Dsllv, Dsrlv, Dsrav,
    Mult, Multu, Div, Divu, Dmult, Dmultu, Ddiv, Ddivu,
    Add, Addu, Sub, Subu, And, Or, Xor, Nor, Slt, Sltu,
    Dadd, Daddu, Dsub, Dsubu,
    Tge, Tgeu, Tlt, Tltu, Teq, Tne,
    Dsll, Dsrl, Dsra, Dsll32, Dsrl32, Dsra32,

    Bltz, Bgez, Bltzl, Bgezl,
    Tgei, Tgeiu, Tlti, Tltiu, Teqi, Tnei,
    Bltzal, Bgezal, Bltzall, Bgezall,

    J, Jal, Beq, Bne, Blez, Bgtz,
    Addi, Addiu, Slti, Sltiu, Andi, Ori, Xori, Lui,
    Beql, Bnel, Blezl, Bgtzl,
    Daddi, Daddiu,
    Ldl, Ldr, Lb, Lh, Lwl, Lw, Lbu, Lhu, Lwr, Lwu,
    Sb, Sh, Swl, Sw, Sdl, Sdr, Swr, Cache,
    Ll, Lwc1, Ldc1, Ld, Sc, Swc1, Sdc1, Sd,

    Mfc0, Mtc0, Tlbr, Tlbwi, Tlbwr, Tlbp, Eret,

    Mfc1, Dmfc1, Cfc1, Mtc1, Dmtc1, Ctc1,
    Bc1f, Bc1t, Bc1fl, Bc1tl,
    FAdd(Fmt), FSub(Fmt), FMul(Fmt), FDiv(Fmt),
    FSqrt(Fmt), FAbs(Fmt), FMov(Fmt), FNeg(Fmt),
    /// Convert to an integer format. Uses the rounding mode in FCR31 if `mode` is `None`.
    FToInt { from: Fmt, to: Fmt, mode: Option<RoundingMode> },
    /// Convert to single or double precision.
    FToFloat { from: Fmt, to: Fmt },
    /// Compare with the condition in the low 4 bits of the function field.
    FCmp(Fmt, u8),

    /// A valid MIPS instruction which this CPU doesn't implement.
    Unimplemented,
    /// Not an instruction.
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode(pub u32);

impl Opcode {
    pub fn new(opcode: u32) -> Self {
        Opcode(opcode)
    }

    /// Operation.
    pub fn op(self) -> u32 {
        self.0.bit_range(26, 31)
    }

    /// Sub operation / function.
    pub fn special(self) -> u32 {
        self.0.bit_range(0, 5)
    }

    /// COP operation.
    pub fn cop_op(self) -> u32 {
        self.0.bit_range(21, 25)
    }

    /// Immediate value.
    pub fn imm(self) -> u32 {
        self.0.bit_range(0, 15)
    }

    /// Immediate value sign extended to 64 bits.
    pub fn signed_imm(self) -> u64 {
        self.0.bit_range(0, 15) as i16 as i64 as u64
    }

    /// Target index used for jump instructions.
    pub fn target(self) -> u32 {
        self.0.bit_range(0, 25)
    }

    pub fn shift(self) -> u32 {
        self.0.bit_range(6, 10)
    }

    /// Destination register.
    pub fn rd(self) -> Register {
        Register::from(self.0.bit_range(11, 15))
    }

    /// Target register.
    pub fn rt(self) -> Register {
        Register::from(self.0.bit_range(16, 20))
    }

    /// Source register.
    pub fn rs(self) -> Register {
        Register::from(self.0.bit_range(21, 25))
    }

    /// FPU destination register.
    pub fn fd(self) -> usize {
        self.0.bit_range(6, 10) as usize
    }

    /// FPU source register.
    pub fn fs(self) -> usize {
        self.0.bit_range(11, 15) as usize
    }

    /// FPU target register.
    pub fn ft(self) -> usize {
        self.0.bit_range(16, 20) as usize
    }

    pub fn decode(self) -> Ins {
        match self.op() {
            0x00 => self.decode_special(),
            0x01 => self.decode_regimm(),
            0x02 => Ins::J,
            0x03 => Ins::Jal,
            0x04 => Ins::Beq,
            0x05 => Ins::Bne,
            0x06 => Ins::Blez,
            0x07 => Ins::Bgtz,
            0x08 => Ins::Addi,
            0x09 => Ins::Addiu,
            0x0a => Ins::Slti,
            0x0b => Ins::Sltiu,
            0x0c => Ins::Andi,
            0x0d => Ins::Ori,
            0x0e => Ins::Xori,
            0x0f => Ins::Lui,
            0x10 => self.decode_cop0(),
            0x11 => self.decode_cop1(),
            0x12 => Ins::Unimplemented,
            0x14 => Ins::Beql,
            0x15 => Ins::Bnel,
            0x16 => Ins::Blezl,
            0x17 => Ins::Bgtzl,
            0x18 => Ins::Daddi,
            0x19 => Ins::Daddiu,
            0x1a => Ins::Ldl,
            0x1b => Ins::Ldr,
            0x20 => Ins::Lb,
            0x21 => Ins::Lh,
            0x22 => Ins::Lwl,
            0x23 => Ins::Lw,
            0x24 => Ins::Lbu,
            0x25 => Ins::Lhu,
            0x26 => Ins::Lwr,
            0x27 => Ins::Lwu,
            0x28 => Ins::Sb,
            0x29 => Ins::Sh,
            0x2a => Ins::Swl,
            0x2b => Ins::Sw,
            0x2c => Ins::Sdl,
            0x2d => Ins::Sdr,
            0x2e => Ins::Swr,
            0x2f => Ins::Cache,
            0x30 => Ins::Ll,
            0x31 => Ins::Lwc1,
            0x32 => Ins::Unimplemented,
            0x34 => Ins::Unimplemented,
            0x35 => Ins::Ldc1,
            0x36 => Ins::Unimplemented,
            0x37 => Ins::Ld,
            0x38 => Ins::Sc,
            0x39 => Ins::Swc1,
            0x3a => Ins::Unimplemented,
            0x3c => Ins::Unimplemented,
            0x3d => Ins::Sdc1,
            0x3e => Ins::Unimplemented,
            0x3f => Ins::Sd,
            _ => Ins::Reserved,
        }
    }

    fn decode_special(self) -> Ins {
        match self.special() {
            0x00 => Ins::Sll,
            0x02 => Ins::Srl,
            0x03 => Ins::Sra,
            0x04 => Ins::Sllv,
            0x06 => Ins::Srlv,
            0x07 => Ins::Srav,
            0x08 => Ins::Jr,
            0x09 => Ins::Jalr,
            0x0c => Ins::Syscall,
            0x0d => Ins::Break,
            0x0f => Ins::Sync,
            0x10 => Ins::Mfhi,
            0x11 => Ins::Mthi,
            0x12 => Ins::Mflo,
            0x13 => Ins::Mtlo,
            0x14 => Ins::Dsllv,
            0x16 => Ins::Dsrlv,
            0x17 => Ins::Dsrav,
            0x18 => Ins::Mult,
            0x19 => Ins::Multu,
            0x1a => Ins::Div,
            0x1b => Ins::Divu,
            0x1c => Ins::Dmult,
            0x1d => Ins::Dmultu,
            0x1e => Ins::Ddiv,
            0x1f => Ins::Ddivu,
            0x20 => Ins::Add,
            0x21 => Ins::Addu,
            0x22 => Ins::Sub,
            0x23 => Ins::Subu,
            0x24 => Ins::And,
            0x25 => Ins::Or,
            0x26 => Ins::Xor,
            0x27 => Ins::Nor,
            0x2a => Ins::Slt,
            0x2b => Ins::Sltu,
            0x2c => Ins::Dadd,
            0x2d => Ins::Daddu,
            0x2e => Ins::Dsub,
            0x2f => Ins::Dsubu,
            0x30 => Ins::Tge,
            0x31 => Ins::Tgeu,
            0x32 => Ins::Tlt,
            0x33 => Ins::Tltu,
            0x34 => Ins::Teq,
            0x36 => Ins::Tne,
            0x38 => Ins::Dsll,
            0x3a => Ins::Dsrl,
            0x3b => Ins::Dsra,
            0x3c => Ins::Dsll32,
            0x3e => Ins::Dsrl32,
            0x3f => Ins::Dsra32,
            _ => Ins::Reserved,
        }
    }

    fn decode_regimm(self) -> Ins {
        match self.rt().0 {
            0x00 => Ins::Bltz,
            0x01 => Ins::Bgez,
            0x02 => Ins::Bltzl,
            0x03 => Ins::Bgezl,
            0x08 => Ins::Tgei,
            0x09 => Ins::Tgeiu,
            0x0a => Ins::Tlti,
            0x0b => Ins::Tltiu,
            0x0c => Ins::Teqi,
            0x0e => Ins::Tnei,
            0x10 => Ins::Bltzal,
            0x11 => Ins::Bgezal,
            0x12 => Ins::Bltzall,
            0x13 => Ins::Bgezall,
            _ => Ins::Reserved,
        }
    }

    fn decode_cop0(self) -> Ins {
        match self.cop_op() {
            0x00 => Ins::Mfc0,
            0x01 | 0x05 => Ins::Unimplemented,
            0x04 => Ins::Mtc0,
            0x10..=0x1f => match self.special() {
                0x01 => Ins::Tlbr,
                0x02 => Ins::Tlbwi,
                0x06 => Ins::Tlbwr,
                0x08 => Ins::Tlbp,
                0x18 => Ins::Eret,
                _ => Ins::Reserved,
            },
            _ => Ins::Reserved,
        }
    }

    fn decode_cop1(self) -> Ins {
        match self.cop_op() {
            0x00 => return Ins::Mfc1,
            0x01 => return Ins::Dmfc1,
            0x02 => return Ins::Cfc1,
            0x04 => return Ins::Mtc1,
            0x05 => return Ins::Dmtc1,
            0x06 => return Ins::Ctc1,
            0x08 => return match self.rt().0 & 0x3 {
                0 => Ins::Bc1f,
                1 => Ins::Bc1t,
                2 => Ins::Bc1fl,
                _ => Ins::Bc1tl,
            },
            _ => {}
        }

        let Some(fmt) = Fmt::from_cop_op(self.cop_op()) else {
            return Ins::Reserved;
        };

        let to_int = |to, mode| Ins::FToInt { from: fmt, to, mode };

        match (self.special(), fmt.is_float()) {
            (0x00, true) => Ins::FAdd(fmt),
            (0x01, true) => Ins::FSub(fmt),
            (0x02, true) => Ins::FMul(fmt),
            (0x03, true) => Ins::FDiv(fmt),
            (0x04, true) => Ins::FSqrt(fmt),
            (0x05, true) => Ins::FAbs(fmt),
            (0x06, true) => Ins::FMov(fmt),
            (0x07, true) => Ins::FNeg(fmt),
            (0x08, true) => to_int(Fmt::L, Some(RoundingMode::Nearest)),
            (0x09, true) => to_int(Fmt::L, Some(RoundingMode::Zero)),
            (0x0a, true) => to_int(Fmt::L, Some(RoundingMode::Up)),
            (0x0b, true) => to_int(Fmt::L, Some(RoundingMode::Down)),
            (0x0c, true) => to_int(Fmt::W, Some(RoundingMode::Nearest)),
            (0x0d, true) => to_int(Fmt::W, Some(RoundingMode::Zero)),
            (0x0e, true) => to_int(Fmt::W, Some(RoundingMode::Up)),
            (0x0f, true) => to_int(Fmt::W, Some(RoundingMode::Down)),
            (0x20, _) if fmt != Fmt::S => Ins::FToFloat { from: fmt, to: Fmt::S },
            (0x21, _) if fmt != Fmt::D => Ins::FToFloat { from: fmt, to: Fmt::D },
            (0x24, true) => to_int(Fmt::W, None),
            (0x25, true) => to_int(Fmt::L, None),
            (0x30..=0x3f, true) => Ins::FCmp(fmt, self.special() as u8 & 0xf),
            _ => Ins::Reserved,
        }
    }
}

const CMP_NAMES: [&str; 16] = [
    "f", "un", "eq", "ueq", "olt", "ult", "ole", "ule",
    "sf", "ngle", "seq", "ngl", "lt", "nge", "le", "ngt",
];

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ins = self.decode();
        let name = format!("{ins:?}").to_lowercase();
        let imm = self.signed_imm() as i64;
        match ins {
            Ins::Sll | Ins::Srl | Ins::Sra | Ins::Dsll | Ins::Dsrl | Ins::Dsra
                | Ins::Dsll32 | Ins::Dsrl32 | Ins::Dsra32 => {
                write!(f, "{name} {} {} {}", self.rd(), self.rt(), self.shift())
            }
            Ins::Sllv | Ins::Srlv | Ins::Srav | Ins::Dsllv | Ins::Dsrlv | Ins::Dsrav => {
                write!(f, "{name} {} {} {}", self.rd(), self.rt(), self.rs())
            }
            Ins::Jr | Ins::Mthi | Ins::Mtlo => write!(f, "{name} {}", self.rs()),
            Ins::Jalr => write!(f, "jalr {} {}", self.rd(), self.rs()),
            Ins::Mfhi | Ins::Mflo => write!(f, "{name} {}", self.rd()),
            Ins::Mult | Ins::Multu | Ins::Div | Ins::Divu | Ins::Dmult | Ins::Dmultu
                | Ins::Ddiv | Ins::Ddivu | Ins::Tge | Ins::Tgeu | Ins::Tlt | Ins::Tltu
                | Ins::Teq | Ins::Tne => {
                write!(f, "{name} {} {}", self.rs(), self.rt())
            }
            Ins::Add | Ins::Addu | Ins::Sub | Ins::Subu | Ins::And | Ins::Or | Ins::Xor
                | Ins::Nor | Ins::Slt | Ins::Sltu | Ins::Dadd | Ins::Daddu | Ins::Dsub
                | Ins::Dsubu => {
                write!(f, "{name} {} {} {}", self.rd(), self.rs(), self.rt())
            }
            Ins::Bltz | Ins::Bgez | Ins::Bltzl | Ins::Bgezl | Ins::Bltzal | Ins::Bgezal
                | Ins::Bltzall | Ins::Bgezall | Ins::Tgei | Ins::Tgeiu | Ins::Tlti
                | Ins::Tltiu | Ins::Teqi | Ins::Tnei | Ins::Blez | Ins::Bgtz | Ins::Blezl
                | Ins::Bgtzl => {
                write!(f, "{name} {} {imm}", self.rs())
            }
            Ins::J | Ins::Jal => write!(f, "{name} {:08x}", self.target() << 2),
            Ins::Beq | Ins::Bne | Ins::Beql | Ins::Bnel => {
                write!(f, "{name} {} {} {imm}", self.rs(), self.rt())
            }
            Ins::Addi | Ins::Addiu | Ins::Slti | Ins::Sltiu | Ins::Daddi | Ins::Daddiu => {
                write!(f, "{name} {} {} {imm}", self.rt(), self.rs())
            }
            Ins::Andi | Ins::Ori | Ins::Xori => {
                write!(f, "{name} {} {} {:#x}", self.rt(), self.rs(), self.imm())
            }
            Ins::Lui => write!(f, "lui {} {:#x}", self.rt(), self.imm()),
            Ins::Ldl | Ins::Ldr | Ins::Lb | Ins::Lh | Ins::Lwl | Ins::Lw | Ins::Lbu
                | Ins::Lhu | Ins::Lwr | Ins::Lwu | Ins::Sb | Ins::Sh | Ins::Swl | Ins::Sw
                | Ins::Sdl | Ins::Sdr | Ins::Swr | Ins::Ll | Ins::Ld | Ins::Sc | Ins::Sd => {
                write!(f, "{name} {} {imm}({})", self.rt(), self.rs())
            }
            Ins::Lwc1 | Ins::Ldc1 | Ins::Swc1 | Ins::Sdc1 => {
                write!(f, "{name} f{} {imm}({})", self.ft(), self.rs())
            }
            Ins::Mfc0 | Ins::Mtc0 => write!(f, "{name} {} {}", self.rt(), self.rd().0),
            Ins::Mfc1 | Ins::Dmfc1 | Ins::Mtc1 | Ins::Dmtc1 => {
                write!(f, "{name} {} f{}", self.rt(), self.fs())
            }
            Ins::Cfc1 | Ins::Ctc1 => write!(f, "{name} {} fcr{}", self.rt(), self.fs()),
            Ins::Bc1f | Ins::Bc1t | Ins::Bc1fl | Ins::Bc1tl => write!(f, "{name} {imm}"),
            Ins::FAdd(fmt) | Ins::FSub(fmt) | Ins::FMul(fmt) | Ins::FDiv(fmt) => {
                let name = &name[1..name.find('(').unwrap_or(name.len())];
                write!(f, "{name}.{fmt} f{} f{} f{}", self.fd(), self.fs(), self.ft())
            }
            Ins::FSqrt(fmt) | Ins::FAbs(fmt) | Ins::FMov(fmt) | Ins::FNeg(fmt) => {
                let name = &name[1..name.find('(').unwrap_or(name.len())];
                write!(f, "{name}.{fmt} f{} f{}", self.fd(), self.fs())
            }
            Ins::FToInt { from, to, mode } => {
                let name = match mode {
                    None => "cvt",
                    Some(RoundingMode::Nearest) => "round",
                    Some(RoundingMode::Zero) => "trunc",
                    Some(RoundingMode::Up) => "ceil",
                    Some(RoundingMode::Down) => "floor",
                };
                write!(f, "{name}.{to}.{from} f{} f{}", self.fd(), self.fs())
            }
            Ins::FToFloat { from, to } => {
                write!(f, "cvt.{to}.{from} f{} f{}", self.fd(), self.fs())
            }
            Ins::FCmp(fmt, cond) => {
                let cond = CMP_NAMES[cond as usize];
                write!(f, "c.{cond}.{fmt} f{} f{}", self.fs(), self.ft())
            }
            Ins::Unimplemented => write!(f, "unimplemented {:08x}", self.0),
            Ins::Reserved => write!(f, "reserved {:08x}", self.0),
            _ => f.write_str(&name),
        }
    }
}
