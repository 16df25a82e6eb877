use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::{GenError, Result};

/// Number of bits needed to index `n` distinct values.
pub const fn bitsize(n: usize) -> u32 {
    if n <= 1 {
        1
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Register id as emitted into the register enum.
///
/// Ids are laid out so that the low three bits are the ModRM/opcode register
/// number and bit 3 is the REX/VEX extension bit for both GP and vector
/// registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Register(pub u8);

impl Register {
    pub const A: Register = Register(0);
    pub const C: Register = Register(1);
    pub const D: Register = Register(2);
    pub const B: Register = Register(3);
    pub const SP: Register = Register(4);
    pub const BP: Register = Register(5);
    pub const SI: Register = Register(6);
    pub const DI: Register = Register(7);
    pub const XMM0: Register = Register(32);
    pub const MM0: Register = Register(64);
    pub const IP: Register = Register(72);
    pub const RFLAGS: Register = Register(73);
    pub const MXCSR: Register = Register(74);

    /// One past the highest id.
    pub const COUNT: usize = 75;

    const GP_NAMES: [&'static str; 8] = ["A", "C", "D", "B", "SP", "BP", "SI", "DI"];

    pub fn all() -> impl Iterator<Item = Register> {
        (0u8..16).chain(32..Self::COUNT as u8).map(Register)
    }

    pub fn name(self) -> String {
        match self.0 {
            n @ 0..=7 => Self::GP_NAMES[n as usize].to_string(),
            n @ 8..=15 => format!("R{n}"),
            n @ 32..=63 => format!("XMM{}", n - 32),
            n @ 64..=71 => format!("MM{}", n - 64),
            72 => "IP".to_string(),
            73 => "RFLAGS".to_string(),
            74 => "MXCSR".to_string(),
            n => format!("INVALID{n}"),
        }
    }

    pub fn id(self) -> i64 {
        self.0 as i64
    }
}

pub const REG_ID_BITS: u32 = bitsize(Register::COUNT);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    Gp,
    Xmm,
    Zmm,
    Mm,
    Ip,
    Rflags,
    Mxcsr,
}

impl RegisterType {
    pub const ALL: [RegisterType; 7] = [
        RegisterType::Gp,
        RegisterType::Xmm,
        RegisterType::Zmm,
        RegisterType::Mm,
        RegisterType::Ip,
        RegisterType::Rflags,
        RegisterType::Mxcsr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RegisterType::Gp => "gp",
            RegisterType::Xmm => "xmm",
            RegisterType::Zmm => "zmm",
            RegisterType::Mm => "mm",
            RegisterType::Ip => "ip",
            RegisterType::Rflags => "rflags",
            RegisterType::Mxcsr => "mxcsr",
        }
    }

    /// Registers an explicit operand of this class may name.
    pub fn members(self) -> Vec<Register> {
        match self {
            RegisterType::Gp => (0..16).map(Register).collect(),
            // without EVEX only the first 16 vector registers are encodable
            RegisterType::Xmm => (32..48).map(Register).collect(),
            RegisterType::Zmm => (32..64).map(Register).collect(),
            RegisterType::Mm => (64..72).map(Register).collect(),
            RegisterType::Ip => vec![Register::IP],
            RegisterType::Rflags => vec![Register::RFLAGS],
            RegisterType::Mxcsr => vec![Register::MXCSR],
        }
    }

    pub fn domain(self) -> Domain {
        Domain::Enum(self.members().into_iter().map(Register::id).collect())
    }
}

/// C-level word type an operand is accessed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordType {
    Lb,
    Hb,
    W,
    Dw,
    Lqw,
    Dqw,
    Vw,
}

impl WordType {
    pub const ALL: [WordType; 7] = [
        WordType::Lb,
        WordType::Hb,
        WordType::W,
        WordType::Dw,
        WordType::Lqw,
        WordType::Dqw,
        WordType::Vw,
    ];

    pub fn from_size(size: u16) -> Result<WordType> {
        match size {
            8 => Ok(WordType::Lb),
            16 => Ok(WordType::W),
            32 => Ok(WordType::Dw),
            64 => Ok(WordType::Lqw),
            128 => Ok(WordType::Dqw),
            256 | 512 => Ok(WordType::Vw),
            _ => Err(GenError::unhandled("operand size", size)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WordType::Lb => "lb",
            WordType::Hb => "hb",
            WordType::W => "w",
            WordType::Dw => "dw",
            WordType::Lqw => "lqw",
            WordType::Dqw => "dqw",
            WordType::Vw => "vw",
        }
    }
}

pub const OPERAND_SIZES: [u16; 7] = [8, 16, 32, 64, 128, 256, 512];

#[derive(Debug, Clone, Copy)]
pub struct ImplicitRegister {
    pub name: &'static str,
    pub reg_type: RegisterType,
    pub register: Register,
    pub size: u16,
    pub word_type: Option<WordType>,
}

const fn implicit(name: &'static str, reg_type: RegisterType, register: Register, size: u16) -> ImplicitRegister {
    ImplicitRegister { name, reg_type, register, size, word_type: None }
}

pub const IMPLICIT_REGISTERS: &[ImplicitRegister] = &[
    implicit("RAX", RegisterType::Gp, Register::A, 64),
    implicit("EAX", RegisterType::Gp, Register::A, 32),
    implicit("AX", RegisterType::Gp, Register::A, 16),
    ImplicitRegister { name: "AL", reg_type: RegisterType::Gp, register: Register::A, size: 8, word_type: Some(WordType::Lb) },
    ImplicitRegister { name: "AH", reg_type: RegisterType::Gp, register: Register::A, size: 8, word_type: Some(WordType::Hb) },
    implicit("RCX", RegisterType::Gp, Register::C, 64),
    implicit("ECX", RegisterType::Gp, Register::C, 32),
    implicit("CX", RegisterType::Gp, Register::C, 16),
    implicit("CL", RegisterType::Gp, Register::C, 8),
    implicit("RDX", RegisterType::Gp, Register::D, 64),
    implicit("EDX", RegisterType::Gp, Register::D, 32),
    implicit("DX", RegisterType::Gp, Register::D, 16),
    implicit("RBX", RegisterType::Gp, Register::B, 64),
    implicit("EBX", RegisterType::Gp, Register::B, 32),
    implicit("BX", RegisterType::Gp, Register::B, 16),
    implicit("BL", RegisterType::Gp, Register::B, 8),
    implicit("RSP", RegisterType::Gp, Register::SP, 64),
    implicit("SP", RegisterType::Gp, Register::SP, 16),
    implicit("RBP", RegisterType::Gp, Register::BP, 64),
    implicit("BP", RegisterType::Gp, Register::BP, 16),
    implicit("RSI", RegisterType::Gp, Register::SI, 64),
    implicit("ESI", RegisterType::Gp, Register::SI, 32),
    implicit("SI", RegisterType::Gp, Register::SI, 16),
    implicit("SIL", RegisterType::Gp, Register::SI, 8),
    implicit("RDI", RegisterType::Gp, Register::DI, 64),
    implicit("EDI", RegisterType::Gp, Register::DI, 32),
    implicit("DI", RegisterType::Gp, Register::DI, 16),
    implicit("DIL", RegisterType::Gp, Register::DI, 8),
    implicit("RIP", RegisterType::Ip, Register::IP, 64),
    implicit("XMM0", RegisterType::Xmm, Register::XMM0, 128),
    implicit("RFLAGS", RegisterType::Rflags, Register::RFLAGS, 64),
    implicit("MXCSR", RegisterType::Mxcsr, Register::MXCSR, 32),
];

pub fn implicit_register(name: &str) -> Result<&'static ImplicitRegister> {
    IMPLICIT_REGISTERS
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| GenError::UnknownImplicitRegister { name: name.to_string() })
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rflags: u32 {
const CF = 1 << 0;
const PF = 1 << 2;
const AF = 1 << 4;
const ZF = 1 << 6;
const SF = 1 << 7;
const DF = 1 << 10;
const OF = 1 << 11;
}
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mxcsr: u32 {
const IE = 1 << 0;
const DE = 1 << 1;
const ZE = 1 << 2;
const OE = 1 << 3;
const UE = 1 << 4;
const PE = 1 << 5;
}
}

pub const IGNORED_RFLAGS: &[&str] = &["TF", "IF", "IOPL", "NT", "RF", "VM", "AC", "VIF", "VIP", "ID"];
pub const IGNORED_MXCSR: &[&str] = &["IM", "DM", "ZM", "OM", "UM", "PM", "DAZ", "FZ", "RC"];

/// Architectural status registers whose bits appear as pseudo-operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusRegister {
    Rflags,
    Mxcsr,
}

impl StatusRegister {
    pub const ALL: [StatusRegister; 2] = [StatusRegister::Rflags, StatusRegister::Mxcsr];

    pub fn name(self) -> &'static str {
        match self {
            StatusRegister::Rflags => "RFLAGS",
            StatusRegister::Mxcsr => "MXCSR",
        }
    }

    /// Bit mask for a tracked status bit name.
    pub fn bit(self, name: &str) -> Option<u32> {
        match self {
            StatusRegister::Rflags => Rflags::from_name(name).map(|f| f.bits()),
            StatusRegister::Mxcsr => Mxcsr::from_name(name).map(|f| f.bits()),
        }
    }

    pub fn all_bits(self) -> u32 {
        match self {
            StatusRegister::Rflags => Rflags::all().bits(),
            StatusRegister::Mxcsr => Mxcsr::all().bits(),
        }
    }

    pub fn ignores(self, name: &str) -> bool {
        match self {
            StatusRegister::Rflags => IGNORED_RFLAGS.contains(&name),
            StatusRegister::Mxcsr => IGNORED_MXCSR.contains(&name),
        }
    }

    pub fn reg_type(self) -> RegisterType {
        match self {
            StatusRegister::Rflags => RegisterType::Rflags,
            StatusRegister::Mxcsr => RegisterType::Mxcsr,
        }
    }

    /// Which status register a pseudo-operand name belongs to, if any.
    pub fn owning(name: &str) -> Option<StatusRegister> {
        Self::ALL.into_iter().find(|s| s.bit(name).is_some() || s.ignores(name))
    }
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstFlags: u32 {
const LOCK = 1 << 0; // LOCK prefix permitted
const REP = 1 << 1;
const BRANCH = 1 << 2;
}
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Features: u64 {
const CX8 = 1 << 0;
const CMOV = 1 << 1;
const MMX = 1 << 2;
const SSE = 1 << 3;
const SSE2 = 1 << 4;
const SSE3 = 1 << 5;
const SSSE3 = 1 << 6;
const SSE4_1 = 1 << 7;
const SSE4_2 = 1 << 8;
const POPCNT = 1 << 9;
const LZCNT = 1 << 10;
const BMI1 = 1 << 11;
const BMI2 = 1 << 12;
const AVX = 1 << 13;
const AVX2 = 1 << 14;
const FMA = 1 << 15;
const F16C = 1 << 16;
const AVX512F = 1 << 17;
}
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Exceptions: u32 {
const DE = 1 << 0;
const DB = 1 << 1;
const BR = 1 << 2;
const UD = 1 << 3;
const NM = 1 << 4;
const DF = 1 << 5;
const TS = 1 << 6;
const NP = 1 << 7;
const SS = 1 << 8;
const GP = 1 << 9;
const PF = 1 << 10;
const MF = 1 << 11;
const AC = 1 << 12;
const XM = 1 << 13;
}
}

/// C-side type tag of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Bool,
    Uint1,
    AddrSize,
    Scale,
    Int3,
    Reg,
    Int8,
    Int32,
    Int64,
}

impl ParamType {
    pub const ALL: [ParamType; 9] = [
        ParamType::Bool,
        ParamType::Uint1,
        ParamType::AddrSize,
        ParamType::Scale,
        ParamType::Int3,
        ParamType::Reg,
        ParamType::Int8,
        ParamType::Int32,
        ParamType::Int64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamType::Bool => "bool",
            ParamType::Uint1 => "uint1",
            ParamType::AddrSize => "addr_size",
            ParamType::Scale => "scale",
            ParamType::Int3 => "int3",
            ParamType::Reg => "reg",
            ParamType::Int8 => "int8",
            ParamType::Int32 => "int32",
            ParamType::Int64 => "int64",
        }
    }
}

/// An encodable field of the parameter struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Imm0,
    Imm1,
    Moffs,
    Rel,
    Disp,
    Reg0,
    Reg1,
    Reg2,
    Reg3,
    Reg4,
    RegBase,
    RegIndex,
    Scale,
    AddrSize,
    VexL,
    RexW,
    Lock,
    ForceRex,
    ForceSib,
    ForceDisp32,
    ForceLongVex,
    LegacyPrefixOrder,
}

impl Param {
    pub const ALL: [Param; 22] = [
        Param::Imm0,
        Param::Imm1,
        Param::Moffs,
        Param::Rel,
        Param::Disp,
        Param::Reg0,
        Param::Reg1,
        Param::Reg2,
        Param::Reg3,
        Param::Reg4,
        Param::RegBase,
        Param::RegIndex,
        Param::Scale,
        Param::AddrSize,
        Param::VexL,
        Param::RexW,
        Param::Lock,
        Param::ForceRex,
        Param::ForceSib,
        Param::ForceDisp32,
        Param::ForceLongVex,
        Param::LegacyPrefixOrder,
    ];

    /// Parameters kept by the reduced register/immediate-only struct.
    pub const BASIC: [Param; 7] = [
        Param::Imm0,
        Param::Moffs,
        Param::Rel,
        Param::Reg0,
        Param::Reg1,
        Param::Reg2,
        Param::Reg3,
    ];

    const IMMS: [Param; 2] = [Param::Imm0, Param::Imm1];
    const REGS: [Param; 5] = [Param::Reg0, Param::Reg1, Param::Reg2, Param::Reg3, Param::Reg4];

    pub fn name(self) -> &'static str {
        match self {
            Param::Imm0 => "imm0",
            Param::Imm1 => "imm1",
            Param::Moffs => "moffs",
            Param::Rel => "rel",
            Param::Disp => "disp",
            Param::Reg0 => "reg0",
            Param::Reg1 => "reg1",
            Param::Reg2 => "reg2",
            Param::Reg3 => "reg3",
            Param::Reg4 => "reg4",
            Param::RegBase => "reg_base",
            Param::RegIndex => "reg_index",
            Param::Scale => "scale",
            Param::AddrSize => "addr_size",
            Param::VexL => "vex_l",
            Param::RexW => "rex_w",
            Param::Lock => "lock",
            Param::ForceRex => "force_rex",
            Param::ForceSib => "force_sib",
            Param::ForceDisp32 => "force_disp32",
            Param::ForceLongVex => "force_long_vex",
            Param::LegacyPrefixOrder => "legacy_prefix_order",
        }
    }

    pub fn from_name(name: &str) -> Result<Param> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| GenError::UnknownFieldKind { name: name.to_string() })
    }

    pub fn imm(index: usize) -> Result<Param> {
        Self::IMMS.get(index).copied().ok_or_else(|| GenError::unhandled("immediate index", index))
    }

    pub fn reg(index: usize) -> Result<Param> {
        Self::REGS.get(index).copied().ok_or_else(|| GenError::unhandled("register index", index))
    }

    pub fn is_basic(self) -> bool {
        Self::BASIC.contains(&self)
    }

    pub fn bit_size(self, basic: bool) -> u32 {
        match self {
            Param::VexL | Param::RexW | Param::Lock | Param::ForceRex | Param::ForceSib | Param::ForceDisp32 | Param::ForceLongVex => 1,
            Param::AddrSize => 1,
            Param::Scale => 2,
            Param::LegacyPrefixOrder => 3,
            Param::Reg0 | Param::Reg1 | Param::Reg2 | Param::Reg3 | Param::Reg4 | Param::RegBase | Param::RegIndex => REG_ID_BITS,
            Param::Imm0 | Param::Moffs | Param::Rel => {
                if basic { 32 } else { 64 }
            }
            // only ENTER takes a second immediate
            Param::Imm1 => 8,
            Param::Disp => 32,
        }
    }

    pub fn signed(self) -> bool {
        matches!(self, Param::Imm0 | Param::Imm1 | Param::Moffs | Param::Rel | Param::Disp)
    }

    pub fn param_type(self, basic: bool) -> ParamType {
        match self {
            Param::Lock | Param::ForceRex | Param::ForceSib | Param::ForceDisp32 | Param::ForceLongVex => ParamType::Bool,
            Param::VexL | Param::RexW => ParamType::Uint1,
            Param::AddrSize => ParamType::AddrSize,
            Param::Scale => ParamType::Scale,
            Param::LegacyPrefixOrder => ParamType::Int3,
            Param::Reg0 | Param::Reg1 | Param::Reg2 | Param::Reg3 | Param::Reg4 | Param::RegBase | Param::RegIndex => ParamType::Reg,
            Param::Imm0 | Param::Moffs | Param::Rel => {
                if basic { ParamType::Int32 } else { ParamType::Int64 }
            }
            Param::Imm1 => ParamType::Int8,
            Param::Disp => ParamType::Int32,
        }
    }

    /// Fields an instruction may leave unspecified; these get a `_set` bit.
    pub fn undefinedable(self) -> bool {
        matches!(
            self,
            Param::RegBase | Param::RegIndex | Param::Scale | Param::Disp | Param::AddrSize | Param::LegacyPrefixOrder
        )
    }

    pub fn default_domain(self) -> Domain {
        match self {
            Param::Imm0 | Param::Moffs | Param::Rel => Domain::Int { bits: 64, signed: true },
            Param::Imm1 => Domain::Int { bits: 8, signed: true },
            Param::Disp => Domain::Int { bits: 32, signed: true },
            Param::Reg0 | Param::Reg1 | Param::Reg2 | Param::Reg3 | Param::Reg4 | Param::RegBase | Param::RegIndex => {
                RegisterType::Gp.domain()
            }
            Param::Scale => Domain::Interval { min: 0, max: 3 },
            Param::LegacyPrefixOrder => Domain::Interval { min: 0, max: 5 },
            Param::AddrSize
            | Param::VexL
            | Param::RexW
            | Param::Lock
            | Param::ForceRex
            | Param::ForceSib
            | Param::ForceDisp32
            | Param::ForceLongVex => Domain::Interval { min: 0, max: 1 },
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
