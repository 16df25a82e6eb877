use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GenError, Result};
use crate::isa::x64::{implicit_register, Param, Register, RegisterType, StatusRegister, WordType};

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Access: u8 {
const READ = 1 << 0;
const WRITE = 1 << 1;
const COND_WRITE = 1 << 2;
const UNDEFINED = 1 << 3;
}
}

impl Default for Access {
    fn default() -> Self {
        Access::empty()
    }
}

/// Inclusive bit slice an access mode is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BitRange {
    pub from: u16,
    pub to: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandType {
    Reg,
    Rm,
    Mem,
    Imm,
    Vsib,
    Flags,
}

impl OperandType {
    pub const ALL: [OperandType; 6] = [
        OperandType::Reg,
        OperandType::Rm,
        OperandType::Mem,
        OperandType::Imm,
        OperandType::Vsib,
        OperandType::Flags,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperandType::Reg => "reg",
            OperandType::Rm => "rm",
            OperandType::Mem => "mem",
            OperandType::Imm => "imm",
            OperandType::Vsib => "vsib",
            OperandType::Flags => "flags",
        }
    }
}

/// Access flags of one operand segment, as written after the `:`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandFlags {
    pub access: Access,
    pub encoded: bool,
    pub mnemonic: bool,
    pub ranges: Vec<(Access, BitRange)>,
}

/// Per-instruction counters handing out `immN` / `regN` parameter names.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamCounters {
    imm: usize,
    reg: usize,
}

impl ParamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_imm(&mut self) -> Result<Param> {
        let p = Param::imm(self.imm)?;
        self.imm += 1;
        Ok(p)
    }

    pub fn next_reg(&mut self) -> Result<Param> {
        let p = Param::reg(self.reg)?;
        self.reg += 1;
        Ok(p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub name: String,
    #[serde(rename = "type")]
    pub op_type: OperandType,
    pub access: Access,
    pub encoded: bool,
    pub mnemonic: bool,
    pub implicit: bool,
    pub accessed_bits: Vec<(Access, BitRange)>,
    pub register: Option<Register>,
    pub register_type: Option<RegisterType>,
    pub register_size: Option<u16>,
    pub register_word_type: Option<WordType>,
    pub mem_size: Option<u16>,
    pub imm_size: Option<u16>,
    pub index_register_size: Option<u16>,
    /// Fixed value of an implicit immediate such as the `1` of `shl r/m32, 1`.
    pub imm: Option<u8>,
    pub parameter: Option<Param>,
    pub read_flags: u32,
    pub written_flags: u32,
    pub undefined_flags: u32,
}

enum ParamSlot {
    None,
    NextImm,
    NextReg,
    Fixed(Param),
}

struct Classified {
    op_type: OperandType,
    reg: Option<(RegisterType, u16)>,
    mem_size: Option<u16>,
    imm_size: Option<u16>,
    index_register_size: Option<u16>,
    slot: ParamSlot,
}

impl Classified {
    fn new(op_type: OperandType, slot: ParamSlot) -> Self {
        Self { op_type, reg: None, mem_size: None, imm_size: None, index_register_size: None, slot }
    }
}

type Rule = fn(&str) -> Option<Result<Classified>>;

// precedence matters: first match wins
const RULES: &[(&str, Rule)] = &[
    ("imm", classify_imm),
    ("rm", classify_rm),
    ("reg", classify_reg),
    ("mem", classify_mem),
    ("moffs", classify_moffs),
    ("vsib", classify_vsib),
];

fn number(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn unrecognized(name: &str) -> GenError {
    GenError::UnrecognizedOperandSyntax { name: name.to_string() }
}

/// `r`, `r32`, `xmm`, `xmm1`, `ymm`, `zmm`, `mm`.
fn reg_token(s: &str) -> Option<(RegisterType, Option<u16>)> {
    if s == "r" {
        return Some((RegisterType::Gp, None));
    }
    for (prefix, reg_type, size) in [
        ("xmm", RegisterType::Xmm, 128),
        ("ymm", RegisterType::Xmm, 256),
        ("zmm", RegisterType::Zmm, 512),
        ("mm", RegisterType::Mm, 64),
    ] {
        if let Some(rest) = s.strip_prefix(prefix) {
            if rest.is_empty() || number(rest).is_some() {
                return Some((reg_type, Some(size)));
            }
        }
    }
    let size = number(s.strip_prefix('r')?)?;
    Some((RegisterType::Gp, Some(size)))
}

fn gp_size(name: &str, size: u16) -> Result<u16> {
    match size {
        8 | 16 | 32 | 64 => Ok(size),
        _ => Err(unrecognized(name)),
    }
}

fn classify_imm(name: &str) -> Option<Result<Classified>> {
    let (slot, rest) = if let Some(rest) = name.strip_prefix("imm") {
        (ParamSlot::NextImm, rest)
    } else if let Some(rest) = name.strip_prefix("rel") {
        (ParamSlot::Fixed(Param::Rel), rest)
    } else {
        return None;
    };
    let size = if rest.is_empty() { None } else { Some(number(rest)?) };
    let mut c = Classified::new(OperandType::Imm, slot);
    c.imm_size = size;
    Some(Ok(c))
}

fn classify_rm(name: &str) -> Option<Result<Classified>> {
    let (reg_type, reg_size, mem_size) = if let Some(size) = name.strip_prefix("rm").and_then(number) {
        (RegisterType::Gp, None, size)
    } else {
        let (reg, mem) = name.split_once("/m")?;
        let (reg_type, reg_size) = reg_token(reg)?;
        (reg_type, reg_size, number(mem)?)
    };
    let reg_size = reg_size.unwrap_or(mem_size);
    if reg_type == RegisterType::Gp {
        if let Err(e) = gp_size(name, reg_size) {
            return Some(Err(e));
        }
    }
    let mut c = Classified::new(OperandType::Rm, ParamSlot::NextReg);
    c.reg = Some((reg_type, reg_size));
    c.mem_size = Some(mem_size);
    Some(Ok(c))
}

fn classify_reg(name: &str) -> Option<Result<Classified>> {
    let (reg_type, size) = reg_token(name)?;
    let size = size?;
    if reg_type == RegisterType::Gp {
        if let Err(e) = gp_size(name, size) {
            return Some(Err(e));
        }
    }
    let mut c = Classified::new(OperandType::Reg, ParamSlot::NextReg);
    c.reg = Some((reg_type, size));
    Some(Ok(c))
}

fn classify_mem(name: &str) -> Option<Result<Classified>> {
    let rest = name.strip_prefix('m')?;
    let size = if rest.is_empty() { None } else { Some(number(rest)?) };
    let mut c = Classified::new(OperandType::Mem, ParamSlot::None);
    c.mem_size = size;
    Some(Ok(c))
}

fn classify_moffs(name: &str) -> Option<Result<Classified>> {
    let size = number(name.strip_prefix("moffs")?)?;
    let mut c = Classified::new(OperandType::Mem, ParamSlot::Fixed(Param::Moffs));
    c.mem_size = Some(size);
    Some(Ok(c))
}

fn classify_vsib(name: &str) -> Option<Result<Classified>> {
    let rest = name.strip_prefix("vm")?;
    let split = rest.find(|c: char| !c.is_ascii_digit())?;
    let (elem, rest) = rest.split_at(split);
    number(elem)?;
    let mut chars = rest.chars();
    let index_size = match chars.next()? {
        'x' => 128,
        'y' => 256,
        'z' => 512,
        _ => return None,
    };
    let mem_size = number(chars.as_str())?;
    let mut c = Classified::new(OperandType::Vsib, ParamSlot::None);
    c.mem_size = Some(mem_size);
    c.index_register_size = Some(index_size);
    Some(Ok(c))
}

impl Operand {
    /// Builds an operand from one spec segment. Fully upper-case names are
    /// implicit and never consume a parameter counter.
    pub fn new(name: &str, flags: OperandFlags, counters: &mut ParamCounters) -> Result<Operand> {
        let mut op = Operand {
            name: name.to_string(),
            op_type: OperandType::Reg,
            access: flags.access,
            encoded: flags.encoded,
            mnemonic: flags.mnemonic,
            implicit: false,
            accessed_bits: flags.ranges,
            register: None,
            register_type: None,
            register_size: None,
            register_word_type: None,
            mem_size: None,
            imm_size: None,
            index_register_size: None,
            imm: None,
            parameter: None,
            read_flags: 0,
            written_flags: 0,
            undefined_flags: 0,
        };
        if name == name.to_uppercase() {
            op.init_implicit()?;
        } else {
            op.init_explicit(counters)?;
        }
        Ok(op)
    }

    /// Synthetic operand standing for every tracked bit of a status register.
    pub fn status(reg: StatusRegister, access: Access, read: u32, written: u32, undefined: u32) -> Operand {
        let implicit = implicit_register(reg.name()).ok();
        Operand {
            name: reg.name().to_string(),
            op_type: OperandType::Flags,
            access,
            encoded: false,
            mnemonic: false,
            implicit: true,
            accessed_bits: Vec::new(),
            register: implicit.map(|r| r.register),
            register_type: Some(reg.reg_type()),
            register_size: implicit.map(|r| r.size),
            register_word_type: None,
            mem_size: None,
            imm_size: None,
            index_register_size: None,
            imm: None,
            parameter: None,
            read_flags: read,
            written_flags: written,
            undefined_flags: undefined,
        }
    }

    fn init_explicit(&mut self, counters: &mut ParamCounters) -> Result<()> {
        let classified = RULES
            .iter()
            .find_map(|(_, rule)| rule(&self.name))
            .ok_or_else(|| unrecognized(&self.name))??;

        self.op_type = classified.op_type;
        if let Some((reg_type, size)) = classified.reg {
            self.register_type = Some(reg_type);
            self.register_size = Some(size);
        }
        self.mem_size = classified.mem_size;
        self.imm_size = classified.imm_size;
        self.index_register_size = classified.index_register_size;
        self.parameter = match classified.slot {
            ParamSlot::None => None,
            ParamSlot::NextImm => Some(counters.next_imm()?),
            ParamSlot::NextReg => Some(counters.next_reg()?),
            ParamSlot::Fixed(p) => Some(p),
        };
        Ok(())
    }

    fn init_implicit(&mut self) -> Result<()> {
        self.implicit = true;

        if self.name.bytes().all(|b| b.is_ascii_digit()) {
            let value = self.name.parse::<u8>().map_err(|_| GenError::unhandled("implicit immediate", &self.name))?;
            self.op_type = OperandType::Imm;
            self.imm = Some(value);
            return Ok(());
        }

        let is_mem = self.name.starts_with('[');
        let mut reg_name = self.name.trim_start_matches('[').trim_end_matches(']').trim();
        if let Some((first, _)) = reg_name.split_once('+') {
            // register pair addressing, e.g. [RBX + AL] in XLAT, is not modeled
            warn!(operand = %self.name, "truncating register expression to its first component");
            reg_name = first.trim();
        }

        let reg = implicit_register(reg_name)?;
        self.op_type = if is_mem {
            OperandType::Mem
        } else if matches!(reg.reg_type, RegisterType::Rflags | RegisterType::Mxcsr) {
            OperandType::Flags
        } else {
            OperandType::Reg
        };
        self.register = Some(reg.register);
        self.register_type = Some(reg.reg_type);
        self.register_size = Some(reg.size);
        self.register_word_type = reg.word_type;

        if self.op_type == OperandType::Flags {
            let status = if reg.reg_type == RegisterType::Rflags { StatusRegister::Rflags } else { StatusRegister::Mxcsr };
            let all = status.all_bits();
            if self.access.contains(Access::READ) {
                self.read_flags = all;
            }
            if self.access.intersects(Access::WRITE | Access::COND_WRITE) {
                self.written_flags = all;
            }
            if self.access.contains(Access::UNDEFINED) {
                self.undefined_flags = all;
            }
        }
        Ok(())
    }

    pub fn read(&self) -> bool {
        self.access.contains(Access::READ)
    }

    pub fn written(&self) -> bool {
        self.access.contains(Access::WRITE)
    }

    pub fn conditionally_written(&self) -> bool {
        self.access.contains(Access::COND_WRITE)
    }

    pub fn undefined(&self) -> bool {
        self.access.contains(Access::UNDEFINED)
    }

    pub fn can_encode_register(&self) -> bool {
        matches!(self.op_type, OperandType::Reg | OperandType::Rm)
    }

    pub fn size(&self) -> Option<u16> {
        self.register_size.or(self.imm_size).or(self.mem_size)
    }

    pub fn size1(&self) -> Option<u16> {
        self.register_size.or(self.imm_size).or(self.index_register_size)
    }

    pub fn size2(&self) -> Option<u16> {
        self.mem_size
    }

    pub fn word_type1(&self) -> Result<Option<WordType>> {
        if let Some(w) = self.register_word_type {
            return Ok(Some(w));
        }
        self.size1().map(WordType::from_size).transpose()
    }

    pub fn word_type2(&self) -> Result<Option<WordType>> {
        self.size2().map(WordType::from_size).transpose()
    }

    pub fn bit_range(&self, mode: Access) -> Option<BitRange> {
        self.accessed_bits.iter().find(|(m, _)| *m == mode).map(|(_, r)| *r)
    }
}
