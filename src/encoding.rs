//! Opcode strings in Intel manual notation, e.g. `REX.W + 81 /0 id` or
//! `VEX.256.0F.WIG 58 /r`.

use serde::Serialize;

use crate::error::{GenError, Result};
use crate::isa::x64::Param;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VexL {
    L128,
    L256,
    /// Encoded from the `vex_l` parameter.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VexW {
    W0,
    W1,
    /// Encoded from the `rex_w` parameter.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VexPrefix {
    pub l: VexL,
    pub pp: u8,  // 0: none, 1: 66, 2: F3, 3: F2
    pub map: u8, // 1: 0F, 2: 0F38, 3: 0F3A
    pub w: VexW,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModRmReg {
    /// `/r`: reg field taken from a register operand.
    Reg,
    /// `/0`..`/7`: opcode extension.
    Digit(u8),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Opcode {
    pub mandatory_prefixes: Vec<u8>,
    pub rex_w: bool,
    pub vex: Option<VexPrefix>,
    pub bytes: Vec<u8>,
    /// Register number is added to the last opcode byte.
    pub plus_reg: bool,
    pub modrm: Option<ModRmReg>,
    /// Widths in bits of the trailing immediates, bound to `imm0`, `imm1`.
    pub imms: Vec<u8>,
    pub rel: Option<u8>,
}

fn imm_width(tok: &str) -> Option<u8> {
    match tok {
        "ib" => Some(8),
        "iw" => Some(16),
        "id" => Some(32),
        "io" => Some(64),
        _ => None,
    }
}

fn rel_width(tok: &str) -> Option<u8> {
    match tok {
        "cb" => Some(8),
        "cw" => Some(16),
        "cd" => Some(32),
        _ => None,
    }
}

fn hex_byte(tok: &str) -> Option<u8> {
    if tok.len() != 2 {
        return None;
    }
    u8::from_str_radix(tok, 16).ok()
}

fn is_plus_reg(tok: &str) -> bool {
    matches!(tok, "rb" | "rw" | "rd" | "ro")
}

pub fn parse_opcode(text: &str) -> Result<Opcode> {
    let mut op = Opcode::default();

    for tok in text.split_whitespace().filter(|t| *t != "+") {
        if tok == "REX.W" {
            op.rex_w = true;
        } else if let Some(vex) = tok.strip_prefix("VEX.") {
            op.vex = Some(parse_vex(text, vex)?);
        } else if tok == "/r" {
            op.modrm = Some(ModRmReg::Reg);
        } else if let Some(digit) = tok.strip_prefix('/').and_then(|d| d.parse::<u8>().ok()).filter(|d| *d < 8) {
            op.modrm = Some(ModRmReg::Digit(digit));
        } else if let Some(w) = imm_width(tok) {
            op.imms.push(w);
        } else if let Some(w) = rel_width(tok) {
            op.rel = Some(w);
        } else if tok.strip_prefix('+').is_some_and(is_plus_reg) {
            if op.bytes.is_empty() {
                return Err(GenError::malformed(text, "`+r` without opcode byte"));
            }
            op.plus_reg = true;
        } else {
            let (hex, suffix) = match tok.split_once('+') {
                Some((hex, suffix)) if is_plus_reg(suffix) => (hex, true),
                Some(_) => return Err(GenError::malformed(text, format!("bad token `{tok}`"))),
                None => (tok, false),
            };
            let byte = hex_byte(hex).ok_or_else(|| GenError::malformed(text, format!("bad token `{tok}`")))?;
            let prefix_position = op.bytes.is_empty() && op.vex.is_none() && !op.rex_w;
            if prefix_position && !suffix && matches!(byte, 0x66 | 0xF2 | 0xF3) {
                op.mandatory_prefixes.push(byte);
            } else {
                op.bytes.push(byte);
                op.plus_reg |= suffix;
            }
        }
    }

    if op.bytes.is_empty() {
        return Err(GenError::malformed(text, "no opcode byte"));
    }
    if op.vex.is_some() && (op.rex_w || !op.mandatory_prefixes.is_empty()) {
        return Err(GenError::malformed(text, "VEX combined with legacy REX or prefixes"));
    }
    if op.imms.len() > 2 {
        return Err(GenError::malformed(text, "more than two immediates"));
    }
    Ok(op)
}

fn parse_vex(text: &str, fields: &str) -> Result<VexPrefix> {
    let mut l = VexL::Ignored;
    let mut pp = 0;
    let mut map = None;
    let mut w = VexW::Ignored;

    for field in fields.split('.') {
        match field {
            "128" | "L0" | "LZ" => l = VexL::L128,
            "256" | "L1" => l = VexL::L256,
            "LIG" => l = VexL::Ignored,
            "66" => pp = 1,
            "F3" => pp = 2,
            "F2" => pp = 3,
            "0F" => map = Some(1),
            "0F38" => map = Some(2),
            "0F3A" => map = Some(3),
            "W0" => w = VexW::W0,
            "W1" => w = VexW::W1,
            "WIG" => w = VexW::Ignored,
            "NDS" | "NDD" | "DDS" => {}
            f => return Err(GenError::malformed(text, format!("unknown VEX field `{f}`"))),
        }
    }

    let map = map.ok_or_else(|| GenError::malformed(text, "VEX without opcode map"))?;
    Ok(VexPrefix { l, pp, map, w })
}

/// Guard of a conditional prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cond {
    Always,
    IsSet(Param),
    Equals(Param, i64),
}

impl Cond {
    pub fn param(self) -> Option<Param> {
        match self {
            Cond::Always => None,
            Cond::IsSet(p) | Cond::Equals(p, _) => Some(p),
        }
    }

    pub fn to_c(self, params: &str) -> String {
        match self {
            Cond::Always => "true".to_string(),
            Cond::IsSet(p) if p.undefinedable() => format!("{params}.{p}_set && {params}.{p}"),
            Cond::IsSet(p) => format!("{params}.{p}"),
            Cond::Equals(p, v) if p.undefinedable() => format!("{params}.{p}_set && {params}.{p} == {v}"),
            Cond::Equals(p, v) => format!("{params}.{p} == {v}"),
        }
    }
}

/// A legacy prefix byte whose position relative to the other legacy
/// prefixes is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefixWrite {
    pub cond: Cond,
    pub byte: u8,
}

impl PrefixWrite {
    pub const LOCK: u8 = 0xF0;
    pub const ADDR_SIZE: u8 = 0x67;
    pub const OPERAND_SIZE: u8 = 0x66;
}
