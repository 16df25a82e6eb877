//! Parser for operand spec strings such as `"RAX:r; rm8:rw; imm8:r"`.

use crate::error::{GenError, Result};
use crate::isa::x64::StatusRegister;
use crate::operand::{Access, BitRange, Operand, OperandFlags, ParamCounters};

/// One `name:flags` segment before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOperand {
    pub name: String,
    pub flags: OperandFlags,
}

pub fn parse_segments(spec: &str) -> Result<Vec<RawOperand>> {
    spec.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let (name, flags) = segment
                .split_once(':')
                .ok_or_else(|| GenError::malformed(segment, "missing `:` separator"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(GenError::malformed(segment, "empty operand name"));
            }
            Ok(RawOperand { name: name.to_string(), flags: parse_flags(segment, flags.trim())? })
        })
        .collect()
}

fn parse_flags(segment: &str, text: &str) -> Result<OperandFlags> {
    let mut flags = OperandFlags::default();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let mode = match c {
            'r' => Some(Access::READ),
            'w' => Some(Access::WRITE),
            'c' => Some(Access::COND_WRITE),
            'u' => Some(Access::UNDEFINED),
            'e' if !flags.encoded => {
                flags.encoded = true;
                None
            }
            'm' if !flags.mnemonic => {
                flags.mnemonic = true;
                None
            }
            'e' | 'm' => return Err(GenError::malformed(segment, format!("repeated flag `{c}`"))),
            c if c.is_whitespace() => continue,
            c => return Err(GenError::malformed(segment, format!("unknown access flag `{c}`"))),
        };

        if let Some(mode) = mode {
            if flags.access.contains(mode) {
                return Err(GenError::malformed(segment, format!("repeated access mode `{c}`")));
            }
            flags.access |= mode;
        }

        if chars.peek() == Some(&'[') {
            chars.next();
            let mut body = String::new();
            loop {
                match chars.next() {
                    Some(']') => break,
                    Some(c) => body.push(c),
                    None => return Err(GenError::malformed(segment, "unclosed bit range")),
                }
            }
            let mode = mode.ok_or_else(|| GenError::malformed(segment, format!("bit range on flag `{c}`")))?;
            flags.ranges.push((mode, parse_range(segment, &body)?));
        }
    }
    Ok(flags)
}

fn parse_range(segment: &str, body: &str) -> Result<BitRange> {
    let bad = || GenError::malformed(segment, format!("bad bit range `[{body}]`"));
    let (from, to) = body.split_once("..").ok_or_else(bad)?;
    let from: u16 = from.trim().parse().map_err(|_| bad())?;
    let to: u16 = to.trim().parse().map_err(|_| bad())?;
    if from > to {
        return Err(bad());
    }
    Ok(BitRange { from, to })
}

#[derive(Default)]
struct StatusAccum {
    access: Access,
    read: u32,
    written: u32,
    undefined: u32,
    seen: bool,
}

/// Parses and classifies a whole operand spec. Individual status bits are
/// folded into one trailing operand per status register.
pub fn parse(spec: &str) -> Result<Vec<Operand>> {
    let mut counters = ParamCounters::new();
    let mut status: [StatusAccum; 2] = Default::default();
    let mut operands = Vec::new();

    for raw in parse_segments(spec)? {
        let Some(reg) = StatusRegister::owning(&raw.name) else {
            operands.push(Operand::new(&raw.name, raw.flags, &mut counters)?);
            continue;
        };
        if reg.ignores(&raw.name) {
            continue;
        }
        let bit = reg.bit(&raw.name).unwrap_or(0);
        let acc = &mut status[reg as usize];
        acc.seen = true;
        acc.access |= raw.flags.access;
        if raw.flags.access.contains(Access::READ) {
            acc.read |= bit;
        }
        if raw.flags.access.intersects(Access::WRITE | Access::COND_WRITE) {
            acc.written |= bit;
        }
        if raw.flags.access.contains(Access::UNDEFINED) {
            acc.undefined |= bit;
        }
    }

    for reg in StatusRegister::ALL {
        let acc = &status[reg as usize];
        if acc.seen {
            operands.push(Operand::status(reg, acc.access, acc.read, acc.written, acc.undefined));
        }
    }
    Ok(operands)
}
