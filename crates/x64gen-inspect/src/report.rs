use std::fmt::Write as _;

use serde::Serialize;

use x64gen_rs::layout::{Layout, Slot};
use x64gen_rs::names::domain_var;
use x64gen_rs::{Domain, Operand};

#[derive(Debug, Clone, Serialize)]
pub struct OperandOut {
    pub name: String,
    #[serde(rename = "type")]
    pub op_type: &'static str,
    pub access: String,
    pub implicit: bool,
    pub param: Option<&'static str>,
    pub size1: Option<u16>,
    pub size2: Option<u16>,
}

impl From<&Operand> for OperandOut {
    fn from(op: &Operand) -> Self {
        let mut access = String::new();
        for (c, on) in [('r', op.read()), ('w', op.written()), ('c', op.conditionally_written()), ('u', op.undefined())] {
            if on {
                access.push(c);
            }
        }
        Self {
            name: op.name.clone(),
            op_type: op.op_type.name(),
            access,
            implicit: op.implicit,
            param: op.parameter.map(|p| p.name()),
            size1: op.size1(),
            size2: op.size2(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainOut {
    pub var: String,
    pub size: Option<u64>,
    pub domain: Domain,
}

impl From<&Domain> for DomainOut {
    fn from(d: &Domain) -> Self {
        Self { var: domain_var(d), size: d.len(), domain: d.clone() }
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn operands_text(ops: &[Operand]) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "{:<12} {:<6} {:<6} {:<8} {:<6} {:<6} {:<6}", "name", "type", "access", "implicit", "param", "size1", "size2");
    for op in ops.iter().map(OperandOut::from) {
        let _ = writeln!(
            buf,
            "{:<12} {:<6} {:<6} {:<8} {:<6} {:<6} {:<6}",
            op.name,
            op.op_type,
            op.access,
            op.implicit,
            opt(op.param),
            opt(op.size1),
            opt(op.size2)
        );
    }
    buf
}

pub fn layout_text(layout: &Layout) -> String {
    let mut buf = String::new();
    for slot in &layout.slots {
        match slot {
            Slot::Field(f) => {
                let _ = writeln!(buf, "{:<24} {:>3} {}", f.name, f.bits, f.c_type());
            }
            Slot::Union(fields) => {
                let _ = writeln!(buf, "union ({} bits)", slot.bits());
                for f in fields {
                    let _ = writeln!(buf, "  {:<22} {:>3} {}", f.name, f.bits, f.c_type());
                }
            }
        }
    }
    let _ = writeln!(buf, "total: {} bits", layout.total_bits);
    buf
}

pub fn domains_text(domains: &[Domain]) -> String {
    let mut buf = String::new();
    for (i, d) in domains.iter().enumerate() {
        let _ = writeln!(buf, "{i:>3} {} {}", domain_var(d), opt(d.len()));
    }
    buf
}
