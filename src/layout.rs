//! Packing of the parameter struct into C bitfields.

use serde::Serialize;
use tracing::debug;

use crate::error::{GenError, Result};
use crate::isa::x64::Param;
use crate::srcgen::Formatter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub bits: u32,
    pub signed: bool,
}

impl Field {
    /// Smallest C integer type holding the field; bitfields narrower than
    /// their type are fine.
    pub fn c_type(&self) -> String {
        let width = match self.bits {
            8 | 16 | 32 => self.bits,
            _ => 64,
        };
        if self.signed {
            format!("int{width}_t")
        } else {
            format!("uint{width}_t")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Field(Field),
    Union(Vec<Field>),
}

impl Slot {
    pub fn bits(&self) -> u32 {
        match self {
            Slot::Field(f) => f.bits,
            Slot::Union(fs) => fs.iter().map(|f| f.bits).max().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub slots: Vec<Slot>,
    pub total_bits: u32,
}

impl Layout {
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.slots.iter().flat_map(|s| match s {
            Slot::Field(f) => std::slice::from_ref(f),
            Slot::Union(fs) => fs.as_slice(),
        })
    }

    pub fn to_c(&self, type_name: &str, f: &mut Formatter) {
        f.block("typedef struct", &format!(" {type_name};"), |f| {
            for slot in &self.slots {
                match slot {
                    Slot::Field(field) => f.line(format!("{} {} : {};", field.c_type(), field.name, field.bits)),
                    Slot::Union(fields) => f.block("union", ";", |f| {
                        for field in fields {
                            f.line(format!("{} {} : {};", field.c_type(), field.name, field.bits));
                        }
                    }),
                }
            }
        });
    }
}

/// Collects fields and union groups, then lays them out deterministically.
#[derive(Debug, Clone)]
pub struct LayoutCompiler {
    fields: Vec<Field>,
    unions: Vec<Vec<String>>,
    budget: u32,
    basic: bool,
}

impl LayoutCompiler {
    pub fn new(budget: u32, basic: bool) -> Self {
        Self { fields: Vec::new(), unions: Vec::new(), budget, basic }
    }

    /// Adds a field by kind name; undefinedable kinds get a `_set` flag.
    pub fn field(&mut self, kind: &str) -> Result<&mut Self> {
        let param = Param::from_name(kind)?;
        self.fields.push(Field {
            name: param.name().to_string(),
            bits: param.bit_size(self.basic),
            signed: param.signed(),
        });
        if param.undefinedable() && !self.basic {
            self.fields.push(Field { name: format!("{}_set", param.name()), bits: 1, signed: false });
        }
        Ok(self)
    }

    /// Declares `members` mutually exclusive; members not added as fields
    /// are ignored.
    pub fn union(&mut self, members: &[&str]) -> &mut Self {
        self.unions.push(members.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn for_params(params: &[Param], basic: bool, budget: u32) -> Result<LayoutCompiler> {
        let mut c = LayoutCompiler::new(budget, basic);
        for p in params {
            c.field(p.name())?;
        }
        c.union(&["imm0", "moffs", "rel"]);
        if !basic {
            c.union(&["imm1", "disp"]);
        }
        Ok(c)
    }

    pub fn compile(&self) -> Result<Layout> {
        let mut fields = self.fields.clone();
        fields.sort_by(|a, b| (a.bits, &a.name).cmp(&(b.bits, &b.name)));

        // groups keep the position of their first member in sorted order
        let mut slots: Vec<Slot> = Vec::new();
        let mut group_slot: Vec<Option<usize>> = vec![None; self.unions.len()];
        for field in fields {
            let group = self.unions.iter().position(|u| u.contains(&field.name));
            match group {
                Some(g) => match group_slot[g] {
                    Some(i) => {
                        if let Slot::Union(members) = &mut slots[i] {
                            members.push(field);
                        }
                    }
                    None => {
                        group_slot[g] = Some(slots.len());
                        slots.push(Slot::Union(vec![field]));
                    }
                },
                None => slots.push(Slot::Field(field)),
            }
        }
        for slot in &mut slots {
            if let Slot::Union(members) = slot {
                if members.len() == 1 {
                    *slot = Slot::Field(members.remove(0));
                }
            }
        }

        let total_bits = slots.iter().map(Slot::bits).sum();
        debug!(total_bits, budget = self.budget, basic = self.basic, "parameter struct layout");
        if total_bits > self.budget {
            return Err(GenError::FieldSetTooWide { bits: total_bits, budget: self.budget });
        }
        Ok(Layout { slots, total_bits })
    }
}
