//! C identifier conventions shared by every emitted block.

use crate::config::GenConfig;
use crate::domain::Domain;
use crate::isa::x64::{Param, Register};
use crate::operand::BitRange;

#[derive(Debug, Clone)]
pub struct Names {
    ns: String,
    arch: String,
}

fn int_c(v: i64) -> String {
    v.to_string().replace('-', "m")
}

impl Names {
    pub fn new(config: &GenConfig) -> Self {
        Self { ns: config.namespace.to_lowercase(), arch: config.arch.to_lowercase() }
    }

    /// `ASMGEN_X64_<GROUP>_<NAME>`.
    pub fn constant(&self, group: &str, name: &str) -> String {
        let mut s = format!("{}_{}", self.ns, self.arch);
        for part in [group, name] {
            if !part.is_empty() {
                s.push('_');
                s.push_str(part);
            }
        }
        s.to_uppercase()
    }

    /// Namespace level constant without the architecture, e.g. `ASMGEN_DOMAIN_TYPE_ENUM`.
    pub fn base_constant(&self, name: &str) -> String {
        format!("{}_{}", self.ns, name).to_uppercase()
    }

    pub fn func(&self, name: &str) -> String {
        format!("{}_{}_{}", self.ns, self.arch, name)
    }

    pub fn base_func(&self, name: &str) -> String {
        format!("{}_{}", self.ns, name)
    }

    pub fn c_type(&self, name: &str) -> String {
        format!("{}_{}_{}_t", self.ns, self.arch, name)
    }

    pub fn base_type(&self, name: &str) -> String {
        format!("{}_{}_t", self.ns, name)
    }

    pub fn enc_func(&self, inst: &str) -> String {
        self.func(&format!("enc_{inst}"))
    }

    pub fn pref_func(&self, id: usize) -> String {
        self.func(&format!("prefs_{id}"))
    }

    pub fn called_func(&self, kind: &str, id: usize) -> String {
        self.func(&format!("{kind}_{id}"))
    }

    pub fn permutation_table(&self, n: usize) -> String {
        self.func(&format!("permutations{n}"))
    }

    pub fn inst_const(&self, inst: &str) -> String {
        self.constant("inst", inst)
    }

    pub fn param_const(&self, param: Param, basic: bool) -> String {
        self.constant(if basic { "basic_param" } else { "param" }, param.name())
    }

    pub fn register_const(&self, reg: Register) -> String {
        self.constant("reg", &reg.name())
    }

    pub fn bit_mask(&self, range: Option<BitRange>) -> String {
        match range {
            Some(r) => self.constant("bit_mask", &format!("{}_{}", r.from, r.to)),
            None => self.constant("bit_mask", "all"),
        }
    }

    pub fn write_func(&self, bits: u8) -> String {
        self.base_func(&format!("enc_ctx_write{bits}"))
    }
}

pub fn inst_params_var(inst: &str) -> String {
    format!("params_{inst}")
}

pub fn inst_operands_var(inst: &str) -> String {
    format!("operands_{inst}")
}

pub fn inst_name_var(inst: &str) -> String {
    format!("name_{inst}")
}

pub fn domain_var(domain: &Domain) -> String {
    match domain {
        Domain::Interval { min, max } => format!("param_domain__{}_{}", int_c(*min), int_c(*max)),
        Domain::Enum(values) => {
            let values: Vec<String> = values.iter().map(|v| int_c(*v)).collect();
            format!("param_domain_enum__{}", values.join("_"))
        }
        Domain::Int { bits, signed: true } => format!("param_domain_int{bits}"),
        Domain::Int { bits, signed: false } => format!("param_domain_uint{bits}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_names_spell_negatives() {
        assert_eq!(domain_var(&Domain::Interval { min: -128, max: 127 }), "param_domain__m128_127");
        assert_eq!(domain_var(&Domain::Enum(vec![0, 1, 3])), "param_domain_enum__0_1_3");
        assert_eq!(domain_var(&Domain::Int { bits: 32, signed: false }), "param_domain_uint32");
    }

    #[test]
    fn constants_are_prefixed() {
        let names = Names::new(&GenConfig::default());
        assert_eq!(names.param_const(Param::RegBase, false), "ASMGEN_X64_PARAM_REG_BASE");
        assert_eq!(names.param_const(Param::Imm0, true), "ASMGEN_X64_BASIC_PARAM_IMM0");
        assert_eq!(names.enc_func("add_rm32_r32"), "asmgen_x64_enc_add_rm32_r32");
        assert_eq!(names.bit_mask(Some(BitRange { from: 0, to: 31 })), "ASMGEN_X64_BIT_MASK_0_31");
    }
}
