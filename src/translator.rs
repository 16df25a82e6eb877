//! Per-instruction encoding function emission.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::Domain;
use crate::encoding::{Cond, ModRmReg, PrefixWrite};
use crate::error::{GenError, Result};
use crate::instructions::Instruction;
use crate::interner::{PermutationTables, RequestTable};
use crate::isa::x64::{Param, RegisterType};
use crate::names::Names;
use crate::operand::{Operand, OperandType};
use crate::routines::{ParamRefs, RegField, RmSource, Routine};
use crate::srcgen::Formatter;

/// An instruction after its encoding function was emitted. The parameter
/// set grows while shared routines are merged back in.
#[derive(Debug, Clone)]
pub struct TranslatedInst {
    pub inst: Instruction,
    pub params: BTreeSet<Param>,
    /// Domains narrower than [`Param::default_domain`].
    pub domains: BTreeMap<Param, Domain>,
}

impl TranslatedInst {
    pub fn merge_params(&mut self, params: &BTreeSet<Param>) {
        self.params.extend(params.iter().copied());
    }

    pub fn param_list(&self) -> Vec<Param> {
        self.params.iter().copied().collect()
    }

    /// Position of `param` in the emitted parameter table.
    pub fn param_index(&self, param: Param) -> Result<usize> {
        self.params.iter().position(|p| *p == param).ok_or_else(|| GenError::ParameterNotFound {
            param: param.name().to_string(),
            params: self.params.iter().map(|p| p.name().to_string()).collect(),
        })
    }

    pub fn domain(&self, param: Param) -> Domain {
        self.domains.get(&param).cloned().unwrap_or_else(|| param.default_domain())
    }
}

/// Tables shared across instructions; the translator requests entries and
/// registers itself as consumer.
pub struct Shared<'a> {
    pub routines: &'a mut RequestTable<Routine>,
    pub prefs: &'a mut RequestTable<Vec<PrefixWrite>>,
    pub permutations: &'a mut PermutationTables,
}

pub struct InstTranslator<'a> {
    names: &'a Names,
    inst: &'a Instruction,
    refs: ParamRefs,
    domains: BTreeMap<Param, Domain>,
    calls: bool,
}

fn reg_class_domain(op: &Operand) -> Option<Domain> {
    match op.register_type? {
        t @ (RegisterType::Gp | RegisterType::Xmm | RegisterType::Zmm | RegisterType::Mm) => Some(t.domain()),
        _ => None,
    }
}

/// Signed domain of an immediate; only widths with C `intN_t` limits qualify.
fn imm_domain(bits: u16) -> Result<Domain> {
    match u8::try_from(bits) {
        Ok(bits @ (8 | 16 | 32 | 64)) => Ok(Domain::Int { bits, signed: true }),
        _ => Err(GenError::unhandled("immediate width", bits)),
    }
}

impl<'a> InstTranslator<'a> {
    pub fn new(names: &'a Names, inst: &'a Instruction) -> Self {
        Self { names, inst, refs: ParamRefs::new(), domains: BTreeMap::new(), calls: false }
    }

    pub fn translate(mut self, consumer: usize, shared: &mut Shared<'_>, f: &mut Formatter) -> Result<TranslatedInst> {
        self.operand_domains()?;

        let mut body = Formatter::new();
        self.prefixes(consumer, shared, &mut body);
        for byte in self.inst.opcode.mandatory_prefixes.clone() {
            self.write(&mut body, 8, &format!("0x{byte:02X}"));
        }
        self.rex_vex(consumer, shared, &mut body)?;
        self.opcode(&mut body)?;
        self.modrm(consumer, shared, &mut body)?;
        self.trailing(&mut body)?;

        let head = format!(
            "static bool {}({} *ctx)",
            self.names.enc_func(&self.inst.name),
            self.names.c_type("enc_ctx")
        );
        f.line(format!("{head} {{"));
        f.indent(|f| {
            for l in body.finish().lines() {
                f.line(l);
            }
            f.line("return true;");
        });
        if self.calls {
            f.line("error:");
            f.indent(|f| f.line("return false;"));
        }
        f.line("}");
        f.empty_line();

        let mut params = self.refs.into_params();
        params.extend(self.inst.operands.iter().filter_map(|op| op.parameter));
        Ok(TranslatedInst { inst: self.inst.clone(), params, domains: self.domains })
    }

    fn write(&self, f: &mut Formatter, bits: u8, expr: &str) {
        f.line(format!("{}(ctx, {expr});", self.names.write_func(bits)));
    }

    fn call(&mut self, f: &mut Formatter, call: String) {
        self.calls = true;
        f.block(format!("if(!{call})"), "", |f| f.line("goto error;"));
    }

    fn operand_domains(&mut self) -> Result<()> {
        for op in &self.inst.operands {
            let Some(param) = op.parameter else { continue };
            let domain = match op.op_type {
                OperandType::Reg | OperandType::Rm => reg_class_domain(op),
                OperandType::Imm => match op.imm_size {
                    Some(bits) => Some(imm_domain(bits)?),
                    None => None,
                },
                OperandType::Mem => None,
                t @ (OperandType::Vsib | OperandType::Flags) => {
                    return Err(GenError::unhandled("parameterized operand type", t.name()))
                }
            };
            if let Some(domain) = domain {
                self.domains.insert(param, domain.canonical()?);
            }
        }
        if self.inst.operands.iter().any(|op| op.op_type == OperandType::Vsib) {
            self.domains.insert(Param::RegIndex, RegisterType::Xmm.domain().canonical()?);
        }
        Ok(())
    }

    fn prefix_writes(&self) -> Vec<PrefixWrite> {
        let mut writes = Vec::new();
        if self.inst.lockable() {
            writes.push(PrefixWrite { cond: Cond::IsSet(Param::Lock), byte: PrefixWrite::LOCK });
        }
        if self.inst.addresses_memory() {
            writes.push(PrefixWrite { cond: Cond::Equals(Param::AddrSize, 1), byte: PrefixWrite::ADDR_SIZE });
        }
        let opcode = &self.inst.opcode;
        if self.inst.operand_size16() && opcode.vex.is_none() && !opcode.mandatory_prefixes.contains(&PrefixWrite::OPERAND_SIZE) {
            writes.push(PrefixWrite { cond: Cond::Always, byte: PrefixWrite::OPERAND_SIZE });
        }
        writes
    }

    fn prefixes(&mut self, consumer: usize, shared: &mut Shared<'_>, f: &mut Formatter) {
        let writes = self.prefix_writes();
        for w in &writes {
            if let Some(p) = w.cond.param() {
                self.refs.mark(p);
            }
        }

        match writes.len() {
            0 => {}
            1 => {
                let w = writes[0];
                let write = format!("{}(ctx, 0x{:02X});", self.names.write_func(8), w.byte);
                match w.cond {
                    Cond::Always => f.line(write),
                    cond => f.block(format!("if({})", cond.to_c("ctx->params")), "", |f| f.line(write)),
                }
            }
            _ => {
                let n = writes.len();
                let perms = shared.permutations.request(n);
                let id = shared.prefs.request(writes, consumer);
                self.domains.insert(Param::LegacyPrefixOrder, Domain::Interval { min: 0, max: perms.len() as i64 - 1 });
                let order = self.refs.get_or(Param::LegacyPrefixOrder, 0);
                let call = format!("{}(ctx, {order})", self.names.pref_func(id));
                self.call(f, call);
            }
        }
    }

    fn explicit(&self, pred: impl Fn(&Operand) -> bool) -> Vec<&'a Operand> {
        let inst: &'a Instruction = self.inst;
        inst.operands.iter().filter(|op| !op.implicit && pred(op)).collect()
    }

    /// Register operand in the ModRM reg field, the rm source and the
    /// leftover register operand for VEX.vvvv.
    fn modrm_fields(&self) -> (Option<RegField>, RmSource, Option<Param>) {
        let regs: Vec<Param> = self
            .explicit(|op| op.op_type == OperandType::Reg)
            .into_iter()
            .filter_map(|op| op.parameter)
            .collect();
        let rm_op = self.explicit(|op| matches!(op.op_type, OperandType::Rm | OperandType::Mem | OperandType::Vsib)).into_iter().next();
        let mut rm = RmSource {
            reg: rm_op.and_then(|op| if op.op_type == OperandType::Rm { op.parameter } else { None }),
            mem: rm_op.is_some(),
            vsib: rm_op.is_some_and(|op| op.op_type == OperandType::Vsib),
        };
        let mut regs = regs.into_iter();

        let reg = match self.inst.opcode.modrm {
            Some(ModRmReg::Reg) => regs.next().map(RegField::Param),
            Some(ModRmReg::Digit(d)) => Some(RegField::Digit(d)),
            None => {
                // +r opcodes carry the register in the opcode byte
                if self.inst.opcode.plus_reg {
                    rm.reg = regs.next();
                }
                rm.mem = false;
                rm.vsib = false;
                return (None, rm, regs.next());
            }
        };
        if rm_op.is_none() {
            rm.reg = regs.next();
        }
        (reg, rm, regs.next())
    }

    fn rex_vex(&mut self, consumer: usize, shared: &mut Shared<'_>, f: &mut Formatter) -> Result<()> {
        let (reg, rm, vvvv) = self.modrm_fields();
        let reg = match reg {
            Some(RegField::Param(p)) => Some(p),
            _ => None,
        };
        let routine = match self.inst.opcode.vex {
            Some(vex) => Routine::Vex { vex, reg, rm, vvvv },
            None => {
                if vvvv.is_some() {
                    return Err(GenError::unhandled("register operand without VEX.vvvv", &self.inst.name));
                }
                if !self.inst.opcode.rex_w && reg.is_none() && rm.reg.is_none() && !rm.mem {
                    return Ok(());
                }
                Routine::Rex { w: self.inst.opcode.rex_w, reg, rm }
            }
        };
        self.request(consumer, shared, routine, f);
        Ok(())
    }

    fn request(&mut self, consumer: usize, shared: &mut Shared<'_>, routine: Routine, f: &mut Formatter) {
        let id = shared.routines.request(routine, consumer);
        let call = format!("{}(ctx)", self.names.called_func(routine.kind(), id));
        self.call(f, call);
    }

    fn opcode(&mut self, f: &mut Formatter) -> Result<()> {
        let inst: &'a Instruction = self.inst;
        let Some((last, init)) = inst.opcode.bytes.split_last() else {
            return Err(GenError::malformed(&self.inst.name, "no opcode byte"));
        };
        for b in init {
            self.write(f, 8, &format!("0x{b:02X}"));
        }
        if self.inst.opcode.plus_reg {
            let (_, rm, _) = self.modrm_fields();
            let reg = rm.reg.ok_or_else(|| GenError::unhandled("+r opcode without register operand", &self.inst.name))?;
            let expr = format!("0x{last:02X} + ({} & 7)", self.refs.get(reg));
            self.write(f, 8, &expr);
        } else {
            self.write(f, 8, &format!("0x{last:02X}"));
        }
        Ok(())
    }

    fn modrm(&mut self, consumer: usize, shared: &mut Shared<'_>, f: &mut Formatter) -> Result<()> {
        if self.inst.opcode.modrm.is_none() {
            return Ok(());
        }
        let (reg, rm, _) = self.modrm_fields();
        let reg = reg.ok_or_else(|| GenError::unhandled("ModRM without reg operand", &self.inst.name))?;
        if rm.reg.is_none() && !rm.mem {
            return Err(GenError::unhandled("ModRM without rm operand", &self.inst.name));
        }
        self.request(consumer, shared, Routine::ModRmSib { reg, rm }, f);
        Ok(())
    }

    fn trailing(&mut self, f: &mut Formatter) -> Result<()> {
        for (i, bits) in self.inst.opcode.imms.clone().into_iter().enumerate() {
            let param = Param::imm(i)?;
            let expr = format!("(uint{bits}_t) {}", self.refs.get(param));
            self.write(f, bits, &expr);
        }
        if let Some(bits) = self.inst.opcode.rel {
            let expr = format!("(uint{bits}_t) {}", self.refs.get(Param::Rel));
            self.write(f, bits, &expr);
        }
        if self.inst.operands.iter().any(|op| op.parameter == Some(Param::Moffs)) {
            let expr = format!("(uint64_t) {}", self.refs.get(Param::Moffs));
            self.write(f, 64, &expr);
        }
        Ok(())
    }
}

/// Emits one preference function: the writes of `key` in the order picked
/// from the permutation table by `order`.
pub fn pref_func_to_c(names: &Names, id: usize, key: &[PrefixWrite], f: &mut Formatter) -> BTreeSet<Param> {
    let mut refs = ParamRefs::new();
    let n = key.len();
    let head = format!("static bool {}({} *ctx, unsigned order)", names.pref_func(id), names.c_type("enc_ctx"));
    f.block(head, "", |f| {
        f.line("unsigned i;");
        f.block(format!("for(i = 0; i < {n}; i++)"), "", |f| {
            f.block(format!("switch({}[order][i])", names.permutation_table(n)), "", |f| {
                for (i, w) in key.iter().enumerate() {
                    f.line(format!("case {i}:"));
                    f.indent(|f| {
                        let write = format!("{}(ctx, 0x{:02X});", names.write_func(8), w.byte);
                        match w.cond.param() {
                            None => f.line(write),
                            Some(p) => {
                                refs.mark(p);
                                f.block(format!("if({})", w.cond.to_c("ctx->params")), "", |f| f.line(write));
                            }
                        }
                        f.line("break;");
                    });
                }
                f.line("default:");
                f.indent(|f| f.line(format!("{}();", names.base_func("assert_not_reached"))));
            });
        });
        f.line("return true;");
    });
    f.empty_line();
    refs.into_params()
}
