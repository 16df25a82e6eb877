//! Generation driver: runs the emission phases in dependency order over one
//! instruction table.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::accessors::Accessors;
use crate::config::GenConfig;
use crate::domain::{Domain, DomainRegistry};
use crate::encoding::PrefixWrite;
use crate::error::{GenError, Result};
use crate::instructions::{self, InstrDesc, Instruction};
use crate::interner::{PermutationTables, RequestTable};
use crate::isa::x64::{
    bitsize, Exceptions, Features, InstFlags, Param, ParamType, Register, RegisterType, WordType, OPERAND_SIZES,
    REG_ID_BITS,
};
use crate::layout::{Layout, LayoutCompiler};
use crate::names::{domain_var, inst_name_var, inst_operands_var, inst_params_var, Names};
use crate::operand::{Access, BitRange, Operand, OperandType};
use crate::routines::{Routine, RoutineTranslator};
use crate::srcgen::Formatter;
use crate::translator::{pref_func_to_c, InstTranslator, Shared, TranslatedInst};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    InstFuncs,
    PrefFuncs,
    PermutationTables,
    CalledFuncs,
    Insts,
    InstOperands,
    InstMnems,
    InstParams,
    ParamsTypeDecl,
    ParamsAccessors,
    ParamDomains,
    Enums,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::InstFuncs => "inst_funcs",
            Phase::PrefFuncs => "pref_funcs",
            Phase::PermutationTables => "permutation_tables",
            Phase::CalledFuncs => "called_funcs",
            Phase::Insts => "insts",
            Phase::InstOperands => "inst_operands",
            Phase::InstMnems => "inst_mnems",
            Phase::InstParams => "inst_params",
            Phase::ParamsTypeDecl => "params_type_decl",
            Phase::ParamsAccessors => "params_accessors",
            Phase::ParamDomains => "param_domains",
            Phase::Enums => "enums",
        }
    }

    /// Output file the block belongs to. Headers are included ahead of the
    /// C files.
    pub fn target(self) -> &'static str {
        match self {
            Phase::ParamsTypeDecl => "params.h",
            Phase::ParamsAccessors => "params.c",
            Phase::Enums => "enums.h",
            _ => "insts.c",
        }
    }
}

type PhaseFn = fn(&mut Unit) -> Result<String>;

const PHASES: &[(Phase, PhaseFn)] = &[
    (Phase::InstFuncs, Unit::inst_funcs),
    (Phase::PrefFuncs, Unit::pref_funcs),
    (Phase::PermutationTables, Unit::permutation_tables),
    (Phase::CalledFuncs, Unit::called_funcs),
    (Phase::Insts, Unit::insts),
    (Phase::InstOperands, Unit::inst_operands),
    (Phase::InstMnems, Unit::inst_mnems),
    (Phase::InstParams, Unit::inst_params),
    (Phase::ParamsTypeDecl, Unit::params_type_decl),
    (Phase::ParamsAccessors, Unit::params_accessors),
    (Phase::ParamDomains, Unit::param_domains),
    (Phase::Enums, Unit::enums),
];

/// Values the surrounding templates interpolate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scalars {
    pub max_params_per_inst: usize,
    pub param_idx_bitsize: u32,
    pub n_domains: usize,
    pub n_insts: usize,
    pub reg_id_bitsize: u32,
    pub params_bits: u32,
    pub basic_params_bits: Option<u32>,
    /// Member counts of the enumerated domains; each needs an `enumN_t`.
    pub enum_domain_sizes: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Artifacts {
    pub blocks: Vec<(Phase, String)>,
    pub files: BTreeMap<String, String>,
    pub scalars: Scalars,
    pub domains: Vec<Domain>,
    pub params_layout: Option<Layout>,
    pub basic_params_layout: Option<Layout>,
}

impl Artifacts {
    pub fn block(&self, phase: Phase) -> Option<&str> {
        self.blocks.iter().find(|(p, _)| *p == phase).map(|(_, text)| text.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }
}

pub struct Unit {
    config: GenConfig,
    names: Names,
    insts: Vec<Instruction>,
    translated: Vec<TranslatedInst>,
    routines: RequestTable<Routine>,
    prefs: RequestTable<Vec<PrefixWrite>>,
    permutations: PermutationTables,
    domains: DomainRegistry,
    bit_masks: BTreeSet<BitRange>,
    layout: Option<Layout>,
    basic_layout: Option<Layout>,
}

fn c_enum<I>(f: &mut Formatter, type_name: &str, members: I)
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    f.block("typedef enum", &format!(" {type_name};"), |f| {
        for (name, value) in members {
            match value {
                Some(v) => f.line(format!("{name} = {v},")),
                None => f.line(format!("{name},")),
            }
        }
    });
    f.empty_line();
}

fn flag(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

fn int_bounds(bits: u8, signed: bool) -> (String, String) {
    if signed {
        (format!("INT{bits}_MIN"), format!("INT{bits}_MAX"))
    } else {
        ("0".to_string(), format!("UINT{bits}_MAX"))
    }
}

fn int_c(v: i64) -> String {
    if v == i64::MIN {
        "INT64_MIN".to_string()
    } else {
        v.to_string()
    }
}

impl Unit {
    pub fn new(config: GenConfig, insts: Vec<Instruction>) -> Unit {
        Unit {
            names: Names::new(&config),
            config,
            insts,
            translated: Vec::new(),
            routines: RequestTable::new(),
            prefs: RequestTable::new(),
            permutations: PermutationTables::new(),
            domains: DomainRegistry::new(),
            bit_masks: BTreeSet::new(),
            layout: None,
            basic_layout: None,
        }
    }

    pub fn from_descs(config: GenConfig, descs: &[InstrDesc]) -> Result<Unit> {
        Ok(Unit::new(config, instructions::load(descs)?))
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.insts
    }

    /// Runs every phase once. Consuming the unit rules out a second run
    /// over already populated tables.
    pub fn translate(mut self) -> Result<Artifacts> {
        let mut blocks = Vec::with_capacity(PHASES.len());
        for &(phase, emit) in PHASES {
            debug!(phase = phase.name(), "emitting block");
            let text = emit(&mut self)?;
            blocks.push((phase, text));
        }

        let mut files: BTreeMap<String, String> = BTreeMap::new();
        for (phase, text) in &blocks {
            files.entry(phase.target().to_string()).or_default().push_str(text);
        }

        let max_params_per_inst = self.translated.iter().map(|t| t.params.len()).max().unwrap_or(0);
        let enum_domain_sizes: BTreeSet<usize> = self
            .domains
            .iter()
            .filter_map(|(_, d)| match d {
                Domain::Enum(values) => Some(values.len()),
                _ => None,
            })
            .collect();
        let scalars = Scalars {
            max_params_per_inst,
            // one extra index encodes "no parameter"
            param_idx_bitsize: bitsize(max_params_per_inst + 1),
            n_domains: self.domains.len(),
            n_insts: self.translated.len(),
            reg_id_bitsize: REG_ID_BITS,
            params_bits: self.layout.as_ref().map_or(0, |l| l.total_bits),
            basic_params_bits: self.basic_layout.as_ref().map(|l| l.total_bits),
            enum_domain_sizes: enum_domain_sizes.into_iter().collect(),
        };
        info!(
            insts = scalars.n_insts,
            domains = scalars.n_domains,
            routines = self.routines.len(),
            pref_funcs = self.prefs.len(),
            "generation finished"
        );

        Ok(Artifacts {
            blocks,
            files,
            scalars,
            domains: self.domains.iter().map(|(_, d)| d.clone()).collect(),
            params_layout: self.layout,
            basic_params_layout: self.basic_layout,
        })
    }

    fn enc_ctx_t(&self) -> String {
        self.names.c_type("enc_ctx")
    }

    fn inst_funcs(&mut self) -> Result<String> {
        let mut body = Formatter::new();
        let mut shared = Shared {
            routines: &mut self.routines,
            prefs: &mut self.prefs,
            permutations: &mut self.permutations,
        };
        let mut translated = Vec::with_capacity(self.insts.len());
        for (consumer, inst) in self.insts.iter().enumerate() {
            let t = InstTranslator::new(&self.names, inst)
                .translate(consumer, &mut shared, &mut body)
                .map_err(|e| e.in_instruction(&inst.name))?;
            translated.push(t);
        }
        self.translated = translated;

        // shared functions are emitted by later phases
        let mut f = Formatter::new();
        let ctx_t = self.enc_ctx_t();
        for (id, _, _) in self.prefs.iter() {
            f.line(format!("static bool {}({ctx_t} *ctx, unsigned order);", self.names.pref_func(id)));
        }
        for (id, routine, _) in self.routines.iter() {
            f.line(format!("static bool {}({ctx_t} *ctx);", self.names.called_func(routine.kind(), id)));
        }
        if !self.prefs.is_empty() || !self.routines.is_empty() {
            f.empty_line();
        }
        Ok(f.finish() + &body.finish())
    }

    fn pref_funcs(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        for (n, perms) in self.permutations.iter() {
            f.line(format!("static const uint8_t {}[{}][{n}];", self.names.permutation_table(n), perms.len()));
        }
        if !self.permutations.is_empty() {
            f.empty_line();
        }
        for (id, key, consumers) in self.prefs.iter() {
            let params = pref_func_to_c(&self.names, id, key, &mut f);
            for &c in consumers {
                self.translated[c].merge_params(&params);
            }
        }
        Ok(f.finish())
    }

    fn permutation_tables(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        for (n, perms) in self.permutations.iter() {
            let head = format!("static const uint8_t {}[{}][{n}] =", self.names.permutation_table(n), perms.len());
            f.block(head, ";", |f| {
                for perm in perms.iter() {
                    let items: Vec<String> = perm.iter().map(usize::to_string).collect();
                    f.line(format!("{{{}}},", items.join(", ")));
                }
            });
            f.empty_line();
        }
        Ok(f.finish())
    }

    fn called_funcs(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        for (id, routine, consumers) in self.routines.iter() {
            let params = RoutineTranslator::new(&self.names).emit(id, routine, &mut f);
            for &c in consumers {
                self.translated[c].merge_params(&params);
            }
        }
        Ok(f.finish())
    }

    fn inst_flags_c(&self, flags: InstFlags) -> String {
        let names: Vec<String> = flags.iter_names().map(|(n, _)| self.names.constant("inst_flag", n)).collect();
        if names.is_empty() {
            "0".to_string()
        } else {
            names.join(" | ")
        }
    }

    fn insts(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        let operand_t = self.names.c_type("operand");
        let param_t = self.names.base_type("inst_param");

        // tables filled in by the following blocks
        for t in &self.translated {
            let name = &t.inst.name;
            if !t.inst.operands.is_empty() {
                f.line(format!("static const {operand_t} {}[{}];", inst_operands_var(name), t.inst.operands.len()));
            }
            if !t.params.is_empty() {
                f.line(format!("static const {param_t} {}[{}];", inst_params_var(name), t.params.len()));
            }
            f.line(format!("static const char {}[{}];", inst_name_var(name), t.inst.mnemonic.len() + 1));
        }
        f.empty_line();

        let insts_var = self.names.func("insts");
        let inst_t = self.names.c_type("inst");
        f.block(format!("static const {inst_t} {insts_var}_[] ="), ";", |f| {
            for t in &self.translated {
                let inst = &t.inst;
                f.block("", ",", |f| {
                    f.line(format!("{},", inst.operands.len()));
                    f.line(format!("{},", self.names.inst_const(&inst.name)));
                    f.line(format!("{},", t.params.len()));
                    f.line(format!("{:#x},", inst.exceptions.bits()));
                    f.line(format!("{},", self.inst_flags_c(inst.flags)));
                    f.line(format!("{:#x}ull,", inst.features.bits()));
                    if t.params.is_empty() {
                        f.line("NULL,");
                    } else {
                        f.line(format!("({param_t} *) {},", inst_params_var(&inst.name)));
                    }
                    f.line(format!("({}) {},", self.names.c_type("enc_func"), self.names.enc_func(&inst.name)));
                    if inst.operands.is_empty() {
                        f.line("NULL,");
                    } else {
                        f.line(format!("({operand_t} *) {},", inst_operands_var(&inst.name)));
                    }
                    f.line(format!("(char *) {}", inst_name_var(&inst.name)));
                });
            }
        });
        f.line(format!("const {inst_t} *{insts_var} = {insts_var}_;"));
        f.empty_line();
        Ok(f.finish())
    }

    fn size_c(names: &Names, size: Option<u16>) -> Result<String> {
        match size {
            None => Ok(names.constant("n_operand_sizes", "")),
            Some(s) if OPERAND_SIZES.contains(&s) => Ok(names.constant("operand_size", &s.to_string())),
            Some(s) => Err(GenError::unhandled("operand size", s)),
        }
    }

    fn operand_to_c(
        names: &Names,
        bit_masks: &mut BTreeSet<BitRange>,
        t: &TranslatedInst,
        op: &Operand,
        f: &mut Formatter,
    ) -> Result<()> {
        let param_idx = match op.parameter {
            Some(p) => t.param_index(p)?,
            None => t.params.len(),
        };
        let reg_type = match op.register_type {
            Some(rt) => names.constant("reg_type", rt.name()),
            None => names.constant("n_reg_types", ""),
        };
        let word_type = match op.word_type1()? {
            Some(w) => names.constant("word_type", w.name()),
            None => names.constant("n_word_types", ""),
        };
        let write_range = op.bit_range(Access::WRITE);
        if let Some(r) = write_range {
            bit_masks.insert(r);
        }
        let value = match (op.op_type, op.register) {
            (OperandType::Imm, _) => op.imm.map_or("255".to_string(), |v| v.to_string()),
            (_, Some(reg)) => names.register_const(reg),
            (_, None) => names.constant("reg", "none"),
        };

        let lines = [
            format!("{},", flag(op.read())),
            format!("{},", flag(op.written())),
            format!("{},", flag(op.undefined())),
            format!("{},", flag(op.conditionally_written())),
            format!("{},", flag(op.implicit)),
            format!("{},", flag(op.mnemonic)),
            format!("{param_idx},"),
            format!("{},", names.constant("operand_type", op.op_type.name())),
            format!("{},", Self::size_c(names, op.size1())?),
            format!("{},", Self::size_c(names, op.size2())?),
            format!("{reg_type},"),
            format!("{word_type},"),
            format!("{},", names.bit_mask(write_range)),
            format!("{{{value}}}"),
        ];
        f.block("", ",", |f| lines.iter().for_each(|l| f.line(l)));
        Ok(())
    }

    fn inst_operands(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        let operand_t = self.names.c_type("operand");
        for t in &self.translated {
            if t.inst.operands.is_empty() {
                continue;
            }
            let head = format!("static const {operand_t} {}[{}] =", inst_operands_var(&t.inst.name), t.inst.operands.len());
            f.try_block(head, ";", |f| {
                for op in &t.inst.operands {
                    Self::operand_to_c(&self.names, &mut self.bit_masks, t, op, f)
                        .map_err(|e| e.in_instruction(&t.inst.name))?;
                }
                Ok::<(), GenError>(())
            })?;
            f.empty_line();
        }
        Ok(f.finish())
    }

    fn inst_mnems(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        for t in &self.translated {
            let inst = &t.inst;
            f.line(format!("static const char {}[{}] = \"{}\";", inst_name_var(&inst.name), inst.mnemonic.len() + 1, inst.mnemonic));
        }
        f.empty_line();
        Ok(f.finish())
    }

    fn domain_c_type(&self, domain: &Domain) -> String {
        match domain {
            Domain::Enum(values) => self.names.base_type(&format!("enum{}", values.len())),
            Domain::Interval { .. } | Domain::Int { .. } => self.names.base_type("interval"),
        }
    }

    fn inst_params(&mut self) -> Result<String> {
        let mut body = Formatter::new();
        let param_t = self.names.base_type("inst_param");
        let domain_t = self.names.base_type("domain");
        let mut used = BTreeSet::new();

        for t in &self.translated {
            if t.params.is_empty() {
                continue;
            }
            let head = format!("static const {param_t} {}[{}] =", inst_params_var(&t.inst.name), t.params.len());
            body.try_block(head, ";", |f| {
                for &p in &t.params {
                    let domain = t.domain(p);
                    let id = self.domains.register(domain).map_err(|e| e.in_instruction(&t.inst.name))?;
                    used.insert(id);
                    let var = domain_var(self.domains.get(id));
                    f.line(format!("{{{}, ({domain_t} *) &{var}}},", self.names.param_const(p, false)));
                }
                Ok::<(), GenError>(())
            })?;
            body.empty_line();
        }

        // domain constants follow in their own block
        let mut f = Formatter::new();
        for id in used {
            let domain = self.domains.get(id);
            f.line(format!("static const {} {};", self.domain_c_type(domain), domain_var(domain)));
        }
        f.empty_line();
        Ok(f.finish() + &body.finish())
    }

    fn params_type_decl(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        let budget = self.config.params_bit_budget;

        let layout = LayoutCompiler::for_params(&Param::ALL, false, budget)?.compile()?;
        layout.to_c(&self.names.c_type("params"), &mut f);
        f.empty_line();
        self.layout = Some(layout);

        if self.config.emit_basic {
            let basic = LayoutCompiler::for_params(&Param::BASIC, true, budget)?.compile()?;
            basic.to_c(&self.names.c_type("basic_params"), &mut f);
            f.empty_line();
            self.basic_layout = Some(basic);
        }
        Ok(f.finish())
    }

    fn params_accessors(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        Accessors::new(&self.names, &Param::ALL, false).to_c(&mut f);
        if self.config.emit_basic {
            Accessors::new(&self.names, &Param::BASIC, true).to_c(&mut f);
            Accessors::to_basic_c(&self.names, &Param::ALL, &Param::BASIC, &mut f);
        }
        Ok(f.finish())
    }

    fn param_domains(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        for (_, domain) in self.domains.iter() {
            let init = match domain {
                Domain::Interval { min, max } => {
                    format!("{{{}, {}, {}}}", self.names.base_constant("domain_type_interval"), int_c(*min), int_c(*max))
                }
                Domain::Int { bits, signed } => {
                    let kind = if *bits == 64 { "domain_type_int64" } else { "domain_type_interval" };
                    let (min, max) = int_bounds(*bits, *signed);
                    format!("{{{}, {min}, {max}}}", self.names.base_constant(kind))
                }
                Domain::Enum(values) => {
                    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                    format!(
                        "{{{}, {}, {{{}}}}}",
                        self.names.base_constant("domain_type_enum"),
                        values.len(),
                        values.join(", ")
                    )
                }
            };
            f.line(format!("static const {} {} = {init};", self.domain_c_type(domain), domain_var(domain)));
        }
        f.empty_line();
        f.line(format!("const uint16_t {} = {};", self.names.base_func("n_domains"), self.domains.len()));
        f.empty_line();
        Ok(f.finish())
    }

    fn enums(&mut self) -> Result<String> {
        let mut f = Formatter::new();
        let n = &self.names;
        let plain = |group: &str, name: &str| -> (String, Option<String>) { (n.constant(group, name), None) };

        c_enum(
            &mut f,
            &n.c_type("inst_id"),
            self.translated
                .iter()
                .map(|t| (n.inst_const(&t.inst.name), None))
                .chain([plain("n_insts", "")]),
        );
        c_enum(
            &mut f,
            &n.c_type("param_id"),
            Param::ALL.iter().map(|&p| (n.param_const(p, false), None)).chain([plain("param", "none")]),
        );
        if self.config.emit_basic {
            c_enum(
                &mut f,
                &n.c_type("basic_param_id"),
                Param::BASIC.iter().map(|&p| (n.param_const(p, true), None)).chain([plain("basic_param", "none")]),
            );
        }
        c_enum(
            &mut f,
            &n.c_type("param_type"),
            ParamType::ALL.iter().map(|t| plain("param_type", t.name())).chain([plain("n_param_types", "")]),
        );
        c_enum(
            &mut f,
            &n.c_type("reg_id"),
            Register::all()
                .map(|r| (n.register_const(r), Some(r.id().to_string())))
                .chain([(n.constant("reg", "none"), Some(Register::COUNT.to_string()))]),
        );
        c_enum(
            &mut f,
            &n.c_type("reg_type"),
            RegisterType::ALL.iter().map(|t| plain("reg_type", t.name())).chain([plain("n_reg_types", "")]),
        );
        c_enum(
            &mut f,
            &n.c_type("operand_type"),
            OperandType::ALL.iter().map(|t| plain("operand_type", t.name())).chain([plain("n_operand_types", "")]),
        );
        c_enum(
            &mut f,
            &n.c_type("operand_size"),
            OPERAND_SIZES
                .iter()
                .map(|s| plain("operand_size", &s.to_string()))
                .chain([plain("n_operand_sizes", "")]),
        );
        c_enum(
            &mut f,
            &n.c_type("word_type"),
            WordType::ALL.iter().map(|w| plain("word_type", w.name())).chain([plain("n_word_types", "")]),
        );
        c_enum(
            &mut f,
            &n.c_type("bit_mask"),
            self.bit_masks.iter().map(|r| (n.bit_mask(Some(*r)), None)).chain([(n.bit_mask(None), None)]),
        );
        c_enum(
            &mut f,
            &n.c_type("feature"),
            Features::all()
                .iter_names()
                .map(|(name, bit)| (n.constant("feature", name), Some(bit.bits().trailing_zeros().to_string()))),
        );
        c_enum(
            &mut f,
            &n.c_type("exception"),
            Exceptions::all()
                .iter_names()
                .map(|(name, bit)| (n.constant("exception", name), Some(bit.bits().trailing_zeros().to_string()))),
        );
        c_enum(
            &mut f,
            &n.c_type("inst_flag"),
            InstFlags::all()
                .iter_names()
                .map(|(name, bit)| (n.constant("inst_flag", name), Some(format!("{:#x}", bit.bits())))),
        );
        Ok(f.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_run_in_dependency_order() {
        let order: Vec<Phase> = PHASES.iter().map(|(p, _)| *p).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(order.first(), Some(&Phase::InstFuncs));
        assert_eq!(order.last(), Some(&Phase::Enums));
    }
}
