//! Shared encoding routines called from the per-instruction functions.
//!
//! A routine is identified by its structural key; every instruction whose
//! encoding needs the same REX, VEX or ModRM/SIB logic calls one emitted
//! function.

use std::collections::BTreeSet;

use crate::encoding::{VexL, VexPrefix, VexW};
use crate::isa::x64::Param;
use crate::names::Names;
use crate::srcgen::Formatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegField {
    Param(Param),
    Digit(u8),
}

/// Where the B/X extension bits and the ModRM rm field come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RmSource {
    /// Register-direct form through this parameter.
    pub reg: Option<Param>,
    /// Memory form through base/index/scale/disp.
    pub mem: bool,
    /// Memory form requires a vector index register.
    pub vsib: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Routine {
    Rex { w: bool, reg: Option<Param>, rm: RmSource },
    Vex { vex: VexPrefix, reg: Option<Param>, rm: RmSource, vvvv: Option<Param> },
    ModRmSib { reg: RegField, rm: RmSource },
}

impl Routine {
    pub fn kind(&self) -> &'static str {
        match self {
            Routine::Rex { .. } => "rex",
            Routine::Vex { .. } => "vex",
            Routine::ModRmSib { .. } => "modrm_sib",
        }
    }
}

/// Parameter expressions handed out while emitting a body; every parameter
/// touched is remembered.
#[derive(Debug, Default)]
pub struct ParamRefs {
    used: BTreeSet<Param>,
}

impl ParamRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, p: Param) -> String {
        self.used.insert(p);
        format!("ctx->params.{p}")
    }

    pub fn is_set(&mut self, p: Param) -> String {
        self.used.insert(p);
        if p.undefinedable() {
            format!("ctx->params.{p}_set")
        } else {
            "true".to_string()
        }
    }

    pub fn get_or(&mut self, p: Param, default: i64) -> String {
        if p.undefinedable() {
            let set = self.is_set(p);
            format!("({set} ? {} : {default})", self.get(p))
        } else {
            self.get(p)
        }
    }

    pub fn mark(&mut self, p: Param) {
        self.used.insert(p);
    }

    pub fn into_params(self) -> BTreeSet<Param> {
        self.used
    }
}

pub struct RoutineTranslator<'a> {
    names: &'a Names,
    refs: ParamRefs,
}

impl<'a> RoutineTranslator<'a> {
    pub fn new(names: &'a Names) -> Self {
        Self { names, refs: ParamRefs::new() }
    }

    /// Emits the routine body and returns the parameters it reads.
    pub fn emit(mut self, id: usize, routine: &Routine, f: &mut Formatter) -> BTreeSet<Param> {
        let head = format!("static bool {}({} *ctx)", self.names.called_func(routine.kind(), id), self.names.c_type("enc_ctx"));
        f.block(head, "", |f| {
            match *routine {
                Routine::Rex { w, reg, rm } => self.rex(w, reg, rm, f),
                Routine::Vex { vex, reg, rm, vvvv } => self.vex(vex, reg, rm, vvvv, f),
                Routine::ModRmSib { reg, rm } => self.modrm_sib(reg, rm, f),
            }
            f.line("return true;");
        });
        f.empty_line();
        self.refs.into_params()
    }

    fn write(&self, bits: u8, expr: &str) -> String {
        format!("{}(ctx, {expr});", self.names.write_func(bits))
    }

    fn memory_form(&mut self) -> String {
        let base = self.refs.is_set(Param::RegBase);
        let index = self.refs.is_set(Param::RegIndex);
        format!("{base} || {index}")
    }

    /// Declares `x` and `b` holding the high bits of the index and rm/base.
    fn ext_bits(&mut self, rm: RmSource, f: &mut Formatter) {
        f.line("unsigned x = 0;");
        f.line("unsigned b = 0;");
        let mem_lines = |this: &mut Self, f: &mut Formatter| {
            let index_set = this.refs.is_set(Param::RegIndex);
            let index = this.refs.get(Param::RegIndex);
            f.block(format!("if({index_set})"), "", |f| f.line(format!("x = ({index} >> 3) & 1;")));
            let base_set = this.refs.is_set(Param::RegBase);
            let base = this.refs.get(Param::RegBase);
            f.block(format!("if({base_set})"), "", |f| f.line(format!("b = ({base} >> 3) & 1;")));
        };
        match (rm.reg, rm.mem) {
            (Some(p), true) => {
                let cond = self.memory_form();
                let reg = self.refs.get(p);
                f.line(format!("if({cond}) {{"));
                f.indent(|f| mem_lines(self, f));
                f.line("} else {");
                f.indent(|f| f.line(format!("b = ({reg} >> 3) & 1;")));
                f.line("}");
            }
            (Some(p), false) => {
                let reg = self.refs.get(p);
                f.line(format!("b = ({reg} >> 3) & 1;"));
            }
            (None, true) => mem_lines(self, f),
            (None, false) => {}
        }
    }

    fn reg_bit(&mut self, reg: Option<Param>) -> String {
        match reg {
            Some(p) => format!("({} >> 3) & 1", self.refs.get(p)),
            None => "0".to_string(),
        }
    }

    fn rex(&mut self, w: bool, reg: Option<Param>, rm: RmSource, f: &mut Formatter) {
        f.line(format!("unsigned w = {};", u8::from(w)));
        let r = self.reg_bit(reg);
        f.line(format!("unsigned r = {r};"));
        self.ext_bits(rm, f);
        let force = self.refs.get(Param::ForceRex);
        let write = self.write(8, "0x40 | (w << 3) | (r << 2) | (x << 1) | b");
        f.block(format!("if(w || r || x || b || {force})"), "", |f| f.line(write));
    }

    fn vex(&mut self, vex: VexPrefix, reg: Option<Param>, rm: RmSource, vvvv: Option<Param>, f: &mut Formatter) {
        let r = self.reg_bit(reg);
        f.line(format!("unsigned r = {r};"));
        self.ext_bits(rm, f);
        let w = match vex.w {
            VexW::W0 => "0".to_string(),
            VexW::W1 => "1".to_string(),
            VexW::Ignored => self.refs.get(Param::RexW),
        };
        let l = match vex.l {
            VexL::L128 => "0".to_string(),
            VexL::L256 => "1".to_string(),
            VexL::Ignored => self.refs.get(Param::VexL),
        };
        let vvvv = match vvvv {
            Some(p) => format!("{} & 0xf", self.refs.get(p)),
            None => "0".to_string(),
        };
        f.line(format!("unsigned w = {w};"));
        f.line(format!("unsigned l = {l};"));
        f.line(format!("unsigned vvvv = {vvvv};"));

        let pp = vex.pp;
        let map = vex.map;
        let long = [
            self.write(8, "0xC4"),
            self.write(8, &format!("((r ^ 1) << 7) | ((x ^ 1) << 6) | ((b ^ 1) << 5) | {map}")),
            self.write(8, &format!("(w << 7) | ((~vvvv & 0xf) << 3) | (l << 2) | {pp}")),
        ];
        // the two byte form only covers map 0F with W0
        if map == 1 && vex.w != VexW::W1 {
            let force = self.refs.get(Param::ForceLongVex);
            let short = [
                self.write(8, "0xC5"),
                self.write(8, &format!("((r ^ 1) << 7) | ((~vvvv & 0xf) << 3) | (l << 2) | {pp}")),
            ];
            f.line(format!("if(!{force} && x == 0 && b == 0 && w == 0) {{"));
            f.indent(|f| short.iter().for_each(|l| f.line(l)));
            f.line("} else {");
            f.indent(|f| long.iter().for_each(|l| f.line(l)));
            f.line("}");
        } else {
            long.iter().for_each(|l| f.line(l));
        }
    }

    fn modrm_sib(&mut self, reg: RegField, rm: RmSource, f: &mut Formatter) {
        let reg = match reg {
            RegField::Param(p) => format!("{} & 7", self.refs.get(p)),
            RegField::Digit(d) => d.to_string(),
        };
        f.line(format!("unsigned reg = {reg};"));

        if let Some(p) = rm.reg {
            let direct = format!("0xC0 | (reg << 3) | ({} & 7)", self.refs.get(p));
            let direct = self.write(8, &direct);
            if rm.mem {
                let cond = self.memory_form();
                f.block(format!("if(!({cond}))"), "", |f| {
                    f.line(direct);
                    f.line("return true;");
                });
            } else {
                f.line(direct);
                return;
            }
        }
        if !rm.mem {
            return;
        }

        if rm.vsib {
            let index_set = self.refs.is_set(Param::RegIndex);
            f.block(format!("if(!{index_set})"), "", |f| f.line("return false;"));
        }

        let disp = self.refs.get_or(Param::Disp, 0);
        let base_set = self.refs.is_set(Param::RegBase);
        let base = self.refs.get(Param::RegBase);
        let index_set = self.refs.is_set(Param::RegIndex);
        let index = self.refs.get(Param::RegIndex);
        let scale = self.refs.get_or(Param::Scale, 0);
        let force_disp32 = self.refs.get(Param::ForceDisp32);
        let force_sib = self.refs.get(Param::ForceSib);

        f.line(format!("int32_t disp = {disp};"));
        f.line(format!("unsigned base_set = {base_set};"));
        f.line("unsigned mod;");
        // no base means SIB with base 5 and a bare disp32
        f.line("if(!base_set) {");
        f.indent(|f| f.line("mod = 0;"));
        f.line(format!("}} else if(disp == 0 && ({base} & 7) != 5 && !{force_disp32}) {{"));
        f.indent(|f| f.line("mod = 0;"));
        f.line(format!("}} else if(disp >= -128 && disp <= 127 && !{force_disp32}) {{"));
        f.indent(|f| f.line("mod = 1;"));
        f.line("} else {");
        f.indent(|f| f.line("mod = 2;"));
        f.line("}");

        let sib = [
            format!("unsigned index = {index_set} ? ({index} & 7) : 4;"),
            format!("unsigned base = base_set ? ({base} & 7) : 5;"),
            self.write(8, "(mod << 6) | (reg << 3) | 4"),
            self.write(8, &format!("({scale} << 6) | (index << 3) | base")),
        ];
        let no_sib = self.write(8, &format!("(mod << 6) | (reg << 3) | ({base} & 7)"));
        f.line(format!("if({force_sib} || {index_set} || !base_set || ({base} & 7) == 4) {{"));
        f.indent(|f| sib.iter().for_each(|l| f.line(l)));
        f.line("} else {");
        f.indent(|f| f.line(no_sib));
        f.line("}");

        let disp8 = self.write(8, "(uint8_t) disp");
        let disp32 = self.write(32, "(uint32_t) disp");
        f.line("if(mod == 1) {");
        f.indent(|f| f.line(disp8));
        f.line("} else if(mod == 2 || !base_set) {");
        f.indent(|f| f.line(disp32));
        f.line("}");
    }
}
