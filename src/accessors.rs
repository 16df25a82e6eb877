//! Switch based setters/getters over the packed parameter struct.

use crate::isa::x64::Param;
use crate::names::Names;
use crate::srcgen::Formatter;

/// Emits accessors for one parameter set. `basic` selects the reduced struct
/// and its id enum.
pub struct Accessors<'a> {
    names: &'a Names,
    params: &'a [Param],
    basic: bool,
}

impl<'a> Accessors<'a> {
    pub fn new(names: &'a Names, params: &'a [Param], basic: bool) -> Self {
        Self { names, params, basic }
    }

    fn prefix(&self) -> &'static str {
        if self.basic {
            "basic_"
        } else {
            ""
        }
    }

    fn params_type(&self) -> String {
        self.names.c_type(&format!("{}params", self.prefix()))
    }

    fn id_type(&self) -> String {
        self.names.c_type(&format!("{}param_id", self.prefix()))
    }

    fn func(&self, op: &str) -> String {
        self.names.func(&format!("{}params_{op}", self.prefix()))
    }

    fn switch(&self, f: &mut Formatter, mut case: impl FnMut(&mut Formatter, Param)) {
        f.block("switch(param)", "", |f| {
            for &p in self.params {
                f.line(format!("case {}:", self.names.param_const(p, self.basic)));
                f.indent(|f| case(f, p));
            }
            f.line("default:");
            f.indent(|f| f.line(format!("{}();", self.names.base_func("assert_not_reached"))));
        });
    }

    fn tracks_set(&self, p: Param) -> bool {
        !self.basic && p.undefinedable()
    }

    pub fn to_c(&self, f: &mut Formatter) {
        let params_t = self.params_type();
        let id_t = self.id_type();

        f.block(format!("void {}({params_t} *params, {id_t} param, int64_t param_val)", self.func("set")), "", |f| {
            self.switch(f, |f, p| {
                f.line(format!("params->{p} = param_val;"));
                if self.tracks_set(p) {
                    f.line(format!("params->{p}_set = true;"));
                }
                f.line("break;");
            });
        });
        f.empty_line();

        f.block(format!("int64_t {}(const {params_t} *params, {id_t} param)", self.func("get")), "", |f| {
            self.switch(f, |f, p| f.line(format!("return (int64_t) params->{p};")));
            f.line("return 0;");
        });
        f.empty_line();

        f.block(format!("void {}({params_t} *params, {id_t} param)", self.func("unset")), "", |f| {
            self.switch(f, |f, p| {
                if self.tracks_set(p) {
                    f.line(format!("params->{p}_set = false;"));
                } else {
                    f.line(format!("params->{p} = 0;"));
                }
                f.line("break;");
            });
        });
        f.empty_line();

        let type_t = self.names.c_type("param_type");
        f.block(format!("{type_t} {}({id_t} param)", self.func("get_type")), "", |f| {
            self.switch(f, |f, p| {
                let ty = p.param_type(self.basic);
                f.line(format!("return {};", self.names.constant("param_type", ty.name())));
            });
            f.line(format!("return {};", self.names.constant("n_param_types", "")));
        });
        f.empty_line();

        f.block(format!("const char *{}({id_t} param)", self.func("get_name")), "", |f| {
            self.switch(f, |f, p| f.line(format!("return \"{p}\";")));
            f.line("return NULL;");
        });
        f.empty_line();
    }

    /// Maps full parameter ids onto basic ids; parameters without a basic
    /// counterpart map to `NONE`.
    pub fn to_basic_c(names: &Names, full: &[Param], basic: &[Param], f: &mut Formatter) {
        let basic_t = names.c_type("basic_param_id");
        let none = names.constant("basic_param", "none");
        let head = format!("{basic_t} {}({} param)", names.func("param_to_basic"), names.c_type("param_id"));
        f.block(head, "", |f| {
            f.block("switch(param)", "", |f| {
                for &p in full.iter().filter(|p| basic.contains(p)) {
                    f.line(format!("case {}:", names.param_const(p, false)));
                    f.indent(|f| f.line(format!("return {};", names.param_const(p, true))));
                }
                f.line("default:");
                f.indent(|f| f.line(format!("return {none};")));
            });
        });
        f.empty_line();
    }
}
