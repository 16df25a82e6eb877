use pretty_assertions::assert_eq;

use x64gen_rs::instructions::x64_table;
use x64gen_rs::isa::x64::{bitsize, REG_ID_BITS};
use x64gen_rs::{Artifacts, GenConfig, GenError, InstrDesc, Phase, Unit};

fn desc(name: &str, opcode: &str, operands: &str, flags: &[&str]) -> InstrDesc {
    InstrDesc {
        name: name.to_string(),
        mnemonic: name.split('_').next().unwrap_or(name).to_string(),
        opcode: opcode.to_string(),
        operands: operands.to_string(),
        flags: flags.iter().map(|s| s.to_string()).collect(),
        features: Vec::new(),
        exceptions: Vec::new(),
    }
}

fn generate(descs: &[InstrDesc]) -> Artifacts {
    Unit::from_descs(GenConfig::default(), descs).unwrap().translate().unwrap()
}

/// Text from `head` through the next line closing a top-level brace.
fn function<'a>(text: &'a str, head: &str) -> &'a str {
    let start = text.find(head).unwrap_or_else(|| panic!("`{head}` not emitted"));
    let rest = &text[start..];
    let end = rest
        .find("\n}")
        .and_then(|i| rest[i + 1..].find('\n').map(|j| i + j + 2))
        .unwrap_or(rest.len());
    &rest[..end]
}

fn lockable_pair() -> Vec<InstrDesc> {
    vec![
        desc("add_rm32_r32", "01 /r", "r32/m32:rw; r32:r; CF:w; ZF:w", &["lock"]),
        desc("adc_rm32_r32", "11 /r", "r32/m32:rw; r32:r; CF:rw; ZF:w", &["lock"]),
    ]
}

#[test]
fn builtin_table_generates_every_block() {
    let artifacts = generate(&x64_table());
    let phases: Vec<Phase> = artifacts.blocks.iter().map(|(p, _)| *p).collect();
    assert_eq!(phases.len(), 12);
    assert_eq!(phases.first(), Some(&Phase::InstFuncs));
    assert_eq!(phases.last(), Some(&Phase::Enums));

    let names: Vec<&str> = artifacts.files.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["enums.h", "insts.c", "params.c", "params.h"]);
    assert_eq!(artifacts.scalars.n_insts, x64_table().len());
}

#[test]
fn generation_is_deterministic() {
    let a = generate(&x64_table());
    let b = generate(&x64_table());
    assert_eq!(a.files, b.files);
    assert_eq!(a.scalars, b.scalars);
    assert_eq!(a.domains, b.domains);
}

#[test]
fn plain_instruction_needs_no_error_path() {
    let artifacts = generate(&[desc("cpuid", "0F A2", "EAX:rw; ECX:rw; EBX:w; EDX:w", &[])]);
    let funcs = artifacts.block(Phase::InstFuncs).unwrap();
    assert_eq!(
        funcs,
        "static bool asmgen_x64_enc_cpuid(asmgen_x64_enc_ctx_t *ctx) {\n  asmgen_enc_ctx_write8(ctx, 0x0F);\n  asmgen_enc_ctx_write8(ctx, 0xA2);\n  return true;\n}\n\n"
    );
    let insts = artifacts.block(Phase::Insts).unwrap();
    assert!(!insts.contains("params_cpuid"), "{insts}");
}

#[test]
fn register_in_opcode_and_trailing_immediate() {
    let artifacts = generate(&[desc("mov_r32_imm32", "B8+rd id", "r32:w; imm32:r", &[])]);
    let f = function(artifacts.block(Phase::InstFuncs).unwrap(), "static bool asmgen_x64_enc_mov_r32_imm32(");
    assert!(f.contains("if(!asmgen_x64_rex_0(ctx)) {\n    goto error;\n  }"), "{f}");
    assert!(f.contains("asmgen_enc_ctx_write8(ctx, 0xB8 + (ctx->params.reg0 & 7));"), "{f}");
    assert!(f.contains("asmgen_enc_ctx_write32(ctx, (uint32_t) ctx->params.imm0);"), "{f}");
    assert!(f.ends_with("error:\n  return false;\n}\n"), "{f}");
}

#[test]
fn equal_routines_are_emitted_once() {
    let artifacts = generate(&lockable_pair());
    let funcs = artifacts.block(Phase::InstFuncs).unwrap();
    for inst in ["add_rm32_r32", "adc_rm32_r32"] {
        let f = function(funcs, &format!("static bool asmgen_x64_enc_{inst}("));
        for call in ["asmgen_x64_prefs_0(ctx, ", "asmgen_x64_rex_0(ctx)", "asmgen_x64_modrm_sib_1(ctx)"] {
            assert!(f.contains(call), "{inst} misses {call}:\n{f}");
        }
    }

    let called = artifacts.block(Phase::CalledFuncs).unwrap();
    assert_eq!(called.matches("static bool asmgen_x64_rex_").count(), 1);
    assert_eq!(called.matches("static bool asmgen_x64_modrm_sib_").count(), 1);
    let prefs = artifacts.block(Phase::PrefFuncs).unwrap();
    assert_eq!(prefs.matches("static bool asmgen_x64_prefs_").count(), 1);
}

#[test]
fn shared_functions_are_declared_before_use() {
    let artifacts = generate(&lockable_pair());
    let funcs = artifacts.block(Phase::InstFuncs).unwrap();
    assert!(funcs.starts_with(
        "static bool asmgen_x64_prefs_0(asmgen_x64_enc_ctx_t *ctx, unsigned order);\n\
         static bool asmgen_x64_rex_0(asmgen_x64_enc_ctx_t *ctx);\n\
         static bool asmgen_x64_modrm_sib_1(asmgen_x64_enc_ctx_t *ctx);\n\n"
    ));

    let prefs = artifacts.block(Phase::PrefFuncs).unwrap();
    assert!(prefs.starts_with("static const uint8_t asmgen_x64_permutations2[2][2];\n"), "{prefs}");
    let tables = artifacts.block(Phase::PermutationTables).unwrap();
    assert_eq!(tables, "static const uint8_t asmgen_x64_permutations2[2][2] = {\n  {0, 1},\n  {1, 0},\n};\n\n");

    let insts = artifacts.block(Phase::Insts).unwrap();
    assert!(insts.contains("static const asmgen_x64_operand_t operands_add_rm32_r32[3];"), "{insts}");
    assert!(insts.contains("static const char name_adc_rm32_r32[4];"), "{insts}");
}

#[test]
fn routine_parameters_flow_back_into_instructions() {
    let artifacts = generate(&lockable_pair());
    let params = artifacts.block(Phase::InstParams).unwrap();
    let table = function(params, "static const asmgen_inst_param_t params_add_rm32_r32[12] =");
    for p in ["LOCK", "ADDR_SIZE", "LEGACY_PREFIX_ORDER", "REG0", "REG1", "REG_BASE", "REG_INDEX", "SCALE", "DISP", "FORCE_REX", "FORCE_SIB", "FORCE_DISP32"] {
        assert!(table.contains(&format!("{{ASMGEN_X64_PARAM_{p}, ")), "{p} missing:\n{table}");
    }
    let insts = artifacts.block(Phase::Insts).unwrap();
    assert!(insts.contains("static const asmgen_inst_param_t params_add_rm32_r32[12];"), "{insts}");
    assert_eq!(artifacts.scalars.max_params_per_inst, 12);
    assert_eq!(artifacts.scalars.param_idx_bitsize, bitsize(13));
}

#[test]
fn three_prefixes_use_a_six_entry_order() {
    let artifacts = generate(&[desc("add_rm16_imm16", "81 /0 iw", "rm16:rw; imm16:r", &["lock"])]);
    let tables = artifacts.block(Phase::PermutationTables).unwrap();
    assert!(tables.starts_with("static const uint8_t asmgen_x64_permutations3[6][3] = {\n  {0, 1, 2},\n"), "{tables}");
    let pref = function(artifacts.block(Phase::PrefFuncs).unwrap(), "static bool asmgen_x64_prefs_0(");
    assert!(pref.contains("switch(asmgen_x64_permutations3[order][i])"), "{pref}");
    assert!(pref.contains("case 2:\n        asmgen_enc_ctx_write8(ctx, 0x66);"), "{pref}");
    assert!(artifacts.domains.contains(&x64gen_rs::Domain::Interval { min: 0, max: 5 }));
}

#[test]
fn single_prefix_is_written_inline() {
    let artifacts = generate(&[desc("lea_r64_m", "REX.W + 8D /r", "r64:w; m:r", &[])]);
    let f = function(artifacts.block(Phase::InstFuncs).unwrap(), "static bool asmgen_x64_enc_lea_r64_m(");
    assert!(
        f.contains("if(ctx->params.addr_size_set && ctx->params.addr_size == 1) {\n    asmgen_enc_ctx_write8(ctx, 0x67);\n  }"),
        "{f}"
    );
    assert!(artifacts.block(Phase::PrefFuncs).unwrap().trim().is_empty());
}

#[test]
fn domains_are_declared_and_defined() {
    let artifacts = generate(&lockable_pair());
    let params = artifacts.block(Phase::InstParams).unwrap();
    assert!(params.starts_with("static const asmgen_interval_t "), "{params}");
    assert!(params.contains("static const asmgen_interval_t param_domain__0_1;"), "{params}");
    assert!(params.contains("static const asmgen_enum16_t param_domain_enum__0_1_2_3_4_5_6_7_8_9_10_11_12_13_14_15;"));

    let defs = artifacts.block(Phase::ParamDomains).unwrap();
    assert!(defs.contains("static const asmgen_interval_t param_domain__0_1 = {ASMGEN_DOMAIN_TYPE_INTERVAL, 0, 1};"), "{defs}");
    assert!(defs.contains("static const asmgen_interval_t param_domain_int32 = {ASMGEN_DOMAIN_TYPE_INTERVAL, INT32_MIN, INT32_MAX};"), "{defs}");
    let n = artifacts.scalars.n_domains;
    assert_eq!(n, artifacts.domains.len());
    assert!(defs.ends_with(&format!("const uint16_t asmgen_n_domains = {n};\n\n")), "{defs}");
    assert_eq!(artifacts.scalars.enum_domain_sizes, vec![16]);
}

#[test]
fn partial_write_masks_become_enum_members() {
    let artifacts = generate(&[desc("movss_xmm_xmmm32", "F3 0F 10 /r", "xmm1:w[0..31]; xmm2/m32:r", &[])]);
    let ops = artifacts.block(Phase::InstOperands).unwrap();
    assert!(ops.contains("ASMGEN_X64_BIT_MASK_0_31,"), "{ops}");
    let enums = artifacts.file("enums.h").unwrap();
    assert!(enums.contains("  ASMGEN_X64_BIT_MASK_0_31,\n  ASMGEN_X64_BIT_MASK_ALL,\n"), "{enums}");
    let f = function(artifacts.block(Phase::InstFuncs).unwrap(), "static bool asmgen_x64_enc_movss_xmm_xmmm32(");
    assert!(f.contains("asmgen_enc_ctx_write8(ctx, 0xF3);"), "{f}");
}

#[test]
fn scalars_describe_the_struct() {
    let artifacts = generate(&x64_table());
    let s = &artifacts.scalars;
    assert_eq!(s.reg_id_bitsize, REG_ID_BITS);
    assert_eq!(s.params_bits, 164);
    assert_eq!(s.basic_params_bits, Some(60));
    assert_eq!(artifacts.params_layout.as_ref().map(|l| l.total_bits), Some(164));
    let header = artifacts.file("params.h").unwrap();
    assert!(header.contains("} asmgen_x64_params_t;"));
    assert!(header.contains("} asmgen_x64_basic_params_t;"));
    let accessors = artifacts.file("params.c").unwrap();
    assert!(accessors.contains("asmgen_x64_param_to_basic"));
}

#[test]
fn basic_struct_can_be_disabled() {
    let config = GenConfig { emit_basic: false, ..GenConfig::default() };
    let artifacts = Unit::from_descs(config, &lockable_pair()).unwrap().translate().unwrap();
    assert_eq!(artifacts.scalars.basic_params_bits, None);
    assert!(!artifacts.file("params.h").unwrap().contains("basic_params_t"));
    assert!(!artifacts.file("params.c").unwrap().contains("basic"));
    assert!(!artifacts.file("enums.h").unwrap().contains("BASIC_PARAM"));
}

#[test]
fn namespace_prefixes_every_symbol() {
    let config = GenConfig { namespace: "jit".to_string(), ..GenConfig::default() };
    let artifacts = Unit::from_descs(config, &lockable_pair()).unwrap().translate().unwrap();
    let insts = artifacts.file("insts.c").unwrap();
    assert!(insts.contains("static bool jit_x64_enc_add_rm32_r32(jit_x64_enc_ctx_t *ctx) {"));
    assert!(!insts.contains("asmgen"));
    assert!(artifacts.file("enums.h").unwrap().contains("JIT_X64_INST_ADC_RM32_R32,"));
}

#[test]
fn duplicate_identifiers_are_rejected() {
    let descs = vec![desc("add", "00 /r", "r8/m8:rw; r8:r", &[]), desc("ADD", "02 /r", "r8:rw; r8/m8:r", &[])];
    let err = Unit::from_descs(GenConfig::default(), &descs).err().unwrap();
    assert_eq!(err, GenError::DuplicateInstruction { name: "add".to_string() });
}

#[test]
fn errors_name_the_instruction() {
    let err = Unit::from_descs(GenConfig::default(), &[desc("bad", "90", "bogus123:r", &[])]).err().unwrap();
    assert_eq!(
        err,
        GenError::InInstruction {
            name: "bad".to_string(),
            source: Box::new(GenError::UnrecognizedOperandSyntax { name: "bogus123".to_string() }),
        }
    );

    let err = Unit::from_descs(GenConfig::default(), &[desc("nop", "90", "", &["nope"])]).err().unwrap();
    assert!(matches!(&err, GenError::InInstruction { source, .. } if matches!(**source, GenError::UnknownFlag { .. })), "{err}");
}

#[test]
fn too_small_budget_aborts_generation() {
    let config = GenConfig { params_bit_budget: 100, ..GenConfig::default() };
    let err = Unit::from_descs(config, &lockable_pair()).unwrap().translate().unwrap_err();
    assert_eq!(err, GenError::FieldSetTooWide { bits: 164, budget: 100 });
}

#[test]
fn config_reads_partial_json() {
    let config = GenConfig::from_json(r#"{"namespace": "jit"}"#).unwrap();
    assert_eq!(config.namespace, "jit");
    assert_eq!(config.params_bit_budget, GenConfig::default().params_bit_budget);
}

#[test]
fn immediate_widths_without_c_limits_are_rejected() {
    for (operands, width) in [("imm128:r", "128"), ("imm256:r", "256"), ("rel128:r", "128")] {
        let descs = [desc("push_imm", "6A ib", operands, &[])];
        let err = Unit::from_descs(GenConfig::default(), &descs).unwrap().translate().unwrap_err();
        assert_eq!(
            err,
            GenError::InInstruction {
                name: "push_imm".to_string(),
                source: Box::new(GenError::UnhandledVariant { what: "immediate width", value: width.to_string() }),
            },
            "{operands}"
        );
    }
}

#[test]
fn vex_routine_picks_short_or_long_form() {
    let artifacts = generate(&[desc("vaddps_ymm_ymm_ymmm256", "VEX.NDS.256.0F.WIG 58 /r", "ymm1:w; ymm2:r; ymm3/m256:r", &[])]);
    let called = artifacts.block(Phase::CalledFuncs).unwrap();
    let vex = function(called, "static bool asmgen_x64_vex_0(asmgen_x64_enc_ctx_t *ctx) {");
    assert_eq!(
        vex,
        "static bool asmgen_x64_vex_0(asmgen_x64_enc_ctx_t *ctx) {\n\
         \x20 unsigned r = (ctx->params.reg0 >> 3) & 1;\n\
         \x20 unsigned x = 0;\n\
         \x20 unsigned b = 0;\n\
         \x20 if(ctx->params.reg_base_set || ctx->params.reg_index_set) {\n\
         \x20   if(ctx->params.reg_index_set) {\n\
         \x20     x = (ctx->params.reg_index >> 3) & 1;\n\
         \x20   }\n\
         \x20   if(ctx->params.reg_base_set) {\n\
         \x20     b = (ctx->params.reg_base >> 3) & 1;\n\
         \x20   }\n\
         \x20 } else {\n\
         \x20   b = (ctx->params.reg2 >> 3) & 1;\n\
         \x20 }\n\
         \x20 unsigned w = ctx->params.rex_w;\n\
         \x20 unsigned l = 1;\n\
         \x20 unsigned vvvv = ctx->params.reg1 & 0xf;\n\
         \x20 if(!ctx->params.force_long_vex && x == 0 && b == 0 && w == 0) {\n\
         \x20   asmgen_enc_ctx_write8(ctx, 0xC5);\n\
         \x20   asmgen_enc_ctx_write8(ctx, ((r ^ 1) << 7) | ((~vvvv & 0xf) << 3) | (l << 2) | 0);\n\
         \x20 } else {\n\
         \x20   asmgen_enc_ctx_write8(ctx, 0xC4);\n\
         \x20   asmgen_enc_ctx_write8(ctx, ((r ^ 1) << 7) | ((x ^ 1) << 6) | ((b ^ 1) << 5) | 1);\n\
         \x20   asmgen_enc_ctx_write8(ctx, (w << 7) | ((~vvvv & 0xf) << 3) | (l << 2) | 0);\n\
         \x20 }\n\
         \x20 return true;\n\
         }\n"
    );

    let params = artifacts.block(Phase::InstParams).unwrap();
    let table = function(params, "static const asmgen_inst_param_t params_vaddps_ymm_ymm_ymmm256[");
    for p in ["REX_W", "FORCE_LONG_VEX", "REG1"] {
        assert!(table.contains(&format!("{{ASMGEN_X64_PARAM_{p}, ")), "{p} missing:\n{table}");
    }
}

#[test]
fn vsib_form_requires_an_index_register() {
    let artifacts = generate(&[desc("vgatherdps_xmm_vm32x_xmm", "VEX.DDS.128.66.0F38.W0 92 /r", "xmm1:rw; vm32x32:r; xmm2:rw", &[])]);
    let called = artifacts.block(Phase::CalledFuncs).unwrap();

    let vex = function(called, "static bool asmgen_x64_vex_0(asmgen_x64_enc_ctx_t *ctx) {");
    assert!(vex.contains("  if(ctx->params.reg_index_set) {\n    x = (ctx->params.reg_index >> 3) & 1;\n  }\n"), "{vex}");
    assert!(!vex.contains("0xC5"), "map 0F38 has no two byte form:\n{vex}");
    assert!(!vex.contains("force_long_vex"), "{vex}");
    assert!(vex.ends_with(
        "  unsigned vvvv = ctx->params.reg1 & 0xf;\n\
         \x20 asmgen_enc_ctx_write8(ctx, 0xC4);\n\
         \x20 asmgen_enc_ctx_write8(ctx, ((r ^ 1) << 7) | ((x ^ 1) << 6) | ((b ^ 1) << 5) | 2);\n\
         \x20 asmgen_enc_ctx_write8(ctx, (w << 7) | ((~vvvv & 0xf) << 3) | (l << 2) | 1);\n\
         \x20 return true;\n\
         }\n"
    ), "{vex}");

    let modrm = function(called, "static bool asmgen_x64_modrm_sib_1(asmgen_x64_enc_ctx_t *ctx) {");
    assert!(modrm.contains(
        "  unsigned reg = ctx->params.reg0 & 7;\n\
         \x20 if(!ctx->params.reg_index_set) {\n\
         \x20   return false;\n\
         \x20 }\n\
         \x20 int32_t disp = "
    ), "{modrm}");
    assert!(!modrm.contains("0xC0 | "), "vsib has no register-direct form:\n{modrm}");
}

#[test]
fn modrm_routine_chooses_mod_sib_and_displacement() {
    let artifacts = generate(&[desc("add_rm32_r32", "01 /r", "r32/m32:rw; r32:r", &[])]);
    let called = artifacts.block(Phase::CalledFuncs).unwrap();
    let modrm = function(called, "static bool asmgen_x64_modrm_sib_1(asmgen_x64_enc_ctx_t *ctx) {");
    assert_eq!(
        modrm,
        "static bool asmgen_x64_modrm_sib_1(asmgen_x64_enc_ctx_t *ctx) {\n\
         \x20 unsigned reg = ctx->params.reg1 & 7;\n\
         \x20 if(!(ctx->params.reg_base_set || ctx->params.reg_index_set)) {\n\
         \x20   asmgen_enc_ctx_write8(ctx, 0xC0 | (reg << 3) | (ctx->params.reg0 & 7));\n\
         \x20   return true;\n\
         \x20 }\n\
         \x20 int32_t disp = (ctx->params.disp_set ? ctx->params.disp : 0);\n\
         \x20 unsigned base_set = ctx->params.reg_base_set;\n\
         \x20 unsigned mod;\n\
         \x20 if(!base_set) {\n\
         \x20   mod = 0;\n\
         \x20 } else if(disp == 0 && (ctx->params.reg_base & 7) != 5 && !ctx->params.force_disp32) {\n\
         \x20   mod = 0;\n\
         \x20 } else if(disp >= -128 && disp <= 127 && !ctx->params.force_disp32) {\n\
         \x20   mod = 1;\n\
         \x20 } else {\n\
         \x20   mod = 2;\n\
         \x20 }\n\
         \x20 if(ctx->params.force_sib || ctx->params.reg_index_set || !base_set || (ctx->params.reg_base & 7) == 4) {\n\
         \x20   unsigned index = ctx->params.reg_index_set ? (ctx->params.reg_index & 7) : 4;\n\
         \x20   unsigned base = base_set ? (ctx->params.reg_base & 7) : 5;\n\
         \x20   asmgen_enc_ctx_write8(ctx, (mod << 6) | (reg << 3) | 4);\n\
         \x20   asmgen_enc_ctx_write8(ctx, ((ctx->params.scale_set ? ctx->params.scale : 0) << 6) | (index << 3) | base);\n\
         \x20 } else {\n\
         \x20   asmgen_enc_ctx_write8(ctx, (mod << 6) | (reg << 3) | (ctx->params.reg_base & 7));\n\
         \x20 }\n\
         \x20 if(mod == 1) {\n\
         \x20   asmgen_enc_ctx_write8(ctx, (uint8_t) disp);\n\
         \x20 } else if(mod == 2 || !base_set) {\n\
         \x20   asmgen_enc_ctx_write32(ctx, (uint32_t) disp);\n\
         \x20 }\n\
         \x20 return true;\n\
         }\n"
    );

    let rex = function(called, "static bool asmgen_x64_rex_0(asmgen_x64_enc_ctx_t *ctx) {");
    assert!(rex.contains("  unsigned w = 0;\n  unsigned r = (ctx->params.reg1 >> 3) & 1;\n"), "{rex}");
    assert!(
        rex.contains("  if(w || r || x || b || ctx->params.force_rex) {\n    asmgen_enc_ctx_write8(ctx, 0x40 | (w << 3) | (r << 2) | (x << 1) | b);\n  }\n"),
        "{rex}"
    );
}
