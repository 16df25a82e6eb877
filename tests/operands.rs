use pretty_assertions::assert_eq;

use x64gen_rs::isa::x64::{Param, Register, RegisterType, Rflags, StatusRegister};
use x64gen_rs::operand::BitRange;
use x64gen_rs::operands::{parse, parse_segments};
use x64gen_rs::{Access, GenError, OperandType};

#[test]
fn implicit_register_takes_no_parameter() {
    let ops = parse("RAX:r").unwrap();
    assert_eq!(ops.len(), 1);
    let rax = &ops[0];
    assert!(rax.implicit);
    assert_eq!(rax.op_type, OperandType::Reg);
    assert_eq!(rax.register, Some(Register::A));
    assert_eq!(rax.register_size, Some(64));
    assert_eq!(rax.parameter, None);
    assert!(rax.read() && !rax.written());
}

#[test]
fn explicit_operands_draw_from_counters() {
    let ops = parse("rm8:rw; imm8:r; imm16:r").unwrap();
    let params: Vec<Option<Param>> = ops.iter().map(|op| op.parameter).collect();
    assert_eq!(params, vec![Some(Param::Reg0), Some(Param::Imm0), Some(Param::Imm1)]);

    let rm = &ops[0];
    assert_eq!(rm.op_type, OperandType::Rm);
    assert_eq!(rm.register_type, Some(RegisterType::Gp));
    assert_eq!(rm.register_size, Some(8));
    assert_eq!(rm.mem_size, Some(8));
    assert_eq!(rm.access, Access::READ | Access::WRITE);
    assert_eq!(ops[2].imm_size, Some(16));
}

#[test]
fn immediates_count_independently() {
    let ops = parse("imm8:r; imm16:r").unwrap();
    assert_eq!(ops[0].parameter, Some(Param::Imm0));
    assert_eq!(ops[1].parameter, Some(Param::Imm1));
    assert_eq!((ops[0].size1(), ops[1].size1()), (Some(8), Some(16)));
}

#[test]
fn counters_restart_per_spec() {
    let a = parse("r32:w; r32:r").unwrap();
    let b = parse("r64:r").unwrap();
    assert_eq!(a[1].parameter, Some(Param::Reg1));
    assert_eq!(b[0].parameter, Some(Param::Reg0));
}

#[test]
fn third_immediate_is_rejected() {
    let err = parse("imm8:r; imm8:r; imm8:r").unwrap_err();
    assert!(matches!(err, GenError::UnhandledVariant { what: "immediate index", .. }), "{err}");
}

#[test]
fn status_bits_coalesce_into_one_operand() {
    let ops = parse("r32:rw; CF:w; ZF:r; TF:w; OF:u").unwrap();
    assert_eq!(ops.len(), 2);
    let flags = &ops[1];
    assert_eq!(flags.op_type, OperandType::Flags);
    assert_eq!(flags.name, "RFLAGS");
    assert!(flags.implicit);
    assert_eq!(flags.read_flags, Rflags::ZF.bits());
    assert_eq!(flags.written_flags, Rflags::CF.bits());
    assert_eq!(flags.undefined_flags, Rflags::OF.bits());
    assert_eq!(flags.access, Access::READ | Access::WRITE | Access::UNDEFINED);
}

#[test]
fn ignored_status_bits_vanish() {
    let ops = parse("xmm1:rw; IM:r; DAZ:r").unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].register_type, Some(RegisterType::Xmm));
}

#[test]
fn status_registers_follow_fixed_order() {
    let ops = parse("PE:w; CF:w").unwrap();
    let names: Vec<&str> = ops.iter().map(|op| op.name.as_str()).collect();
    assert_eq!(names, vec![StatusRegister::Rflags.name(), StatusRegister::Mxcsr.name()]);
}

#[test]
fn whole_status_register_sets_all_bits() {
    let ops = parse("RFLAGS:r; RSP:rw").unwrap();
    assert_eq!(ops[0].op_type, OperandType::Flags);
    assert_eq!(ops[0].read_flags, Rflags::all().bits());
    assert_eq!(ops[0].written_flags, 0);
}

#[test]
fn implicit_memory_and_immediates() {
    let ops = parse("[RBX + AL]:r; 1:r").unwrap();
    assert_eq!(ops[0].op_type, OperandType::Mem);
    assert_eq!(ops[0].register, Some(Register::B));
    assert_eq!(ops[1].op_type, OperandType::Imm);
    assert_eq!(ops[1].imm, Some(1));
    assert_eq!(ops[1].parameter, None);
}

#[test]
fn bit_ranges_attach_to_their_mode() {
    let ops = parse("xmm1:w[0..31]; xmm2/m32:r").unwrap();
    assert_eq!(ops[0].bit_range(Access::WRITE), Some(BitRange { from: 0, to: 31 }));
    assert_eq!(ops[0].bit_range(Access::READ), None);
    assert_eq!(ops[1].size1(), Some(128));
    assert_eq!(ops[1].size2(), Some(32));
}

#[test]
fn vsib_sizes() {
    let ops = parse("xmm1:rw; vm32x32:r; xmm2:rw").unwrap();
    let vsib = &ops[1];
    assert_eq!(vsib.op_type, OperandType::Vsib);
    assert_eq!(vsib.parameter, None);
    assert_eq!(vsib.index_register_size, Some(128));
    assert_eq!(vsib.mem_size, Some(32));
    assert_eq!(ops[2].parameter, Some(Param::Reg1));
}

#[test]
fn special_parameters_are_fixed() {
    let ops = parse("AL:w; moffs8:r").unwrap();
    assert_eq!(ops[1].parameter, Some(Param::Moffs));
    let ops = parse("rel32:r").unwrap();
    assert_eq!(ops[0].parameter, Some(Param::Rel));
    assert_eq!(ops[0].imm_size, Some(32));
}

#[test]
fn empty_segments_are_skipped() {
    let raw = parse_segments(" r32:r ;; imm8:r; ").unwrap();
    let names: Vec<&str> = raw.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["r32", "imm8"]);
    assert!(parse("").unwrap().is_empty());
}

#[test]
fn malformed_segments() {
    for spec in ["RAX r", "rax", ":r", "rm8:rr", "rm8:rx", "xmm1:w[31..0]", "r32:e[0..7]", "r32:ee", "xmm1:w[0..31"] {
        let err = parse(spec).unwrap_err();
        assert!(matches!(err, GenError::MalformedSpec { .. }), "{spec}: {err}");
    }
}

#[test]
fn unknown_names() {
    assert!(matches!(parse("bogus123:r"), Err(GenError::UnrecognizedOperandSyntax { .. })));
    assert!(matches!(parse("r12:r"), Err(GenError::UnrecognizedOperandSyntax { .. })));
    assert!(matches!(parse("FOO:r"), Err(GenError::UnknownImplicitRegister { .. })));
}

#[test]
fn flags_e_and_m() {
    let ops = parse("r32:rem").unwrap();
    assert!(ops[0].encoded);
    assert!(ops[0].mnemonic);
    assert_eq!(ops[0].access, Access::READ);
}

#[test]
fn unclosed_range_does_not_swallow_the_rest() {
    let err = parse("xmm1:w[0..31; xmm2/m32:r").unwrap_err();
    assert_eq!(err, GenError::MalformedSpec { spec: "xmm1:w[0..31".to_string(), reason: "unclosed bit range".to_string() });
}
