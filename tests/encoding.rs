use pretty_assertions::assert_eq;

use x64gen_rs::encoding::{parse_opcode, Cond, ModRmReg, VexL, VexPrefix, VexW};
use x64gen_rs::isa::x64::Param;
use x64gen_rs::GenError;

#[test]
fn legacy_opcode_with_modrm() {
    let op = parse_opcode("66 0F 58 /r").unwrap();
    assert_eq!(op.mandatory_prefixes, vec![0x66]);
    assert_eq!(op.bytes, vec![0x0F, 0x58]);
    assert_eq!(op.modrm, Some(ModRmReg::Reg));
    assert!(!op.rex_w);
    assert!(op.imms.is_empty());
}

#[test]
fn digit_and_immediate() {
    let op = parse_opcode("81 /0 iw").unwrap();
    assert_eq!(op.bytes, vec![0x81]);
    assert_eq!(op.modrm, Some(ModRmReg::Digit(0)));
    assert_eq!(op.imms, vec![16]);

    let op = parse_opcode("C8 iw ib").unwrap();
    assert_eq!(op.imms, vec![16, 8]);
    assert_eq!(op.modrm, None);
}

#[test]
fn plus_register_forms() {
    let joined = parse_opcode("REX.W + B8+rd io").unwrap();
    assert!(joined.rex_w);
    assert!(joined.plus_reg);
    assert_eq!(joined.bytes, vec![0xB8]);
    assert_eq!(joined.imms, vec![64]);

    let split = parse_opcode("B8 +rd id").unwrap();
    assert!(split.plus_reg);
    assert_eq!(split.bytes, vec![0xB8]);
}

#[test]
fn relative_targets() {
    assert_eq!(parse_opcode("E9 cd").unwrap().rel, Some(32));
    assert_eq!(parse_opcode("74 cb").unwrap().rel, Some(8));
}

#[test]
fn prefix_byte_after_rex_is_an_opcode_byte() {
    let op = parse_opcode("REX.W + 66 90").unwrap();
    assert!(op.mandatory_prefixes.is_empty());
    assert_eq!(op.bytes, vec![0x66, 0x90]);
}

#[test]
fn vex_fields() {
    let op = parse_opcode("VEX.NDS.256.0F.WIG 58 /r").unwrap();
    assert_eq!(op.vex, Some(VexPrefix { l: VexL::L256, pp: 0, map: 1, w: VexW::Ignored }));
    let op = parse_opcode("VEX.DDS.128.66.0F38.W0 92 /r").unwrap();
    assert_eq!(op.vex, Some(VexPrefix { l: VexL::L128, pp: 1, map: 2, w: VexW::W0 }));
    let op = parse_opcode("VEX.LIG.F2.0F3A.W1 0B /r ib").unwrap();
    assert_eq!(op.vex, Some(VexPrefix { l: VexL::Ignored, pp: 3, map: 3, w: VexW::W1 }));
}

#[test]
fn malformed_opcodes() {
    for text in [
        "/r",
        "REX.W",
        "REX.W VEX.128.0F 58",
        "F3 VEX.128.0F 58",
        "VEX.128.66 58",
        "VEX.128.0F.W9 58",
        "C8 ib ib ib",
        "ZZ",
        "B8+zz",
        "+rd B8",
    ] {
        let err = parse_opcode(text).unwrap_err();
        assert!(matches!(err, GenError::MalformedSpec { .. }), "{text}: {err}");
    }
}

#[test]
fn prefix_conditions() {
    assert_eq!(Cond::IsSet(Param::Lock).to_c("ctx->params"), "ctx->params.lock");
    assert_eq!(
        Cond::Equals(Param::AddrSize, 1).to_c("ctx->params"),
        "ctx->params.addr_size_set && ctx->params.addr_size == 1"
    );
    assert_eq!(Cond::Always.to_c("p"), "true");
    assert_eq!(Cond::Always.param(), None);
}
