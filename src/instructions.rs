use bitflags::Flags;
use serde::{Deserialize, Serialize};

use crate::encoding::{parse_opcode, Opcode};
use crate::error::{GenError, Result};
use crate::isa::x64::{Exceptions, Features, InstFlags, RegisterType};
use crate::operand::{Operand, OperandType};
use crate::operands;

/// One row of the instruction table as it appears in the input data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrDesc {
    pub name: String,
    pub mnemonic: String,
    pub opcode: String,
    #[serde(default)]
    pub operands: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub exceptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// C identifier, unique within the table.
    pub name: String,
    pub mnemonic: String,
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub flags: InstFlags,
    pub features: Features,
    pub exceptions: Exceptions,
}

pub fn c_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn parse_bits<F: Flags>(kind: &'static str, names: &[String]) -> Result<F> {
    names.iter().try_fold(F::empty(), |acc, name| {
        let key = name.to_uppercase().replace('.', "_");
        F::from_name(&key)
            .map(|f| acc.union(f))
            .ok_or_else(|| GenError::UnknownFlag { kind, name: name.clone() })
    })
}

impl Instruction {
    pub fn from_desc(desc: &InstrDesc) -> Result<Instruction> {
        let build = || -> Result<Instruction> {
            Ok(Instruction {
                name: c_ident(&desc.name),
                mnemonic: desc.mnemonic.clone(),
                opcode: parse_opcode(&desc.opcode)?,
                operands: operands::parse(&desc.operands)?,
                flags: parse_bits("instruction flag", &desc.flags)?,
                features: parse_bits("feature", &desc.features)?,
                exceptions: parse_bits("exception", &desc.exceptions)?,
            })
        };
        build().map_err(|e| e.in_instruction(&desc.name))
    }

    pub fn lockable(&self) -> bool {
        self.flags.contains(InstFlags::LOCK)
    }

    /// Whether some encoding of this instruction addresses memory through
    /// ModRM.
    pub fn addresses_memory(&self) -> bool {
        self.opcode.modrm.is_some()
            && self
                .operands
                .iter()
                .any(|op| !op.implicit && matches!(op.op_type, OperandType::Rm | OperandType::Mem | OperandType::Vsib))
    }

    /// 16-bit general purpose operands need the 0x66 operand-size prefix.
    pub fn operand_size16(&self) -> bool {
        self.operands.iter().any(|op| {
            op.op_type != OperandType::Mem && op.register_type == Some(RegisterType::Gp) && op.register_size == Some(16)
        })
    }
}

/// Builds instructions from rows; identifiers must be unique.
pub fn load(descs: &[InstrDesc]) -> Result<Vec<Instruction>> {
    let mut insts: Vec<Instruction> = Vec::with_capacity(descs.len());
    for desc in descs {
        let inst = Instruction::from_desc(desc)?;
        if insts.iter().any(|i| i.name == inst.name) {
            return Err(GenError::DuplicateInstruction { name: inst.name });
        }
        insts.push(inst);
    }
    Ok(insts)
}

pub fn load_table_json(text: &str) -> serde_json::Result<Vec<InstrDesc>> {
    serde_json::from_str(text)
}

struct Row {
    name: &'static str,
    mnemonic: &'static str,
    opcode: &'static str,
    operands: &'static str,
    flags: &'static [&'static str],
    features: &'static [&'static str],
    exceptions: &'static [&'static str],
}

const MEM_EXC: &[&str] = &["gp", "ss", "pf", "ac"];
const SSE_EXC: &[&str] = &["gp", "ss", "pf", "ud", "nm", "xm"];

// Built-in subset of the x64 table; one row per encoding shape the generator handles.
const TABLE: &[Row] = &[
    Row { name: "add_rm32_r32", mnemonic: "add", opcode: "01 /r", operands: "r32/m32:rw; r32:r; OF:w; SF:w; ZF:w; AF:w; CF:w; PF:w", flags: &["lock"], features: &[], exceptions: MEM_EXC },
    Row { name: "add_r64_rm64", mnemonic: "add", opcode: "REX.W + 03 /r", operands: "r64:rw; r64/m64:r; OF:w; SF:w; ZF:w; AF:w; CF:w; PF:w", flags: &[], features: &[], exceptions: MEM_EXC },
    Row { name: "add_rm16_imm16", mnemonic: "add", opcode: "81 /0 iw", operands: "rm16:rw; imm16:r; OF:w; SF:w; ZF:w; AF:w; CF:w; PF:w", flags: &["lock"], features: &[], exceptions: MEM_EXC },
    Row { name: "add_rm8_imm8", mnemonic: "add", opcode: "80 /0 ib", operands: "rm8:rw; imm8:r; OF:w; SF:w; ZF:w; AF:w; CF:w; PF:w", flags: &["lock"], features: &[], exceptions: MEM_EXC },
    Row { name: "add_al_imm8", mnemonic: "add", opcode: "04 ib", operands: "AL:rw; imm8:r; OF:w; SF:w; ZF:w; AF:w; CF:w; PF:w", flags: &[], features: &[], exceptions: &[] },
    Row { name: "adc_rm32_r32", mnemonic: "adc", opcode: "11 /r", operands: "r32/m32:rw; r32:r; CF:rw; OF:w; SF:w; ZF:w; AF:w; PF:w", flags: &["lock"], features: &[], exceptions: MEM_EXC },
    Row { name: "mov_r32_imm32", mnemonic: "mov", opcode: "B8+rd id", operands: "r32:w; imm32:r", flags: &[], features: &[], exceptions: &[] },
    Row { name: "mov_r64_imm64", mnemonic: "mov", opcode: "REX.W + B8+rd io", operands: "r64:w; imm64:r", flags: &[], features: &[], exceptions: &[] },
    Row { name: "mov_al_moffs8", mnemonic: "mov", opcode: "A0", operands: "AL:w; moffs8:r", flags: &[], features: &[], exceptions: MEM_EXC },
    Row { name: "jmp_rel32", mnemonic: "jmp", opcode: "E9 cd", operands: "rel32:r; RIP:rw", flags: &["branch"], features: &[], exceptions: &["gp"] },
    Row { name: "jz_rel8", mnemonic: "jz", opcode: "74 cb", operands: "rel8:r; RIP:rw; ZF:r", flags: &["branch"], features: &[], exceptions: &["gp"] },
    Row { name: "shl_rm32_1", mnemonic: "shl", opcode: "D1 /4", operands: "r32/m32:rw; 1:r; CF:w; OF:c; SF:w; ZF:w; PF:w; AF:u", flags: &[], features: &[], exceptions: MEM_EXC },
    Row { name: "enter_imm16_imm8", mnemonic: "enter", opcode: "C8 iw ib", operands: "imm16:r; imm8:r; RSP:rw; RBP:rw", flags: &[], features: &[], exceptions: &["ss", "pf"] },
    Row { name: "addps_xmm_xmmm128", mnemonic: "addps", opcode: "0F 58 /r", operands: "xmm1:rw; xmm2/m128:r; IE:w; DE:w; OE:w; UE:w; PE:w; IM:r", flags: &[], features: &["sse"], exceptions: SSE_EXC },
    Row { name: "addpd_xmm_xmmm128", mnemonic: "addpd", opcode: "66 0F 58 /r", operands: "xmm1:rw; xmm2/m128:r; IE:w; DE:w; OE:w; UE:w; PE:w", flags: &[], features: &["sse2"], exceptions: SSE_EXC },
    Row { name: "movss_xmm_xmmm32", mnemonic: "movss", opcode: "F3 0F 10 /r", operands: "xmm1:w[0..31]; xmm2/m32:r", flags: &[], features: &["sse"], exceptions: SSE_EXC },
    Row { name: "vaddps_ymm_ymm_ymmm256", mnemonic: "vaddps", opcode: "VEX.NDS.256.0F.WIG 58 /r", operands: "ymm1:w; ymm2:r; ymm3/m256:r; IE:w; DE:w; OE:w; UE:w; PE:w", flags: &[], features: &["avx"], exceptions: SSE_EXC },
    Row { name: "vgatherdps_xmm_vm32x_xmm", mnemonic: "vgatherdps", opcode: "VEX.DDS.128.66.0F38.W0 92 /r", operands: "xmm1:rw; vm32x32:r; xmm2:rw", flags: &[], features: &["avx2"], exceptions: &["gp", "ss", "pf", "ud"] },
    Row { name: "lzcnt_r32_rm32", mnemonic: "lzcnt", opcode: "F3 0F BD /r", operands: "r32:w; r32/m32:r; ZF:w; CF:w; OF:u; SF:u; PF:u; AF:u", flags: &[], features: &["lzcnt"], exceptions: MEM_EXC },
    Row { name: "xlat", mnemonic: "xlat", opcode: "D7", operands: "AL:rw; [RBX + AL]:r", flags: &[], features: &[], exceptions: MEM_EXC },
    Row { name: "lea_r64_m", mnemonic: "lea", opcode: "REX.W + 8D /r", operands: "r64:w; m:r", flags: &[], features: &[], exceptions: &["ud"] },
    Row { name: "movs_m64_m64", mnemonic: "movs", opcode: "REX.W + A5", operands: "[RDI]:w; [RSI]:r; RDI:rw; RSI:rw; DF:r", flags: &["rep"], features: &[], exceptions: MEM_EXC },
    Row { name: "pushfq", mnemonic: "pushfq", opcode: "9C", operands: "RFLAGS:r; RSP:rw", flags: &[], features: &[], exceptions: &["ss", "pf", "ac"] },
    Row { name: "cmovz_r64_rm64", mnemonic: "cmovz", opcode: "REX.W + 0F 44 /r", operands: "r64:c; r64/m64:r; ZF:r", flags: &[], features: &["cmov"], exceptions: MEM_EXC },
    Row { name: "cpuid", mnemonic: "cpuid", opcode: "0F A2", operands: "EAX:rw; ECX:rw; EBX:w; EDX:w", flags: &[], features: &[], exceptions: &[] },
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn x64_table() -> Vec<InstrDesc> {
    TABLE
        .iter()
        .map(|r| InstrDesc {
            name: r.name.to_string(),
            mnemonic: r.mnemonic.to_string(),
            opcode: r.opcode.to_string(),
            operands: r.operands.to_string(),
            flags: strings(r.flags),
            features: strings(r.features),
            exceptions: strings(r.exceptions),
        })
        .collect()
}
