pub mod accessors;
pub mod config;
pub mod domain;
pub mod encoding;
pub mod error;
pub mod instructions;
pub mod interner;
pub mod layout;
pub mod names;
pub mod operand;
pub mod operands;
pub mod routines;
pub mod srcgen;
pub mod translator;
pub mod unit;

pub mod isa {
    pub mod x64; // register file, status bits and encodable parameters
}

pub use config::GenConfig;
pub use domain::{Domain, DomainRegistry};
pub use error::{GenError, Result};
pub use instructions::{InstrDesc, Instruction};
pub use operand::{Access, Operand, OperandType};
pub use unit::{Artifacts, Phase, Scalars, Unit};
