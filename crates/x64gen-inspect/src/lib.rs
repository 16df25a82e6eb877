pub mod load;
pub mod report;

pub use load::{load_config, load_table};
pub use report::{domains_text, layout_text, operands_text, DomainOut, OperandOut};
