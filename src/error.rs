use thiserror::Error;

/// Every failure aborts the whole generation run; a partial artifact would
/// carry dangling references.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("malformed spec `{spec}`: {reason}")]
    MalformedSpec { spec: String, reason: String },
    #[error("unrecognized operand syntax `{name}`")]
    UnrecognizedOperandSyntax { name: String },
    #[error("unknown implicit register `{name}`")]
    UnknownImplicitRegister { name: String },
    #[error("unknown field kind `{name}`")]
    UnknownFieldKind { name: String },
    #[error("enumerated domain has {len} members, at most {max} allowed")]
    DomainTooLarge { len: usize, max: usize },
    #[error("parameter `{param}` not found in {params:?}")]
    ParameterNotFound { param: String, params: Vec<String> },
    #[error("unhandled {what}: {value}")]
    UnhandledVariant { what: &'static str, value: String },
    #[error("field set needs {bits} bits, budget is {budget}")]
    FieldSetTooWide { bits: u32, budget: u32 },
    #[error("unknown {kind} `{name}`")]
    UnknownFlag { kind: &'static str, name: String },
    #[error("duplicate instruction `{name}`")]
    DuplicateInstruction { name: String },
    #[error("instruction `{name}`: {source}")]
    InInstruction {
        name: String,
        #[source]
        source: Box<GenError>,
    },
}

impl GenError {
    pub(crate) fn malformed(spec: &str, reason: impl Into<String>) -> Self {
        GenError::MalformedSpec { spec: spec.to_string(), reason: reason.into() }
    }

    pub(crate) fn unhandled(what: &'static str, value: impl ToString) -> Self {
        GenError::UnhandledVariant { what, value: value.to_string() }
    }

    pub(crate) fn in_instruction(self, name: &str) -> Self {
        match self {
            e @ GenError::InInstruction { .. } => e,
            e => GenError::InInstruction { name: name.to_string(), source: Box::new(e) },
        }
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
