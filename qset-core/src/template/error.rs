//! Errors raised while substituting variables into a template

use std::fmt;

/// The resolver that rejected its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    Number,
    Date,
    ObjectId,
    Regex,
    Duration,
    Membership,
}

impl fmt::Display for ResolveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolveKind::Number => "number",
            ResolveKind::Date => "date",
            ResolveKind::ObjectId => "objectId",
            ResolveKind::Regex => "regex",
            ResolveKind::Duration => "duration",
            ResolveKind::Membership => "membership",
        };
        f.write_str(name)
    }
}

/// Substitution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VariableError {
    #[error("Invalid field variable {segment:?} in key {key:?}")]
    MalformedFieldVariable { key: String, segment: String },

    #[error("Field variable {name:?} in key {key:?} is not bound")]
    UnboundFieldVariable { key: String, name: String },

    #[error("Renaming key {from:?} to {to:?} collides with an existing field")]
    FieldVariableCollision { from: String, to: String },

    #[error("Invalid variable format {0:?}, missing ':'")]
    MalformedValueVariable(String),

    #[error("Unknown command {0:?}")]
    UnknownResolverCommand(String),

    #[error("Invalid {kind} value {value:?}")]
    Resolution { kind: ResolveKind, value: String },

    #[error("Invalid lookup {0:?}, expected \"stage.field\"")]
    MalformedLookup(String),

    #[error("Stage {0:?} not found in saved results")]
    UnknownStage(String),

    #[error("Index {index} out of range, stage {stage:?} returned {len} documents")]
    IndexOutOfRange {
        stage: String,
        index: usize,
        len: usize,
    },

    #[error("Field {0:?} not found")]
    FieldNotFound(String),

    #[error("Field {field:?} is a {found} and not a document")]
    NotADocument { field: String, found: &'static str },

    #[error("Wildcard lookup {0:?} cannot be expanded inside an array")]
    AmbiguousExpansion(String),
}

impl VariableError {
    pub(crate) fn resolution(kind: ResolveKind, value: &str) -> Self {
        VariableError::Resolution {
            kind,
            value: value.to_string(),
        }
    }
}
