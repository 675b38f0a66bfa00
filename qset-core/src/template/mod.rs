//! Query templates
//!
//! A stage template is a list of pipeline documents holding two kinds of
//! placeholders:
//! - field variables, `{name}` as a dot separated segment of a key
//! - value variables, `#command:argument` as a string value
//!
//! [`Substitution`] resolves both against the caller's [`Bindings`] and the
//! [`ResultIndex`] of the running execution.

pub mod error;
pub mod resolve;
pub mod results;
pub mod substitute;

use std::collections::HashMap;

pub use error::{ResolveKind, VariableError};
pub use resolve::Command;
pub use results::{field_lookup, DataOp, ResultIndex};
pub use substitute::{process_variables, Substitution, MEMBERSHIP_OPERATORS};

/// Parameter name to raw string value
pub type Bindings = HashMap<String, String>;
