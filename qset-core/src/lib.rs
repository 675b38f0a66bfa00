//! qset core - parameterized multi-stage query sets
//!
//! This crate provides:
//! - Document and Value types with extended JSON conversion
//! - Template substitution: field variables, typed value variables and
//!   cross-stage lookups into earlier results
//! - The execution engine that runs a set's stages in order
//! - Set and document store interfaces with in-memory implementations
//! - Configuration and logging

pub mod config;
pub mod document;
pub mod exec;
pub mod monitoring;
pub mod set;
pub mod store;
pub mod template;

pub use config::QsetConfig;
pub use document::{Document, DocumentError, ObjectId, Value};
pub use exec::{CancelToken, Engine, ExecError, ExecState, Execution, RunResults};
pub use set::{MemorySetStore, Param, Query, Set, SetError, SetStore, SetStoreError};
pub use store::{DocumentStore, MemoryStore, StoreError};
pub use template::{Bindings, ResultIndex, VariableError};
