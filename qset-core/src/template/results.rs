//! Saved stage results and cross-stage lookups
//!
//! A lookup `#data.<op>:stage.field.path` reads documents saved by an earlier
//! stage of the same execution. `op` is either an index selecting a single
//! document or `*` selecting every document.

use super::error::VariableError;
use crate::document::{Document, Value};
use std::collections::BTreeMap;

/// Which saved documents a lookup reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOp {
    /// Every document, producing an array
    All,
    /// A single document by position
    Index(usize),
}

impl DataOp {
    /// Parse `*` or a non-negative decimal index
    pub fn parse(op: &str) -> Option<Self> {
        if op == "*" {
            return Some(DataOp::All);
        }
        if op.is_empty() || !op.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        op.parse().ok().map(DataOp::Index)
    }
}

/// Documents saved by earlier stages of one execution, keyed by stage name
#[derive(Debug, Clone, Default)]
pub struct ResultIndex {
    results: BTreeMap<String, Vec<Document>>,
}

impl ResultIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the documents of a stage, replacing anything saved under the same name
    pub fn insert(&mut self, stage: impl Into<String>, docs: Vec<Document>) -> Option<Vec<Document>> {
        self.results.insert(stage.into(), docs)
    }

    /// Documents saved for a stage
    pub fn get(&self, stage: &str) -> Option<&[Document]> {
        self.results.get(stage).map(Vec::as_slice)
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.results.contains_key(stage)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Names of the stages with saved results
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<Document>> {
        self.results
    }

    /// Resolve `stage.field.path` against the saved results.
    ///
    /// `DataOp::All` always yields an array, empty when the stage saved no
    /// documents.
    pub fn lookup(&self, op: DataOp, lookup: &str) -> Result<Value, VariableError> {
        let (stage, field) = lookup
            .split_once('.')
            .ok_or_else(|| VariableError::MalformedLookup(lookup.to_string()))?;

        let docs = self
            .results
            .get(stage)
            .ok_or_else(|| VariableError::UnknownStage(stage.to_string()))?;

        match op {
            DataOp::All => docs
                .iter()
                .map(|doc| field_lookup(doc, field))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            DataOp::Index(index) => {
                let doc = docs.get(index).ok_or_else(|| VariableError::IndexOutOfRange {
                    stage: stage.to_string(),
                    index,
                    len: docs.len(),
                })?;
                field_lookup(doc, field)
            }
        }
    }
}

impl From<BTreeMap<String, Vec<Document>>> for ResultIndex {
    fn from(results: BTreeMap<String, Vec<Document>>) -> Self {
        Self { results }
    }
}

/// Walk a dotted field path into a document and clone the value found
pub fn field_lookup(doc: &Document, field: &str) -> Result<Value, VariableError> {
    let mut parts = field.split('.');
    let first = parts.next().unwrap_or_default();

    let mut current = doc
        .get(first)
        .ok_or_else(|| VariableError::FieldNotFound(first.to_string()))?;
    let mut walked = first.to_string();

    for part in parts {
        let obj = match current {
            Value::Object(obj) => obj,
            other => {
                return Err(VariableError::NotADocument {
                    field: walked,
                    found: other.type_name(),
                })
            }
        };

        walked.push('.');
        walked.push_str(part);

        current = obj
            .get(part)
            .ok_or_else(|| VariableError::FieldNotFound(walked.clone()))?;
    }

    Ok(current.clone())
}
