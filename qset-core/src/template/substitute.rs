//! Variable substitution
//!
//! Walks a pipeline template and rewrites, in place:
//! - keys containing field variables: `stats.{dimension}.count` becomes
//!   `stats.region.count` when `dimension` is bound to `region`
//! - string values holding value variables: `{"age": "#number:min_age"}`
//!   becomes `{"age": 21}`
//!
//! Key renames for a document are collected while its values are processed
//! and applied once the walk of that document is complete.

use super::error::{ResolveKind, VariableError};
use super::resolve::Command;
use super::results::{DataOp, ResultIndex};
use super::Bindings;
use crate::document::{Document, Value};
use std::collections::BTreeMap;
use tracing::trace;

/// Operators whose operand must be a list of values
pub const MEMBERSHIP_OPERATORS: &[&str] = &["$in", "$nin"];

/// Substitution context for one stage of one execution
pub struct Substitution<'a> {
    vars: &'a Bindings,
    results: &'a ResultIndex,
}

impl<'a> Substitution<'a> {
    pub fn new(vars: &'a Bindings, results: &'a ResultIndex) -> Self {
        Self { vars, results }
    }

    /// Substitute every pipeline stage of a template
    pub fn commands(&self, commands: &mut [Document]) -> Result<(), VariableError> {
        for command in commands.iter_mut() {
            self.document(command)?;
        }
        Ok(())
    }

    /// Substitute a single document
    pub fn document(&self, doc: &mut Document) -> Result<(), VariableError> {
        self.fields(&mut doc.fields)
    }

    fn fields(&self, fields: &mut BTreeMap<String, Value>) -> Result<(), VariableError> {
        let mut renames = Vec::new();

        for (key, value) in fields.iter_mut() {
            if key.contains('{') {
                let renamed = self.rename_key(key)?;
                if renamed != *key {
                    renames.push((key.clone(), renamed));
                }
            }

            self.value(key, value)?;
        }

        if renames.is_empty() {
            return Ok(());
        }

        // Take every renamed field out before inserting any, so a rename onto
        // a key that is itself being renamed away is not a collision.
        let moved: Vec<(String, String, Value)> = renames
            .into_iter()
            .filter_map(|(from, to)| fields.remove(&from).map(|value| (from, to, value)))
            .collect();

        for (from, to, value) in moved {
            if fields.contains_key(&to) {
                return Err(VariableError::FieldVariableCollision { from, to });
            }
            trace!(from = %from, to = %to, "renamed field");
            fields.insert(to, value);
        }

        Ok(())
    }

    /// Replace every `{name}` segment of a dotted key with its binding
    fn rename_key(&self, key: &str) -> Result<String, VariableError> {
        let parts = key
            .split('.')
            .map(|segment| {
                if !segment.starts_with('{') {
                    return Ok(segment);
                }

                if segment.len() < 3 || !segment.ends_with('}') {
                    return Err(VariableError::MalformedFieldVariable {
                        key: key.to_string(),
                        segment: segment.to_string(),
                    });
                }

                let name = &segment[1..segment.len() - 1];
                self.vars
                    .get(name)
                    .map(String::as_str)
                    .ok_or_else(|| VariableError::UnboundFieldVariable {
                        key: key.to_string(),
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parts.join("."))
    }

    fn value(&self, key: &str, value: &mut Value) -> Result<(), VariableError> {
        let resolved = match value {
            Value::Object(fields) => return self.fields(fields),
            Value::Array(items) => return self.array(items),
            Value::String(s) if s.starts_with('#') => self.value_variable(key, s)?,
            _ => return Ok(()),
        };
        *value = resolved;
        Ok(())
    }

    fn array(&self, items: &mut [Value]) -> Result<(), VariableError> {
        for item in items.iter_mut() {
            let resolved = match item {
                Value::Object(fields) => {
                    self.fields(fields)?;
                    continue;
                }
                Value::Array(inner) => {
                    self.array(inner)?;
                    continue;
                }
                Value::String(s) if s.starts_with('#') => self.element_variable(s)?,
                _ => continue,
            };
            *item = resolved;
        }
        Ok(())
    }

    /// Array elements are replaced one for one, so a wildcard has no place there
    fn element_variable(&self, variable: &str) -> Result<Value, VariableError> {
        let (cmd, arg) = split_variable(variable)?;
        let command = Command::parse(cmd)?;
        if command == Command::Data(DataOp::All) {
            return Err(VariableError::AmbiguousExpansion(variable.to_string()));
        }
        self.resolve(command, arg)
    }

    fn value_variable(&self, key: &str, variable: &str) -> Result<Value, VariableError> {
        let (cmd, arg) = split_variable(variable)?;
        let command = Command::parse(cmd)?;

        if MEMBERSHIP_OPERATORS.contains(&key) && !matches!(command, Command::Data(_)) {
            return Err(VariableError::resolution(ResolveKind::Membership, variable));
        }

        self.resolve(command, arg)
    }

    fn resolve(&self, command: Command, arg: &str) -> Result<Value, VariableError> {
        // Unbound arguments are used literally
        let param = self.vars.get(arg).map(String::as_str).unwrap_or(arg);

        let value = match command {
            Command::Data(op) => self.results.lookup(op, param)?,
            other => other.resolve(param)?,
        };

        trace!(?command, param, kind = value.type_name(), "resolved variable");
        Ok(value)
    }
}

/// Split `#command:argument` on the first colon
fn split_variable(variable: &str) -> Result<(&str, &str), VariableError> {
    variable
        .strip_prefix('#')
        .and_then(|rest| rest.split_once(':'))
        .ok_or_else(|| VariableError::MalformedValueVariable(variable.to_string()))
}

/// Substitute a single document with the given bindings and saved results
pub fn process_variables(
    doc: &mut Document,
    vars: &Bindings,
    results: &ResultIndex,
) -> Result<(), VariableError> {
    Substitution::new(vars, results).document(doc)
}
