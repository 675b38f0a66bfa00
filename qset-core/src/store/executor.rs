//! Pipeline executor
//!
//! Runs parsed pipeline stages over an in-memory list of documents.

use super::pipeline::{Filter, Projection, Sort, SortOrder, Stage};
use crate::document::{Document, Value};
use std::cmp::Ordering as CmpOrdering;

/// Executes pipelines over owned document lists
#[derive(Debug, Default)]
pub struct PipelineExecutor;

impl PipelineExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run every stage in order
    pub fn execute(&self, mut documents: Vec<Document>, stages: &[Stage]) -> Vec<Document> {
        for stage in stages {
            documents = self.execute_stage(documents, stage);
        }
        documents
    }

    fn execute_stage(&self, mut documents: Vec<Document>, stage: &Stage) -> Vec<Document> {
        match stage {
            Stage::Match(filter) => {
                documents.retain(|doc| self.matches_filter(doc, filter));
                documents
            }
            Stage::Project(projection) => self.apply_projection(documents, projection),
            Stage::Sort(sort) => {
                self.apply_sort(&mut documents, sort);
                documents
            }
            Stage::Skip(skip) => documents.into_iter().skip(*skip).collect(),
            Stage::Limit(limit) => {
                documents.truncate(*limit);
                documents
            }
            Stage::Count(field) => {
                let count = documents.len() as i64;
                vec![Document::new().with(field.as_str(), count)]
            }
        }
    }

    /// Check if a document matches a filter
    pub fn matches_filter(&self, doc: &Document, filter: &Filter) -> bool {
        match filter {
            Filter::Empty => true,

            Filter::Eq { field, value } => doc
                .get_by_path(field)
                .map(|v| any_element(v, |v| values_equal(v, value)))
                .unwrap_or(value.is_null()),

            Filter::Ne { field, value } => !self.matches_filter(
                doc,
                &Filter::Eq {
                    field: field.clone(),
                    value: value.clone(),
                },
            ),

            Filter::Gt { field, value } => self.compare_field(doc, field, value, |o| o.is_gt()),
            Filter::Gte { field, value } => self.compare_field(doc, field, value, |o| o.is_ge()),
            Filter::Lt { field, value } => self.compare_field(doc, field, value, |o| o.is_lt()),
            Filter::Lte { field, value } => self.compare_field(doc, field, value, |o| o.is_le()),

            Filter::In { field, values } => match doc.get_by_path(field) {
                Some(v) => any_element(v, |v| values.iter().any(|candidate| values_equal(v, candidate))),
                None => values.iter().any(Value::is_null),
            },

            Filter::Nin { field, values } => !self.matches_filter(
                doc,
                &Filter::In {
                    field: field.clone(),
                    values: values.clone(),
                },
            ),

            Filter::Exists { field, exists } => doc.get_by_path(field).is_some() == *exists,

            Filter::Regex { field, regex } => doc
                .get_by_path(field)
                .map(|v| any_element(v, |v| v.as_str().is_some_and(|s| regex.is_match(s))))
                .unwrap_or(false),

            Filter::And(filters) => filters.iter().all(|f| self.matches_filter(doc, f)),
            Filter::Or(filters) => filters.iter().any(|f| self.matches_filter(doc, f)),
            Filter::Not(filter) => !self.matches_filter(doc, filter),
        }
    }

    fn compare_field(
        &self,
        doc: &Document,
        field: &str,
        value: &Value,
        accept: impl Fn(CmpOrdering) -> bool,
    ) -> bool {
        doc.get_by_path(field)
            .map(|v| any_element(v, |v| compare_values(v, value).is_some_and(&accept)))
            .unwrap_or(false)
    }

    /// Sort documents by each sort field in turn
    pub fn apply_sort(&self, documents: &mut [Document], sort: &Sort) {
        documents.sort_by(|a, b| {
            for (field, order) in &sort.fields {
                let cmp = match (a.get_by_path(field), b.get_by_path(field)) {
                    (Some(av), Some(bv)) => sort_order(av, bv),
                    (Some(_), None) => CmpOrdering::Greater,
                    (None, Some(_)) => CmpOrdering::Less,
                    (None, None) => CmpOrdering::Equal,
                };

                let cmp = match order {
                    SortOrder::Ascending => cmp,
                    SortOrder::Descending => cmp.reverse(),
                };

                if cmp != CmpOrdering::Equal {
                    return cmp;
                }
            }
            CmpOrdering::Equal
        });
    }

    /// Keep the top level fields the projection selects
    pub fn apply_projection(&self, documents: Vec<Document>, projection: &Projection) -> Vec<Document> {
        documents
            .into_iter()
            .map(|doc| {
                Document::from_fields(
                    doc.into_fields()
                        .into_iter()
                        .filter(|(field, _)| projection.should_include(field))
                        .collect(),
                )
            })
            .collect()
    }
}

/// Apply `pred` to a value, or to each element when the value is an array
fn any_element(value: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => pred(value) || items.iter().any(|item| pred(item)),
        _ => pred(value),
    }
}

/// Compare two values of the same kind. Numbers compare across widths.
pub fn compare_values(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(CmpOrdering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::ObjectId(a), Value::ObjectId(b)) => Some(a.cmp(b)),
        (Value::Float64(_), _) | (_, Value::Float64(_)) if a.is_number() && b.is_number() => {
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        _ if a.is_number() && b.is_number() => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        _ => None,
    }
}

/// Equality with numeric widening, falling back to structural equality
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ord) => ord == CmpOrdering::Equal,
        None => a == b,
    }
}

/// Total order used by `$sort`: values of different kinds order by kind
fn sort_order(a: &Value, b: &Value) -> CmpOrdering {
    compare_values(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Binary(_) => 5,
        Value::ObjectId(_) => 6,
        Value::Bool(_) => 7,
        Value::DateTime(_) => 8,
        Value::Regex { .. } => 9,
    }
}
