//! Pipeline stage definitions and parsing
//!
//! Parses substituted pipeline documents (`{"$match": {...}}`,
//! `{"$sort": {...}}`, ...) into [`Stage`] values the executor runs.

use super::StoreError;
use crate::document::{Document, Value, REGEX_OPTIONS};
use regex::Regex;
use std::collections::BTreeMap;

/// One parsed pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Project(Projection),
    Sort(Sort),
    Skip(usize),
    Limit(usize),
    /// Replace the documents with `{<field>: <count>}`
    Count(String),
}

impl Stage {
    /// Parse a single pipeline document, which must hold exactly one operator
    pub fn parse(doc: &Document) -> Result<Self, StoreError> {
        let mut fields = doc.iter();
        let (name, spec) = match (fields.next(), fields.next()) {
            (Some(field), None) => field,
            _ => {
                return Err(StoreError::InvalidStage(format!(
                    "pipeline stage must have exactly one field, found {}",
                    doc.len()
                )))
            }
        };

        let stage = match name.as_str() {
            "$match" => Stage::Match(Filter::parse(object(name, spec)?)?),
            "$project" => Stage::Project(Projection::parse(object(name, spec)?)?),
            "$sort" => Stage::Sort(Sort::parse(object(name, spec)?)?),
            "$skip" => Stage::Skip(count(name, spec)?),
            "$limit" => Stage::Limit(count(name, spec)?),
            "$count" => {
                let field = spec.as_str().filter(|f| !f.is_empty() && !f.starts_with('$'));
                let field = field.ok_or_else(|| {
                    StoreError::InvalidStage("$count must be a non-empty field name".to_string())
                })?;
                Stage::Count(field.to_string())
            }
            other => return Err(StoreError::UnsupportedStage(other.to_string())),
        };

        Ok(stage)
    }

    /// Parse every document of a pipeline
    pub fn parse_pipeline(pipeline: &[Document]) -> Result<Vec<Self>, StoreError> {
        pipeline.iter().map(Self::parse).collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::Sort(_) => "$sort",
            Stage::Skip(_) => "$skip",
            Stage::Limit(_) => "$limit",
            Stage::Count(_) => "$count",
        }
    }
}

fn object<'a>(stage: &str, spec: &'a Value) -> Result<&'a BTreeMap<String, Value>, StoreError> {
    spec.as_object()
        .ok_or_else(|| StoreError::InvalidStage(format!("{} must be a document", stage)))
}

fn count(stage: &str, spec: &Value) -> Result<usize, StoreError> {
    spec.as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| StoreError::InvalidStage(format!("{} must be a non-negative integer", stage)))
}

/// Filter conditions for `$match`
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every document
    Empty,
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex { field: String, regex: Regex },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Filter::Empty)
    }

    /// Parse a filter document
    pub fn parse(spec: &BTreeMap<String, Value>) -> Result<Self, StoreError> {
        let mut filters = Vec::new();

        for (key, value) in spec {
            let filter = match key.as_str() {
                "$and" => Filter::And(Self::parse_list(key, value)?),
                "$or" => Filter::Or(Self::parse_list(key, value)?),
                "$nor" => Filter::Not(Box::new(Filter::Or(Self::parse_list(key, value)?))),
                "$not" => Filter::Not(Box::new(Self::parse(object(key, value)?)?)),
                op if op.starts_with('$') => {
                    return Err(StoreError::UnsupportedOperator(op.to_string()))
                }
                field => Self::parse_field_condition(field, value)?,
            };
            filters.push(filter);
        }

        Ok(Self::all_of(filters))
    }

    fn parse_list(op: &str, value: &Value) -> Result<Vec<Filter>, StoreError> {
        let items = value
            .as_array()
            .ok_or_else(|| StoreError::InvalidStage(format!("{} must be an array", op)))?;

        items
            .iter()
            .map(|item| Self::parse(object(op, item)?))
            .collect()
    }

    fn all_of(mut filters: Vec<Filter>) -> Self {
        match filters.len() {
            0 => Filter::Empty,
            1 => filters.remove(0),
            _ => Filter::And(filters),
        }
    }

    /// Parse the condition on a single field
    fn parse_field_condition(field: &str, value: &Value) -> Result<Self, StoreError> {
        let ops = match value {
            Value::Regex { pattern, options } => {
                return Ok(Filter::Regex {
                    field: field.to_string(),
                    regex: compile_regex(pattern, options)?,
                })
            }
            Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops,
            // Literal value or embedded document
            other => return Ok(Filter::eq(field, other.clone())),
        };

        let mut filters = Vec::new();

        for (op, val) in ops {
            let field = field.to_string();
            let filter = match op.as_str() {
                "$eq" => Filter::Eq { field, value: val.clone() },
                "$ne" => Filter::Ne { field, value: val.clone() },
                "$gt" => Filter::Gt { field, value: val.clone() },
                "$gte" => Filter::Gte { field, value: val.clone() },
                "$lt" => Filter::Lt { field, value: val.clone() },
                "$lte" => Filter::Lte { field, value: val.clone() },
                "$in" => Filter::In {
                    field,
                    values: Self::operand_list(op, val)?,
                },
                "$nin" => Filter::Nin {
                    field,
                    values: Self::operand_list(op, val)?,
                },
                "$exists" => {
                    let exists = match val {
                        Value::Bool(b) => *b,
                        other => other.as_i64().map(|n| n != 0).ok_or_else(|| {
                            StoreError::InvalidStage("$exists must be a boolean".to_string())
                        })?,
                    };
                    Filter::Exists { field, exists }
                }
                "$regex" => {
                    let options = ops.get("$options").and_then(Value::as_str);
                    let (pattern, inline) = match val {
                        Value::String(pattern) => (pattern.as_str(), ""),
                        Value::Regex { pattern, options } => (pattern.as_str(), options.as_str()),
                        _ => {
                            return Err(StoreError::InvalidStage(
                                "$regex must be a string or a regular expression".to_string(),
                            ))
                        }
                    };
                    Filter::Regex {
                        field,
                        regex: compile_regex(pattern, options.unwrap_or(inline))?,
                    }
                }
                // Read together with $regex
                "$options" if ops.contains_key("$regex") => continue,
                "$not" => Filter::Not(Box::new(Self::parse_field_condition(&field, val)?)),
                other => return Err(StoreError::UnsupportedOperator(other.to_string())),
            };
            filters.push(filter);
        }

        Ok(Self::all_of(filters))
    }

    fn operand_list(op: &str, value: &Value) -> Result<Vec<Value>, StoreError> {
        value
            .as_array()
            .cloned()
            .ok_or_else(|| StoreError::InvalidStage(format!("{} must be an array", op)))
    }
}

/// Compile a pattern with `/pattern/options` style flags
pub fn compile_regex(pattern: &str, options: &str) -> Result<Regex, StoreError> {
    let mut flags = String::new();
    for flag in options.chars() {
        if !REGEX_OPTIONS.contains(flag) {
            return Err(StoreError::InvalidRegex(format!(
                "unsupported option {:?} in /{}/{}",
                flag, pattern, options
            )));
        }
        if !flags.contains(flag) {
            flags.push(flag);
        }
    }

    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };

    Regex::new(&source).map_err(|e| StoreError::InvalidRegex(e.to_string()))
}

/// Projection specification (fields to include/exclude)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub fields: BTreeMap<String, ProjectionType>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), ProjectionType::Include);
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), ProjectionType::Exclude);
        self
    }

    /// Check if this is an inclusion projection
    pub fn is_inclusion(&self) -> bool {
        self.fields.values().any(|t| *t == ProjectionType::Include)
    }

    /// Check if a field should be included
    pub fn should_include(&self, field: &str) -> bool {
        match self.fields.get(field) {
            Some(t) => *t == ProjectionType::Include,
            // `_id` is kept unless excluded explicitly
            None => field == "_id" || !self.is_inclusion(),
        }
    }

    fn parse(spec: &BTreeMap<String, Value>) -> Result<Self, StoreError> {
        let mut projection = Projection::new();

        for (field, val) in spec {
            let include = match val {
                Value::Bool(b) => *b,
                other => match other.as_i64() {
                    Some(0) => false,
                    Some(1) => true,
                    _ => {
                        return Err(StoreError::InvalidStage(
                            "Projection value must be 0, 1, true, or false".to_string(),
                        ))
                    }
                },
            };

            projection = if include {
                projection.include(field.as_str())
            } else {
                projection.exclude(field.as_str())
            };
        }

        let mixed = projection
            .fields
            .iter()
            .any(|(k, v)| k != "_id" && *v == ProjectionType::Exclude);
        if projection.is_inclusion() && mixed {
            return Err(StoreError::InvalidStage(
                "Cannot mix inclusion and exclusion in projection (except _id)".to_string(),
            ));
        }

        Ok(projection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    Include,
    Exclude,
}

/// Sort specification, fields in key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    pub fields: Vec<(String, SortOrder)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.fields.push((field.into(), order));
        self
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.add(field, SortOrder::Ascending)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.add(field, SortOrder::Descending)
    }

    fn parse(spec: &BTreeMap<String, Value>) -> Result<Self, StoreError> {
        let mut sort = Sort::new();

        for (field, val) in spec {
            let order = match (val.as_i64(), val.as_str()) {
                (Some(1), _) | (_, Some("asc" | "ascending")) => SortOrder::Ascending,
                (Some(-1), _) | (_, Some("desc" | "descending")) => SortOrder::Descending,
                _ => {
                    return Err(StoreError::InvalidStage(
                        "Sort value must be 1, -1, 'asc', or 'desc'".to_string(),
                    ))
                }
            };
            sort = sort.add(field.as_str(), order);
        }

        Ok(sort)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stage(json: serde_json::Value) -> Result<Stage, StoreError> {
        Stage::parse(&Document::from_json_value(&json).unwrap())
    }

    fn filter(json: serde_json::Value) -> Filter {
        match stage(json!({ "$match": json })).unwrap() {
            Stage::Match(filter) => filter,
            other => panic!("Expected $match, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_match() {
        assert!(filter(json!({})).is_empty());
    }

    #[test]
    fn test_parse_simple_equality() {
        match filter(json!({"name": "John"})) {
            Filter::Eq { field, value } => {
                assert_eq!(field, "name");
                assert_eq!(value.as_str(), Some("John"));
            }
            other => panic!("Expected Eq filter, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_embedded_document_equality() {
        match filter(json!({"address": {"city": "Paris"}})) {
            Filter::Eq { field, value } => {
                assert_eq!(field, "address");
                assert!(value.is_object());
            }
            other => panic!("Expected Eq filter, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_comparison_operators() {
        match filter(json!({"age": {"$gt": 18}})) {
            Filter::Gt { field, value } => {
                assert_eq!(field, "age");
                assert_eq!(value.as_i64(), Some(18));
            }
            other => panic!("Expected Gt filter, got {:?}", other),
        }

        match filter(json!({"age": {"$gte": 18, "$lte": 65}})) {
            Filter::And(filters) => assert_eq!(filters.len(), 2),
            other => panic!("Expected And filter, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_in_operator() {
        match filter(json!({"status": {"$in": ["active", "pending"]}})) {
            Filter::In { field, values } => {
                assert_eq!(field, "status");
                assert_eq!(values.len(), 2);
            }
            other => panic!("Expected In filter, got {:?}", other),
        }

        assert!(matches!(
            stage(json!({"$match": {"status": {"$in": "active"}}})),
            Err(StoreError::InvalidStage(_))
        ));
    }

    #[test]
    fn test_parse_regex() {
        match filter(json!({"email": {"$regex": "^BILL", "$options": "i"}})) {
            Filter::Regex { field, regex } => {
                assert_eq!(field, "email");
                assert!(regex.is_match("bill@example.com"));
            }
            other => panic!("Expected Regex filter, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_regex_value() {
        let mut doc = Document::new();
        let mut spec = BTreeMap::new();
        spec.insert(
            "name".to_string(),
            Value::Regex {
                pattern: "^co".to_string(),
                options: "i".to_string(),
            },
        );
        doc.insert("$match".to_string(), Value::Object(spec));

        match Stage::parse(&doc).unwrap() {
            Stage::Match(Filter::Regex { regex, .. }) => assert!(regex.is_match("Coral")),
            other => panic!("Expected Regex filter, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_invalid_regex() {
        assert!(matches!(
            stage(json!({"$match": {"name": {"$regex": "("}}})),
            Err(StoreError::InvalidRegex(_))
        ));
        assert!(matches!(
            stage(json!({"$match": {"name": {"$regex": "x", "$options": "q"}}})),
            Err(StoreError::InvalidRegex(_))
        ));
    }

    #[test]
    fn test_parse_logical_operators() {
        match filter(json!({"$and": [{"name": "John"}, {"age": {"$gt": 18}}]})) {
            Filter::And(filters) => assert_eq!(filters.len(), 2),
            other => panic!("Expected And filter, got {:?}", other),
        }
        match filter(json!({"$or": [{"role": "admin"}, {"role": "moderator"}]})) {
            Filter::Or(filters) => assert_eq!(filters.len(), 2),
            other => panic!("Expected Or filter, got {:?}", other),
        }
        match filter(json!({"$not": {"deleted": true}})) {
            Filter::Not(inner) => assert!(matches!(*inner, Filter::Eq { .. })),
            other => panic!("Expected Not filter, got {:?}", other),
        }
        match filter(json!({"age": {"$not": {"$gt": 5}}})) {
            Filter::Not(inner) => assert!(matches!(*inner, Filter::Gt { .. })),
            other => panic!("Expected Not filter, got {:?}", other),
        }
    }

    #[test]
    fn test_implicit_and() {
        match filter(json!({"name": "John", "age": 30})) {
            Filter::And(filters) => assert_eq!(filters.len(), 2),
            other => panic!("Expected implicit And filter, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_operators() {
        assert!(matches!(
            stage(json!({"$match": {"$where": "x"}})),
            Err(StoreError::UnsupportedOperator(op)) if op == "$where"
        ));
        assert!(matches!(
            stage(json!({"$match": {"age": {"$size": 2}}})),
            Err(StoreError::UnsupportedOperator(op)) if op == "$size"
        ));
        assert!(matches!(
            stage(json!({"$group": {"_id": "$name"}})),
            Err(StoreError::UnsupportedStage(op)) if op == "$group"
        ));
    }

    #[test]
    fn test_parse_stage_shape() {
        assert!(matches!(stage(json!({})), Err(StoreError::InvalidStage(_))));
        assert!(matches!(
            stage(json!({"$skip": 1, "$limit": 2})),
            Err(StoreError::InvalidStage(_))
        ));
        assert!(matches!(stage(json!({"$skip": -1})), Err(StoreError::InvalidStage(_))));
        assert!(matches!(stage(json!({"$limit": "5"})), Err(StoreError::InvalidStage(_))));
        assert!(matches!(stage(json!({"$count": ""})), Err(StoreError::InvalidStage(_))));

        assert!(matches!(stage(json!({"$skip": 3})), Ok(Stage::Skip(3))));
        assert!(matches!(stage(json!({"$limit": 5})), Ok(Stage::Limit(5))));
        assert!(matches!(stage(json!({"$count": "total"})), Ok(Stage::Count(f)) if f == "total"));
    }

    #[test]
    fn test_parse_projection() {
        let projection = match stage(json!({"$project": {"name": 1, "age": true}})).unwrap() {
            Stage::Project(p) => p,
            other => panic!("Expected $project, got {:?}", other),
        };
        assert!(projection.is_inclusion());
        assert!(projection.should_include("name"));
        assert!(projection.should_include("_id"));
        assert!(!projection.should_include("email"));

        let projection = match stage(json!({"$project": {"password": 0, "_id": 0}})).unwrap() {
            Stage::Project(p) => p,
            other => panic!("Expected $project, got {:?}", other),
        };
        assert!(!projection.is_inclusion());
        assert!(projection.should_include("name"));
        assert!(!projection.should_include("password"));
        assert!(!projection.should_include("_id"));

        assert!(stage(json!({"$project": {"name": 1, "_id": 0}})).is_ok());
        assert!(matches!(
            stage(json!({"$project": {"name": 1, "age": 0}})),
            Err(StoreError::InvalidStage(_))
        ));
        assert!(matches!(
            stage(json!({"$project": {"name": 2}})),
            Err(StoreError::InvalidStage(_))
        ));
    }

    #[test]
    fn test_parse_sort() {
        let sort = match stage(json!({"$sort": {"name": 1, "age": "desc"}})).unwrap() {
            Stage::Sort(s) => s,
            other => panic!("Expected $sort, got {:?}", other),
        };
        assert_eq!(
            sort,
            Sort::new().desc("age").asc("name")
        );

        assert!(matches!(
            stage(json!({"$sort": {"name": 0}})),
            Err(StoreError::InvalidStage(_))
        ));
    }
}
