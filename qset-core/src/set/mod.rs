//! Query set model
//!
//! A [`Set`] is a named, ordered list of pipeline [`Query`] stages plus the
//! parameters callers may bind. Sets are stored as plain JSON:
//!
//! ```json
//! {
//!   "name": "station_conditions",
//!   "desc": "Wind at the stations in a region",
//!   "enabled": true,
//!   "params": [{"name": "region", "default": "gulf", "desc": "Region code"}],
//!   "queries": [
//!     {
//!       "name": "list",
//!       "type": "pipeline",
//!       "collection": "stations",
//!       "return": true,
//!       "commands": [{"$match": {"region": "#string:region"}}]
//!     }
//!   ]
//! }
//! ```

pub mod store;

use crate::document::Document;
use crate::template::Bindings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub use store::{MemorySetStore, SetStore, SetStoreError};

/// The only executable query type
pub const PIPELINE: &str = "pipeline";

/// A parameter callers may bind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub desc: String,
}

/// One stage of a set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(rename = "type", default)]
    pub query_type: String,
    pub collection: String,
    /// Save the output for later stages and return it to the caller
    #[serde(rename = "return", default)]
    pub returns: bool,
    #[serde(default)]
    pub commands: Vec<Document>,
}

impl Query {
    pub fn pipeline(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            query_type: PIPELINE.to_string(),
            collection: collection.into(),
            returns: false,
            commands: Vec::new(),
        }
    }

    pub fn returning(mut self) -> Self {
        self.returns = true;
        self
    }

    pub fn command(mut self, command: Document) -> Self {
        self.commands.push(command);
        self
    }

    pub fn is_pipeline(&self) -> bool {
        self.query_type == PIPELINE
    }
}

/// A named query set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Set {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub queries: Vec<Query>,
}

impl Set {
    /// An enabled set with no params or queries
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            enabled: true,
            params: Vec::new(),
            queries: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: default.into(),
            desc: String::new(),
        });
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Param defaults overlaid by the caller's arguments
    pub fn bindings(&self, args: &HashMap<String, String>) -> Bindings {
        let mut vars: Bindings = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect();
        vars.extend(args.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    /// Check the structure of the set. Stage templates are not inspected.
    pub fn validate(&self, max_queries: usize) -> Result<(), SetError> {
        let set = || self.name.clone();

        if self.name.trim().is_empty() {
            return Err(SetError::EmptyName);
        }

        if self.queries.is_empty() {
            return Err(SetError::NoQueries { set: set() });
        }

        if self.queries.len() > max_queries {
            return Err(SetError::TooManyQueries {
                set: set(),
                count: self.queries.len(),
                max: max_queries,
            });
        }

        let mut params = HashSet::new();
        for param in &self.params {
            if param.name.is_empty() {
                return Err(SetError::EmptyParamName { set: set() });
            }
            if !params.insert(param.name.as_str()) {
                return Err(SetError::DuplicateParam {
                    set: set(),
                    param: param.name.clone(),
                });
            }
        }

        let mut names = HashSet::new();
        for (index, query) in self.queries.iter().enumerate() {
            if query.name.is_empty() {
                return Err(SetError::EmptyQueryName { set: set(), index });
            }
            if !names.insert(query.name.as_str()) {
                return Err(SetError::DuplicateQuery {
                    set: set(),
                    query: query.name.clone(),
                });
            }
            if query.collection.is_empty() {
                return Err(SetError::MissingCollection {
                    set: set(),
                    query: query.name.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Structural problems with a set
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SetError {
    #[error("Set name must not be empty")]
    EmptyName,

    #[error("Set {set:?} has no queries")]
    NoQueries { set: String },

    #[error("Set {set:?} has {count} queries (max: {max})")]
    TooManyQueries { set: String, count: usize, max: usize },

    #[error("Set {set:?} has a param with an empty name")]
    EmptyParamName { set: String },

    #[error("Param {param:?} is declared twice in set {set:?}")]
    DuplicateParam { set: String, param: String },

    #[error("Query {index} of set {set:?} has an empty name")]
    EmptyQueryName { set: String, index: usize },

    #[error("Query {query:?} is declared twice in set {set:?}")]
    DuplicateQuery { set: String, query: String },

    #[error("Query {query:?} of set {set:?} has no collection")]
    MissingCollection { set: String, query: String },
}
