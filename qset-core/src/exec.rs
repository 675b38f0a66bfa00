//! Query set execution
//!
//! An [`Engine`] loads a set by name and runs its stages in order. Each stage
//! is substituted into a private copy of its commands, executed against the
//! document store, and, when marked `return`, saved under its name so later
//! stages can read it with `#data.<op>:stage.field`.

use crate::config::ExecutionSettings;
use crate::document::Document;
use crate::monitoring::SlowStageLogger;
use crate::set::{Query, Set, SetError, SetStore, SetStoreError};
use crate::store::{DocumentStore, StoreError};
use crate::template::{Bindings, ResultIndex, Substitution, VariableError};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, trace};

/// Documents of every `return` stage, keyed by stage name
pub type RunResults = BTreeMap<String, Vec<Document>>;

/// Cooperative cancellation, checked before each stage starts
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecState {
    Pending,
    Running { stage: String },
    Completed,
    /// `stage` is None when the set failed before any stage started
    Failed { stage: Option<String> },
    Cancelled { stage: String },
}

impl ExecState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExecState::Completed | ExecState::Failed { .. } | ExecState::Cancelled { .. }
        )
    }
}

/// Execution errors
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Set {0:?} is disabled")]
    SetDisabled(String),

    #[error(transparent)]
    SetStore(#[from] SetStoreError),

    #[error("Invalid set: {0}")]
    InvalidSet(#[from] SetError),

    #[error("Stage {stage:?} has unsupported type {query_type:?}")]
    UnsupportedStageType { stage: String, query_type: String },

    #[error("Execution cancelled before stage {stage:?}")]
    Cancelled { stage: String },

    #[error("Stage {stage:?}: {source}")]
    Substitution {
        stage: String,
        source: VariableError,
    },

    #[error("Stage {stage:?}: {source}")]
    Store { stage: String, source: StoreError },
}

impl ExecError {
    /// Name of the stage the error belongs to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            ExecError::UnsupportedStageType { stage, .. }
            | ExecError::Cancelled { stage }
            | ExecError::Substitution { stage, .. }
            | ExecError::Store { stage, .. } => Some(stage.as_str()),
            _ => None,
        }
    }
}

/// A single run of a set. Owns its bindings and saved results.
pub struct Execution<'s> {
    set: &'s Set,
    vars: Bindings,
    results: ResultIndex,
    state: ExecState,
    max_stages: Option<usize>,
}

impl<'s> Execution<'s> {
    pub fn new(set: &'s Set, args: &HashMap<String, String>) -> Self {
        Self {
            set,
            vars: set.bindings(args),
            results: ResultIndex::new(),
            state: ExecState::Pending,
            max_stages: None,
        }
    }

    /// Validate the set against `max` stages before running it
    pub fn max_stages(mut self, max: usize) -> Self {
        self.max_stages = Some(max);
        self
    }

    pub fn state(&self) -> &ExecState {
        &self.state
    }

    pub fn bindings(&self) -> &Bindings {
        &self.vars
    }

    /// Run every stage in order, stopping at the first failure
    pub fn run<D>(
        &mut self,
        store: &D,
        slow_stages: &SlowStageLogger,
        cancel: &CancelToken,
    ) -> Result<RunResults, ExecError>
    where
        D: DocumentStore + ?Sized,
    {
        let set = self.set;
        if !set.enabled {
            self.state = ExecState::Failed { stage: None };
            return Err(ExecError::SetDisabled(set.name.clone()));
        }

        if let Some(max) = self.max_stages {
            if let Err(err) = set.validate(max) {
                self.state = ExecState::Failed { stage: None };
                return Err(err.into());
            }
        }

        for query in &set.queries {
            if cancel.is_cancelled() {
                self.state = ExecState::Cancelled {
                    stage: query.name.clone(),
                };
                return Err(ExecError::Cancelled {
                    stage: query.name.clone(),
                });
            }

            self.state = ExecState::Running {
                stage: query.name.clone(),
            };

            let docs = match self.exec_query(query, store, slow_stages) {
                Ok(docs) => docs,
                Err(err) => {
                    self.state = ExecState::Failed {
                        stage: Some(query.name.clone()),
                    };
                    return Err(err);
                }
            };

            if query.returns {
                self.results.insert(query.name.as_str(), docs);
            }
        }

        self.state = ExecState::Completed;
        Ok(std::mem::take(&mut self.results).into_inner())
    }

    fn exec_query<D>(
        &self,
        query: &Query,
        store: &D,
        slow_stages: &SlowStageLogger,
    ) -> Result<Vec<Document>, ExecError>
    where
        D: DocumentStore + ?Sized,
    {
        if !query.is_pipeline() {
            return Err(ExecError::UnsupportedStageType {
                stage: query.name.clone(),
                query_type: query.query_type.clone(),
            });
        }

        // The set is shared, substitute into a copy
        let mut commands = query.commands.clone();
        Substitution::new(&self.vars, &self.results)
            .commands(&mut commands)
            .map_err(|source| ExecError::Substitution {
                stage: query.name.clone(),
                source,
            })?;

        trace!(
            stage = %query.name,
            commands = ?commands.iter().map(Document::to_json_value).collect::<Vec<_>>(),
            "substituted stage"
        );

        let timer = slow_stages.start_stage(&self.set.name, &query.name, &query.collection);
        let docs = store
            .execute(&query.collection, &commands)
            .map_err(|source| ExecError::Store {
                stage: query.name.clone(),
                source,
            })?;
        let elapsed = slow_stages.finish_stage(timer);

        debug!(
            stage = %query.name,
            collection = %query.collection,
            returned = docs.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "stage executed"
        );

        Ok(docs)
    }
}

/// Runs query sets from a set store against a document store
pub struct Engine<S, D> {
    sets: S,
    store: D,
    slow_stages: SlowStageLogger,
    max_stages: usize,
}

impl<S: SetStore, D: DocumentStore> Engine<S, D> {
    pub fn new(sets: S, store: D) -> Self {
        Self::with_settings(sets, store, &ExecutionSettings::default())
    }

    pub fn with_settings(sets: S, store: D, settings: &ExecutionSettings) -> Self {
        Self {
            sets,
            store,
            slow_stages: SlowStageLogger::new(Duration::from_millis(
                settings.slow_stage_threshold_ms,
            )),
            max_stages: settings.max_stages,
        }
    }

    pub fn sets(&self) -> &S {
        &self.sets
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn slow_stages(&self) -> &SlowStageLogger {
        &self.slow_stages
    }

    /// Load a set by name and run it
    pub fn run(&self, set_name: &str, args: &HashMap<String, String>) -> Result<RunResults, ExecError> {
        self.run_with_cancel(set_name, args, &CancelToken::new())
    }

    pub fn run_with_cancel(
        &self,
        set_name: &str,
        args: &HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<RunResults, ExecError> {
        let set = self.sets.get_set_by_name(set_name).map_err(|err| {
            error!(set = %set_name, error = %err, "failed to load set");
            ExecError::from(err)
        })?;

        self.exec_set_with_cancel(&set, args, cancel)
    }

    /// Run a set that is already loaded
    pub fn exec_set(&self, set: &Set, args: &HashMap<String, String>) -> Result<RunResults, ExecError> {
        self.exec_set_with_cancel(set, args, &CancelToken::new())
    }

    pub fn exec_set_with_cancel(
        &self,
        set: &Set,
        args: &HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<RunResults, ExecError> {
        let span = info_span!("exec_set", set = %set.name);
        let _enter = span.enter();

        let result = self.exec_checked(set, args, cancel);
        match &result {
            Ok(results) => info!(
                stages = set.queries.len(),
                returned = results.len(),
                "set completed"
            ),
            Err(err) => error!(
                set = %set.name,
                stage = err.stage().unwrap_or("-"),
                error = %err,
                "set failed"
            ),
        }
        result
    }

    fn exec_checked(
        &self,
        set: &Set,
        args: &HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<RunResults, ExecError> {
        info!(stages = set.queries.len(), args = args.len(), "executing set");

        Execution::new(set, args)
            .max_stages(self.max_stages)
            .run(&self.store, &self.slow_stages, cancel)
    }
}
