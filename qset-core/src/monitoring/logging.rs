//! Structured logging with tracing
//!
//! Installs the global subscriber and records stages that run longer than a
//! configured threshold.

use crate::config::{LogFormat, LoggingSettings};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Slow stages kept for reporting
const MAX_SLOW_STAGES: usize = 1000;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.to_string()));

    let writer = match &settings.file_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = Registry::default().with(env_filter);

    let installed = match settings.format {
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true);

            subscriber.with(json_layer).try_init()
        }
        LogFormat::Text => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .compact();

            subscriber.with(fmt_layer).try_init()
        }
    };
    installed.context("Failed to install tracing subscriber")?;

    tracing::debug!(
        level = %settings.level,
        format = ?settings.format,
        "logging initialized"
    );

    Ok(())
}

/// A stage that ran longer than the threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowStage {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub set: String,
    pub stage: String,
    pub collection: String,
}

/// Running stage timer, see [`SlowStageLogger::start_stage`]
pub struct StageTimer {
    start_time: Instant,
    set: String,
    stage: String,
    collection: String,
}

impl StageTimer {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Slow stage logger
#[derive(Debug)]
pub struct SlowStageLogger {
    threshold: Duration,
    stages: RwLock<Vec<SlowStage>>,
}

impl SlowStageLogger {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            stages: RwLock::new(Vec::new()),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn start_stage(&self, set: &str, stage: &str, collection: &str) -> StageTimer {
        StageTimer {
            start_time: Instant::now(),
            set: set.to_string(),
            stage: stage.to_string(),
            collection: collection.to_string(),
        }
    }

    /// Stop the timer, logging the stage if it was slow. Returns the elapsed time.
    pub fn finish_stage(&self, timer: StageTimer) -> Duration {
        let duration = timer.elapsed();
        if duration < self.threshold {
            return duration;
        }

        let slow = SlowStage {
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            set: timer.set,
            stage: timer.stage,
            collection: timer.collection,
        };

        tracing::warn!(
            target: "slow_stage",
            duration_ms = slow.duration_ms,
            set = %slow.set,
            stage = %slow.stage,
            collection = %slow.collection,
            "Slow stage detected"
        );

        let mut stages = self.stages.write();
        stages.push(slow);
        if stages.len() > MAX_SLOW_STAGES {
            let len = stages.len();
            stages.drain(0..len - MAX_SLOW_STAGES);
        }

        duration
    }

    /// Most recent slow stages, newest first
    pub fn get_slow_stages(&self, limit: usize) -> Vec<SlowStage> {
        self.stages.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn clear(&self) {
        self.stages.write().clear();
    }
}

impl Default for SlowStageLogger {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
