//! Logging for qset

pub mod logging;

pub use logging::{init_logging, SlowStage, SlowStageLogger, StageTimer};
