pub mod config;
pub mod run;
pub mod set;

pub use config::*;
pub use run::*;
pub use set::*;
