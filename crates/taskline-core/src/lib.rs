//! # Taskline Core
//!
//! Error type and logging setup shared by every Taskline crate.
//! The queue itself lives in `taskline-jobs`; this crate only carries what
//! the configuration layer and the worker binary have in common.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_logging, LogFormat, TelemetryConfig};
