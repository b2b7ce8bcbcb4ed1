//! Result type aliases for Taskline.

use crate::TasklineError;

/// A specialized `Result` type for Taskline operations.
pub type TasklineResult<T> = Result<T, TasklineError>;
