//! Convenience result type alias for the presence subsystem.

use crate::error::AppError;

/// A specialized `Result` type for presence operations.
pub type AppResult<T> = Result<T, AppError>;
