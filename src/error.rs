//! Error taxonomy per the error-handling contract: two fatal kinds that
//! abort the process (`ConfigError`, `SchemaError`, `InvariantViolation`)
//! and two per-task kinds that a Worker records and returns
//! (`ValidationError`, `ExternalError`). Call sites still reach for
//! `anyhow::Context` for everything in between; this enum only marks the
//! boundary a caller needs to branch on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SonicatError {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("external error: {0}")]
    External(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl SonicatError {
    /// Per-task errors are recorded on the task and retried at the next
    /// `make_tasks` pass; fatal errors propagate out of `main` and exit
    /// the process non-zero.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SonicatError::Config(_) | SonicatError::Schema(_) | SonicatError::InvariantViolation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SonicatError>;
