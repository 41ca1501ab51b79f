use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Lock failed: {0}")]
    LockFailed(String),

    #[error("Stage execution failed: {0}")]
    StageExecutionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(#[from] codeindex_ir::IndexError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    pub fn git<E: std::fmt::Display>(e: E) -> Self {
        Self::Git(e.to_string())
    }

    /// Category for the retry policy
    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::Git(_) | OrchestratorError::Timeout(_) => ErrorCategory::Transient,
            OrchestratorError::Io(_) => ErrorCategory::Infrastructure,
            OrchestratorError::InvalidStateTransition { .. }
            | OrchestratorError::Config(_)
            | OrchestratorError::JobNotFound(_) => ErrorCategory::Permanent,
            OrchestratorError::LockFailed(_) => ErrorCategory::Transient,
            _ => ErrorCategory::Transient,
        }
    }
}

/// Error category for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Retry automatically (timeouts, connectivity, VCS hiccups)
    Transient,
    /// Don't retry (invalid input, state machine violations)
    Permanent,
    /// Alert ops (disk, OOM)
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
