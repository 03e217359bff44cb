use serde::{Deserialize, Serialize};

use crate::model::{ForecastMethod, ModelId};

/// Stable, serializable error kind recorded on failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IncompleteAssumptions,
    InvalidHorizon,
    InvalidParameter,
    InvalidOverridePath,
    BaselineModelNotFound,
    InvalidTrialCount,
    InvalidDistribution,
    InsufficientValidTrials,
    InsufficientHistory,
    Timeout,
    Cancelled,
    StoreUnavailable,
    Repository,
    InternalComputationError,
}

impl ErrorKind {
    /// Only timeouts and transient store failures may be retried; everything else is a
    /// deterministic validation failure that would fail again.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::StoreUnavailable)
    }
}

/// Errors raised by the computation engines and the orchestrator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("incomplete assumptions: missing {}", .missing.join(", "))]
    IncompleteAssumptions { missing: Vec<String> },

    #[error("invalid horizon {0}: must be at least one month")]
    InvalidHorizon(u32),

    #[error("invalid value {value} for {path}: {reason}")]
    InvalidParameter {
        path: String,
        value: f64,
        reason: &'static str,
    },

    #[error("invalid override path: {0}")]
    InvalidOverridePath(String),

    #[error("baseline model not found: {0}")]
    BaselineModelNotFound(ModelId),

    /// `max` is the caller's ceiling, when one applies
    #[error(
        "invalid trial count {requested}{}",
        .max.map(|m| format!(" (allowed 1..={m})")).unwrap_or_default()
    )]
    InvalidTrialCount { requested: usize, max: Option<usize> },

    #[error("invalid distribution for {path}: {reason}")]
    InvalidDistribution { path: String, reason: String },

    #[error("only {valid} of {total} trials produced a valid projection")]
    InsufficientValidTrials { valid: usize, total: usize },

    #[error("insufficient history for {method}: need {required} points, have {actual}")]
    InsufficientHistory {
        method: ForecastMethod,
        required: usize,
        actual: usize,
    },

    #[error("job exceeded its time limit of {0:?}")]
    Timeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("assumption store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("internal computation error: {0}")]
    InternalComputationError(String),
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::IncompleteAssumptions { .. } => ErrorKind::IncompleteAssumptions,
            EngineError::InvalidHorizon(_) => ErrorKind::InvalidHorizon,
            EngineError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            EngineError::InvalidOverridePath(_) => ErrorKind::InvalidOverridePath,
            EngineError::BaselineModelNotFound(_) => ErrorKind::BaselineModelNotFound,
            EngineError::InvalidTrialCount { .. } => ErrorKind::InvalidTrialCount,
            EngineError::InvalidDistribution { .. } => ErrorKind::InvalidDistribution,
            EngineError::InsufficientValidTrials { .. } => ErrorKind::InsufficientValidTrials,
            EngineError::InsufficientHistory { .. } => ErrorKind::InsufficientHistory,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            EngineError::Repository(_) => ErrorKind::Repository,
            EngineError::InternalComputationError(_) => ErrorKind::InternalComputationError,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Error record persisted on a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for JobError {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors from assumption store lookups
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    #[error("no historical series {metric} for model {model_id}")]
    SeriesNotFound { model_id: ModelId, metric: String },

    #[error("invalid model data: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ModelNotFound(id) => EngineError::BaselineModelNotFound(id),
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::SeriesNotFound { .. } | StoreError::Invalid(_) => {
                EngineError::IncompleteAssumptions {
                    missing: vec![err.to_string()],
                }
            }
        }
    }
}

/// Errors from job repositories
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("duplicate job id: {0}")]
    Duplicate(String),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("mutex lock error")]
    LockError,
}

impl<T> From<std::sync::PoisonError<T>> for RepoError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        RepoError::LockError
    }
}

impl From<RepoError> for EngineError {
    fn from(err: RepoError) -> Self {
        EngineError::Repository(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
