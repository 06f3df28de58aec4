use hive_auth::AuthError;
use hive_core::validation::ValidationError;
use hive_core::{CursorError, ReportRejected};
use hive_storage::StorageError;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found")]
    NotFound,
    /// The mutation would not change anything. Callers treat this as a skip.
    #[error("already in the requested state")]
    NoOp,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("gave up after {attempts} attempts with {remaining} keys unprocessed")]
    RetriesExhausted { attempts: u32, remaining: usize },
    #[error("internal error: {0}")]
    Unknown(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Transient failures a caller may retry as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    #[must_use]
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    pub(crate) fn deadline_exceeded() -> Self {
        Self::StoreUnavailable("deadline exceeded".to_owned())
    }
}

impl From<StorageError> for EngineError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::ContentNotFound | StorageError::RecordNotFound => Self::NotFound,
            StorageError::Unavailable | StorageError::Timeout => {
                Self::StoreUnavailable(value.to_string())
            }
            // Only surfaces once the ledger has used up its conflict retries.
            StorageError::VersionConflict => Self::StoreUnavailable(value.to_string()),
            StorageError::ContentReviewed => Self::Unauthorized(value.to_string()),
            StorageError::ContentExists
            | StorageError::BatchTooLarge(_)
            | StorageError::InvalidInput(_) => Self::BadRequest(value.to_string()),
            StorageError::Database(_)
            | StorageError::Migration(_)
            | StorageError::MissingDatabaseUrl => {
                tracing::error!(error = %value, "unexpected store error");
                Self::Unknown(value.to_string())
            }
        }
    }
}

impl From<CursorError> for EngineError {
    fn from(value: CursorError) -> Self {
        Self::BadRequest(format!("invalid cursor: {value}"))
    }
}

impl From<ValidationError> for EngineError {
    fn from(value: ValidationError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl From<ReportRejected> for EngineError {
    fn from(value: ReportRejected) -> Self {
        Self::Unauthorized(value.to_string())
    }
}

impl From<AuthError> for EngineError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::HiveNotFound => Self::NotFound,
            AuthError::NotMember | AuthError::Forbidden(_) => {
                Self::Unauthorized(value.to_string())
            }
            AuthError::Unavailable(_) => Self::StoreUnavailable(value.to_string()),
        }
    }
}
