//! Errors surfaced by the identity and vitals layer.

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, UserError>;

/// Errors a caller of the core can observe.
///
/// Storage vocabulary never crosses this boundary: store faults are logged
/// and translated into one of these kinds.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user was modified concurrently, fetch it again and retry")]
    Conflict,
    #[error("storage unavailable")]
    StorageUnavailable(#[source] StoreError),
}

impl UserError {
    /// Log an unexpected storage fault and report it as unavailable.
    pub(crate) fn storage(operation: &str, key: &str, err: StoreError) -> Self {
        tracing::error!(
            operation,
            key,
            error = %err,
            "storage operation failed"
        );
        Self::StorageUnavailable(err)
    }

    /// Translate a failed partial update.
    ///
    /// Version mismatches and storage conflicts become [`UserError::Conflict`];
    /// a vanished document becomes `missing`.
    pub(crate) fn patch(
        operation: &str,
        key: &str,
        err: StoreError,
        missing: UserError,
    ) -> Self {
        match err {
            StoreError::PreconditionFailed | StoreError::Conflict => {
                tracing::warn!(operation, key, error = %err, "concurrent update rejected");
                Self::Conflict
            },
            StoreError::NotFound => {
                tracing::warn!(operation, key, "document vanished before update");
                missing
            },
            err => Self::storage(operation, key, err),
        }
    }
}
