use thiserror::Error;

/// Failures surfaced by [`crate::storage::Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this `result_id` is already stored. Nothing was written.
    #[error("speedtest result '{result_id}' is already stored")]
    DuplicateKey { result_id: String },

    /// The record carries no `result_id`, so it cannot be keyed.
    #[error("speedtest result has no result_id")]
    MissingResultId,

    /// The storage engine could not be opened, read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}
