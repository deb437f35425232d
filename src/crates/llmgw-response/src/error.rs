use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResponseError>;

#[derive(Debug, Error)]
pub enum ResponseError {
    /// A cached/pending call identifier points to nothing, usually a
    /// corrupted store.
    #[error("integrity error: call identifier resolved to no response: {0:?}")]
    Integrity(String),

    #[error("backend error resolving response: {0}")]
    Backend(String),

    #[error("response text is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
