use thiserror::Error;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Anything an adapter can raise. The core surfaces these as-is to the
/// caller, or persists them to the `errors` table for batch jobs.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("batch job not ready: {0}")]
    BatchNotReady(String),
}
