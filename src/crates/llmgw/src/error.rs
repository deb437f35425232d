use thiserror::Error;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Top-level error surfaced by the `llmgw` facade. Every variant wraps a
/// lower crate's own error type rather than re-stating its cases — the
/// facade adds only the "mismatched adapter/strategy" case that belongs
/// to factory construction itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration is invalid: {0}")]
    Config(#[from] toml::de::Error),

    #[error("working directory error: {0}")]
    Files(#[from] llmgw_files::FilesError),

    #[error("datastore error: {0}")]
    Store(#[from] llmgw_store::StoreError),

    #[error("agent error: {0}")]
    Agent(#[from] llmgw_agent::AgentError),

    #[error("backend error: {0}")]
    Backend(#[from] llmgw_backend::BackendError),

    #[error(
        "adapter does not implement the `{strategy}` strategy this gateway was opened with"
    )]
    AdapterStrategyMismatch { strategy: &'static str },
}
