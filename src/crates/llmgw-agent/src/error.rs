use thiserror::Error;

pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// A true error out of `askLLM`/checkpoint handling — anything that is
/// *not* one of the in-band [`llmgw_types::ControlSignal`] values.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("llm provider {declared:?} is incompatible with adapter provider {adapter:?}")]
    ProviderIncompatible { declared: String, adapter: String },

    #[error(transparent)]
    Hash(#[from] llmgw_hash::HashError),

    #[error(transparent)]
    Store(#[from] llmgw_store::StoreError),

    #[error(transparent)]
    Backend(#[from] llmgw_backend::BackendError),

    #[error(transparent)]
    Files(#[from] llmgw_files::FilesError),

    #[error(transparent)]
    Response(#[from] llmgw_response::ResponseError),

    #[error(transparent)]
    Boxed(#[from] Box<dyn std::error::Error + Send + Sync>),
}
