use thiserror::Error;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// *BackendError*: anything a backend can fail with that
/// is not one of the in-band [`llmgw_types::ControlSignal`] values.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Provider(#[from] llmgw_provider::ProviderError),

    #[error(transparent)]
    Store(#[from] llmgw_store::StoreError),

    #[error(transparent)]
    Files(#[from] llmgw_files::FilesError),

    #[error("batch raw-output archive error: {0}")]
    Archive(String),

    #[error("async backend is shutting down")]
    ShuttingDown,

    #[error("timed out waiting for the async backend")]
    Timeout,
}
