use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilesError>;

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata is corrupt: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("userdata blob is corrupt: {0}")]
    Userdata(#[from] Box<bincode::ErrorKind>),

    #[error("working directory is locked by another process (pid {0})")]
    Locked(u32),

    #[error("userdata key not found: {0}")]
    UserdataNotFound(String),
}
