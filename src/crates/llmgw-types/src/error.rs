use thiserror::Error;

pub type Result<T> = std::result::Result<T, TypesError>;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid llm identity: {0}")]
    InvalidIdentity(String),
}
