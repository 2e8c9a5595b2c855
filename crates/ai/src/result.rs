use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("invalid forecast input: {0}")]
    InvalidInput(String),
}
