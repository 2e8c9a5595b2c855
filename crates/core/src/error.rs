//! Error taxonomy shared by every pipeline stage.
//!
//! Only [`PipelineError`] ever reaches a caller, and only as the `error` text of a
//! failed [`crate::PipelineResponse`]. Everything else is recovered inside the
//! stage that produced it.

use std::time::Duration;

use thiserror::Error;

/// Failure of the natural-language completion service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Network fault, rate limit or 5xx: worth retrying.
    #[error("completion service unavailable: {0}")]
    Transient(String),

    /// Authentication or request rejected: retrying will not help.
    #[error("completion service rejected the request: {0}")]
    Permanent(String),

    /// The service answered, but the body had no usable text.
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// Completion text that could not be turned into a structured value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("response was empty")]
    Empty,

    #[error("no JSON object found in response")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("no reporting query found in response")]
    NoQuery,
}

/// Failure of the commerce-analytics backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("analytics backend unavailable: {0}")]
    Unavailable(String),

    #[error("analytics backend rejected the query: {0}")]
    Rejected(String),
}

/// Anything that escapes the stages and fails the whole request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("question cannot be empty")]
    EmptyQuestion,

    #[error("pipeline stage panicked: {0}")]
    Panicked(String),

    #[error("request exceeded its time budget of {}s", .0.as_secs())]
    Timeout(Duration),
}
