//! Domain error taxonomy.
//!
//! Every failure surfaced to a caller carries one of these variants so the
//! HTTP layer can map it to a status code without string matching.
//! Extraction faults never appear here — the extraction engine converts
//! them into marker strings instead (see [`crate::extract`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Bad client input: disallowed extension, oversized payload,
    /// malformed identifier.
    #[error("{0}")]
    Validation(String),

    /// Unknown or soft-deleted document/session.
    #[error("{0}")]
    NotFound(String),

    /// Caller is neither the owner nor an admin.
    #[error("{0}")]
    Forbidden(String),

    /// Operation asked for state that does not exist yet
    /// (e.g. Q&A before extraction has produced text).
    #[error("{0}")]
    Precondition(String),

    /// The hosted answer engine returned a non-success response or the
    /// request failed in transit. Surfaced as-is to the Q&A caller.
    #[error("answer engine request failed: {0}")]
    AnswerEngine(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = DomainError> = std::result::Result<T, E>;
