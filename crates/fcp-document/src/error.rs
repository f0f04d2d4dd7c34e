//! Document error types.

use fcp_types::ParseError;
use thiserror::Error;

/// Errors raised while building or (de)serialising a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The protocol source did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// JSON encoding or decoding failed.
    #[error("document JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Document result type alias.
pub type DocumentResult<T> = Result<T, DocumentError>;
