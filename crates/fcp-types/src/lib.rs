//! Shared types for the FCP protocol language.
//!
//! This crate defines the syntax tree, source spans and location strings,
//! and the parse error type used across the front end.

mod error;
mod span;
pub mod ast;

pub use error::{ErrorCategory, ErrorCode, ParseError};
pub use span::{SourceFile, Span};

/// Result type used throughout the front end.
pub type Result<T> = std::result::Result<T, ParseError>;
