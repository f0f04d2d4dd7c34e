//! Runtime error types for the FCP evaluator and simulation engine.

use crate::model::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A name was defined twice in one scope, or looked up and not found.
    Name,
    /// Array rank/shape mismatch, or a view/index outside the array.
    Shape,
    /// An operation was applied to the wrong kind of value.
    Type,
    /// Argument or tuple size mismatch.
    Arity,
    /// The model collaborator failed.
    Model,
    /// An `assert` statement evaluated to zero.
    Assertion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Name => "name error",
            ErrorKind::Shape => "shape error",
            ErrorKind::Type => "type error",
            ErrorKind::Arity => "arity error",
            ErrorKind::Model => "model error",
            ErrorKind::Assertion => "assertion failed",
        };
        f.write_str(name)
    }
}

/// A fatal evaluation error.
///
/// `locations` is the chain of protocol locations that were active when the
/// error was raised, innermost first, each formatted as
/// `file:line:col<TAB>source line`.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}{}", render_locations(.locations))]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    pub locations: Vec<String>,
}

fn render_locations(locations: &[String]) -> String {
    locations
        .iter()
        .map(|loc| format!("\n  at {loc}"))
        .collect()
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            locations: Vec::new(),
        }
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name, message)
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Shape, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn arity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arity, message)
    }

    /// Append an enclosing location to the trace.
    pub fn at(mut self, location: String) -> Self {
        if self.locations.last() != Some(&location) {
            self.locations.push(location);
        }
        self
    }
}

impl From<ModelError> for EvalError {
    fn from(err: ModelError) -> Self {
        Self::new(ErrorKind::Model, err.to_string())
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_locations_innermost_first() {
        let err = EvalError::shape("bad")
            .at("a.txt:3:5\t  x = y".into())
            .at("a.txt:1:1\tdef f() {".into());
        assert_eq!(
            err.to_string(),
            "shape error: bad\n  at a.txt:3:5\t  x = y\n  at a.txt:1:1\tdef f() {"
        );
    }

    #[test]
    fn test_repeated_location_recorded_once() {
        let err = EvalError::name("x").at("l".into()).at("l".into());
        assert_eq!(err.locations, vec!["l".to_string()]);
    }

    #[test]
    fn test_model_error_conversion() {
        let err: EvalError = ModelError::UnknownVariable("q".into()).into();
        assert_eq!(err.kind, ErrorKind::Model);
        assert!(err.message.contains("q"));
    }
}
