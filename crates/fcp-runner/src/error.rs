//! Errors raised while running a protocol.

use fcp_eval::EvalError;
use fcp_types::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    /// A protocol (the main one or an import) did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Evaluation or simulation failed.
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("import '{0}' could not be found")]
    ImportNotFound(String),

    /// An import chain leads back to a protocol still being loaded.
    #[error("import cycle: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),

    /// `use imports p` names a prefix no import declared.
    #[error("no import is bound to prefix '{0}'")]
    UnknownImport(String),
}

/// Run result type alias.
pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = RunError::ImportCycle(vec!["a.txt".into(), "b.txt".into(), "a.txt".into()]);
        assert_eq!(err.to_string(), "import cycle: a.txt -> b.txt -> a.txt");
    }

    #[test]
    fn test_eval_error_is_transparent() {
        let err = RunError::from(EvalError::name("'x' is not defined"));
        assert_eq!(err.to_string(), "name error: 'x' is not defined");
    }
}
