use crate::{SourceFile, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Structure,
}

/// Numeric parse error code (E100–E699).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNCLOSED_DELIMITER: Self = Self(101);
    pub const UNEXPECTED_CHARACTER: Self = Self(102);
    pub const UNTERMINATED_STRING: Self = Self(103);
    pub const INVALID_NUMBER: Self = Self(104);
    pub const UNKNOWN_ACCESSOR: Self = Self(105);
    pub const UNKNOWN_OPERATOR: Self = Self(106);
    pub const TRAILING_INPUT: Self = Self(107);

    // ── Structure errors (E600–E699) ──
    pub const RECURSION_LIMIT: Self = Self(600);
    pub const UNKNOWN_SIMULATION: Self = Self(601);
    pub const INVALID_UNITS_EXPRESSION: Self = Self(602);

    pub fn category(self) -> ErrorCategory {
        match self.0 {
            600..=699 => ErrorCategory::Structure,
            _ => ErrorCategory::Syntax,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

/// A fatal parse failure. One is reported per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    /// Source file name.
    pub file: String,
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    /// Byte offset of the offending position.
    pub offset: usize,
    #[serde(flatten)]
    pub span: Span,
    /// The source line containing the error.
    pub source_line: String,
    /// What the grammar would have accepted at this point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl ParseError {
    pub fn new(
        source: &SourceFile,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            file: source.name.clone(),
            code,
            category: code.category(),
            message: message.into(),
            offset: source.offset(span.start_line, span.start_col),
            span,
            source_line: source.line(span.start_line).unwrap_or("").to_string(),
            expected: None,
        }
    }

    /// Record the alternative the grammar expected.
    pub fn expecting(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (offset {}): {} [{}] {}",
            self.file, self.span, self.offset, self.code, self.category, self.message
        )?;
        if let Some(expected) = &self.expected {
            write!(f, "; expected {expected}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::UNEXPECTED_TOKEN.to_string(), "E100");
        assert_eq!(ErrorCode::RECURSION_LIMIT.to_string(), "E600");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::TRAILING_INPUT.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::RECURSION_LIMIT.category(), ErrorCategory::Structure);
    }

    #[test]
    fn test_parse_error_records_offset_and_line() {
        let src = SourceFile::new("p.txt", "inputs {\n  x = )\n}");
        let err = ParseError::new(
            &src,
            ErrorCode::UNEXPECTED_TOKEN,
            "unexpected ')'",
            Span::point(2, 7),
        )
        .expecting("expression");
        assert_eq!(err.offset, 15);
        assert_eq!(err.source_line, "  x = )");
        assert_eq!(
            err.to_string(),
            "p.txt:2:7 (offset 15): E100 [syntax] unexpected ')'; expected expression"
        );
    }

    #[test]
    fn test_parse_error_serialization() {
        let src = SourceFile::new("p.txt", "x");
        let err = ParseError::new(&src, ErrorCode::TRAILING_INPUT, "trailing", Span::point(1, 1));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 107);
        assert_eq!(json["category"], "syntax");
        assert_eq!(json["start_line"], 1);
        assert!(json.get("expected").is_none());
    }
}
