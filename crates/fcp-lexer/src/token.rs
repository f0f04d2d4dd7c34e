//! Token types for the protocol lexer.
//!
//! Words are all lexed as [`TokenKind::Identifier`]; the parser recognises
//! keywords by context, so section words such as `units` or `range` remain
//! usable as variable names.

use fcp_types::Span;
use std::fmt;

/// Words that may not be used as variable references inside expressions.
pub const EXPRESSION_KEYWORDS: &[&str] = &[
    "if", "then", "else", "lambda", "null", "default", "not", "for", "in",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Whether whitespace, a comment or a line continuation preceded this
    /// token. Adjacency-sensitive rules (`f(`, `a[`, `a{`, `a.SHAPE`, `1$`)
    /// require this to be `false`.
    pub spaced: bool,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, spaced: bool) -> Self {
        Self { kind, span, spaced }
    }

    /// Returns `true` if this token is the identifier `word`.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(w) if w == word)
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    /// Numeric literal, kept as written: `42`, `3.5e-2`
    Number(String),
    /// Quoted string, escapes resolved: `"mV"`, `'a\'b'`
    StringLit(String),
    /// Any word: `x`, `lambda`, `post`
    Identifier(String),

    // ── Layout ────────────────────────────────────────────────
    /// Statement separator (not produced inside `(` or `[`)
    Newline,
    Eof,

    // ── Punctuation ───────────────────────────────────────────
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    /// `:`
    Colon,
    /// `::` (units annotation)
    DoubleColon,
    /// `;`
    Semicolon,
    /// `$` (dimension marker)
    Dollar,
    /// `@` (operator wrap)
    At,
    /// `.` (accessor)
    Dot,
    /// `?` (trace marker)
    Question,

    // ── Operators ─────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    BangEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
}

impl TokenKind {
    /// The surface text of operator tokens, used when mapping to operators.
    pub fn operator_symbol(&self) -> Option<&'static str> {
        Some(match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Caret => "^",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEq => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(symbol) = self.operator_symbol() {
            return f.write_str(symbol);
        }
        match self {
            TokenKind::Number(text) => f.write_str(text),
            TokenKind::StringLit(s) => write!(f, "\"{s}\""),
            TokenKind::Identifier(s) => f.write_str(s),
            TokenKind::Newline => f.write_str("newline"),
            TokenKind::Eof => f.write_str("end of file"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::DoubleColon => f.write_str("::"),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Dollar => f.write_str("$"),
            TokenKind::At => f.write_str("@"),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Question => f.write_str("?"),
            TokenKind::Eq => f.write_str("="),
            _ => f.write_str("operator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_word() {
        let tok = Token::new(TokenKind::Identifier("range".into()), Span::point(1, 1), false);
        assert!(tok.is_word("range"));
        assert!(!tok.is_word("units"));
        let num = Token::new(TokenKind::Number("1".into()), Span::point(1, 1), false);
        assert!(!num.is_word("1"));
    }

    #[test]
    fn test_display_operators() {
        assert_eq!(TokenKind::AndAnd.to_string(), "&&");
        assert_eq!(TokenKind::LessEq.to_string(), "<=");
        assert_eq!(TokenKind::Caret.to_string(), "^");
    }

    #[test]
    fn test_display_punctuation_and_literals() {
        assert_eq!(TokenKind::DoubleColon.to_string(), "::");
        assert_eq!(TokenKind::Dollar.to_string(), "$");
        assert_eq!(TokenKind::Number("1e3".into()).to_string(), "1e3");
        assert_eq!(TokenKind::StringLit("mV".into()).to_string(), "\"mV\"");
        assert_eq!(TokenKind::Eof.to_string(), "end of file");
    }

    #[test]
    fn test_expression_keywords() {
        assert!(EXPRESSION_KEYWORDS.contains(&"lambda"));
        assert!(!EXPRESSION_KEYWORDS.contains(&"units"));
    }
}
