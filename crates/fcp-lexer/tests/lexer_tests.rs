//! Lexer behaviour tests.
//!
//! Covers:
//! 1. Significant newlines and their suppression inside brackets
//! 2. Comments and backslash continuations
//! 3. Adjacency (`spaced`) tracking
//! 4. Strings, operators and error reporting

use fcp_lexer::{Lexer, Token, TokenKind};
use fcp_types::{ErrorCode, SourceFile};
use pretty_assertions::assert_eq;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn lex(source: &str) -> Vec<Token> {
    let sf = SourceFile::new("test.txt", source);
    Lexer::new(&sf).lex().expect("lexing failed")
}

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|t| t.kind).collect()
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

fn num(text: &str) -> TokenKind {
    TokenKind::Number(text.to_string())
}

// ─────────────────────────────────────────────────────────────────────
// Newlines
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_newlines_are_tokens_at_top_level() {
    assert_eq!(
        kinds("a = 1\nb = 2"),
        vec![
            ident("a"),
            TokenKind::Eq,
            num("1"),
            TokenKind::Newline,
            ident("b"),
            TokenKind::Eq,
            num("2"),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_newlines_suppressed_inside_parens_and_brackets() {
    assert_eq!(
        kinds("f(1,\n 2)\n[3,\n4]"),
        vec![
            ident("f"),
            TokenKind::LParen,
            num("1"),
            TokenKind::Comma,
            num("2"),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::LBracket,
            num("3"),
            TokenKind::Comma,
            num("4"),
            TokenKind::RBracket,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_newlines_kept_inside_braces_within_parens() {
    let toks = kinds("map(lambda x {\nreturn x\n}, a)");
    let newlines = toks.iter().filter(|k| **k == TokenKind::Newline).count();
    assert_eq!(newlines, 2);
}

// ─────────────────────────────────────────────────────────────────────
// Comments & continuations
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_comment_runs_to_end_of_line() {
    assert_eq!(
        kinds("x = 1 # a comment ( [\ny"),
        vec![
            ident("x"),
            TokenKind::Eq,
            num("1"),
            TokenKind::Newline,
            ident("y"),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_backslash_continuation_joins_lines() {
    assert_eq!(
        kinds("x = 1 + \\\n    2"),
        vec![
            ident("x"),
            TokenKind::Eq,
            num("1"),
            TokenKind::Plus,
            num("2"),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_backslash_continuation_with_trailing_comment() {
    assert_eq!(
        kinds("a \\  # why not\nb"),
        vec![ident("a"), ident("b"), TokenKind::Eof]
    );
}

#[test]
fn test_stray_backslash_is_an_error() {
    let sf = SourceFile::new("test.txt", "a \\ b");
    let err = Lexer::new(&sf).lex().unwrap_err();
    assert_eq!(err.code, ErrorCode::UNEXPECTED_CHARACTER);
    assert_eq!(err.offset, 2);
}

// ─────────────────────────────────────────────────────────────────────
// Adjacency
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_spaced_flag_tracks_whitespace() {
    let toks = lex("f(x) g (y)");
    let spaced: Vec<bool> = toks.iter().map(|t| t.spaced).collect();
    // f ( x ) g ( y ) Eof
    assert_eq!(
        spaced,
        vec![true, false, false, false, true, true, false, false, false]
    );
}

#[test]
fn test_token_after_newline_is_spaced() {
    let toks = lex("a\nb");
    assert!(toks[2].spaced);
    assert_eq!(toks[2].span.start_line, 2);
}

// ─────────────────────────────────────────────────────────────────────
// Strings & operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_strings_with_both_quote_styles() {
    assert_eq!(
        kinds(r#""mV" 'it\'s' "a\"b""#),
        vec![
            TokenKind::StringLit("mV".into()),
            TokenKind::StringLit("it's".into()),
            TokenKind::StringLit("a\"b".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_unterminated_string() {
    let sf = SourceFile::new("test.txt", "x = \"abc\ny");
    let err = Lexer::new(&sf).lex().unwrap_err();
    assert_eq!(err.code, ErrorCode::UNTERMINATED_STRING);
    assert_eq!(err.span.start_line, 1);
    assert_eq!(err.span.start_col, 5);
}

#[test]
fn test_compound_operators() {
    assert_eq!(
        kinds("== != <= >= && || :: < > = :"),
        vec![
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::DoubleColon,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::Eq,
            TokenKind::Colon,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_single_ampersand_is_an_error() {
    let sf = SourceFile::new("test.txt", "a & b");
    let err = Lexer::new(&sf).lex().unwrap_err();
    assert_eq!(err.code, ErrorCode::UNEXPECTED_CHARACTER);
    assert_eq!(err.expected.as_deref(), Some("'&&'"));
}

#[test]
fn test_wrap_and_view_punctuation() {
    assert_eq!(
        kinds("@2:+ a[*$0] b{i, pad:1=0} c.SHAPE?"),
        vec![
            TokenKind::At,
            num("2"),
            TokenKind::Colon,
            TokenKind::Plus,
            ident("a"),
            TokenKind::LBracket,
            TokenKind::Star,
            TokenKind::Dollar,
            num("0"),
            TokenKind::RBracket,
            ident("b"),
            TokenKind::LBrace,
            ident("i"),
            TokenKind::Comma,
            ident("pad"),
            TokenKind::Colon,
            num("1"),
            TokenKind::Eq,
            num("0"),
            TokenKind::RBrace,
            ident("c"),
            TokenKind::Dot,
            ident("SHAPE"),
            TokenKind::Question,
            TokenKind::Eof,
        ]
    );
}
