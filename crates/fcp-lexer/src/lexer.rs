//! Protocol lexer: converts source text to a token stream.
//!
//! - `#` comments run to end of line
//! - a backslash before a line end joins the two lines
//! - newlines are tokens, except inside `(` … `)` and `[` … `]`
//! - every token records whether whitespace preceded it

use fcp_types::{ErrorCode, ParseError, SourceFile, Span};

use crate::token::{Token, TokenKind};

pub struct Lexer<'src> {
    /// The full source text as bytes.
    source: &'src [u8],
    source_file: &'src SourceFile,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
    /// Open delimiters, innermost last.
    delimiters: Vec<u8>,
    /// Whether trivia was skipped since the previous token.
    spaced: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            source_file,
            pos: 0,
            line: 1,
            col: 1,
            delimiters: Vec::new(),
            spaced: true,
        }
    }

    /// Lex the entire source file. The stream always ends with `Eof`.
    pub fn lex(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(
            start_line,
            start_col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::new(self.source_file, code, message, span)
    }

    fn in_brackets(&self) -> bool {
        matches!(self.delimiters.last(), Some(b'(') | Some(b'['))
    }

    // ─────────────────────────────────────────────────────────────
    // Trivia: whitespace, comments, continuations
    // ─────────────────────────────────────────────────────────────

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.advance();
        }
    }

    /// If a backslash continuation starts here, consume it through the line
    /// end and return `true`. Trailing blanks and a comment may sit between
    /// the backslash and the newline.
    fn skip_continuation(&mut self) -> bool {
        let mut offset = 1;
        while let Some(b' ' | b'\t' | b'\r') = self.peek_at(offset) {
            offset += 1;
        }
        if self.peek_at(offset) == Some(b'#') {
            while !matches!(self.peek_at(offset), None | Some(b'\n')) {
                offset += 1;
            }
        }
        if self.peek_at(offset) != Some(b'\n') {
            return false;
        }
        for _ in 0..=offset {
            self.advance();
        }
        true
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => {
                    self.advance();
                }
                Some(b'#') => self.skip_comment(),
                Some(b'\\') if self.skip_continuation() => {}
                Some(b'\n') if self.in_brackets() => {
                    self.advance();
                }
                _ => return,
            }
            self.spaced = true;
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Scanning
    // ─────────────────────────────────────────────────────────────

    fn scan(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia();
        let spaced = std::mem::replace(&mut self.spaced, false);
        let start_line = self.line;
        let start_col = self.col;

        let Some(ch) = self.advance() else {
            return Ok(Token::new(
                TokenKind::Eof,
                Span::point(start_line, start_col),
                spaced,
            ));
        };

        let kind = match ch {
            b'\n' => {
                self.spaced = true;
                TokenKind::Newline
            }
            b'0'..=b'9' => self.scan_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_identifier(),
            b'"' | b'\'' => self.scan_string(ch, start_line, start_col)?,

            b'(' | b'[' | b'{' => {
                self.delimiters.push(ch);
                match ch {
                    b'(' => TokenKind::LParen,
                    b'[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            b')' => self.close(b'(', TokenKind::RParen),
            b']' => self.close(b'[', TokenKind::RBracket),
            b'}' => self.close(b'{', TokenKind::RBrace),

            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'$' => TokenKind::Dollar,
            b'@' => TokenKind::At,
            b'.' => TokenKind::Dot,
            b'?' => TokenKind::Question,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'^' => TokenKind::Caret,

            b':' => self.one_or_two(b':', TokenKind::DoubleColon, TokenKind::Colon),
            b'=' => self.one_or_two(b'=', TokenKind::EqEq, TokenKind::Eq),
            b'<' => self.one_or_two(b'=', TokenKind::LessEq, TokenKind::Less),
            b'>' => self.one_or_two(b'=', TokenKind::GreaterEq, TokenKind::Greater),
            b'!' | b'&' | b'|' => {
                let (second, kind) = match ch {
                    b'!' => (b'=', TokenKind::BangEq),
                    b'&' => (b'&', TokenKind::AndAnd),
                    _ => (b'|', TokenKind::OrOr),
                };
                if self.peek() != Some(second) {
                    let span = self.span_from(start_line, start_col);
                    return Err(self
                        .error(
                            ErrorCode::UNEXPECTED_CHARACTER,
                            format!("unexpected character '{}'", ch as char),
                            span,
                        )
                        .expecting(format!("'{}{}'", ch as char, second as char)));
                }
                self.advance();
                kind
            }

            _ => {
                let span = self.span_from(start_line, start_col);
                let shown = if ch.is_ascii_graphic() {
                    format!("'{}'", ch as char)
                } else {
                    format!("byte 0x{ch:02x}")
                };
                return Err(self.error(
                    ErrorCode::UNEXPECTED_CHARACTER,
                    format!("unexpected character {shown}"),
                    span,
                ));
            }
        };

        Ok(Token::new(
            kind,
            self.span_from(start_line, start_col),
            spaced,
        ))
    }

    fn one_or_two(&mut self, second: u8, double: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek() == Some(second) {
            self.advance();
            double
        } else {
            single
        }
    }

    fn close(&mut self, opener: u8, kind: TokenKind) -> TokenKind {
        if self.delimiters.last() == Some(&opener) {
            self.delimiters.pop();
        }
        kind
    }

    fn text_from(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
    }

    // ─────────────────────────────────────────────────────────────
    // Literals & identifiers
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos - 1;
        while let Some(b'0'..=b'9') = self.peek() {
            self.advance();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while let Some(b'0'..=b'9') = self.peek() {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let digits_at = if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                2
            } else {
                1
            };
            if matches!(self.peek_at(digits_at), Some(b'0'..=b'9')) {
                for _ in 0..digits_at {
                    self.advance();
                }
                while let Some(b'0'..=b'9') = self.peek() {
                    self.advance();
                }
            }
        }
        TokenKind::Number(self.text_from(start))
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos - 1;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Identifier(self.text_from(start))
    }

    /// Scan a quoted string after its opening quote.
    fn scan_string(
        &mut self,
        quote: u8,
        start_line: u32,
        start_col: u32,
    ) -> Result<TokenKind, ParseError> {
        let mut buf = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    let span = self.span_from(start_line, start_col);
                    return Err(self
                        .error(
                            ErrorCode::UNTERMINATED_STRING,
                            "unterminated string literal",
                            span,
                        )
                        .expecting(format!("closing {}", quote as char)));
                }
                Some(ch) if ch == quote => {
                    self.advance();
                    return Ok(TokenKind::StringLit(
                        String::from_utf8_lossy(&buf).into_owned(),
                    ));
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(b'n') => buf.push(b'\n'),
                        Some(b't') => buf.push(b'\t'),
                        Some(other) => buf.push(other),
                        None => {}
                    }
                }
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let sf = SourceFile::new("test.txt", src);
        Lexer::new(&sf)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_source_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            kinds("1 2.5 3e4 5.0E-2 7e"),
            vec![
                TokenKind::Number("1".into()),
                TokenKind::Number("2.5".into()),
                TokenKind::Number("3e4".into()),
                TokenKind::Number("5.0E-2".into()),
                TokenKind::Number("7".into()),
                TokenKind::Identifier("e".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_range_colons_do_not_join_numbers() {
        assert_eq!(
            kinds("0:1:5"),
            vec![
                TokenKind::Number("0".into()),
                TokenKind::Colon,
                TokenKind::Number("1".into()),
                TokenKind::Colon,
                TokenKind::Number("5".into()),
                TokenKind::Eof,
            ]
        );
    }
}
