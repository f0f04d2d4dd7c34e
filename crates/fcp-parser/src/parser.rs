//! Core parser infrastructure: token cursor, parse context, expression memo
//! and the recursion-budget retry loop.

use std::collections::{BTreeSet, HashMap};

use fcp_lexer::{Lexer, Token, TokenKind};
use fcp_types::ast::{Block, Expr, Ident, Protocol};
use fcp_types::{ErrorCode, ParseError, SourceFile, Span};

/// Stack kept free before `stacker` allocates a new segment.
const RED_ZONE: usize = 128 * 1024;
/// Size of each newly allocated stack segment.
const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

/// Tunables for one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Initial nesting depth the expression grammar may reach.
    pub recursion_budget: usize,
    /// How many times the budget is doubled before giving up.
    pub max_escalations: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            recursion_budget: 256,
            max_escalations: 3,
        }
    }
}

/// Why a rule stopped.
#[derive(Debug, Clone)]
pub(crate) enum Failure {
    /// Malformed input. Fatal unless a rule explicitly rewinds.
    Syntax(ParseError),
    /// The recursion budget ran out. Never memoized or rewound; the whole
    /// parse is retried with a larger budget.
    Budget,
}

impl From<ParseError> for Failure {
    fn from(err: ParseError) -> Self {
        Failure::Syntax(err)
    }
}

pub(crate) type PResult<T> = Result<T, Failure>;

/// State threaded through one parse.
#[derive(Debug, Clone)]
pub(crate) struct ParseContext {
    /// Names that may qualify an identifier in expressions (`p:name`):
    /// namespaces, import prefixes, simulation names and `MathML`.
    pub(crate) prefixes: BTreeSet<String>,
    /// Units name → description, for output labels.
    pub(crate) unit_descriptions: HashMap<String, String>,
    /// Named simulations declared so far.
    pub(crate) simulations: BTreeSet<String>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            prefixes: BTreeSet::from(["MathML".to_string()]),
            unit_descriptions: HashMap::new(),
            simulations: BTreeSet::new(),
        }
    }
}

/// The protocol parser.
///
/// Consumes the token stream produced by the lexer and builds the syntax
/// tree with recursive descent. Sub-parses of the expression non-terminal
/// are memoized by token position.
pub(crate) struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source_file: &'src SourceFile,
    pub(crate) context: ParseContext,
    /// (token position, view bound?) → (expression, end position) or the
    /// error it produced.
    memo: HashMap<(usize, bool), Result<(Expr, usize), ParseError>>,
    /// Set while parsing a view bound, where `::` separates start and end
    /// instead of annotating units.
    pub(crate) in_view_bound: bool,
    depth: usize,
    budget: usize,
    /// Where the budget ran out, for the final error message.
    exhausted_at: Option<Span>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Entry points
// ══════════════════════════════════════════════════════════════════════════════

/// Parse a complete protocol file.
#[tracing::instrument(level = "debug", skip_all, fields(file = %source.name))]
pub fn parse_protocol(source: &SourceFile, config: &ParserConfig) -> Result<Protocol, ParseError> {
    run(source, config, |p| p.parse_protocol_file())
}

/// Parse a single expression spanning the whole input.
pub fn parse_expression(source: &SourceFile, config: &ParserConfig) -> Result<Expr, ParseError> {
    run(source, config, |p| {
        p.skip_newlines();
        let expr = p.parse_expr()?;
        p.expect_end()?;
        Ok(expr)
    })
}

/// Parse a newline-separated statement list spanning the whole input.
pub fn parse_statements(source: &SourceFile, config: &ParserConfig) -> Result<Block, ParseError> {
    run(source, config, |p| {
        let block = p.parse_statement_list()?;
        p.expect_end()?;
        Ok(block)
    })
}

/// Run `rule` over the whole file, doubling the recursion budget after each
/// exhaustion until `max_escalations` retries have been spent.
fn run<T>(
    source: &SourceFile,
    config: &ParserConfig,
    rule: impl Fn(&mut Parser<'_>) -> PResult<T>,
) -> Result<T, ParseError> {
    let tokens = Lexer::new(source).lex()?;
    let mut budget = config.recursion_budget.max(1);
    let mut escalations = 0;
    loop {
        let mut parser = Parser::new(tokens.clone(), source, budget);
        match rule(&mut parser) {
            Ok(value) => return Ok(value),
            Err(Failure::Syntax(err)) => return Err(err),
            Err(Failure::Budget) => {
                let span = parser.exhausted_at.unwrap_or_else(|| parser.current_span());
                if escalations >= config.max_escalations {
                    return Err(ParseError::new(
                        source,
                        ErrorCode::RECURSION_LIMIT,
                        format!(
                            "nesting exceeds the recursion budget of {budget} after {escalations} escalations"
                        ),
                        span,
                    ));
                }
                escalations += 1;
                let raised = budget.saturating_mul(2);
                tracing::warn!(
                    file = %source.name,
                    at = %span,
                    budget,
                    raised,
                    "recursion budget exhausted, retrying parse"
                );
                budget = raised;
            }
        }
    }
}

impl<'src> Parser<'src> {
    pub(crate) fn new(tokens: Vec<Token>, source_file: &'src SourceFile, budget: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            context: ParseContext::new(),
            memo: HashMap::new(),
            in_view_bound: false,
            depth: 0,
            budget,
            exhausted_at: None,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Returns the token `n` positions ahead, or the final `Eof`.
    pub(crate) fn peek_at(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor back to a position saved with [`Self::position`].
    pub(crate) fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(1, 1)
        }
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// `true` if the current token is `kind` and no whitespace precedes it.
    pub(crate) fn at_adjacent(&self, kind: &TokenKind) -> bool {
        self.at(kind) && !self.peek().spaced
    }

    pub(crate) fn at_word(&self, word: &str) -> bool {
        self.peek().is_word(word)
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_word(&mut self, word: &str) -> bool {
        if self.at_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ── Newline Handling ──────────────────────────────────────────────────────

    pub(crate) fn skip_newlines(&mut self) {
        while self.at(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// `true` if `kind` is the next token once blank lines are skipped.
    pub(crate) fn at_after_newlines(&self, kind: &TokenKind) -> bool {
        let mut n = 0;
        while self.peek_at(n).kind == TokenKind::Newline {
            n += 1;
        }
        self.peek_at(n).kind == *kind
    }

    /// The whole input must have been consumed.
    pub(crate) fn expect_end(&mut self) -> PResult<()> {
        self.skip_newlines();
        if self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self
                .error_at_current(
                    ErrorCode::TRAILING_INPUT,
                    format!("unparsed input starting at '{}'", self.peek_kind()),
                )
                .into())
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind and return it.
    pub(crate) fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if self.at(kind) {
            return Ok(self.advance());
        }
        let closing = matches!(
            kind,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        );
        if closing && self.at(&TokenKind::Eof) {
            return Err(self
                .error_at_current(
                    ErrorCode::UNCLOSED_DELIMITER,
                    format!("unclosed delimiter, expected '{kind}'"),
                )
                .expecting(format!("'{kind}'"))
                .into());
        }
        Err(self.unexpected(&format!("'{kind}'")))
    }

    pub(crate) fn expect_word(&mut self, word: &str) -> PResult<Span> {
        if self.at_word(word) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("'{word}'")))
        }
    }

    /// Expect a plain (unqualified) identifier.
    pub(crate) fn expect_identifier(&mut self) -> PResult<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok(Ident::new(name, span))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Expect an identifier that may carry prefixes: `oxmeta:membrane_voltage`.
    /// Every `:` and segment must be adjacent to what precedes it.
    pub(crate) fn expect_qualified_identifier(&mut self) -> PResult<Ident> {
        let mut ident = self.expect_identifier()?;
        while self.at_adjacent(&TokenKind::Colon)
            && matches!(self.peek_at(1).kind, TokenKind::Identifier(_))
            && !self.peek_at(1).spaced
        {
            self.advance();
            let segment = self.expect_identifier()?;
            ident.name = format!("{}:{}", ident.name, segment.name);
            ident.span = ident.span.merge(segment.span);
        }
        Ok(ident)
    }

    pub(crate) fn expect_string(&mut self) -> PResult<String> {
        match self.peek_kind().clone() {
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("quoted string")),
        }
    }

    /// Parse `{ item (newline item)* }`, tolerating blank lines anywhere.
    /// Returns the items and the span from `{` to `}`.
    pub(crate) fn parse_braced<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> PResult<T>,
    ) -> PResult<(Vec<T>, Span)> {
        self.skip_newlines();
        let open = self.expect(&TokenKind::LBrace)?.span;
        self.skip_newlines();
        let mut items = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            items.push(item(self)?);
            if !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
                self.expect(&TokenKind::Newline)?;
            }
            self.skip_newlines();
        }
        let close = self.expect(&TokenKind::RBrace)?.span;
        Ok((items, open.merge(close)))
    }

    // ── Memo & Budget ─────────────────────────────────────────────────────────

    /// Look up a memoized expression parse at the current position. On a hit
    /// the cursor moves to the recorded end.
    pub(crate) fn memo_lookup(&mut self) -> Option<PResult<Expr>> {
        let entry = self.memo.get(&(self.pos, self.in_view_bound)).cloned()?;
        Some(match entry {
            Ok((expr, end)) => {
                self.pos = end;
                Ok(expr)
            }
            Err(err) => Err(Failure::Syntax(err)),
        })
    }

    /// Record the outcome of an expression parse that began at `start`.
    /// Budget failures are not recorded.
    pub(crate) fn memo_store(&mut self, start: usize, result: &PResult<Expr>) {
        match result {
            Ok(expr) => {
                self.memo
                    .insert((start, self.in_view_bound), Ok((expr.clone(), self.pos)));
            }
            Err(Failure::Syntax(err)) => {
                self.memo.insert((start, self.in_view_bound), Err(err.clone()));
            }
            Err(Failure::Budget) => {}
        }
    }

    /// Run `f` one level deeper, failing with [`Failure::Budget`] once the
    /// recursion budget is spent.
    pub(crate) fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= self.budget {
            if self.exhausted_at.is_none() {
                self.exhausted_at = Some(self.peek().span);
            }
            return Err(Failure::Budget);
        }
        self.depth += 1;
        let result = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || f(self));
        self.depth -= 1;
        result
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> ParseError {
        ParseError::new(self.source_file, code, message, span)
    }

    pub(crate) fn error_at_current(&self, code: ErrorCode, message: impl Into<String>) -> ParseError {
        self.error_at(code, message, self.current_span())
    }

    /// An unexpected-token failure at the current position.
    pub(crate) fn unexpected(&self, expected: &str) -> Failure {
        self.error_at_current(
            ErrorCode::UNEXPECTED_TOKEN,
            format!("unexpected {}", describe(self.peek_kind())),
        )
        .expecting(expected)
        .into()
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Eof | TokenKind::Newline => kind.to_string(),
        _ => format!("'{kind}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser_for(source: &SourceFile) -> Parser<'_> {
        let tokens = Lexer::new(source).lex().unwrap();
        Parser::new(tokens, source, 8)
    }

    #[test]
    fn test_cursor_stops_at_eof() {
        let sf = SourceFile::new("t.txt", "a");
        let mut p = parser_for(&sf);
        assert!(p.at_word("a"));
        p.advance();
        assert!(p.at(&TokenKind::Eof));
        p.advance();
        assert!(p.at(&TokenKind::Eof));
    }

    #[test]
    fn test_qualified_identifier_requires_adjacency() {
        let sf = SourceFile::new("t.txt", "oxmeta:V a :b");
        let mut p = parser_for(&sf);
        assert_eq!(p.expect_qualified_identifier().unwrap().name, "oxmeta:V");
        assert_eq!(p.expect_qualified_identifier().unwrap().name, "a");
        assert!(p.at(&TokenKind::Colon));
    }

    #[test]
    fn test_at_after_newlines_does_not_consume() {
        let sf = SourceFile::new("t.txt", "\n\n{");
        let p = parser_for(&sf);
        assert!(p.at_after_newlines(&TokenKind::LBrace));
        assert!(p.at(&TokenKind::Newline));
    }

    #[test]
    fn test_nested_reports_budget_exhaustion() {
        let sf = SourceFile::new("t.txt", "x");
        let mut p = parser_for(&sf);
        fn dive(p: &mut Parser<'_>) -> PResult<()> {
            p.nested(dive)
        }
        assert!(matches!(dive(&mut p), Err(Failure::Budget)));
        assert_eq!(p.depth, 0);
        assert!(p.exhausted_at.is_some());
    }

    #[test]
    fn test_unclosed_delimiter_at_eof() {
        let sf = SourceFile::new("t.txt", "");
        let mut p = parser_for(&sf);
        match p.expect(&TokenKind::RParen) {
            Err(Failure::Syntax(err)) => assert_eq!(err.code, ErrorCode::UNCLOSED_DELIMITER),
            other => panic!("expected unclosed delimiter, got {other:?}"),
        }
    }
}
