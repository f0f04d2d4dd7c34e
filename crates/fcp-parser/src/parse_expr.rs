//! Expression parsing with full operator precedence.
//!
//! Precedence (highest → lowest):
//! 1. `?` trace marker (adjacent, postfix)
//! 2. `.ACCESSOR` (adjacent, chainable)
//! 3. `a[..][..]` views (adjacent)
//! 4. `a{..}` index (adjacent)
//! 5. `^` (left)
//! 6. unary `-` (right)
//! 7. `*`, `/` (left)
//! 8. `+`, `-` (left)
//! 9. `not` (right)
//! 10. `==`, `!=`, `<=`, `>=`, `<`, `>` (left)
//! 11. `&&`, `||` (left)

use fcp_lexer::token::{TokenKind, EXPRESSION_KEYWORDS};
use fcp_types::ast::*;
use fcp_types::{ErrorCode, Span};

use crate::parser::{Failure, PResult, Parser};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse an expression. Results are memoized by start position, so the
    /// rules that try an expression and then rewind pay for it once.
    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        if let Some(result) = self.memo_lookup() {
            return result;
        }
        let start = self.position();
        let result = self.nested(|p| p.parse_logical());
        self.memo_store(start, &result);
        result
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `Logical = Relational { ("&&" | "||") Relational }`
    fn parse_logical(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::AndAnd => Operator::And,
                TokenKind::OrOr => Operator::Or,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
    }

    /// `Relational = Not { RelOp Not }`
    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_not()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => Operator::Eq,
                TokenKind::BangEq => Operator::Neq,
                TokenKind::Less => Operator::Lt,
                TokenKind::Greater => Operator::Gt,
                TokenKind::LessEq => Operator::Leq,
                TokenKind::GreaterEq => Operator::Geq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_not()?;
            left = binary(op, left, right);
        }
    }

    /// `Not = "not" Not | Additive`
    fn parse_not(&mut self) -> PResult<Expr> {
        if !self.at_word("not") {
            return self.parse_additive();
        }
        let start = self.advance().span;
        let operand = self.nested(|p| p.parse_not())?;
        let span = start.merge(operand.span);
        Ok(Expr::new(
            ExprKind::Operator {
                op: Operator::Not,
                operands: vec![operand],
            },
            span,
        ))
    }

    /// `Additive = Multiplicative { ("+" | "-") Multiplicative }`
    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => Operator::Plus,
                TokenKind::Minus => Operator::Minus,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    /// `Multiplicative = Unary { ("*" | "/") Unary }`
    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => Operator::Times,
                TokenKind::Slash => Operator::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    /// `Unary = "-" Unary | Power`
    ///
    /// A minus applied directly to a plain number literal becomes a negative
    /// literal rather than an operator application.
    fn parse_unary(&mut self) -> PResult<Expr> {
        if !self.at(&TokenKind::Minus) {
            return self.parse_power();
        }
        let start = self.advance().span;
        let operand = self.nested(|p| p.parse_unary())?;
        let span = start.merge(operand.span);
        Ok(negate(operand, span))
    }

    /// `Power = Index { "^" Index }`
    fn parse_power(&mut self) -> PResult<Expr> {
        let mut left = self.parse_index()?;
        while self.eat(&TokenKind::Caret) {
            let right = self.parse_index()?;
            left = binary(Operator::Power, left, right);
        }
        Ok(left)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Postfix Tiers
    // ══════════════════════════════════════════════════════════════════════════

    /// `Index = View { "{" Expr [ "," ("shrink:" Expr | "pad:" Expr "=" Expr) ] "}" }`
    fn parse_index(&mut self) -> PResult<Expr> {
        let mut target = self.parse_view()?;
        while self.at_adjacent(&TokenKind::LBrace) {
            self.advance();
            let (indices, mode) = self.grouped(|p| {
                let indices = p.parse_expr()?;
                let mode = if p.eat(&TokenKind::Comma) {
                    p.parse_index_mode()?
                } else {
                    IndexMode::Plain
                };
                Ok((indices, mode))
            })?;
            let close = self.expect(&TokenKind::RBrace)?.span;
            let span = target.span.merge(close);
            target = Expr::new(
                ExprKind::Index {
                    target: Box::new(target),
                    indices: Box::new(indices),
                    mode,
                },
                span,
            );
        }
        Ok(target)
    }

    fn parse_index_mode(&mut self) -> PResult<IndexMode> {
        if self.eat_word("shrink") {
            self.expect_adjacent_colon()?;
            let dimension = self.parse_expr()?;
            return Ok(IndexMode::Shrink {
                dimension: Box::new(dimension),
            });
        }
        if self.eat_word("pad") {
            self.expect_adjacent_colon()?;
            let dimension = self.parse_expr()?;
            self.expect(&TokenKind::Eq)?;
            let value = self.parse_expr()?;
            return Ok(IndexMode::Pad {
                dimension: Box::new(dimension),
                value: Box::new(value),
            });
        }
        Err(self.unexpected("'shrink:' or 'pad:'"))
    }

    fn expect_adjacent_colon(&mut self) -> PResult<()> {
        if self.at_adjacent(&TokenKind::Colon) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected("':' directly after the keyword"))
        }
    }

    /// `View = Accessor { "[" ViewSpec "]" }`; consecutive specs form one view.
    fn parse_view(&mut self) -> PResult<Expr> {
        let target = self.parse_accessor()?;
        if !self.at_adjacent(&TokenKind::LBracket) {
            return Ok(target);
        }
        let mut specs = Vec::new();
        let mut span = target.span;
        while self.at_adjacent(&TokenKind::LBracket) {
            let spec = self.parse_view_spec()?;
            span = span.merge(spec.span);
            specs.push(spec);
        }
        Ok(Expr::new(
            ExprKind::View {
                target: Box::new(target),
                specs,
            },
            span,
        ))
    }

    /// `ViewSpec = "[" [ ("*" | Expr) "$" ] [Expr] [ ":" [Expr] [ ":" [Expr] ] ] "]"`
    fn parse_view_spec(&mut self) -> PResult<ViewSpec> {
        let open = self.expect(&TokenKind::LBracket)?.span;
        let dimension = self.parse_view_dimension()?;

        let mut parts = vec![self.parse_optional_bound()?];
        while parts.len() < 3 {
            if self.eat(&TokenKind::Colon) {
                parts.push(self.parse_optional_bound()?);
            } else if parts.len() == 1 && self.eat(&TokenKind::DoubleColon) {
                // `a[s::e]` leaves the step empty.
                parts.push(None);
                parts.push(self.parse_optional_bound()?);
            } else {
                break;
            }
        }
        let close = self.expect(&TokenKind::RBracket)?.span;

        let mut parts = parts.into_iter();
        let first = parts.next().flatten();
        let slice = match (parts.next(), parts.next()) {
            (None, _) => Slice::Single(first),
            (Some(end), None) => Slice::Range { start: first, end },
            (Some(step), Some(end)) => Slice::Stepped {
                start: first,
                step,
                end,
            },
        };
        Ok(ViewSpec {
            dimension,
            slice,
            span: open.merge(close),
        })
    }

    /// An optional `dim$` or `*$` prefix. A pinned dimension is an arbitrary
    /// expression, so it is tried and the cursor rewound when no `$` follows.
    fn parse_view_dimension(&mut self) -> PResult<Option<ViewDimension>> {
        if self.at(&TokenKind::Star)
            && self.peek_at(1).kind == TokenKind::Dollar
            && !self.peek_at(1).spaced
        {
            self.advance();
            self.advance();
            return Ok(Some(ViewDimension::Generic));
        }
        Ok(self.try_dimension()?.map(ViewDimension::Pinned))
    }

    /// Try `Expr "$"`. On a mismatch the cursor is restored and `None`
    /// returned; only budget exhaustion escapes.
    pub(crate) fn try_dimension(&mut self) -> PResult<Option<Expr>> {
        let saved = self.position();
        match self.parse_expr() {
            Ok(dim) if self.at_adjacent(&TokenKind::Dollar) => {
                self.advance();
                Ok(Some(dim))
            }
            Ok(_) | Err(Failure::Syntax(_)) => {
                self.rewind(saved);
                Ok(None)
            }
            Err(Failure::Budget) => Err(Failure::Budget),
        }
    }

    /// Run `f` inside brackets nested in a view bound, where `::` annotates
    /// units again.
    fn grouped<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let outer = std::mem::replace(&mut self.in_view_bound, false);
        let result = f(self);
        self.in_view_bound = outer;
        result
    }

    fn parse_optional_bound(&mut self) -> PResult<Option<Expr>> {
        match self.peek_kind() {
            TokenKind::Colon | TokenKind::DoubleColon | TokenKind::RBracket => Ok(None),
            _ => {
                let outer = std::mem::replace(&mut self.in_view_bound, true);
                let bound = self.parse_expr();
                self.in_view_bound = outer;
                bound.map(Some)
            }
        }
    }

    /// `Accessor = Traced { "." NAME }`
    fn parse_accessor(&mut self) -> PResult<Expr> {
        let mut target = self.parse_traced()?;
        while self.at_adjacent(&TokenKind::Dot) {
            self.advance();
            let name = self.expect_identifier()?;
            let Some(accessor) = Accessor::from_name(&name.name) else {
                return Err(self
                    .error_at(
                        ErrorCode::UNKNOWN_ACCESSOR,
                        format!("unknown accessor '{}'", name.name),
                        name.span,
                    )
                    .expecting("an accessor such as SHAPE or IS_ARRAY")
                    .into());
            };
            let span = target.span.merge(name.span);
            target = Expr::new(
                ExprKind::Accessor {
                    target: Box::new(target),
                    accessor,
                },
                span,
            );
        }
        Ok(target)
    }

    /// `Traced = Atom ["?"]`
    fn parse_traced(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_atom()?;
        if self.at_adjacent(&TokenKind::Question) {
            let mark = self.advance().span;
            expr.traced = true;
            expr.span = expr.span.merge(mark);
        }
        Ok(expr)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Atoms
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_atom(&mut self) -> PResult<Expr> {
        match self.peek_kind().clone() {
            TokenKind::LBracket => self.grouped(|p| p.parse_array()),
            TokenKind::At => self.parse_wrap(),
            TokenKind::Number(text) => self.parse_number(text),
            TokenKind::Minus
                if matches!(self.peek_at(1).kind, TokenKind::Number(_)) && !self.peek_at(1).spaced =>
            {
                let start = self.advance().span;
                let TokenKind::Number(text) = self.peek_kind().clone() else {
                    return Err(self.unexpected("number"));
                };
                let literal = self.parse_number(text)?;
                let span = start.merge(literal.span);
                Ok(negate(literal, span))
            }
            TokenKind::StringLit(value) => {
                let span = self.advance().span;
                Ok(Expr::new(ExprKind::StringLit(value), span))
            }
            TokenKind::LParen => self.grouped(|p| p.parse_paren()),
            TokenKind::Identifier(word) => match word.as_str() {
                "if" => self.parse_if(),
                "null" => Ok(Expr::new(ExprKind::Null, self.advance().span)),
                "default" => Ok(Expr::new(ExprKind::Default, self.advance().span)),
                "lambda" => {
                    let lambda = self.parse_lambda()?;
                    let span = lambda.span;
                    Ok(Expr::new(ExprKind::Lambda(Box::new(lambda)), span))
                }
                w if EXPRESSION_KEYWORDS.contains(&w) => Err(self.unexpected("expression")),
                _ => self.parse_name_or_call(),
            },
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Number literal with an optional `:: units` annotation. Inside a view
    /// bound `::` is left for the view (`a[0::n]`).
    fn parse_number(&mut self, text: String) -> PResult<Expr> {
        let mut span = self.advance().span;
        let value = text.parse::<f64>().map_err(|_| {
            self.error_at(
                ErrorCode::INVALID_NUMBER,
                format!("invalid number '{text}'"),
                span,
            )
        })?;
        let units = if !self.in_view_bound
            && self.at(&TokenKind::DoubleColon)
            && matches!(self.peek_at(1).kind, TokenKind::Identifier(_))
        {
            self.advance();
            let units = self.expect_identifier()?;
            span = span.merge(units.span);
            Some(units)
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Number(NumberLit { text, value, units }),
            span,
        ))
    }

    /// `[e1, e2, ...]` or `[gen for ... for ...]`
    fn parse_array(&mut self) -> PResult<Expr> {
        let open = self.expect(&TokenKind::LBracket)?.span;
        let first = self.parse_expr()?;
        if self.at_word("for") {
            let mut loops = Vec::new();
            while self.at_word("for") {
                loops.push(self.parse_comprehension_loop()?);
            }
            let close = self.expect(&TokenKind::RBracket)?.span;
            return Ok(Expr::new(
                ExprKind::Comprehension {
                    generator: Box::new(first),
                    loops,
                },
                open.merge(close),
            ));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_expr()?);
        }
        let close = self.expect(&TokenKind::RBracket)?.span;
        Ok(Expr::new(ExprKind::Array(items), open.merge(close)))
    }

    /// `for [dim$] var in start:[step:]end`
    fn parse_comprehension_loop(&mut self) -> PResult<ComprehensionLoop> {
        let start = self.expect_word("for")?;
        let dimension = self.try_dimension()?;
        let variable = self.expect_variable_name()?;
        self.expect_word("in")?;
        let (first, step, end) = self.parse_numeric_range()?;
        let span = start.merge(end.span);
        Ok(ComprehensionLoop {
            dimension,
            variable,
            start: first,
            step,
            end,
            span,
        })
    }

    /// `a:b` or `a:s:b`, returned as (start, step, end).
    pub(crate) fn parse_numeric_range(&mut self) -> PResult<(Expr, Option<Expr>, Expr)> {
        let start = self.parse_expr()?;
        self.expect(&TokenKind::Colon)?;
        let second = self.parse_expr()?;
        if self.eat(&TokenKind::Colon) {
            let end = self.parse_expr()?;
            Ok((start, Some(second), end))
        } else {
            Ok((start, None, second))
        }
    }

    /// `@N:op` where op is an infix symbol, `not`, or `MathML:fn`.
    fn parse_wrap(&mut self) -> PResult<Expr> {
        let start = self.expect(&TokenKind::At)?.span;
        let arity = match self.peek_kind().clone() {
            TokenKind::Number(text) if !self.peek().spaced => {
                let span = self.advance().span;
                text.parse::<usize>().map_err(|_| {
                    self.error_at(
                        ErrorCode::INVALID_NUMBER,
                        format!("operand count must be a whole number, got '{text}'"),
                        span,
                    )
                })?
            }
            _ => return Err(self.unexpected("operand count directly after '@'")),
        };
        self.expect_adjacent_colon()?;

        let op_span = self.current_span();
        let op = if let Some(symbol) = self.peek_kind().operator_symbol() {
            self.advance();
            Operator::from_symbol(symbol)
        } else if self.eat_word("not") {
            Some(Operator::Not)
        } else if self.at_word("MathML") && self.at_mathml_member() {
            self.advance();
            self.advance();
            let name = self.expect_identifier()?;
            Some(self.mathml_function(&name)?)
        } else {
            None
        };
        let Some(op) = op else {
            return Err(self
                .error_at(
                    ErrorCode::UNKNOWN_OPERATOR,
                    format!("cannot wrap '{}'", self.peek_kind()),
                    op_span,
                )
                .expecting("an operator or MathML:function")
                .into());
        };
        Ok(Expr::new(
            ExprKind::Wrap { arity, op },
            start.merge(self.previous_span()),
        ))
    }

    /// `if c then a else b`
    fn parse_if(&mut self) -> PResult<Expr> {
        let start = self.expect_word("if")?;
        let condition = self.parse_expr()?;
        self.expect_word("then")?;
        let then_branch = self.parse_expr()?;
        self.expect_word("else")?;
        let else_branch = self.parse_expr()?;
        let span = start.merge(else_branch.span);
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    /// `lambda p1, p2=e: expr` or `lambda p1 { stmts }`
    pub(crate) fn parse_lambda(&mut self) -> PResult<Lambda> {
        let start = self.expect_word("lambda")?;
        let params = self.parse_param_list(|p| {
            matches!(
                p.peek_kind(),
                TokenKind::Colon | TokenKind::LBrace | TokenKind::Newline
            )
        })?;
        let body = self.parse_function_body()?;
        Ok(Lambda {
            params,
            body,
            span: start.merge(self.previous_span()),
        })
    }

    /// Comma-separated `name[=default]` list, possibly empty.
    pub(crate) fn parse_param_list(&mut self, at_end: fn(&Self) -> bool) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if at_end(self) {
            return Ok(params);
        }
        loop {
            let name = self.expect_variable_name()?;
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(&TokenKind::Comma) {
                return Ok(params);
            }
        }
    }

    /// `: expr` or a braced statement block.
    pub(crate) fn parse_function_body(&mut self) -> PResult<LambdaBody> {
        if self.eat(&TokenKind::Colon) {
            return Ok(LambdaBody::Expr(Box::new(self.parse_expr()?)));
        }
        if self.at_after_newlines(&TokenKind::LBrace) {
            return Ok(LambdaBody::Block(self.parse_block()?));
        }
        Err(self.unexpected("':' or '{'"))
    }

    /// `(e)` grouping, `(e,)` or `(e1, e2, ...)` tuple.
    fn parse_paren(&mut self) -> PResult<Expr> {
        let open = self.expect(&TokenKind::LParen)?.span;
        let first = self.parse_expr()?;
        if !self.eat(&TokenKind::Comma) {
            self.expect(&TokenKind::RParen)?;
            return Ok(first);
        }
        let mut items = vec![first];
        if !self.at(&TokenKind::RParen) {
            loop {
                items.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(&TokenKind::RParen)?.span;
        Ok(Expr::new(ExprKind::Tuple(items), open.merge(close)))
    }

    /// Variable reference or function call. `p:name` is read as one
    /// qualified name only when `p` is a known prefix; `MathML:` names
    /// resolve to constants and built-in functions.
    fn parse_name_or_call(&mut self) -> PResult<Expr> {
        let first = self.expect_identifier()?;
        let mut name = first.clone();
        if self.context.prefixes.contains(&first.name) && self.at_qualified_member() {
            self.advance();
            let member = self.expect_identifier()?;
            if first.name == "MathML" {
                return self.parse_mathml(member, first.span);
            }
            name = Ident::new(
                format!("{}:{}", first.name, member.name),
                first.span.merge(member.span),
            );
        }

        if !self.at_adjacent(&TokenKind::LParen) {
            return Ok(Expr::new(ExprKind::Variable(name.name), name.span));
        }
        self.advance();
        let args = self.grouped(|p| p.parse_call_args())?;
        let span = name.span.merge(self.previous_span());
        Ok(Expr::new(ExprKind::FunctionCall { callee: name, args }, span))
    }

    /// `MathML:pi` or `MathML:fn(args)`.
    fn parse_mathml(&mut self, member: Ident, start: Span) -> PResult<Expr> {
        if let Some(constant) = Constant::from_name(&member.name) {
            return Ok(Expr::new(ExprKind::Constant(constant), start.merge(member.span)));
        }
        let op = self.mathml_function(&member)?;
        if !self.at_adjacent(&TokenKind::LParen) {
            return Err(self.unexpected("'(' after a MathML function"));
        }
        self.advance();
        let operands = self.grouped(|p| p.parse_call_args())?;
        let span = start.merge(self.previous_span());
        Ok(Expr::new(ExprKind::Operator { op, operands }, span))
    }

    fn mathml_function(&self, name: &Ident) -> PResult<Operator> {
        Operator::from_mathml_function(&name.name).ok_or_else(|| {
            self.error_at(
                ErrorCode::UNKNOWN_OPERATOR,
                format!("unknown MathML function '{}'", name.name),
                name.span,
            )
            .into()
        })
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    /// At `MathML`, followed by adjacent `:` and an adjacent identifier.
    fn at_mathml_member(&self) -> bool {
        self.peek_at(1).kind == TokenKind::Colon
            && !self.peek_at(1).spaced
            && matches!(self.peek_at(2).kind, TokenKind::Identifier(_))
            && !self.peek_at(2).spaced
    }

    /// After a prefix word: adjacent `:` then an adjacent identifier.
    fn at_qualified_member(&self) -> bool {
        self.at_adjacent(&TokenKind::Colon)
            && matches!(self.peek_at(1).kind, TokenKind::Identifier(_))
            && !self.peek_at(1).spaced
    }

    /// An identifier usable as a variable: not an expression keyword.
    pub(crate) fn expect_variable_name(&mut self) -> PResult<Ident> {
        match self.peek_kind() {
            TokenKind::Identifier(word) if !EXPRESSION_KEYWORDS.contains(&word.as_str()) => {
                self.expect_identifier()
            }
            _ => Err(self.unexpected("name")),
        }
    }
}

fn binary(op: Operator, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Operator {
            op,
            operands: vec![left, right],
        },
        span,
    )
}

/// Apply unary minus, folding it into a plain number literal.
fn negate(operand: Expr, span: Span) -> Expr {
    if let ExprKind::Number(lit) = &operand.kind {
        if lit.units.is_none() && !operand.traced {
            let text = match lit.text.strip_prefix('-') {
                Some(positive) => positive.to_string(),
                None => format!("-{}", lit.text),
            };
            return Expr::new(
                ExprKind::Number(NumberLit {
                    text,
                    value: -lit.value,
                    units: None,
                }),
                span,
            );
        }
    }
    Expr::new(
        ExprKind::Operator {
            op: Operator::Minus,
            operands: vec![operand],
        },
        span,
    )
}
