//! Statement parsing.
//!
//! Statements are newline-separated. The leading words `assert`, `return`
//! and `def` are only keywords when they are not being assigned to.

use fcp_lexer::token::TokenKind;
use fcp_types::ast::*;

use crate::parser::{PResult, Parser};

impl<'src> Parser<'src> {
    /// A statement list running to the next `}` or end of input.
    pub(crate) fn parse_statement_list(&mut self) -> PResult<Block> {
        self.skip_newlines();
        let start = self.current_span();
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
            if !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
                self.expect(&TokenKind::Newline)?;
            }
            self.skip_newlines();
        }
        let span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => first.span.merge(last.span),
            _ => start,
        };
        Ok(Block { stmts, span })
    }

    /// `{ stmt (newline stmt)* }`
    pub(crate) fn parse_block(&mut self) -> PResult<Block> {
        let (stmts, span) = self.parse_braced(|p| p.parse_statement())?;
        Ok(Block { stmts, span })
    }

    /// `{ name = expr ... }`, used by `inputs` and import overrides.
    pub(crate) fn parse_simple_assignments(&mut self) -> PResult<Block> {
        let (stmts, span) = self.parse_braced(|p| p.parse_simple_assignment())?;
        Ok(Block { stmts, span })
    }

    pub(crate) fn parse_statement(&mut self) -> PResult<Stmt> {
        let assigning = matches!(
            self.peek_at(1).kind,
            TokenKind::Eq | TokenKind::Comma
        );
        if !assigning {
            if self.at_word("assert") {
                return self.parse_assert();
            }
            if self.at_word("return") {
                return self.parse_return();
            }
            if self.at_word("def") {
                return self.parse_function_def();
            }
        }
        self.parse_assignment()
    }

    /// `assert expr`
    fn parse_assert(&mut self) -> PResult<Stmt> {
        let start = self.expect_word("assert")?;
        let expr = self.parse_expr()?;
        let span = start.merge(expr.span);
        Ok(Stmt {
            kind: StmtKind::Assert(expr),
            span,
        })
    }

    /// `return e1, e2, ...`
    fn parse_return(&mut self) -> PResult<Stmt> {
        let start = self.expect_word("return")?;
        let values = self.parse_expr_list()?;
        Ok(Stmt {
            kind: StmtKind::Return(values),
            span: start.merge(self.previous_span()),
        })
    }

    /// `def f(params): expr` or `def f(params) { stmts }`
    fn parse_function_def(&mut self) -> PResult<Stmt> {
        let start = self.expect_word("def")?;
        let name = self.expect_variable_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_param_list(|p| p.at(&TokenKind::RParen))?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_function_body()?;
        let span = start.merge(self.previous_span());
        Ok(Stmt {
            kind: StmtKind::FunctionDef {
                name,
                lambda: Lambda { params, body, span },
            },
            span,
        })
    }

    /// `a = e` or `a, b = e1, e2`
    fn parse_assignment(&mut self) -> PResult<Stmt> {
        let start = self.current_span();
        let mut targets = vec![self.expect_variable_name()?];
        while self.eat(&TokenKind::Comma) {
            targets.push(self.expect_variable_name()?);
        }
        self.expect(&TokenKind::Eq)?;
        let values = self.parse_expr_list()?;
        Ok(Stmt {
            kind: StmtKind::Assign { targets, values },
            span: start.merge(self.previous_span()),
        })
    }

    /// `name = expr` with a single target.
    fn parse_simple_assignment(&mut self) -> PResult<Stmt> {
        let target = self.expect_variable_name()?;
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expr()?;
        let span = target.span.merge(value.span);
        Ok(Stmt {
            kind: StmtKind::Assign {
                targets: vec![target],
                values: vec![value],
            },
            span,
        })
    }

    fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut values = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma) {
            values.push(self.parse_expr()?);
        }
        Ok(values)
    }
}
