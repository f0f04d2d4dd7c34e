//! Edge-case tests for the parser.
//!
//! Covers:
//! 1. Recursion budget escalation and the final recursion-limit error
//! 2. Deeply nested but valid input
//! 3. Newline handling inside brackets and blocks
//! 4. Error positions for unterminated constructs

use fcp_parser::{parse_expression, parse_protocol, parse_statements, ParserConfig};
use fcp_types::ast::*;
use fcp_types::{ErrorCode, SourceFile};
use pretty_assertions::assert_eq;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn config(recursion_budget: usize, max_escalations: u32) -> ParserConfig {
    ParserConfig {
        recursion_budget,
        max_escalations,
    }
}

fn nested_parens(depth: usize) -> String {
    format!("{}1{}", "(".repeat(depth), ")".repeat(depth))
}

fn minus_depth(expr: &Expr) -> usize {
    match &expr.kind {
        ExprKind::Operator {
            op: Operator::Minus,
            operands,
        } if operands.len() == 1 => 1 + minus_depth(&operands[0]),
        _ => 0,
    }
}

// ─────────────────────────────────────────────────────────────────────
// Recursion budget
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_exhausted_budget_without_escalation_fails() {
    let sf = SourceFile::new("deep.txt", nested_parens(6));
    let err = parse_expression(&sf, &config(4, 0)).unwrap_err();
    assert_eq!(err.code, ErrorCode::RECURSION_LIMIT);
    assert_eq!(err.file, "deep.txt");
}

#[test]
fn test_budget_escalation_recovers() {
    let sf = SourceFile::new("deep.txt", nested_parens(6));
    let expr = parse_expression(&sf, &config(4, 2)).unwrap();
    assert!(matches!(expr.kind, ExprKind::Number(ref n) if n.text == "1"));
}

#[test]
fn test_escalation_limit_is_respected() {
    // 4 → 8 → 16 is still too shallow for 40 levels.
    let sf = SourceFile::new("deep.txt", nested_parens(40));
    let err = parse_expression(&sf, &config(4, 2)).unwrap_err();
    assert_eq!(err.code, ErrorCode::RECURSION_LIMIT);
    assert!(err.message.contains("16"), "message was {:?}", err.message);
}

#[test]
fn test_default_budget_escalates_for_deep_input() {
    let sf = SourceFile::new("deep.txt", nested_parens(300));
    let expr = parse_expression(&sf, &ParserConfig::default()).unwrap();
    assert!(matches!(expr.kind, ExprKind::Number(_)));
}

#[test]
fn test_deep_unary_chain() {
    let source = format!("{}x", "- ".repeat(50));
    let sf = SourceFile::new("deep.txt", source);
    let expr = parse_expression(&sf, &config(16, 3)).unwrap();
    assert_eq!(minus_depth(&expr), 50);
}

#[test]
fn test_budget_applies_inside_protocols() {
    let source = format!("post-processing {{\n    x = {}\n}}\n", nested_parens(20));
    let sf = SourceFile::new("deep.txt", source);
    assert_eq!(
        parse_protocol(&sf, &config(8, 0)).unwrap_err().code,
        ErrorCode::RECURSION_LIMIT
    );
    assert!(parse_protocol(&sf, &config(8, 2)).is_ok());
}

// ─────────────────────────────────────────────────────────────────────
// Newlines
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_newlines_inside_brackets_are_ignored() {
    let sf = SourceFile::new(
        "t.txt",
        "x = f(1,\n      2)\ny = [1,\n     2,\n     3]\n",
    );
    let block = parse_statements(&sf, &ParserConfig::default()).unwrap();
    assert_eq!(block.stmts.len(), 2);
}

#[test]
fn test_blank_lines_and_comments_between_statements() {
    let sf = SourceFile::new("t.txt", "\n# leading\nx = 1\n\n\n# gap\ny = 2 # trailing\n");
    let block = parse_statements(&sf, &ParserConfig::default()).unwrap();
    assert_eq!(block.stmts.len(), 2);
}

#[test]
fn test_block_body_may_open_on_next_line() {
    let sf = SourceFile::new("t.txt", "def f(a)\n{\n    return a\n}\n");
    let block = parse_statements(&sf, &ParserConfig::default()).unwrap();
    match &block.stmts[0].kind {
        StmtKind::FunctionDef { lambda, .. } => {
            assert!(matches!(lambda.body, LambdaBody::Block(_)));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn test_statement_keywords_can_be_assigned() {
    let sf = SourceFile::new("t.txt", "return = 1\ndef, x = 2, 3\n");
    let block = parse_statements(&sf, &ParserConfig::default()).unwrap();
    match &block.stmts[0].kind {
        StmtKind::Assign { targets, .. } => assert_eq!(targets[0].name, "return"),
        other => panic!("{other:?}"),
    }
    match &block.stmts[1].kind {
        StmtKind::Assign { targets, .. } => assert_eq!(targets[0].name, "def"),
        other => panic!("{other:?}"),
    }
}

#[test]
fn test_expression_keywords_cannot_be_assigned() {
    let sf = SourceFile::new("t.txt", "in = 1\n");
    let err = parse_statements(&sf, &ParserConfig::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNEXPECTED_TOKEN);
    assert_eq!(err.expected.as_deref(), Some("name"));
}

// ─────────────────────────────────────────────────────────────────────
// Error positions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unclosed_section_brace() {
    let sf = SourceFile::new("t.txt", "inputs {\n    x = 1\n");
    let err = parse_protocol(&sf, &ParserConfig::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNCLOSED_DELIMITER);
}

#[test]
fn test_error_on_second_line_reports_that_line() {
    let sf = SourceFile::new("t.txt", "inputs {\n    x = )\n}\n");
    let err = parse_protocol(&sf, &ParserConfig::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNEXPECTED_TOKEN);
    assert_eq!(err.span.start_line, 2);
    assert_eq!(err.offset, 17);
    assert_eq!(err.source_line, "    x = )");
    assert_eq!(err.expected.as_deref(), Some("expression"));
}

#[test]
fn test_lexer_errors_surface_through_the_parser() {
    let sf = SourceFile::new("t.txt", "x = 1 & 2");
    let err = parse_statements(&sf, &ParserConfig::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNEXPECTED_CHARACTER);
}

#[test]
fn test_invalid_wrap_arity() {
    let sf = SourceFile::new("t.txt", "@1.5:+");
    let err = parse_expression(&sf, &ParserConfig::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_NUMBER);
}
