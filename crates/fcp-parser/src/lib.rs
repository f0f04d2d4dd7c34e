//! FCP parser: converts protocol source text into a typed syntax tree.
//!
//! Parsing is fail-fast: the first error ends the parse and is reported with
//! its byte offset and, where known, the alternative the grammar expected.

mod parse_expr;
mod parse_protocol;
mod parse_stmt;
mod parser;

pub use parser::{parse_expression, parse_protocol, parse_statements, ParserConfig};
