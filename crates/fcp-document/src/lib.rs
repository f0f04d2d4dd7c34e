//! FCP structured document: the namespaced element tree a protocol is
//! turned into after parsing.
//!
//! # Layers
//!
//! - [`element`]: the tree itself, with JSON (de)serialisation via serde
//! - [`emit`]: syntax tree → element tree, with source locations
//! - [`xml`]: element tree → XML text
//! - [`printer`]: syntax tree → compact protocol syntax
//!
//! Expressions use MathML with protocol csymbols for constructs MathML
//! lacks; units definitions use CellML; everything else lives in the
//! protocol namespace.

pub mod element;
pub mod emit;
pub mod error;
pub mod printer;
pub mod xml;

pub use element::{Element, Namespace};
pub use emit::{emit_expression, emit_protocol, emit_statements};
pub use error::{DocumentError, DocumentResult};
pub use printer::{print_expression, print_protocol, print_statements};
pub use xml::to_xml;

use fcp_parser::ParserConfig;
use fcp_types::SourceFile;

/// Parse a protocol file and build its document.
#[tracing::instrument(level = "debug", skip_all, fields(file = %source.name))]
pub fn build_document(source: &SourceFile, config: &ParserConfig) -> DocumentResult<Element> {
    let protocol = fcp_parser::parse_protocol(source, config)?;
    let document = emit_protocol(&protocol, source);
    tracing::debug!(elements = document.size(), "built protocol document");
    Ok(document)
}

impl Element {
    pub fn to_json(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> DocumentResult<Element> {
        Ok(serde_json::from_str(json)?)
    }
}
