//! The structured document tree.
//!
//! A protocol document is a tree of namespace-qualified elements. Each
//! element may carry attributes, text content and child elements, plus the
//! source location it was built from.

use serde::{Deserialize, Serialize};

/// The protocol language namespace.
pub const PROTO_NS: &str = "https://chaste.cs.ox.ac.uk/nss/protocol/0.1#";
/// Base URL for protocol-defined MathML csymbols.
pub const PROTO_CSYM_BASE: &str = "https://chaste.cs.ox.ac.uk/nss/protocol/";
pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
pub const CELLML_NS: &str = "http://www.cellml.org/cellml/1.0#";

/// The namespaces a document element can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Protocol,
    MathMl,
    CellMl,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Protocol, Namespace::MathMl, Namespace::CellMl];

    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Protocol => PROTO_NS,
            Namespace::MathMl => MATHML_NS,
            Namespace::CellMl => CELLML_NS,
        }
    }

    /// The prefix used for this namespace in XML output.
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Protocol => "proto",
            Namespace::MathMl => "m",
            Namespace::CellMl => "cellml",
        }
    }
}

/// One document element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub ns: Namespace,
    pub name: String,
    /// Attributes in insertion order. Keys may be prefixed (`cellml:units`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    /// `file:line:col<TAB>source line` of the construct this came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,
}

impl Element {
    pub fn new(ns: Namespace, name: impl Into<String>) -> Self {
        Self {
            ns,
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            loc: None,
        }
    }

    pub fn proto(name: impl Into<String>) -> Self {
        Self::new(Namespace::Protocol, name)
    }

    pub fn mathml(name: impl Into<String>) -> Self {
        Self::new(Namespace::MathMl, name)
    }

    pub fn cellml(name: impl Into<String>) -> Self {
        Self::new(Namespace::CellMl, name)
    }

    /// A protocol csymbol: `<csymbol definitionURL=".../name">`.
    pub fn csymbol(symbol: &str) -> Self {
        Self::mathml("csymbol").attr("definitionURL", format!("{PROTO_CSYM_BASE}{symbol}"))
    }

    // ── Builders ────────────────────────────────────────────────────────────

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn at(mut self, loc: impl Into<String>) -> Self {
        self.loc = Some(loc.into());
        self
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given local name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The csymbol this element names, if it is a protocol csymbol.
    pub fn csymbol_name(&self) -> Option<&str> {
        if self.ns != Namespace::MathMl || self.name != "csymbol" {
            return None;
        }
        self.attribute("definitionURL")?.strip_prefix(PROTO_CSYM_BASE)
    }

    /// Number of elements in this subtree, including this one.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Element::size).sum::<usize>()
    }

    /// Drop every `loc` in the subtree, for comparisons that ignore
    /// provenance.
    pub fn strip_locations(&mut self) {
        self.loc = None;
        for child in &mut self.children {
            child.strip_locations();
        }
    }

    pub fn without_locations(&self) -> Element {
        let mut copy = self.clone();
        copy.strip_locations();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csymbol_name() {
        let sym = Element::csymbol("newArray");
        assert_eq!(sym.csymbol_name(), Some("newArray"));
        assert_eq!(Element::mathml("ci").csymbol_name(), None);
    }

    #[test]
    fn test_strip_locations_is_deep() {
        let tree = Element::proto("inputs")
            .at("a.txt:1:1\tinputs {")
            .child(Element::mathml("cn").with_text("1").at("a.txt:2:5\t  x = 1"));
        let stripped = tree.without_locations();
        assert!(stripped.loc.is_none());
        assert!(stripped.children[0].loc.is_none());
        assert_eq!(tree.size(), 2);
    }

    #[test]
    fn test_json_omits_empty_fields() {
        let json = serde_json::to_value(Element::mathml("pi")).unwrap();
        assert_eq!(json, serde_json::json!({"ns": "mathml", "name": "pi"}));
    }
}
