//! XML serialisation of document trees.
//!
//! The root element declares every namespace. Protocol elements are written
//! in the default namespace, MathML elements with `m:` and CellML elements
//! with `cellml:`. Source locations become `proto:loc` attributes.

use std::fmt::Write;

use crate::element::{Element, Namespace};

const INDENT: &str = "  ";

/// Render a complete XML document rooted at `root`.
pub fn to_xml(root: &Element) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(&mut out, root, 0, true);
    out
}

fn qualified_name(el: &Element) -> String {
    match el.ns {
        Namespace::Protocol => el.name.clone(),
        ns => format!("{}:{}", ns.prefix(), el.name),
    }
}

fn write_element(out: &mut String, el: &Element, depth: usize, root: bool) {
    let name = qualified_name(el);
    let pad = INDENT.repeat(depth);
    let _ = write!(out, "{pad}<{name}");
    if root {
        let _ = write!(out, " xmlns=\"{}\"", Namespace::Protocol.uri());
        for ns in Namespace::ALL {
            let _ = write!(out, " xmlns:{}=\"{}\"", ns.prefix(), ns.uri());
        }
    }
    for (key, value) in &el.attributes {
        let _ = write!(out, " {key}=\"{}\"", escape(value, true));
    }
    if let Some(loc) = &el.loc {
        let _ = write!(out, " proto:loc=\"{}\"", escape(loc, true));
    }

    match (&el.text, el.children.is_empty()) {
        (None, true) => out.push_str("/>\n"),
        (Some(text), true) => {
            let _ = writeln!(out, ">{}</{name}>", escape(text, false));
        }
        (text, false) => {
            out.push_str(">\n");
            if let Some(text) = text {
                let _ = writeln!(out, "{pad}{INDENT}{}", escape(text, false));
            }
            for child in &el.children {
                write_element(out, child, depth + 1, false);
            }
            let _ = writeln!(out, "{pad}</{name}>");
        }
    }
}

/// Escape markup characters. Attribute values also escape quotes and
/// whitespace control characters so they survive attribute normalisation.
fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            '\t' if attribute => escaped.push_str("&#9;"),
            '\n' if attribute => escaped.push_str("&#10;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a < b && c", false), "a &lt; b &amp;&amp; c");
        assert_eq!(escape("say \"hi\"\tnow", true), "say &quot;hi&quot;&#9;now");
        assert_eq!(escape("say \"hi\"", false), "say \"hi\"");
    }

    #[test]
    fn test_nested_output() {
        let doc = Element::proto("protocol").child(
            Element::mathml("apply")
                .child(Element::mathml("plus"))
                .child(Element::mathml("cn").with_text("1").at("p.txt:1:1\tx = 1")),
        );
        let xml = to_xml(&doc);
        let expected = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <protocol xmlns=\"{p}\" xmlns:proto=\"{p}\" xmlns:m=\"{m}\" xmlns:cellml=\"{c}\">\n\
             \x20 <m:apply>\n\
             \x20   <m:plus/>\n\
             \x20   <m:cn proto:loc=\"p.txt:1:1&#9;x = 1\">1</m:cn>\n\
             \x20 </m:apply>\n\
             </protocol>\n",
            p = Namespace::Protocol.uri(),
            m = Namespace::MathMl.uri(),
            c = Namespace::CellMl.uri(),
        );
        assert_eq!(xml, expected);
    }
}
