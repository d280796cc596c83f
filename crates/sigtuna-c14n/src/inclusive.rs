#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0.
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - Outputs namespace declarations sorted by prefix (default first)
//! - Outputs attributes sorted by (namespace URI, local name)
//! - Escapes text and attribute values per C14N rules
//! - Optionally preserves or strips comments
//! - Supports document-subset canonicalization via NodeSet

use crate::escape;
use crate::render::{Attr, NsDecl};
use sigtuna_core::Error;
use sigtuna_xml::nodeset::NodeSet;
use std::collections::BTreeMap;

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        with_comments,
        node_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl C14nContext<'_> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        match self.node_set {
            None => true,
            Some(ns) => ns.contains(node),
        }
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, inherited_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, inherited_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    document_level_separator(node, output, true);
                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");
                    document_level_separator(node, output, false);
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    document_level_separator(node, output, true);
                    output.extend_from_slice(b"<?");
                    if let Some(pi) = node.pi() {
                        output.extend_from_slice(pi.target.as_bytes());
                        if let Some(value) = pi.value {
                            if !value.is_empty() {
                                output.push(b' ');
                                output.extend_from_slice(escape::escape_pi(value).as_bytes());
                            }
                        }
                    }
                    output.extend_from_slice(b"?>");
                    document_level_separator(node, output, false);
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(&node) {
            // Invisible element: children in the node-set are still emitted,
            // and they inherit the rendered-namespace context of the nearest
            // visible ancestor, not of this element.
            for child in node.children() {
                self.process_node(child, output, inherited_ns)?;
            }
            return Ok(());
        }

        // All namespaces in scope here; a declaration is rendered when it
        // differs from what the nearest visible ancestor already rendered.
        let current_ns = collect_inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for (prefix, uri) in &current_ns {
            if prefix == "xml" {
                continue;
            }
            if inherited_ns.get(prefix) != Some(uri) {
                ns_decls.push(NsDecl {
                    prefix: prefix.clone(),
                    uri: uri.clone(),
                });
            }
        }
        ns_decls.sort();

        let mut attrs = collect_attrs(&node);

        // xml:* attributes are inherited from ancestors when the immediate
        // parent is not in the node-set (document-subset rule).
        if self.node_set.is_some() {
            let parent_not_visible = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(&p));
            if parent_not_visible {
                let extra = inherited_xml_attrs(&node, &attrs);
                attrs.extend(extra);
            }
        }
        attrs.sort();

        let elem_name = qualified_element_name(&node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        let mut child_ns = inherited_ns.clone();
        for (prefix, uri) in &current_ns {
            if prefix != "xml" {
                child_ns.insert(prefix.clone(), uri.clone());
            }
        }
        for child in node.children() {
            self.process_node(child, output, &child_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

/// Comments and PIs between the prolog, document element and trailer get
/// newline separators in the canonical form.
fn document_level_separator(node: roxmltree::Node<'_, '_>, output: &mut Vec<u8>, before: bool) {
    let parent_is_root = node
        .parent()
        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);
    if !parent_is_root {
        return;
    }
    if before {
        if node.prev_siblings().any(|s| s.is_element()) {
            output.push(b'\n');
        }
    } else if node.next_siblings().any(|s| s.is_element()) {
        output.push(b'\n');
    }
}

/// Collect all in-scope namespaces for an element, nearest declaration wins.
pub(crate) fn collect_inscope_namespaces(
    node: &roxmltree::Node<'_, '_>,
) -> BTreeMap<String, String> {
    let mut ns_stack: Vec<BTreeMap<String, String>> = Vec::new();

    let mut current = Some(*node);
    while let Some(n) = current {
        if n.is_element() {
            let mut level = BTreeMap::new();
            for ns in n.namespaces() {
                let prefix = ns.name().unwrap_or("").to_owned();
                level.insert(prefix, ns.uri().to_owned());
            }
            ns_stack.push(level);
        }
        current = n.parent();
    }

    let mut result = BTreeMap::new();
    for level in ns_stack.into_iter().rev() {
        for (prefix, uri) in level {
            if uri.is_empty() {
                result.remove(&prefix);
            } else {
                result.insert(prefix, uri);
            }
        }
    }
    result
}

/// Collect the element's attributes (namespace declarations are not
/// attributes in the data model and are handled separately).
pub(crate) fn collect_attrs(node: &roxmltree::Node<'_, '_>) -> Vec<Attr> {
    let mut attrs = Vec::new();
    for attr in node.attributes() {
        let ns_uri = attr.namespace().unwrap_or("");
        let qname = match attr_prefix(node, ns_uri) {
            Some(prefix) => format!("{}:{}", prefix, attr.name()),
            None => attr.name().to_owned(),
        };
        attrs.push(Attr {
            ns_uri: ns_uri.to_owned(),
            local_name: attr.name().to_owned(),
            qualified_name: qname,
            value: attr.value().to_owned(),
        });
    }
    attrs
}

/// Find a prefix for a namespaced attribute. Unqualified attributes have no
/// namespace, so any non-empty URI is bound to some in-scope prefix.
fn attr_prefix<'a>(node: &roxmltree::Node<'a, '_>, ns_uri: &str) -> Option<&'a str> {
    if ns_uri.is_empty() {
        return None;
    }
    if ns_uri == sigtuna_core::ns::XML {
        return Some("xml");
    }
    node.namespaces()
        .find(|ns| ns.uri() == ns_uri && ns.name().is_some())
        .and_then(|ns| ns.name())
}

/// The qualified element name exactly as it appears in the source text.
pub(crate) fn qualified_element_name(node: &roxmltree::Node<'_, '_>) -> String {
    let text = node.document().input_text();
    let tag = &text[node.range()];
    let tag = tag.strip_prefix('<').unwrap_or(tag);
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(tag.len());
    tag[..end].to_owned()
}

/// For document-subset C14N: collect xml:* attributes from all ancestors,
/// nearest value winning, minus those already on the element itself.
fn inherited_xml_attrs(node: &roxmltree::Node<'_, '_>, existing_attrs: &[Attr]) -> Vec<Attr> {
    let xml_ns = sigtuna_core::ns::XML;
    let mut inherited: BTreeMap<String, String> = BTreeMap::new();

    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.is_element() {
            for attr in ancestor.attributes() {
                if attr.namespace() == Some(xml_ns) && !inherited.contains_key(attr.name()) {
                    inherited.insert(attr.name().to_owned(), attr.value().to_owned());
                }
            }
        }
        current = ancestor.parent();
    }

    let mut result = Vec::new();
    for (name, value) in &inherited {
        let already_present = existing_attrs
            .iter()
            .any(|a| a.ns_uri == xml_ns && a.local_name == *name);
        if !already_present {
            result.push(Attr {
                ns_uri: xml_ns.to_owned(),
                local_name: name.clone(),
                qualified_name: format!("xml:{name}"),
                value: value.clone(),
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None).unwrap()).unwrap()
    }

    #[test]
    fn attributes_are_sorted() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn empty_elements_become_pairs() {
        assert_eq!(c14n("<root><a/></root>"), "<root><a></a></root>");
    }

    #[test]
    fn namespace_declarations_are_rendered_once() {
        let out = c14n(r#"<root xmlns:a="http://a"><a:child><a:sub/></a:child></root>"#);
        assert_eq!(
            out,
            r#"<root xmlns:a="http://a"><a:child><a:sub></a:sub></a:child></root>"#
        );
    }

    #[test]
    fn text_escaping_is_preserved() {
        assert_eq!(
            c14n("<root>a &amp; b &lt; c</root>"),
            "<root>a &amp; b &lt; c</root>"
        );
    }

    #[test]
    fn subtree_canonicalization_renders_inscope_namespaces() {
        let xml = r#"<root xmlns:p="http://p"><p:child attr="v">t</p:child></root>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let child = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "child")
            .unwrap();
        let ns = NodeSet::tree_without_comments(child);
        let out = String::from_utf8(canonicalize(&doc, false, Some(&ns)).unwrap()).unwrap();
        assert_eq!(out, r#"<p:child xmlns:p="http://p" attr="v">t</p:child>"#);
    }

    #[test]
    fn comments_stripped_without_comments_mode() {
        assert_eq!(c14n("<root><!-- gone --><a/></root>"), "<root><a></a></root>");
    }
}
