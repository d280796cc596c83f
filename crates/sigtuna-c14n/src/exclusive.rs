#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! The key difference from inclusive C14N: only "visibly utilized" namespace
//! declarations are output. A namespace is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.

use crate::inclusive::{collect_attrs, collect_inscope_namespaces, qualified_element_name};
use crate::render::NsDecl;
use crate::escape;
use sigtuna_core::Error;
use sigtuna_xml::nodeset::NodeSet;
use std::collections::{BTreeMap, HashSet};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let prefix_set: HashSet<String> = inclusive_prefixes.iter().cloned().collect();
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        with_comments,
        node_set,
        inclusive_prefixes: prefix_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: HashSet<String>,
}

impl ExcC14nContext<'_> {
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
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, rendered_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
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
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(&node) {
            // Exclusive C14N renders namespace declarations only on visible
            // element start tags; invisible elements pass the rendered
            // context through unchanged.
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        let elem_name = qualified_element_name(&node);

        // Visibly utilized prefixes for this element.
        let mut utilized: HashSet<String> = HashSet::new();
        utilized.insert(prefix_of(&elem_name).to_owned());
        let attrs = {
            let mut attrs = collect_attrs(&node);
            attrs.sort();
            attrs
        };
        for attr in &attrs {
            let p = prefix_of(&attr.qualified_name);
            if !p.is_empty() {
                utilized.insert(p.to_owned());
            }
        }
        for p in &self.inclusive_prefixes {
            if p == "#default" {
                utilized.insert(String::new());
            } else {
                utilized.insert(p.clone());
            }
        }

        let inscope_ns = collect_inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            if let Some(uri) = inscope_ns.get(prefix.as_str()) {
                if rendered_ns.get(prefix.as_str()) != Some(uri) {
                    ns_decls.push(NsDecl {
                        prefix: prefix.clone(),
                        uri: uri.clone(),
                    });
                }
            } else if prefix.is_empty() {
                // The element is in no namespace but a default namespace was
                // previously rendered: undeclare it.
                if rendered_ns.get("").is_some_and(|u| !u.is_empty()) {
                    ns_decls.push(NsDecl {
                        prefix: String::new(),
                        uri: String::new(),
                    });
                }
            }
        }
        ns_decls.sort();

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        let mut child_rendered = rendered_ns.clone();
        for ns_decl in &ns_decls {
            child_rendered.insert(ns_decl.prefix.clone(), ns_decl.uri.clone());
        }
        for child in node.children() {
            self.process_node(child, output, &child_rendered)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

fn prefix_of(qname: &str) -> &str {
    match qname.split_once(':') {
        Some((prefix, _)) => prefix,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc_c14n(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, false, None, &[]).unwrap()).unwrap()
    }

    #[test]
    fn unused_namespaces_are_dropped() {
        let out = exc_c14n(r#"<root xmlns:unused="http://u" xmlns:p="http://p"><p:a/></root>"#);
        assert_eq!(out, r#"<root><p:a xmlns:p="http://p"></p:a></root>"#);
    }

    #[test]
    fn namespace_rendered_at_first_use_only() {
        let out = exc_c14n(r#"<p:root xmlns:p="http://p"><p:a><p:b/></p:a></p:root>"#);
        assert_eq!(
            out,
            r#"<p:root xmlns:p="http://p"><p:a><p:b></p:b></p:a></p:root>"#
        );
    }

    #[test]
    fn subtree_does_not_inherit_unutilized_ancestor_namespaces() {
        let xml = r#"<root xmlns:o="http://outer"><child a="1">x</child></root>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let child = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "child")
            .unwrap();
        let ns = NodeSet::tree_without_comments(child);
        let out =
            String::from_utf8(canonicalize(&doc, false, Some(&ns), &[]).unwrap()).unwrap();
        assert_eq!(out, r#"<child a="1">x</child>"#);
    }
}
