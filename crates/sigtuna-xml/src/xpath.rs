#![forbid(unsafe_code)]

//! Minimal XPath subset for signature processing.
//!
//! Only the patterns XML-DSig actually uses: same-document URI references
//! (`#id-value`) and element lookup by registered ID. Elements are selected
//! directly from the typed tree during production; XPath-style predicate
//! strings are never built.

use sigtuna_core::Error;
use std::collections::HashMap;

/// Parse a same-document reference (e.g. `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// Resolve an ID value in a parsed document using a pre-built ID map.
pub fn resolve_id<'a>(
    doc: &'a roxmltree::Document<'a>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'a>, Error> {
    id_map
        .get(id)
        .and_then(|nid| doc.get_node(*nid))
        .ok_or_else(|| Error::InvalidUri(format!("ID not found: {id}")))
}

/// Check if `ancestor` is an ancestor-or-self of `node`.
pub fn is_ancestor_or_self(
    ancestor: roxmltree::Node<'_, '_>,
    node: roxmltree::Node<'_, '_>,
) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.id() == ancestor.id() {
            return true;
        }
        current = n.parent();
    }
    false
}
