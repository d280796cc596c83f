#![forbid(unsafe_code)]

//! NodeSet type for canonicalization and transforms.
//!
//! A `NodeSet` is the set of document nodes visible to a canonicalizer,
//! identified by their position in the `roxmltree` arena. Supports the
//! operations XAdES processing needs: whole-document selection (with or
//! without comments), subtree selection for same-document references, and
//! subtree removal for the enveloped-signature transform.

use std::collections::HashSet;

/// A set of XML document nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self {
            nodes: HashSet::new(),
        }
    }

    /// Create a node set containing all nodes in the document.
    pub fn all(doc: &roxmltree::Document<'_>) -> Self {
        let nodes = doc.descendants().map(node_index).collect();
        Self { nodes }
    }

    /// All nodes except comments. Per the W3C DSig spec, `URI=""` selects
    /// the document without comments.
    pub fn all_without_comments(doc: &roxmltree::Document<'_>) -> Self {
        let nodes = doc
            .descendants()
            .filter(|n| !n.is_comment())
            .map(node_index)
            .collect();
        Self { nodes }
    }

    /// Subtree rooted at the given node, excluding comments.
    pub fn tree_without_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let nodes = root
            .descendants()
            .filter(|n| !n.is_comment())
            .map(node_index)
            .collect();
        Self { nodes }
    }

    /// Subtree rooted at the given node, including comments.
    pub fn tree_with_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let nodes = root.descendants().map(node_index).collect();
        Self { nodes }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node_index(*node))
    }

    /// Add a node.
    pub fn insert(&mut self, node: roxmltree::Node<'_, '_>) {
        self.nodes.insert(node_index(node));
    }

    /// Remove a node.
    pub fn remove(&mut self, node: roxmltree::Node<'_, '_>) {
        self.nodes.remove(&node_index(node));
    }

    /// Remove a node and all its descendants (enveloped-signature transform).
    pub fn remove_subtree(&mut self, root: roxmltree::Node<'_, '_>) {
        for n in root.descendants() {
            self.nodes.remove(&node_index(n));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Get a stable numeric index for a roxmltree node.
///
/// `roxmltree::NodeId` keeps its arena index private and does not implement
/// `Hash`; its `Debug` form is `NodeId(n)`, which we parse back out.
pub fn node_index(node: roxmltree::Node<'_, '_>) -> usize {
    let debug = format!("{:?}", node.id());
    debug
        .strip_prefix("NodeId(")
        .and_then(|s| s.strip_suffix(')'))
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_removal_excludes_descendants() {
        let xml = r#"<root><keep>x</keep><drop><inner>y</inner></drop></root>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let mut ns = NodeSet::all(&doc);
        let drop = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "drop")
            .unwrap();
        ns.remove_subtree(drop);

        assert!(!ns.contains(&drop));
        let inner = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "inner")
            .unwrap();
        assert!(!ns.contains(&inner));
        let keep = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "keep")
            .unwrap();
        assert!(ns.contains(&keep));
    }

    #[test]
    fn all_without_comments_drops_comment_nodes() {
        let xml = r#"<root><!-- note --><a/></root>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let ns = NodeSet::all_without_comments(&doc);
        let comment = doc.descendants().find(|n| n.is_comment()).unwrap();
        assert!(!ns.contains(&comment));
    }
}
