#![forbid(unsafe_code)]

//! Owned XML document with per-document ID registration.
//!
//! The ID map is rebuilt from scratch for every parse, so id values from one
//! verification can never leak into the next.

use sigtuna_core::Error;
use std::collections::HashMap;

/// An owned XML document. Stores the text; the parsed tree is produced on
/// demand and borrows from it.
pub struct XmlDocument {
    text: String,
    /// Additional ID attribute names to register (beyond `Id`, `ID`, `id`).
    extra_id_attrs: Vec<String>,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        let _doc = roxmltree::Document::parse_with_options(&text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        Ok(Self {
            text,
            extra_id_attrs: Vec::new(),
        })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?
            .to_owned();
        Self::parse(text)
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Register an additional ID attribute name (e.g. `wsu:Id`).
    pub fn add_id_attr(&mut self, name: &str) {
        self.extra_id_attrs.push(name.to_owned());
    }

    /// Parse the document and return a temporary `Document`.
    ///
    /// Re-parses the stored text. Call once at the top of a processing
    /// pipeline and pass the reference down.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        roxmltree::Document::parse_with_options(&self.text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))
    }

    /// Build the ID → node mapping for a parsed document.
    ///
    /// Duplicate ID values are rejected outright: signature wrapping attacks
    /// rely on a second element claiming an already-registered id.
    pub fn build_id_map(
        &self,
        doc: &roxmltree::Document<'_>,
    ) -> Result<HashMap<String, roxmltree::NodeId>, Error> {
        let extra: Vec<&str> = self.extra_id_attrs.iter().map(|s| s.as_str()).collect();
        build_id_map(doc, &extra)
    }
}

/// Build an ID map over a parsed document, registering the default ID
/// attribute names plus any extras. Fails on duplicate id values.
pub fn build_id_map(
    doc: &roxmltree::Document<'_>,
    extra_id_attrs: &[&str],
) -> Result<HashMap<String, roxmltree::NodeId>, Error> {
    let mut attr_names: Vec<&str> = vec!["Id", "ID", "id"];
    attr_names.extend(extra_id_attrs);

    let mut map = HashMap::new();
    for node in doc.descendants() {
        if !node.is_element() {
            continue;
        }
        for attr_name in &attr_names {
            if let Some(val) = node.attribute(*attr_name) {
                if map.insert(val.to_owned(), node.id()).is_some() {
                    return Err(Error::XmlStructure(format!("duplicate ID: {val}")));
                }
            }
        }
        if let Some(val) = node.attribute(("http://www.w3.org/XML/1998/namespace", "id")) {
            if map.insert(val.to_owned(), node.id()).is_some() {
                return Err(Error::XmlStructure(format!("duplicate ID: {val}")));
            }
        }
    }
    Ok(map)
}

/// Find the first descendant element with the given local name and namespace.
pub fn find_element<'a>(
    doc: &'a roxmltree::Document<'a>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    doc.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}

/// Find all descendant elements with the given local name and namespace.
pub fn find_elements<'a>(
    doc: &'a roxmltree::Document<'a>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'a>> {
    doc.descendants()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .collect()
}

/// Find the first direct child element with the given local name and namespace.
pub fn find_child_element<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}

/// Find all direct child elements with the given local name and namespace.
pub fn find_child_elements<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'a>> {
    parent
        .children()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .collect()
}

/// Find a direct child element with the given local name in any of the
/// provided namespaces. Used where both XAdES v1.3.2 and legacy v1.1.1
/// documents must be accepted.
pub fn find_child_element_ns_any<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uris: &[&str],
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && ns_uris.contains(&n.tag_name().namespace().unwrap_or(""))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_map_registers_default_attrs() {
        let doc = XmlDocument::parse(
            r#"<root><a Id="one"/><b ID="two"/><c id="three"/></root>"#.to_owned(),
        )
        .unwrap();
        let parsed = doc.parse_doc().unwrap();
        let map = doc.build_id_map(&parsed).unwrap();
        assert_eq!(map.len(), 3);
        assert!(map.contains_key("one"));
        assert!(map.contains_key("two"));
        assert!(map.contains_key("three"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let doc =
            XmlDocument::parse(r#"<root><a Id="x"/><b Id="x"/></root>"#.to_owned()).unwrap();
        let parsed = doc.parse_doc().unwrap();
        assert!(doc.build_id_map(&parsed).is_err());
    }

    #[test]
    fn id_map_is_rebuilt_per_document() {
        let first = XmlDocument::parse(r#"<root><a Id="x"/></root>"#.to_owned()).unwrap();
        let parsed = first.parse_doc().unwrap();
        let _ = first.build_id_map(&parsed).unwrap();

        let second = XmlDocument::parse(r#"<root><b Id="y"/></root>"#.to_owned()).unwrap();
        let parsed = second.parse_doc().unwrap();
        let map = second.build_id_map(&parsed).unwrap();
        assert!(!map.contains_key("x"));
        assert!(map.contains_key("y"));
    }
}
