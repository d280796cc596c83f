#![forbid(unsafe_code)]

//! Text splicing over parsed documents.
//!
//! The document text is the source of truth for digests, so structural
//! edits (inserting a signature, appending unsigned properties) are done by
//! splicing serialized fragments into the original text at positions taken
//! from the parsed tree, never by re-serializing the DOM.

use sigtuna_core::{Error, Result};

/// The qualified name of an element exactly as written in the source.
pub fn element_qname(elem_text: &str) -> &str {
    let tag = elem_text.strip_prefix('<').unwrap_or(elem_text);
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(tag.len());
    &tag[..end]
}

/// Insert `fragment` as the last child of `node`, returning the new
/// document text. Self-closing elements are expanded into open/close pairs.
pub fn insert_child_fragment(
    xml: &str,
    node: roxmltree::Node<'_, '_>,
    fragment: &str,
) -> Result<String> {
    let range = node.range();
    let elem_text = &xml[range.clone()];
    let qname = element_qname(elem_text);

    let mut out = String::with_capacity(xml.len() + fragment.len() + qname.len() + 3);
    out.push_str(&xml[..range.start]);

    if let Some(stripped) = elem_text.strip_suffix("/>") {
        out.push_str(stripped.trim_end());
        out.push('>');
        out.push_str(fragment);
        out.push_str("</");
        out.push_str(qname);
        out.push('>');
    } else {
        let close_pos = elem_text.rfind("</").ok_or_else(|| {
            Error::XmlStructure(format!("element {qname} has no closing tag"))
        })?;
        out.push_str(&elem_text[..close_pos]);
        out.push_str(fragment);
        out.push_str(&elem_text[close_pos..]);
    }

    out.push_str(&xml[range.end..]);
    Ok(out)
}

/// The prefix an element was written with, if any.
pub fn element_prefix(elem_text: &str) -> Option<&str> {
    element_qname(elem_text).split_once(':').map(|(p, _)| p)
}

/// Build a qualified name using the prefix of an existing element.
pub fn qname_like(elem_text: &str, local: &str) -> String {
    match element_prefix(elem_text) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_owned(),
    }
}

/// Append a fragment under the signature's
/// `QualifyingProperties/UnsignedProperties/UnsignedSignatureProperties`,
/// creating the missing intermediate elements with the same prefix the
/// `QualifyingProperties` element uses. Unsigned properties are deliberately
/// outside `<SignedInfo>` coverage, so this never invalidates the signature.
pub fn insert_unsigned_property(xml: &str, sig_id: &str, fragment: &str) -> Result<String> {
    use sigtuna_core::ns;

    let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let sig = sigtuna_dsig::verify::find_signature(
        &doc,
        sigtuna_dsig::SignatureSelector::ById(sig_id),
    )?;
    let (qp, _) = crate::properties::find_qualifying_properties(sig)?;
    let qp_text = &xml[qp.range()];

    if let Some(usp) = crate::properties::find_unsigned_signature_properties(qp) {
        return insert_child_fragment(xml, usp, fragment);
    }

    let usp_qname = qname_like(qp_text, ns::node::UNSIGNED_SIGNATURE_PROPERTIES);
    let wrapped_usp = format!("<{usp_qname}>{fragment}</{usp_qname}>");

    if let Some(up) = sigtuna_xml::document::find_child_element_ns_any(
        qp,
        &crate::properties::XADES_NAMESPACES,
        ns::node::UNSIGNED_PROPERTIES,
    ) {
        return insert_child_fragment(xml, up, &wrapped_usp);
    }

    let up_qname = qname_like(qp_text, ns::node::UNSIGNED_PROPERTIES);
    let wrapped_up = format!("<{up_qname}>{wrapped_usp}</{up_qname}>");
    insert_child_fragment(xml, qp, &wrapped_up)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_named<'a>(
        doc: &'a roxmltree::Document<'a>,
        name: &str,
    ) -> roxmltree::Node<'a, 'a> {
        doc.descendants()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .unwrap()
    }

    #[test]
    fn fragment_lands_before_closing_tag() {
        let xml = "<root><a>x</a></root>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let root = node_named(&doc, "root");
        let out = insert_child_fragment(xml, root, "<b></b>").unwrap();
        assert_eq!(out, "<root><a>x</a><b></b></root>");
    }

    #[test]
    fn self_closing_elements_are_expanded() {
        let xml = "<root><target/></root>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let target = node_named(&doc, "target");
        let out = insert_child_fragment(xml, target, "<c></c>").unwrap();
        assert_eq!(out, "<root><target><c></c></target></root>");
    }

    #[test]
    fn qname_is_read_from_source_text() {
        assert_eq!(element_qname("<xa:QualifyingProperties Target=\"#s\">"), "xa:QualifyingProperties");
        assert_eq!(element_prefix("<plain>"), None);
        assert_eq!(qname_like("<xa:QualifyingProperties>", "UnsignedProperties"), "xa:UnsignedProperties");
    }
}
