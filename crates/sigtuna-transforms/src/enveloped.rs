#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<ds:Signature>` being produced or verified, together with
//! all its descendants, from the node set.

use crate::pipeline::{Transform, TransformData};
use sigtuna_core::{algorithm, Error};
use sigtuna_xml::nodeset::{node_index, NodeSet};

/// The enveloped-signature transform. Identified by the arena index of the
/// `<Signature>` element so it can be re-located after a re-parse.
pub struct EnvelopedSignatureTransform {
    signature_node_index: usize,
}

impl EnvelopedSignatureTransform {
    /// Create from the `<Signature>` node this transform must exclude.
    pub fn from_node(sig_node: roxmltree::Node<'_, '_>) -> Self {
        Self {
            signature_node_index: node_index(sig_node),
        }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        match input {
            TransformData::Xml { xml_text, node_set } => {
                let doc = roxmltree::Document::parse_with_options(
                    &xml_text,
                    sigtuna_xml::parsing_options(),
                )
                .map_err(|e| Error::XmlParse(e.to_string()))?;

                let sig_node = doc
                    .descendants()
                    .find(|n| node_index(*n) == self.signature_node_index)
                    .ok_or_else(|| {
                        Error::Transform("enveloped transform lost its Signature node".into())
                    })?;

                let mut ns = node_set.unwrap_or_else(|| NodeSet::all_without_comments(&doc));
                ns.remove_subtree(sig_node);

                Ok(TransformData::Xml {
                    xml_text,
                    node_set: Some(ns),
                })
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

    #[test]
    fn signature_subtree_is_excluded() {
        let xml = format!(
            r#"<root><data>x</data><ds:Signature xmlns:ds="{DSIG}"><ds:SignedInfo></ds:SignedInfo></ds:Signature></root>"#
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let sig = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "Signature")
            .unwrap();

        let t = EnvelopedSignatureTransform::from_node(sig);
        let out = t
            .execute(TransformData::Xml {
                xml_text: xml.clone(),
                node_set: None,
            })
            .unwrap();
        let bytes = out.to_binary().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "<root><data>x</data></root>");
    }
}
