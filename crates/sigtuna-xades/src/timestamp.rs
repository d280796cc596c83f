#![forbid(unsafe_code)]

//! XAdES-T: `<SignatureTimeStamp>` attachment and validation.
//!
//! The time-stamped message is the canonical form of the signature's
//! `<SignatureValue>` element, canonicalized with the method named inside
//! the time-stamp property itself (falling back to the signature's own
//! method when absent).

use crate::properties::{find_qualifying_properties, XADES_NAMESPACES};
use crate::splice;
use base64::Engine;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns, Error, Result};
use sigtuna_dsig::verify::decode_base64_text;
use sigtuna_dsig::SignatureSelector;
use sigtuna_tsa::{TimestampAuthority, TstVerdict};
use sigtuna_xml::document::find_child_element;

/// Canonicalize the `<SignatureValue>` of a signature with the given mode.
fn canonical_signature_value(
    doc: &roxmltree::Document<'_>,
    sig_node: roxmltree::Node<'_, '_>,
    mode: C14nMode,
) -> Result<Vec<u8>> {
    let sig_value = find_child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    sigtuna_c14n::canonicalize_subtree(doc, sig_value, mode)
}

/// The C14N method declared in the signature's own `<SignedInfo>`.
fn signature_c14n_mode(sig_node: roxmltree::Node<'_, '_>) -> Result<C14nMode> {
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let (mode, _) = sigtuna_dsig::verify::read_c14n_method(signed_info)?;
    Ok(mode)
}

/// Attach a `<SignatureTimeStamp>` to the signature with the given id,
/// requesting a token from the TSA over the canonical `<SignatureValue>`.
/// Returns the updated document text.
pub fn attach(xml: &str, sig_id: &str, tsa: &dyn TimestampAuthority) -> Result<String> {
    let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let sig_node =
        sigtuna_dsig::verify::find_signature(&doc, SignatureSelector::ById(sig_id))?;

    let mode = signature_c14n_mode(sig_node)?;
    let canonical = canonical_signature_value(&doc, sig_node, mode)?;

    let tst_der = tsa.request_tst(&canonical, algorithm::SHA256)?;
    let tst_b64 = base64::engine::general_purpose::STANDARD.encode(&tst_der);

    let (qp, _) = find_qualifying_properties(sig_node)?;
    let qp_text = &xml[qp.range()];
    let ts_qname = splice::qname_like(qp_text, ns::node::SIGNATURE_TIME_STAMP);
    let ets_qname = splice::qname_like(qp_text, ns::node::ENCAPSULATED_TIME_STAMP);
    let ds_prefix = splice::element_prefix(&xml[sig_node.range()]).unwrap_or("ds");

    let fragment = format!(
        "<{ts_qname}><{ds_prefix}:{cm} Algorithm=\"{alg}\"></{ds_prefix}:{cm}>\
         <{ets_qname}>{tst_b64}</{ets_qname}></{ts_qname}>",
        cm = ns::node::CANONICALIZATION_METHOD,
        alg = mode.uri(),
    );

    splice::insert_unsigned_property(xml, sig_id, &fragment)
}

/// Validate every `<SignatureTimeStamp>` of a signature. Returns the number
/// of conclusively valid tokens.
///
/// Imprint mismatches and invalid token signatures are fatal; an
/// inconclusive outcome (OCSP or issuer unavailable) is logged and skipped.
pub fn validate(
    doc: &roxmltree::Document<'_>,
    sig_node: roxmltree::Node<'_, '_>,
    tsa: &dyn TimestampAuthority,
) -> Result<usize> {
    let Ok((qp, _)) = find_qualifying_properties(sig_node) else {
        return Ok(0);
    };
    let Some(usp) = crate::properties::find_unsigned_signature_properties(qp) else {
        return Ok(0);
    };

    let mut validated = 0;
    for ts_node in usp.children().filter(|n| {
        n.is_element()
            && n.tag_name().name() == ns::node::SIGNATURE_TIME_STAMP
            && XADES_NAMESPACES.contains(&n.tag_name().namespace().unwrap_or(""))
    }) {
        let mode = match find_child_element(ts_node, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        {
            Some(uri) => C14nMode::from_uri(uri)
                .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {uri}")))?,
            None => signature_c14n_mode(sig_node)?,
        };
        let canonical = canonical_signature_value(doc, sig_node, mode)?;

        let ets = ts_node
            .children()
            .find(|n| {
                n.is_element()
                    && n.tag_name().name() == ns::node::ENCAPSULATED_TIME_STAMP
                    && XADES_NAMESPACES.contains(&n.tag_name().namespace().unwrap_or(""))
            })
            .and_then(|n| n.text())
            .ok_or_else(|| Error::MissingElement("EncapsulatedTimeStamp".into()))?;
        let tst_der = decode_base64_text(ets)
            .map_err(|e| Error::Base64(format!("EncapsulatedTimeStamp: {e}")))?;

        match tsa.verify_tst(&tst_der, &canonical)? {
            TstVerdict::Valid => validated += 1,
            TstVerdict::Inconclusive(reason) => {
                log::warn!("signature time-stamp inconclusive: {reason}");
            }
            TstVerdict::Invalid(reason) => {
                return Err(Error::TimestampInvalid(reason));
            }
        }
    }
    Ok(validated)
}
