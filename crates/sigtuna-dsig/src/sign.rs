#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Operates on a template whose `<DigestValue>` and `<SignatureValue>`
//! elements are empty: reference digests are computed and spliced in first,
//! then `<SignedInfo>` is canonicalized and signed. All splicing is
//! restricted to the byte range of the targeted `<Signature>` element, so a
//! document that already carries other (filled) signatures is never touched
//! outside the one being produced.

use crate::context::DsigContext;
use crate::verify::{
    canonical_signed_info_bytes, compute_reference_digest, find_signature, read_c14n_method,
    SignatureSelector,
};
use base64::Engine;
use sigtuna_core::{ns, Error};
use sigtuna_keys::Key;
use sigtuna_xml::document::{find_child_element, find_child_elements};

/// Compute and splice the digest of every `<Reference>` whose
/// `<DigestValue>` is still empty. Returns the updated document text.
pub fn fill_reference_digests(
    ctx: &DsigContext,
    xml: &str,
    selector: SignatureSelector<'_>,
) -> Result<String, Error> {
    let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;

    let extra: Vec<&str> = ctx.id_attrs.iter().map(|s| s.as_str()).collect();
    let id_map = sigtuna_xml::document::build_id_map(&doc, &extra)?;

    let sig_node = find_signature(&doc, selector)?;
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    // Digests are computed against the unmodified text: no reference in the
    // XAdES profile covers SignedInfo itself, so filling DigestValue
    // elements afterwards cannot invalidate them.
    let mut digests = Vec::new();
    for reference in find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
        let digest_value = find_child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        if !digest_value.text().unwrap_or("").trim().is_empty() {
            continue;
        }
        let computed =
            compute_reference_digest(ctx, &reference, &doc, &id_map, xml, sig_node)?;
        digests.push(base64::engine::general_purpose::STANDARD.encode(&computed));
    }

    // Splice the digests into the signature's own byte range, in reference
    // order (which is document order inside SignedInfo).
    let range = sig_node.range();
    let mut sig_text = xml[range.clone()].to_owned();
    for b64 in digests {
        sig_text = fill_first_empty(&sig_text, ns::node::DIGEST_VALUE, &b64)?;
    }

    let mut result = String::with_capacity(xml.len() + sig_text.len());
    result.push_str(&xml[..range.start]);
    result.push_str(&sig_text);
    result.push_str(&xml[range.end..]);
    Ok(result)
}

/// Return the exact canonical `<SignedInfo>` octets that a signer would
/// sign, with reference digests filled in. This is the entry point for
/// out-of-process signing (HSM or remote signer).
pub fn signed_info_bytes(
    ctx: &DsigContext,
    xml: &str,
    selector: SignatureSelector<'_>,
) -> Result<(String, Vec<u8>), Error> {
    let filled = fill_reference_digests(ctx, xml, selector)?;
    let doc = roxmltree::Document::parse_with_options(&filled, sigtuna_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let sig_node = find_signature(&doc, selector)?;
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let (mode, prefixes) = read_c14n_method(signed_info)?;
    let bytes = canonical_signed_info_bytes(&doc, signed_info, mode, &prefixes)?;
    Ok((filled, bytes))
}

/// Sign a template document: fill reference digests, canonicalize
/// `<SignedInfo>`, sign it and splice the base64 signature into the empty
/// `<SignatureValue>`. Returns the signed document text.
pub fn sign(
    ctx: &DsigContext,
    xml: &str,
    key: &Key,
    selector: SignatureSelector<'_>,
) -> Result<String, Error> {
    if !key.has_private() {
        return Err(Error::Key("signing requires a private key".into()));
    }

    let (filled, canonical) = signed_info_bytes(ctx, xml, selector)?;

    let doc = roxmltree::Document::parse_with_options(&filled, sigtuna_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let sig_node = find_signature(&doc, selector)?;
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let sig_method = find_child_element(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;

    let alg = sigtuna_crypto::sign::from_uri(sig_method)?;
    let signature = alg.sign(&key.to_signing_key(), &canonical)?;
    let sig_b64 = base64::engine::general_purpose::STANDARD.encode(&signature);

    let range = sig_node.range();
    let sig_text = fill_first_empty(&filled[range.clone()], ns::node::SIGNATURE_VALUE, &sig_b64)?;

    let mut result = String::with_capacity(filled.len() + sig_b64.len());
    result.push_str(&filled[..range.start]);
    result.push_str(&sig_text);
    result.push_str(&filled[range.end..]);
    Ok(result)
}

/// Insert `value` into the first empty `<{qname}>` element (prefixed with
/// `ds:` or unprefixed) found in `text`. The element may carry attributes;
/// "empty" means nothing between the start and end tags.
fn fill_first_empty(text: &str, local_name: &str, value: &str) -> Result<String, Error> {
    for close in [format!("</ds:{local_name}>"), format!("</{local_name}>")] {
        let mut search_from = 0;
        while let Some(pos) = text[search_from..].find(&close) {
            let pos = search_from + pos;
            if text[..pos].ends_with('>') && !text[..pos].ends_with(&close) {
                // Confirm the '>' closes the matching start tag, i.e. the
                // element is empty.
                let open_prefixed = format!("<ds:{local_name}");
                let open_plain = format!("<{local_name}");
                let before = &text[..pos];
                if let Some(open_pos) = before.rfind('<') {
                    let tag = &before[open_pos..];
                    if tag.starts_with(&open_prefixed) || tag.starts_with(open_plain.as_str()) {
                        let mut out = String::with_capacity(text.len() + value.len());
                        out.push_str(before);
                        out.push_str(value);
                        out.push_str(&text[pos..]);
                        return Ok(out);
                    }
                }
            }
            search_from = pos + close.len();
        }
    }
    Err(Error::XmlStructure(format!(
        "no empty {local_name} element to fill"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_targets_first_empty_element_only() {
        let text = "<x><ds:DigestValue>done</ds:DigestValue><ds:DigestValue></ds:DigestValue></x>";
        let out = fill_first_empty(text, "DigestValue", "NEW").unwrap();
        assert_eq!(
            out,
            "<x><ds:DigestValue>done</ds:DigestValue><ds:DigestValue>NEW</ds:DigestValue></x>"
        );
    }

    #[test]
    fn fill_handles_attributes_on_empty_element() {
        let text = r#"<ds:SignatureValue Id="sv"></ds:SignatureValue>"#;
        let out = fill_first_empty(text, "SignatureValue", "SIG").unwrap();
        assert_eq!(out, r#"<ds:SignatureValue Id="sv">SIG</ds:SignatureValue>"#);
    }

    #[test]
    fn fill_fails_when_no_empty_element_exists() {
        let text = "<ds:DigestValue>full</ds:DigestValue>";
        assert!(fill_first_empty(text, "DigestValue", "x").is_err());
    }
}
