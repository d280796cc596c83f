#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Parse the document, register ID attributes (duplicates rejected)
//! 2. Locate the `<Signature>` and read `<SignedInfo>` methods
//! 3. For each `<Reference>`: resolve URI, run transforms, recompute digest
//! 4. Resolve the verification key from `<KeyInfo>` or the caller
//! 5. Canonicalize `<SignedInfo>` with the method it declares
//! 6. Verify `<SignatureValue>`

use crate::context::DsigContext;
use base64::Engine;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_crypto::digest;
use sigtuna_keys::Key;
use sigtuna_transforms::uri::ResolvedUri;
use sigtuna_transforms::{Transform, TransformData};
use sigtuna_xml::document::{find_child_element, find_child_elements};
use std::collections::HashMap;

/// Which `<Signature>` element an operation targets.
#[derive(Debug, Clone, Copy)]
pub enum SignatureSelector<'a> {
    /// The first `<Signature>` that is not nested inside another one.
    FirstTopLevel,
    /// The `<Signature>` with the given `Id` value.
    ById(&'a str),
}

/// Result of checking `<SignatureValue>` against canonical `<SignedInfo>`.
#[derive(Debug)]
pub enum VerifyOutcome {
    /// Signature is cryptographically valid.
    Valid,
    /// Signature value does not verify.
    Invalid { reason: String },
    /// No key could be located to verify with.
    KeyMissing,
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Valid)
    }
}

/// Verify one signature in a signed XML document.
///
/// Reference digest mismatches are fatal and surface as
/// [`Error::ReferenceDigestMismatch`]; the crypto check on
/// `<SignatureValue>` is reported through [`VerifyOutcome`].
pub fn verify(
    ctx: &DsigContext,
    xml: &str,
    selector: SignatureSelector<'_>,
    external_key: Option<&Key>,
) -> Result<VerifyOutcome, Error> {
    let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;

    let extra: Vec<&str> = ctx.id_attrs.iter().map(|s| s.as_str()).collect();
    let id_map = sigtuna_xml::document::build_id_map(&doc, &extra)?;

    let sig_node = find_signature(&doc, selector)?;
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    let (c14n_mode, inclusive_prefixes) = read_c14n_method(signed_info)?;
    let sig_method_uri = read_signature_method(signed_info)?;

    // 3. Verify each Reference.
    for reference in find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
        verify_reference(ctx, &reference, &doc, &id_map, xml, sig_node)?;
    }

    // 4. Resolve the verification key.
    let keyinfo_key = keyinfo_certificates(sig_node)
        .into_iter()
        .next()
        .and_then(|der| {
            let cert = sigtuna_keys::x509::parse_cert(&der).ok()?;
            let public = sigtuna_keys::x509::rsa_public_key(&cert).ok()?;
            Some(sigtuna_crypto::sign::SigningKey::RsaPublic(public))
        });
    let signing_key = if let Some(k) = keyinfo_key {
        k
    } else if let Some(key) = external_key {
        key.to_signing_key()
    } else {
        return Ok(VerifyOutcome::KeyMissing);
    };

    // 5. Canonicalize <SignedInfo>.
    let c14n_signed_info =
        canonical_signed_info_bytes(&doc, signed_info, c14n_mode, &inclusive_prefixes)?;
    log::debug!(
        "canonical SignedInfo is {} bytes ({})",
        c14n_signed_info.len(),
        c14n_mode.uri()
    );

    // 6. Verify SignatureValue.
    let sig_value_node = find_child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let sig_value = decode_base64_text(sig_value_node.text().unwrap_or(""))
        .map_err(|e| Error::Base64(format!("SignatureValue: {e}")))?;

    let sig_alg = sigtuna_crypto::sign::from_uri(sig_method_uri)?;
    if sig_alg.verify(&signing_key, &c14n_signed_info, &sig_value)? {
        Ok(VerifyOutcome::Valid)
    } else {
        Ok(VerifyOutcome::Invalid {
            reason: "signature value does not match canonical SignedInfo".into(),
        })
    }
}

/// Locate the `<Signature>` element targeted by a selector.
pub fn find_signature<'a>(
    doc: &'a roxmltree::Document<'a>,
    selector: SignatureSelector<'_>,
) -> Result<roxmltree::Node<'a, 'a>, Error> {
    let mut candidates = doc.descendants().filter(|n| {
        n.is_element()
            && n.tag_name().name() == ns::node::SIGNATURE
            && n.tag_name().namespace().unwrap_or("") == ns::DSIG
    });
    let found = match selector {
        SignatureSelector::FirstTopLevel => candidates.find(|n| {
            !n.ancestors().skip(1).any(|a| {
                a.is_element()
                    && a.tag_name().name() == ns::node::SIGNATURE
                    && a.tag_name().namespace().unwrap_or("") == ns::DSIG
            })
        }),
        SignatureSelector::ById(id) => {
            candidates.find(|n| n.attribute(ns::attr::ID) == Some(id))
        }
    };
    found.ok_or_else(|| Error::MissingElement("Signature".into()))
}

/// Read `<CanonicalizationMethod>` from a `<SignedInfo>`.
pub fn read_c14n_method(
    signed_info: roxmltree::Node<'_, '_>,
) -> Result<(C14nMode, Vec<String>), Error> {
    let method = find_child_element(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
        .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
    let uri = method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on CanonicalizationMethod".into()))?;
    let mode = C14nMode::from_uri(uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {uri}")))?;
    Ok((mode, read_inclusive_prefixes(method)))
}

fn read_signature_method<'a>(signed_info: roxmltree::Node<'a, 'a>) -> Result<&'a str, Error> {
    let method = find_child_element(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
        .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
    method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on SignatureMethod".into()))
}

/// Canonicalize a `<SignedInfo>` element in its document context.
pub fn canonical_signed_info_bytes(
    doc: &roxmltree::Document<'_>,
    signed_info: roxmltree::Node<'_, '_>,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let node_set = sigtuna_xml::NodeSet::tree_without_comments(signed_info);
    sigtuna_c14n::canonicalize_doc(doc, mode, Some(&node_set), inclusive_prefixes)
}

/// Recompute the digest for one `<Reference>` and compare it to the stored
/// `<DigestValue>`. A mismatch is fatal.
fn verify_reference(
    ctx: &DsigContext,
    reference: &roxmltree::Node<'_, '_>,
    doc: &roxmltree::Document<'_>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    xml: &str,
    sig_node: roxmltree::Node<'_, '_>,
) -> Result<(), Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");

    let digest_value_node = find_child_element(*reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
    let expected = decode_base64_text(digest_value_node.text().unwrap_or(""))
        .map_err(|e| Error::Base64(format!("DigestValue: {e}")))?;

    let computed = compute_reference_digest(ctx, reference, doc, id_map, xml, sig_node)?;

    if computed == expected {
        Ok(())
    } else {
        Err(Error::ReferenceDigestMismatch(format!(
            "URI={uri}: stored digest does not match recomputed digest"
        )))
    }
}

/// Resolve a `<Reference>`, run its transform chain and digest the result.
pub fn compute_reference_digest(
    ctx: &DsigContext,
    reference: &roxmltree::Node<'_, '_>,
    doc: &roxmltree::Document<'_>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    xml: &str,
    sig_node: roxmltree::Node<'_, '_>,
) -> Result<Vec<u8>, Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");

    let digest_method = find_child_element(*reference, ns::DSIG, ns::node::DIGEST_METHOD)
        .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
    let digest_uri = digest_method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on DigestMethod".into()))?;

    let resolved = sigtuna_transforms::uri::resolve(
        uri,
        doc,
        id_map,
        xml,
        &ctx.url_maps,
        ctx.base_dir.as_deref(),
    )?;
    let mut data = match resolved {
        ResolvedUri::Xml { xml_text, node_set } => TransformData::Xml { xml_text, node_set },
        ResolvedUri::Binary(bytes) => TransformData::Binary(bytes),
    };

    if let Some(transforms) = find_child_element(*reference, ns::DSIG, ns::node::TRANSFORMS) {
        for transform_node in transforms.children() {
            if !transform_node.is_element()
                || transform_node.tag_name().name() != ns::node::TRANSFORM
            {
                continue;
            }
            let transform_uri = transform_node.attribute(ns::attr::ALGORITHM).unwrap_or("");
            data = apply_transform(transform_uri, data, &transform_node, sig_node)?;
        }
    }

    let bytes = data.to_binary()?;
    log::debug!("pre-digest data for URI={uri} is {} bytes", bytes.len());
    digest::digest(digest_uri, &bytes)
}

/// Apply a single transform.
pub(crate) fn apply_transform(
    uri: &str,
    data: TransformData,
    transform_node: &roxmltree::Node<'_, '_>,
    sig_node: roxmltree::Node<'_, '_>,
) -> Result<TransformData, Error> {
    match uri {
        algorithm::ENVELOPED_SIGNATURE => {
            let t = sigtuna_transforms::enveloped::EnvelopedSignatureTransform::from_node(sig_node);
            t.execute(data)
        }
        algorithm::C14N
        | algorithm::C14N_WITH_COMMENTS
        | algorithm::EXC_C14N
        | algorithm::EXC_C14N_WITH_COMMENTS => {
            let mode = C14nMode::from_uri(uri)
                .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {uri}")))?;
            let prefixes = read_inclusive_prefixes(*transform_node);
            let t = sigtuna_transforms::C14nTransform::new(mode, prefixes);
            t.execute(data)
        }
        _ => Err(Error::UnsupportedAlgorithm(format!("transform: {uri}"))),
    }
}

/// Collect the DER certificates carried in `<KeyInfo>/<X509Data>`.
pub fn keyinfo_certificates(sig_node: roxmltree::Node<'_, '_>) -> Vec<Vec<u8>> {
    let mut certs = Vec::new();
    let Some(key_info) = find_child_element(sig_node, ns::DSIG, ns::node::KEY_INFO) else {
        return certs;
    };
    for x509_data in find_child_elements(key_info, ns::DSIG, ns::node::X509_DATA) {
        for cert_node in find_child_elements(x509_data, ns::DSIG, ns::node::X509_CERTIFICATE) {
            if let Ok(der) = decode_base64_text(cert_node.text().unwrap_or("")) {
                certs.push(der);
            }
        }
    }
    certs
}

/// Decode base64 text that may contain whitespace line wrapping.
pub fn decode_base64_text(text: &str) -> Result<Vec<u8>, String> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| e.to_string())
}

fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    for child in node.children() {
        if child.is_element() && child.tag_name().name() == ns::node::INCLUSIVE_NAMESPACES {
            if let Some(prefix_list) = child.attribute(ns::attr::PREFIX_LIST) {
                return prefix_list
                    .split_whitespace()
                    .map(|s| s.to_owned())
                    .collect();
            }
        }
    }
    Vec::new()
}
