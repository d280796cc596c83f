#![forbid(unsafe_code)]

//! Counter-signatures: a nested XML-DSig whose single reference covers the
//! outer signature's `<SignatureValue>`.
//!
//! The nested signature is a complete XAdES signature of its own (fresh
//! signature id, its own qualifying properties) appended under
//! `UnsignedSignatureProperties/CounterSignature`. The `Type` attribute of
//! its reference is what establishes the counter-signing relationship; no
//! additional cryptographic bond exists or is required.

use crate::certbind;
use crate::properties::{find_qualifying_properties, SignedPropertiesBuilder, XADES_NAMESPACES};
use crate::sign::{
    build_signature_template, generate_signature_id, PayloadRef, SignOptions, SignedDocument,
    SignatureTemplate, XadesSigner,
};
use crate::splice;
use chrono::{SecondsFormat, Utc};
use sigtuna_core::{algorithm, ns, Error, Result};
use sigtuna_dsig::{DsigContext, SignatureSelector, VerifyOutcome};
use sigtuna_keys::Key;
use sigtuna_xml::document::{find_child_element, find_child_elements};

/// Counter-sign the first top-level signature in `xml` with the given key.
pub fn counter_sign(
    signer: &XadesSigner<'_>,
    xml: &str,
    key: Key,
    opts: &SignOptions,
) -> Result<SignedDocument> {
    if !key.has_private() {
        return Err(Error::Key("counter-signing requires a private key".into()));
    }

    let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let outer = sigtuna_dsig::verify::find_signature(&doc, SignatureSelector::FirstTopLevel)?;
    let outer_id = outer
        .attribute(ns::attr::ID)
        .ok_or_else(|| Error::StructuralMismatch("outer Signature has no Id".into()))?
        .to_owned();
    let sv_id = find_child_element(outer, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .and_then(|n| n.attribute(ns::attr::ID))
        .ok_or_else(|| {
            Error::StructuralMismatch("outer SignatureValue has no Id to reference".into())
        })?
        .to_owned();

    // Build the nested signature template, complete with its own
    // qualifying properties.
    let signature_id = opts
        .signature_id
        .clone()
        .unwrap_or_else(generate_signature_id);
    let payload_ref_id = format!("{signature_id}-ref0");
    let signed_props_id = format!("{signature_id}-signedprops");

    let leaf = key
        .leaf_cert_der()
        .ok_or_else(|| Error::Key("a signing certificate is required".into()))?
        .to_vec();
    let issuer = key.x509_chain.get(1).cloned();
    let cert_entries =
        certbind::build_cert_entries(&leaf, issuer.as_deref(), algorithm::SHA256)?;

    let signing_time = opts
        .signing_time
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut signed_props = SignedPropertiesBuilder {
        id: &signed_props_id,
        signing_time,
        cert_entries,
        policy: None,
        production_place: opts.production_place.as_ref(),
        signer_role: opts.signer_role.as_ref(),
        payload_ref_id: &payload_ref_id,
        mime_type: &opts.mime_type,
    }
    .build();
    signed_props.apply_prefix(ns::XADES, ns::XADES_PREFIX);
    signed_props.apply_prefix(ns::DSIG, ns::DSIG_PREFIX);

    let target_uri = format!("#{sv_id}");
    let template = build_signature_template(&SignatureTemplate {
        signature_id: &signature_id,
        c14n: opts.c14n,
        payload: PayloadRef::CounterSignature {
            ref_id: &payload_ref_id,
            target_uri: &target_uri,
        },
        key_info_certs: &key.x509_chain,
        signed_props_xml: &signed_props.to_xml(),
        enveloping_payload: None,
        object_id: "",
    });

    // Splice first, sign second: the nested SignedInfo is canonicalized in
    // the context of the final document, so the digests must be computed
    // after insertion.
    let (qp, _) = find_qualifying_properties(outer)?;
    let cs_qname = splice::qname_like(&xml[qp.range()], ns::node::COUNTER_SIGNATURE);
    let wrapped = format!("<{cs_qname}>{template}</{cs_qname}>");
    let spliced = splice::insert_unsigned_property(xml, &outer_id, &wrapped)?;

    let signed = sigtuna_dsig::sign::sign(
        &signer.ctx,
        &spliced,
        &key,
        SignatureSelector::ById(&signature_id),
    )?;
    drop(key);

    log::info!("counter-signed {outer_id} with {signature_id}");
    Ok(SignedDocument {
        text: signed,
        signature_id,
        path: None,
    })
}

/// Validate every counter-signature of a signature. Returns the number of
/// valid nested signatures.
///
/// Each nested `<ds:Signature>` is verified as a stand-alone signature;
/// additionally its single reference must carry the counter-signature type
/// and point at the outer `<SignatureValue>`.
pub fn validate(
    doc: &roxmltree::Document<'_>,
    sig_node: roxmltree::Node<'_, '_>,
    xml: &str,
    ctx: &DsigContext,
    external_key: Option<&Key>,
) -> Result<usize> {
    let Ok((qp, _)) = find_qualifying_properties(sig_node) else {
        return Ok(0);
    };
    let Some(usp) = crate::properties::find_unsigned_signature_properties(qp) else {
        return Ok(0);
    };

    let outer_sv_id = find_child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .and_then(|n| n.attribute(ns::attr::ID));

    let mut validated = 0;
    for cs in usp.children().filter(|n| {
        n.is_element()
            && n.tag_name().name() == ns::node::COUNTER_SIGNATURE
            && XADES_NAMESPACES.contains(&n.tag_name().namespace().unwrap_or(""))
    }) {
        for inner in find_child_elements(cs, ns::DSIG, ns::node::SIGNATURE) {
            validate_one(doc, inner, outer_sv_id, xml, ctx, external_key)?;
            validated += 1;
        }
    }
    Ok(validated)
}

fn validate_one(
    _doc: &roxmltree::Document<'_>,
    inner: roxmltree::Node<'_, '_>,
    outer_sv_id: Option<&str>,
    xml: &str,
    ctx: &DsigContext,
    external_key: Option<&Key>,
) -> Result<()> {
    let signed_info = find_child_element(inner, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::CounterSignatureInvalid("nested SignedInfo missing".into()))?;
    let references = find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE);

    // Exactly one reference, typed as a counter-signature and pointing at
    // the outer SignatureValue.
    let counter_ref = references
        .iter()
        .find(|r| {
            r.attribute(ns::attr::TYPE) == Some(algorithm::COUNTERSIGNED_SIGNATURE_TYPE)
        })
        .ok_or_else(|| {
            Error::CounterSignatureInvalid(
                "nested signature has no counter-signature reference".into(),
            )
        })?;
    if let (Some(sv_id), Some(uri)) = (outer_sv_id, counter_ref.attribute(ns::attr::URI)) {
        if uri.strip_prefix('#') != Some(sv_id) {
            return Err(Error::CounterSignatureInvalid(format!(
                "counter-signature reference {uri} does not target the outer SignatureValue"
            )));
        }
    }

    let inner_id = inner.attribute(ns::attr::ID).ok_or_else(|| {
        Error::CounterSignatureInvalid("nested signature carries no Id".into())
    })?;

    let outcome = sigtuna_dsig::verify::verify(
        ctx,
        xml,
        SignatureSelector::ById(inner_id),
        external_key,
    )
    .map_err(|e| Error::CounterSignatureInvalid(e.to_string()))?;
    match outcome {
        VerifyOutcome::Valid => {}
        VerifyOutcome::Invalid { reason } => {
            return Err(Error::CounterSignatureInvalid(reason));
        }
        VerifyOutcome::KeyMissing => {
            return Err(Error::CounterSignatureInvalid(
                "no key available to verify the nested signature".into(),
            ));
        }
    }

    // The nested signature may carry its own qualifying properties; when it
    // does, hold it to the same certificate binding rules.
    if find_qualifying_properties(inner).is_ok() {
        if let Some(cert_der) = sigtuna_dsig::verify::keyinfo_certificates(inner).first() {
            certbind::verify_binding(inner, cert_der)
                .map_err(|e| Error::CounterSignatureInvalid(e.to_string()))?;
        }
    }
    Ok(())
}
