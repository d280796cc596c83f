#![forbid(unsafe_code)]

//! Signing-certificate binding (`SigningCertificateV2` and its legacy
//! predecessor).
//!
//! On sign: digest the DER signer certificate and encode
//! `IssuerSerialV2` as base64 DER. On verify: the certificate taken from
//! `<KeyInfo>` must match the digest, the serial (big-integer equality) and
//! the issuer DN (canonical RFC 4514 string equality). Any mismatch is
//! fatal, and is checked before reference digests so that a substituted
//! certificate surfaces as a binding failure, not a crypto failure.

use crate::properties::{
    find_qualifying_properties, find_signed_properties, CertEntry, XADES_NAMESPACES,
};
use base64::Engine;
use sigtuna_core::{ns, Error, Result};
use sigtuna_dsig::verify::decode_base64_text;
use sigtuna_keys::x509;
use sigtuna_xml::document::find_child_element_ns_any;

/// Build the `<Cert>` entries for `SigningCertificateV2`: the signer first,
/// then the issuer when supplied. The issuer may also be absent entirely,
/// deferring issuer identification to lookup at verification time.
pub fn build_cert_entries(
    signer_der: &[u8],
    issuer_der: Option<&[u8]>,
    digest_uri: &str,
) -> Result<Vec<CertEntry>> {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut entries = Vec::new();

    let signer = x509::parse_cert(signer_der)?;
    entries.push(CertEntry {
        digest_method_uri: digest_uri.to_owned(),
        digest_value_b64: engine.encode(x509::cert_digest(signer_der, digest_uri)?),
        issuer_serial_b64: Some(engine.encode(x509::issuer_serial_der(&signer)?)),
    });

    if let Some(issuer_der) = issuer_der {
        let issuer = x509::parse_cert(issuer_der)?;
        entries.push(CertEntry {
            digest_method_uri: digest_uri.to_owned(),
            digest_value_b64: engine.encode(x509::cert_digest(issuer_der, digest_uri)?),
            issuer_serial_b64: Some(engine.encode(x509::issuer_serial_der(&issuer)?)),
        });
    }

    Ok(entries)
}

/// Check the signing-certificate binding of a signature against the signer
/// certificate extracted from `<KeyInfo>` (or supplied externally).
pub fn verify_binding(
    sig_node: roxmltree::Node<'_, '_>,
    signer_cert_der: &[u8],
) -> Result<()> {
    let (qp, _) = find_qualifying_properties(sig_node)?;
    let sp = find_signed_properties(qp)?;
    let ssp = find_child_element_ns_any(
        sp,
        &XADES_NAMESPACES,
        ns::node::SIGNED_SIGNATURE_PROPERTIES,
    )
    .ok_or_else(|| Error::StructuralMismatch("SignedSignatureProperties missing".into()))?;

    let cert = x509::parse_cert(signer_cert_der)?;

    if let Some(v2) =
        find_child_element_ns_any(ssp, &XADES_NAMESPACES, ns::node::SIGNING_CERTIFICATE_V2)
    {
        return verify_v2(v2, signer_cert_der, &cert);
    }
    if let Some(v1) =
        find_child_element_ns_any(ssp, &XADES_NAMESPACES, ns::node::SIGNING_CERTIFICATE)
    {
        return verify_legacy(v1, signer_cert_der, &cert);
    }
    Err(Error::StructuralMismatch(
        "no signing-certificate property to check".into(),
    ))
}

/// `SigningCertificateV2`: first `<Cert>` entry names the signer.
fn verify_v2(
    v2: roxmltree::Node<'_, '_>,
    signer_cert_der: &[u8],
    cert: &x509::Certificate,
) -> Result<()> {
    let entry = find_child_element_ns_any(v2, &XADES_NAMESPACES, ns::node::CERT)
        .ok_or_else(|| Error::StructuralMismatch("SigningCertificateV2 has no Cert".into()))?;

    check_cert_digest(entry, signer_cert_der)?;

    if let Some(issuer_serial) =
        find_child_element_ns_any(entry, &XADES_NAMESPACES, ns::node::ISSUER_SERIAL_V2)
    {
        let der = decode_base64_text(issuer_serial.text().unwrap_or(""))
            .map_err(|e| Error::Base64(format!("IssuerSerialV2: {e}")))?;
        let (declared_issuer, declared_serial) = x509::parse_issuer_serial(&der)?;

        if declared_serial != x509::serial_bytes(cert) {
            return Err(Error::CertificateBindingMismatch(
                "IssuerSerialV2 serial does not match the signer certificate".into(),
            ));
        }
        if let Some(declared_issuer) = declared_issuer {
            if !x509::dn_equal(&declared_issuer, &x509::issuer_canonical(cert)) {
                return Err(Error::CertificateBindingMismatch(
                    "IssuerSerialV2 issuer does not match the signer certificate".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Legacy `SigningCertificate` with `IssuerSerial/X509IssuerName` +
/// `X509SerialNumber` (v1.1.1 documents).
fn verify_legacy(
    v1: roxmltree::Node<'_, '_>,
    signer_cert_der: &[u8],
    cert: &x509::Certificate,
) -> Result<()> {
    let entry = find_child_element_ns_any(v1, &XADES_NAMESPACES, ns::node::CERT)
        .ok_or_else(|| Error::StructuralMismatch("SigningCertificate has no Cert".into()))?;

    check_cert_digest(entry, signer_cert_der)?;

    if let Some(issuer_serial) =
        find_child_element_ns_any(entry, &XADES_NAMESPACES, ns::node::ISSUER_SERIAL)
    {
        let issuer_name = issuer_serial
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == ns::node::X509_ISSUER_NAME)
            .and_then(|n| n.text())
            .map(str::trim);
        let serial_text = issuer_serial
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == ns::node::X509_SERIAL_NUMBER)
            .and_then(|n| n.text())
            .map(str::trim);

        if let Some(serial_text) = serial_text {
            let cert_serial = x509::serial_decimal(&x509::serial_bytes(cert));
            if serial_text != cert_serial {
                return Err(Error::CertificateBindingMismatch(format!(
                    "X509SerialNumber {serial_text} does not match certificate serial {cert_serial}"
                )));
            }
        }
        if let Some(issuer_name) = issuer_name {
            if !x509::dn_equal(issuer_name, &x509::issuer_canonical(cert)) {
                return Err(Error::CertificateBindingMismatch(
                    "X509IssuerName does not match the signer certificate".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Compare a `<CertDigest>` against the DER certificate, under the digest
/// method the entry declares.
fn check_cert_digest(entry: roxmltree::Node<'_, '_>, signer_cert_der: &[u8]) -> Result<()> {
    let cert_digest = find_child_element_ns_any(entry, &XADES_NAMESPACES, ns::node::CERT_DIGEST)
        .ok_or_else(|| Error::StructuralMismatch("Cert has no CertDigest".into()))?;

    let digest_uri = cert_digest
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement("CertDigest/DigestMethod".into()))?;
    let declared = cert_digest
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::DIGEST_VALUE)
        .and_then(|n| n.text())
        .ok_or_else(|| Error::MissingElement("CertDigest/DigestValue".into()))?;
    let declared = decode_base64_text(declared)
        .map_err(|e| Error::Base64(format!("CertDigest/DigestValue: {e}")))?;

    let computed = x509::cert_digest(signer_cert_der, digest_uri)?;
    if computed != declared {
        return Err(Error::CertificateBindingMismatch(
            "certificate digest does not match the KeyInfo certificate".into(),
        ));
    }
    Ok(())
}

