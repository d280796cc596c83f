#![forbid(unsafe_code)]

//! The verification orchestrator.
//!
//! Order of checks: structure, certificate binding, reference digests and
//! the signature value, policy, time-stamps, counter-signatures. The
//! binding runs before the reference engine so that a substituted signing
//! certificate surfaces as [`sigtuna_core::Error::CertificateBindingMismatch`]
//! rather than a downstream crypto failure.

use crate::certbind;
use crate::countersign;
use crate::policy::{parse_policy_identifier, DefaultPolicy, PolicyStrategy};
use crate::properties::{
    find_qualifying_properties, find_signed_properties, validate_structure, XADES_NAMESPACES,
};
use crate::timestamp;
use sigtuna_core::{algorithm, ns, Error, Result};
use sigtuna_dsig::{DsigContext, SignatureSelector, VerifyOutcome};
use sigtuna_keys::{Key, KeyData};
use sigtuna_tsa::{TimestampAuthority, TokenValidator};
use sigtuna_xml::document::{find_child_element, find_child_element_ns_any, find_child_elements};

static DEFAULT_POLICY: DefaultPolicy = DefaultPolicy;
static DEFAULT_TSA: TokenValidator = TokenValidator;

/// Options for a verify operation.
#[derive(Default)]
pub struct VerifyOptions<'a> {
    /// Trusted certificate (DER) used when `<KeyInfo>` carries none.
    pub trust_cert_der: Option<Vec<u8>>,
    /// Time-stamp validator. Defaults to the built-in CMS token validator.
    pub tsa: Option<&'a dyn TimestampAuthority>,
    /// Base directory for resolving detached reference URIs.
    pub detached_base_dir: Option<String>,
    /// URL-to-file mappings for detached reference URIs.
    pub url_maps: Vec<(String, String)>,
}

/// Summary of a successful verification.
#[derive(Debug)]
pub struct VerificationReport {
    /// Id of the verified signature, when it carries one.
    pub signature_id: Option<String>,
    /// Number of conclusively valid signature time-stamps.
    pub timestamps: usize,
    /// Number of valid counter-signatures.
    pub counter_signatures: usize,
}

/// The XAdES verification orchestrator.
pub struct XadesVerifier<'a> {
    policy: &'a dyn PolicyStrategy,
}

impl Default for XadesVerifier<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> XadesVerifier<'a> {
    pub fn new() -> Self {
        Self {
            policy: &DEFAULT_POLICY,
        }
    }

    pub fn with_policy(policy: &'a dyn PolicyStrategy) -> Self {
        Self { policy }
    }

    /// Verify a signed document from a file.
    pub fn verify_file(
        &self,
        path: &std::path::Path,
        opts: &VerifyOptions<'_>,
    ) -> Result<VerificationReport> {
        let text = std::fs::read_to_string(path)?;
        let mut opts_with_base = VerifyOptions {
            trust_cert_der: opts.trust_cert_der.clone(),
            tsa: opts.tsa,
            detached_base_dir: opts.detached_base_dir.clone(),
            url_maps: opts.url_maps.clone(),
        };
        if opts_with_base.detached_base_dir.is_none() {
            opts_with_base.detached_base_dir = path
                .parent()
                .map(|p| p.to_string_lossy().into_owned());
        }
        self.verify_text(&text, &opts_with_base)
    }

    /// Verify a signed document.
    pub fn verify_text(
        &self,
        xml: &str,
        opts: &VerifyOptions<'_>,
    ) -> Result<VerificationReport> {
        let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        let sig_node =
            sigtuna_dsig::verify::find_signature(&doc, SignatureSelector::FirstTopLevel)?;
        let signature_id = sig_node.attribute(ns::attr::ID).map(str::to_owned);

        // 1. Structure: qualifying properties and the SignedProperties
        //    reference with the XAdES type URI.
        let (qp, _xades_ns) = find_qualifying_properties(sig_node)?;
        validate_structure(qp, sig_node)?;
        check_signed_properties_reference(sig_node, qp)?;

        // 2. Certificate binding, before any digest is recomputed.
        let keyinfo_certs = sigtuna_dsig::verify::keyinfo_certificates(sig_node);
        let signer_cert = keyinfo_certs
            .first()
            .map(|v| v.as_slice())
            .or(opts.trust_cert_der.as_deref());
        if let Some(cert_der) = signer_cert {
            certbind::verify_binding(sig_node, cert_der)?;
        }

        // 3. References and the signature value.
        let ctx = DsigContext {
            id_attrs: Vec::new(),
            url_maps: opts.url_maps.clone(),
            base_dir: opts.detached_base_dir.clone(),
        };
        let external_key = match (keyinfo_certs.first(), &opts.trust_cert_der) {
            (None, Some(der)) => Some(key_from_cert(der)?),
            _ => None,
        };
        let outcome = sigtuna_dsig::verify::verify(
            &ctx,
            xml,
            SignatureSelector::FirstTopLevel,
            external_key.as_ref(),
        )?;
        match outcome {
            VerifyOutcome::Valid => {}
            VerifyOutcome::Invalid { reason } => {
                return Err(Error::SignatureCryptoInvalid(reason));
            }
            VerifyOutcome::KeyMissing => {
                return Err(Error::Key(
                    "no verification key in KeyInfo and no trusted certificate supplied".into(),
                ));
            }
        }

        // 4. Policy.
        self.check_policy(qp)?;

        // 5. Time-stamps (XAdES-T). Inconclusive outcomes are logged inside.
        let tsa = opts.tsa.unwrap_or(&DEFAULT_TSA);
        let timestamps = timestamp::validate(&doc, sig_node, tsa)?;

        // 6. Counter-signatures.
        let counter_signatures =
            countersign::validate(&doc, sig_node, xml, &ctx, external_key.as_ref())?;

        log::info!(
            "verified signature {:?}: {timestamps} time-stamp(s), {counter_signatures} counter-signature(s)",
            signature_id
        );
        Ok(VerificationReport {
            signature_id,
            timestamps,
            counter_signatures,
        })
    }

    fn check_policy(&self, qp: roxmltree::Node<'_, '_>) -> Result<()> {
        let sp = find_signed_properties(qp)?;
        let Some(ssp) = find_child_element_ns_any(
            sp,
            &XADES_NAMESPACES,
            ns::node::SIGNED_SIGNATURE_PROPERTIES,
        ) else {
            return Ok(());
        };
        let Some(spi) = find_child_element_ns_any(
            ssp,
            &XADES_NAMESPACES,
            ns::node::SIGNATURE_POLICY_IDENTIFIER,
        ) else {
            return self.policy.validate_implied();
        };

        match parse_policy_identifier(spi)? {
            None => self.policy.validate_implied(),
            Some(explicit) => {
                let document = self
                    .policy
                    .policy_document_url(&explicit.identifier)
                    .and_then(|url| read_policy_document(&url));
                self.policy.validate_explicit(&explicit, document.as_deref())
            }
        }
    }
}

/// The SignedProperties reference must exist, carry the XAdES type URI and
/// target the `<SignedProperties>` element by same-document fragment.
fn check_signed_properties_reference(
    sig_node: roxmltree::Node<'_, '_>,
    qp: roxmltree::Node<'_, '_>,
) -> Result<()> {
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let sp = find_signed_properties(qp)?;
    let sp_id = sp
        .attribute(ns::attr::ID)
        .ok_or_else(|| Error::StructuralMismatch("SignedProperties carries no Id".into()))?;

    let references = find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE);
    let sp_ref = references
        .iter()
        .find(|r| r.attribute(ns::attr::TYPE) == Some(algorithm::SIGNED_PROPERTIES_TYPE))
        .ok_or_else(|| {
            Error::StructuralMismatch(
                "no Reference with the SignedProperties type URI".into(),
            )
        })?;
    let uri = sp_ref.attribute(ns::attr::URI).unwrap_or("");
    if uri.strip_prefix('#') != Some(sp_id) {
        return Err(Error::StructuralMismatch(format!(
            "SignedProperties reference {uri} does not target SignedProperties #{sp_id}"
        )));
    }
    Ok(())
}

/// Wrap a trusted certificate's public key as a verification-only key.
fn key_from_cert(der: &[u8]) -> Result<Key> {
    let cert = sigtuna_keys::x509::parse_cert(der)?;
    let public = sigtuna_keys::x509::rsa_public_key(&cert)?;
    Ok(Key::new(KeyData::Rsa {
        private: None,
        public,
    })
    .with_cert(der.to_vec()))
}

/// Read a policy document from a `file://` URL or a local path.
fn read_policy_document(url: &str) -> Option<Vec<u8>> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    std::fs::read(path).ok()
}
