#![forbid(unsafe_code)]

//! Signature-policy strategy.
//!
//! Profile-specific policy behavior is plugged into the orchestrator as a
//! strategy rather than inherited: what policy identifier to emit, how to
//! validate implied and explicit policies, where policy documents live, and
//! how output files are named. The default strategy emits no policy and
//! treats implied policies as acceptable.

use crate::properties::XadesNode;
use sigtuna_core::{ns, Error, Result};
use std::path::{Path, PathBuf};

/// An explicit signature policy as read from `<SignaturePolicyId>`.
#[derive(Debug, Clone)]
pub struct ExplicitPolicy {
    /// The policy identifier (an OID URN or URL).
    pub identifier: String,
    /// Digest algorithm URI declared in `<SigPolicyHash>`.
    pub digest_method_uri: String,
    /// Declared digest of the policy document.
    pub digest_value: Vec<u8>,
}

/// Strategy hooks for policy handling and output naming.
pub trait PolicyStrategy {
    /// Policy identifier subtree to emit at signing time, if any.
    fn policy_identifier(&self) -> Option<XadesNode> {
        None
    }

    /// Validate a signature that declares no policy or an implied policy.
    fn validate_implied(&self) -> Result<()> {
        Ok(())
    }

    /// Validate an explicit policy. `document` is the policy document when
    /// it could be located. The declared digest must equal the computed
    /// digest of the document.
    fn validate_explicit(&self, policy: &ExplicitPolicy, document: Option<&[u8]>) -> Result<()> {
        let Some(document) = document else {
            return Err(Error::PolicyMissing(format!(
                "policy document for {} not available",
                policy.identifier
            )));
        };
        let computed = sigtuna_crypto::digest::digest(&policy.digest_method_uri, document)?;
        if policy.digest_value != computed {
            return Err(Error::PolicyDigestMismatch(policy.identifier.clone()));
        }
        Ok(())
    }

    /// Where a policy document can be fetched or read from, given its
    /// identifier. `None` means unavailable.
    fn policy_document_url(&self, _identifier: &str) -> Option<String> {
        None
    }

    /// Compose the output file path for a signed document.
    fn signature_filename(&self, location: &Path, name: Option<&str>) -> PathBuf {
        let name = crate::input::ensure_xml_extension(name.unwrap_or("signature.xml"));
        location.join(name)
    }
}

/// The default, policy-less strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

impl PolicyStrategy for DefaultPolicy {}

/// Read an explicit policy out of a `<SignaturePolicyIdentifier>` element,
/// if it declares one (`SignaturePolicyImplied` yields `None`).
pub fn parse_policy_identifier(
    spi: roxmltree::Node<'_, '_>,
) -> Result<Option<ExplicitPolicy>> {
    use crate::properties::XADES_NAMESPACES;
    use sigtuna_xml::document::find_child_element_ns_any;

    if find_child_element_ns_any(spi, &XADES_NAMESPACES, ns::node::SIGNATURE_POLICY_IMPLIED)
        .is_some()
    {
        return Ok(None);
    }
    let policy_id =
        find_child_element_ns_any(spi, &XADES_NAMESPACES, ns::node::SIGNATURE_POLICY_ID)
            .ok_or_else(|| {
                Error::StructuralMismatch(
                    "SignaturePolicyIdentifier with neither Implied nor Id".into(),
                )
            })?;

    let identifier = policy_id
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::IDENTIFIER)
        .and_then(|n| n.text())
        .map(str::trim)
        .ok_or_else(|| Error::StructuralMismatch("SigPolicyId has no Identifier".into()))?;

    let hash = find_child_element_ns_any(policy_id, &XADES_NAMESPACES, ns::node::SIG_POLICY_HASH)
        .ok_or_else(|| Error::StructuralMismatch("SignaturePolicyId lacks SigPolicyHash".into()))?;
    let digest_method_uri = hash
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement("SigPolicyHash/DigestMethod".into()))?;
    let digest_value = hash
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::DIGEST_VALUE)
        .and_then(|n| n.text())
        .ok_or_else(|| Error::MissingElement("SigPolicyHash/DigestValue".into()))?;
    let digest_value = sigtuna_dsig::verify::decode_base64_text(digest_value)
        .map_err(|e| Error::Base64(format!("SigPolicyHash/DigestValue: {e}")))?;

    Ok(Some(ExplicitPolicy {
        identifier: identifier.to_owned(),
        digest_method_uri: digest_method_uri.to_owned(),
        digest_value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_accepts_implied() {
        assert!(DefaultPolicy.validate_implied().is_ok());
    }

    #[test]
    fn explicit_policy_without_document_is_missing() {
        let policy = ExplicitPolicy {
            identifier: "urn:example:policy".into(),
            digest_method_uri: sigtuna_core::algorithm::SHA256.into(),
            digest_value: vec![0; 32],
        };
        assert!(matches!(
            DefaultPolicy.validate_explicit(&policy, None),
            Err(Error::PolicyMissing(_))
        ));
    }

    #[test]
    fn explicit_policy_digest_is_really_compared() {
        let document = b"the policy text";
        let good = sigtuna_crypto::digest::digest(sigtuna_core::algorithm::SHA256, document)
            .unwrap();
        let policy = ExplicitPolicy {
            identifier: "urn:example:policy".into(),
            digest_method_uri: sigtuna_core::algorithm::SHA256.into(),
            digest_value: good.clone(),
        };
        assert!(DefaultPolicy.validate_explicit(&policy, Some(document)).is_ok());

        let bad = ExplicitPolicy {
            digest_value: vec![0; 32],
            ..policy
        };
        assert!(matches!(
            DefaultPolicy.validate_explicit(&bad, Some(document)),
            Err(Error::PolicyDigestMismatch(_))
        ));
    }
}
