#![forbid(unsafe_code)]

//! The XAdES qualifying-properties tree.
//!
//! Every XAdES element is modeled as an [`XadesNode`]: local name, target
//! namespace, optional prefix, attributes, ordered children and text. The
//! tree renders to XML exactly once per sign operation; on verify, elements
//! are re-read from the parsed document. Prefixes are applied by a traverse
//! pass before the tree is spliced into a host document, so importing never
//! re-declares namespaces on foreign nodes.

use sigtuna_core::{ns, Error, Result};
use sigtuna_xml::document::find_child_element_ns_any;
use sigtuna_xml::XmlWriter;

/// Both namespaces accepted when reading qualifying properties. v1.3.2 is
/// what we emit; v1.1.1 documents are verified for compatibility.
pub const XADES_NAMESPACES: [&str; 2] = [ns::XADES, ns::XADES_111];

/// A typed XAdES element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XadesNode {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XadesNode>,
}

impl XadesNode {
    pub fn new(local: impl Into<String>, ns_uri: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
            ns_uri: ns_uri.into(),
            attrs: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// A new element in the XAdES v1.3.2 namespace.
    pub fn xades(local: impl Into<String>) -> Self {
        Self::new(local, ns::XADES)
    }

    /// A new element in the XML-DSig namespace.
    pub fn dsig(local: impl Into<String>) -> Self {
        Self::new(local, ns::DSIG)
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: XadesNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: XadesNode) {
        self.children.push(child);
    }

    /// The element's `Id` attribute, if set.
    pub fn id(&self) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == ns::attr::ID)
            .map(|(_, value)| value.as_str())
    }

    pub fn find_child(&self, local: &str) -> Option<&XadesNode> {
        self.children.iter().find(|c| c.local == local)
    }

    /// Depth-first traversal with a mutable visitor.
    pub fn traverse(&mut self, visit: &mut dyn FnMut(&mut XadesNode)) {
        visit(self);
        for child in &mut self.children {
            child.traverse(visit);
        }
    }

    /// Rewrite the prefix of every node whose namespace equals `ns_uri`,
    /// leaving foreign-namespaced children alone.
    pub fn apply_prefix(&mut self, ns_uri: &str, prefix: &str) {
        let ns_uri = ns_uri.to_owned();
        let prefix = prefix.to_owned();
        self.traverse(&mut |node| {
            if node.ns_uri == ns_uri {
                node.prefix = Some(prefix.clone());
            }
        });
    }

    fn qname(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }

    /// Serialize into a writer. Namespace declarations are not emitted here;
    /// the caller declares them on the appropriate ancestor (`xmlns:ds` on
    /// `Signature`, `xmlns:xa` on `QualifyingProperties`).
    pub fn serialize(&self, w: &mut XmlWriter) {
        let qname = self.qname();
        let attrs: Vec<(&str, &str)> = self
            .attrs
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        w.start_element(&qname, &attrs);
        if let Some(text) = &self.text {
            w.text(text);
        }
        for child in &self.children {
            child.serialize(w);
        }
        w.end_element();
    }

    /// Serialize to an XML fragment string.
    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new();
        self.serialize(&mut w);
        w.into_string()
    }

    /// Build a typed tree back out of a parsed DOM node.
    pub fn parse(node: roxmltree::Node<'_, '_>) -> Result<Self> {
        if !node.is_element() {
            return Err(Error::XmlStructure("expected an element node".into()));
        }
        let mut out = XadesNode::new(
            node.tag_name().name(),
            node.tag_name().namespace().unwrap_or(""),
        );
        for attr in node.attributes() {
            out.attrs
                .push((attr.name().to_owned(), attr.value().to_owned()));
        }
        let mut text = String::new();
        for child in node.children() {
            if child.is_element() {
                out.children.push(XadesNode::parse(child)?);
            } else if child.is_text() {
                text.push_str(child.text().unwrap_or(""));
            }
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.text = Some(trimmed.to_owned());
        }
        Ok(out)
    }

    /// Enforce that the listed children are present, in order of appearance.
    pub fn validate_required_children(&self, required: &[&str]) -> Result<()> {
        let mut cursor = 0;
        for want in required {
            match self.children[cursor..].iter().position(|c| c.local == *want) {
                Some(offset) => cursor += offset + 1,
                None => {
                    return Err(Error::StructuralMismatch(format!(
                        "{} is missing required child {want}",
                        self.local
                    )))
                }
            }
        }
        Ok(())
    }
}

// ── Optional signed-signature properties ─────────────────────────────

/// `SignatureProductionPlaceV2` content.
#[derive(Debug, Clone, Default)]
pub struct ProductionPlace {
    pub city: Option<String>,
    pub state_or_province: Option<String>,
    pub postal_code: Option<String>,
    pub country_name: Option<String>,
}

impl ProductionPlace {
    pub fn to_node(&self) -> XadesNode {
        let mut node = XadesNode::xades(ns::node::SIGNATURE_PRODUCTION_PLACE_V2);
        if let Some(city) = &self.city {
            node.push_child(XadesNode::xades(ns::node::CITY).with_text(city.clone()));
        }
        if let Some(state) = &self.state_or_province {
            node.push_child(XadesNode::xades(ns::node::STATE_OR_PROVINCE).with_text(state.clone()));
        }
        if let Some(postal) = &self.postal_code {
            node.push_child(XadesNode::xades(ns::node::POSTAL_CODE).with_text(postal.clone()));
        }
        if let Some(country) = &self.country_name {
            node.push_child(XadesNode::xades(ns::node::COUNTRY_NAME).with_text(country.clone()));
        }
        node
    }
}

/// `SignerRoleV2` content (claimed roles only; certified roles would need
/// an attribute-certificate stack).
#[derive(Debug, Clone, Default)]
pub struct SignerRole {
    pub claimed_roles: Vec<String>,
}

impl SignerRole {
    pub fn to_node(&self) -> XadesNode {
        let mut claimed = XadesNode::xades(ns::node::CLAIMED_ROLES);
        for role in &self.claimed_roles {
            claimed.push_child(XadesNode::xades(ns::node::CLAIMED_ROLE).with_text(role.clone()));
        }
        XadesNode::xades(ns::node::SIGNER_ROLE_V2).with_child(claimed)
    }
}

// ── SignedProperties construction ────────────────────────────────────

/// A `<Cert>` entry for `SigningCertificateV2`.
#[derive(Debug, Clone)]
pub struct CertEntry {
    pub digest_method_uri: String,
    pub digest_value_b64: String,
    pub issuer_serial_b64: Option<String>,
}

impl CertEntry {
    pub fn to_node(&self) -> XadesNode {
        let cert_digest = XadesNode::xades(ns::node::CERT_DIGEST)
            .with_child(
                XadesNode::dsig(ns::node::DIGEST_METHOD)
                    .with_attr(ns::attr::ALGORITHM, self.digest_method_uri.clone()),
            )
            .with_child(
                XadesNode::dsig(ns::node::DIGEST_VALUE).with_text(self.digest_value_b64.clone()),
            );
        let mut cert = XadesNode::xades(ns::node::CERT).with_child(cert_digest);
        if let Some(issuer_serial) = &self.issuer_serial_b64 {
            cert.push_child(
                XadesNode::xades(ns::node::ISSUER_SERIAL_V2).with_text(issuer_serial.clone()),
            );
        }
        cert
    }
}

/// Everything needed to build a `<SignedProperties>` subtree.
pub struct SignedPropertiesBuilder<'a> {
    pub id: &'a str,
    pub signing_time: String,
    pub cert_entries: Vec<CertEntry>,
    pub policy: Option<XadesNode>,
    pub production_place: Option<&'a ProductionPlace>,
    pub signer_role: Option<&'a SignerRole>,
    /// Id of the payload `<Reference>`, for `DataObjectFormat`.
    pub payload_ref_id: &'a str,
    pub mime_type: &'a str,
}

impl SignedPropertiesBuilder<'_> {
    /// Build the `<SignedProperties>` tree in schema order.
    pub fn build(&self) -> XadesNode {
        let mut signing_cert = XadesNode::xades(ns::node::SIGNING_CERTIFICATE_V2);
        for entry in &self.cert_entries {
            signing_cert.push_child(entry.to_node());
        }

        let mut ssp = XadesNode::xades(ns::node::SIGNED_SIGNATURE_PROPERTIES)
            .with_child(
                XadesNode::xades(ns::node::SIGNING_TIME).with_text(self.signing_time.clone()),
            )
            .with_child(signing_cert);
        if let Some(policy) = &self.policy {
            ssp.push_child(policy.clone());
        }
        if let Some(place) = self.production_place {
            ssp.push_child(place.to_node());
        }
        if let Some(role) = self.signer_role {
            ssp.push_child(role.to_node());
        }

        let data_object_format = XadesNode::xades(ns::node::DATA_OBJECT_FORMAT)
            .with_attr(
                ns::attr::OBJECT_REFERENCE,
                format!("#{}", self.payload_ref_id),
            )
            .with_child(XadesNode::xades(ns::node::MIME_TYPE).with_text(self.mime_type));
        let sdop = XadesNode::xades(ns::node::SIGNED_DATA_OBJECT_PROPERTIES)
            .with_child(data_object_format);

        XadesNode::xades(ns::node::SIGNED_PROPERTIES)
            .with_attr(ns::attr::ID, self.id)
            .with_child(ssp)
            .with_child(sdop)
    }
}

// ── Verification-side lookups ────────────────────────────────────────

/// Locate the `<QualifyingProperties>` of a signature and report which
/// XAdES namespace it uses. Accepts v1.3.2 and legacy v1.1.1.
pub fn find_qualifying_properties<'a>(
    sig_node: roxmltree::Node<'a, 'a>,
) -> Result<(roxmltree::Node<'a, 'a>, &'static str)> {
    for object in sig_node.children().filter(|n| {
        n.is_element()
            && n.tag_name().name() == ns::node::OBJECT
            && n.tag_name().namespace().unwrap_or("") == ns::DSIG
    }) {
        for xades_ns in [ns::XADES, ns::XADES_111] {
            if let Some(qp) =
                sigtuna_xml::document::find_child_element(object, xades_ns, ns::node::QUALIFYING_PROPERTIES)
            {
                return Ok((qp, xades_ns));
            }
        }
    }
    Err(Error::StructuralMismatch(
        "signature carries no QualifyingProperties".into(),
    ))
}

/// Structural validation of a parsed `<QualifyingProperties>`:
/// required containment, the `Target` binding, and the presence of a
/// signing-time plus signing-certificate group.
pub fn validate_structure(
    qp: roxmltree::Node<'_, '_>,
    sig_node: roxmltree::Node<'_, '_>,
) -> Result<()> {
    let target = qp
        .attribute(ns::attr::TARGET)
        .ok_or_else(|| Error::StructuralMismatch("QualifyingProperties lacks Target".into()))?;
    if let Some(sig_id) = sig_node.attribute(ns::attr::ID) {
        if target.strip_prefix('#') != Some(sig_id) {
            return Err(Error::StructuralMismatch(format!(
                "QualifyingProperties Target {target} does not name its Signature"
            )));
        }
    }

    let sp = find_child_element_ns_any(qp, &XADES_NAMESPACES, ns::node::SIGNED_PROPERTIES)
        .ok_or_else(|| Error::StructuralMismatch("SignedProperties missing".into()))?;
    if sp.attribute(ns::attr::ID).is_none() {
        return Err(Error::StructuralMismatch(
            "SignedProperties carries no Id".into(),
        ));
    }

    let ssp = find_child_element_ns_any(
        sp,
        &XADES_NAMESPACES,
        ns::node::SIGNED_SIGNATURE_PROPERTIES,
    )
    .ok_or_else(|| Error::StructuralMismatch("SignedSignatureProperties missing".into()))?;

    if find_child_element_ns_any(ssp, &XADES_NAMESPACES, ns::node::SIGNING_TIME).is_none() {
        return Err(Error::StructuralMismatch("SigningTime missing".into()));
    }
    let has_v2 =
        find_child_element_ns_any(ssp, &XADES_NAMESPACES, ns::node::SIGNING_CERTIFICATE_V2)
            .is_some();
    let has_v1 =
        find_child_element_ns_any(ssp, &XADES_NAMESPACES, ns::node::SIGNING_CERTIFICATE).is_some();
    if !has_v2 && !has_v1 {
        return Err(Error::StructuralMismatch(
            "neither SigningCertificateV2 nor SigningCertificate present".into(),
        ));
    }
    if has_v2 && has_v1 {
        return Err(Error::StructuralMismatch(
            "SigningCertificate and SigningCertificateV2 are mutually exclusive".into(),
        ));
    }
    Ok(())
}

/// Find the `<SignedProperties>` element of a signature.
pub fn find_signed_properties<'a>(
    qp: roxmltree::Node<'a, 'a>,
) -> Result<roxmltree::Node<'a, 'a>> {
    find_child_element_ns_any(qp, &XADES_NAMESPACES, ns::node::SIGNED_PROPERTIES)
        .ok_or_else(|| Error::StructuralMismatch("SignedProperties missing".into()))
}

/// Find the `<UnsignedSignatureProperties>` element, if present.
pub fn find_unsigned_signature_properties<'a>(
    qp: roxmltree::Node<'a, 'a>,
) -> Option<roxmltree::Node<'a, 'a>> {
    let up = find_child_element_ns_any(qp, &XADES_NAMESPACES, ns::node::UNSIGNED_PROPERTIES)?;
    find_child_element_ns_any(
        up,
        &XADES_NAMESPACES,
        ns::node::UNSIGNED_SIGNATURE_PROPERTIES,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_rewrite_skips_foreign_namespaces() {
        let mut tree = XadesNode::xades("SignedProperties")
            .with_child(XadesNode::dsig("DigestMethod"))
            .with_child(XadesNode::xades("SigningTime").with_text("t"));
        tree.apply_prefix(ns::XADES, "xa");
        tree.apply_prefix(ns::DSIG, "ds");

        assert_eq!(tree.prefix.as_deref(), Some("xa"));
        assert_eq!(tree.children[0].prefix.as_deref(), Some("ds"));
        assert_eq!(tree.children[1].prefix.as_deref(), Some("xa"));
    }

    #[test]
    fn serialization_uses_open_close_pairs() {
        let mut node = XadesNode::xades("SignedDataObjectProperties");
        node.apply_prefix(ns::XADES, "xa");
        assert_eq!(
            node.to_xml(),
            "<xa:SignedDataObjectProperties></xa:SignedDataObjectProperties>"
        );
    }

    #[test]
    fn parse_round_trips_structure() {
        let xml = format!(
            r#"<xa:SignedProperties xmlns:xa="{}" Id="sp"><xa:SignedSignatureProperties><xa:SigningTime>2026-01-01T00:00:00Z</xa:SigningTime></xa:SignedSignatureProperties></xa:SignedProperties>"#,
            ns::XADES
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let tree = XadesNode::parse(doc.root_element()).unwrap();
        assert_eq!(tree.local, "SignedProperties");
        assert_eq!(tree.id(), Some("sp"));
        let ssp = tree.find_child("SignedSignatureProperties").unwrap();
        assert_eq!(
            ssp.find_child("SigningTime").unwrap().text.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[test]
    fn required_children_enforce_order() {
        let node = XadesNode::xades("SignedProperties")
            .with_child(XadesNode::xades("SignedSignatureProperties"))
            .with_child(XadesNode::xades("SignedDataObjectProperties"));
        assert!(node
            .validate_required_children(&[
                "SignedSignatureProperties",
                "SignedDataObjectProperties"
            ])
            .is_ok());
        assert!(node
            .validate_required_children(&[
                "SignedDataObjectProperties",
                "SignedSignatureProperties"
            ])
            .is_err());
    }

    #[test]
    fn signed_properties_spec_builds_schema_order() {
        let builder = SignedPropertiesBuilder {
            id: "sp-1",
            signing_time: "2026-01-01T00:00:00Z".into(),
            cert_entries: vec![CertEntry {
                digest_method_uri: sigtuna_core::algorithm::SHA256.into(),
                digest_value_b64: "AAAA".into(),
                issuer_serial_b64: Some("BBBB".into()),
            }],
            policy: None,
            production_place: None,
            signer_role: None,
            payload_ref_id: "ref0",
            mime_type: "text/xml",
        };
        let node = builder.build();
        assert_eq!(node.id(), Some("sp-1"));
        node.validate_required_children(&[
            "SignedSignatureProperties",
            "SignedDataObjectProperties",
        ])
        .unwrap();
        let ssp = node.find_child("SignedSignatureProperties").unwrap();
        ssp.validate_required_children(&["SigningTime", "SigningCertificateV2"])
            .unwrap();
    }
}
