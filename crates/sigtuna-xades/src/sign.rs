#![forbid(unsafe_code)]

//! The signing orchestrator.
//!
//! Builds the signature template (SignedInfo with its two references,
//! KeyInfo, and the qualifying-properties object), splices it into or
//! around the payload according to the signature mode, and hands the
//! result to the DSig driver. Output is only written to disk after the
//! whole operation has succeeded.

use crate::certbind;
use crate::input::ResourceInput;
use crate::policy::{DefaultPolicy, PolicyStrategy};
use crate::properties::{ProductionPlace, SignedPropertiesBuilder, SignerRole};
use crate::splice;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns, Error, Result};
use sigtuna_dsig::{DsigContext, SignatureSelector};
use sigtuna_keys::Key;
use sigtuna_tsa::TimestampAuthority;
use sigtuna_xml::XmlWriter;
use std::path::PathBuf;

static DEFAULT_POLICY: DefaultPolicy = DefaultPolicy;

/// Where the signature lives relative to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMode {
    /// The signature is inserted into the payload document.
    Enveloped,
    /// The payload is embedded in a `<ds:Object>` of the signature.
    Enveloping,
    /// The signature references the payload externally.
    Detached,
}

/// Options for a sign operation.
pub struct SignOptions {
    pub mode: SignatureMode,
    pub c14n: C14nMode,
    /// Pin the signature id (otherwise randomly generated). Derived ids
    /// (references, SignedProperties, SignatureValue) follow from it.
    pub signature_id: Option<String>,
    /// Pin the signing time (otherwise the current UTC time).
    pub signing_time: Option<chrono::DateTime<Utc>>,
    pub production_place: Option<ProductionPlace>,
    pub signer_role: Option<SignerRole>,
    /// MIME type recorded in `DataObjectFormat` for the payload.
    pub mime_type: String,
    /// Attach a `<SignatureTimeStamp>` right after signing (XAdES-T).
    pub add_timestamp: bool,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            mode: SignatureMode::Enveloped,
            c14n: C14nMode::Inclusive,
            signature_id: None,
            signing_time: None,
            production_place: None,
            signer_role: None,
            mime_type: "text/xml".into(),
            add_timestamp: false,
        }
    }
}

/// The result of a sign operation.
#[derive(Debug)]
pub struct SignedDocument {
    /// The signed document text (the whole document for enveloped mode,
    /// the signature document for enveloping and detached modes).
    pub text: String,
    /// The `Id` of the produced `<ds:Signature>`.
    pub signature_id: String,
    /// Where the document was written, when it was.
    pub path: Option<PathBuf>,
}

/// The XAdES signing orchestrator.
pub struct XadesSigner<'a> {
    pub ctx: DsigContext,
    policy: &'a dyn PolicyStrategy,
    tsa: Option<&'a dyn TimestampAuthority>,
}

impl Default for XadesSigner<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> XadesSigner<'a> {
    pub fn new() -> Self {
        Self {
            ctx: DsigContext::new(),
            policy: &DEFAULT_POLICY,
            tsa: None,
        }
    }

    pub fn with_policy(policy: &'a dyn PolicyStrategy) -> Self {
        Self {
            ctx: DsigContext::new(),
            policy,
            tsa: None,
        }
    }

    pub fn set_tsa(&mut self, tsa: &'a dyn TimestampAuthority) {
        self.tsa = Some(tsa);
    }

    /// Sign a payload and return the document text without touching disk.
    ///
    /// The key is consumed: a signer is used exactly once per operation.
    pub fn sign_document(
        &self,
        input: &ResourceInput,
        key: Key,
        opts: &SignOptions,
    ) -> Result<SignedDocument> {
        if !key.has_private() {
            return Err(Error::Key("signing requires a private key".into()));
        }
        let chain = key.x509_chain.clone();
        let (template, signature_id, op_ctx) = self.build_template_document(input, &chain, opts)?;

        let mut signed = sigtuna_dsig::sign::sign(
            &op_ctx,
            &template,
            &key,
            SignatureSelector::ById(&signature_id),
        )?;
        drop(key);

        if opts.add_timestamp {
            let tsa = self.tsa.ok_or_else(|| {
                Error::InvalidInput("timestamping requested but no TSA configured".into())
            })?;
            signed = crate::timestamp::attach(&signed, &signature_id, tsa)?;
        }

        log::info!("produced signature {signature_id}");
        Ok(SignedDocument {
            text: signed,
            signature_id,
            path: None,
        })
    }

    /// Sign a payload and write the output to the configured save location.
    pub fn sign(
        &self,
        input: &ResourceInput,
        key: Key,
        opts: &SignOptions,
    ) -> Result<SignedDocument> {
        let mut signed = self.sign_document(input, key, opts)?;
        let path = self
            .policy
            .signature_filename(&input.output_dir()?, input.save_name());
        std::fs::write(&path, signed.text.as_bytes())?;
        signed.path = Some(path);
        Ok(signed)
    }

    /// Counter-sign the first signature of an already-signed document.
    pub fn counter_sign(
        &self,
        input: &ResourceInput,
        key: Key,
        opts: &SignOptions,
    ) -> Result<SignedDocument> {
        let xml = input.load_text()?;
        let mut signed = crate::countersign::counter_sign(self, &xml, key, opts)?;
        if let Ok(dir) = input.output_dir() {
            let path = self.policy.signature_filename(&dir, input.save_name());
            std::fs::write(&path, signed.text.as_bytes())?;
            signed.path = Some(path);
        }
        Ok(signed)
    }

    /// Build the template and return the exact canonical `<SignedInfo>`
    /// octets an in-process signer would sign, for out-of-process signing.
    /// The returned template has its reference digests filled in.
    pub fn prepare_signed_info(
        &self,
        input: &ResourceInput,
        chain: &[Vec<u8>],
        opts: &SignOptions,
    ) -> Result<(String, String, Vec<u8>)> {
        let (template, signature_id, op_ctx) = self.build_template_document(input, chain, opts)?;
        let (filled, bytes) = sigtuna_dsig::sign::signed_info_bytes(
            &op_ctx,
            &template,
            SignatureSelector::ById(&signature_id),
        )?;
        Ok((filled, signature_id, bytes))
    }

    /// Assemble the unsigned template document for a payload: signature
    /// skeleton plus qualifying properties, spliced per the mode.
    fn build_template_document(
        &self,
        input: &ResourceInput,
        chain: &[Vec<u8>],
        opts: &SignOptions,
    ) -> Result<(String, String, DsigContext)> {
        if input.is_detached() != (opts.mode == SignatureMode::Detached) {
            return Err(Error::InvalidInput(
                "signature mode disagrees with the input's detached flag".into(),
            ));
        }

        let signature_id = opts
            .signature_id
            .clone()
            .unwrap_or_else(generate_signature_id);
        let payload_ref_id = format!("{signature_id}-ref0");
        let signed_props_id = format!("{signature_id}-signedprops");
        let object_id = format!("{signature_id}-object");

        let leaf = chain
            .first()
            .ok_or_else(|| Error::Key("a signing certificate is required".into()))?;
        let issuer = chain.get(1).map(|v| v.as_slice());
        let cert_entries = certbind::build_cert_entries(leaf, issuer, algorithm::SHA256)?;

        let signing_time = opts
            .signing_time
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut signed_props = SignedPropertiesBuilder {
            id: &signed_props_id,
            signing_time,
            cert_entries,
            policy: self.policy.policy_identifier(),
            production_place: opts.production_place.as_ref(),
            signer_role: opts.signer_role.as_ref(),
            payload_ref_id: &payload_ref_id,
            mime_type: &opts.mime_type,
        }
        .build();
        signed_props.apply_prefix(ns::XADES, ns::XADES_PREFIX);
        signed_props.apply_prefix(ns::DSIG, ns::DSIG_PREFIX);

        let mut op_ctx = DsigContext {
            id_attrs: self.ctx.id_attrs.clone(),
            url_maps: self.ctx.url_maps.clone(),
            base_dir: self.ctx.base_dir.clone(),
        };

        match opts.mode {
            SignatureMode::Enveloped => {
                let host = input.load_text()?;
                let doc = roxmltree::Document::parse_with_options(
                    &host,
                    sigtuna_xml::parsing_options(),
                )
                .map_err(|e| Error::XmlParse(e.to_string()))?;
                if sigtuna_dsig::verify::find_signature(&doc, SignatureSelector::FirstTopLevel)
                    .is_ok()
                {
                    return Err(Error::DocumentConflict(
                        "document already carries a Signature and the mode is not detached"
                            .into(),
                    ));
                }
                let template = build_signature_template(&SignatureTemplate {
                    signature_id: &signature_id,
                    c14n: opts.c14n,
                    payload: PayloadRef::Enveloped {
                        ref_id: &payload_ref_id,
                    },
                    key_info_certs: chain,
                    signed_props_xml: &signed_props.to_xml(),
                    enveloping_payload: None,
                    object_id: &object_id,
                });
                let root = doc.root_element();
                let text = splice::insert_child_fragment(&host, root, &template)?;
                Ok((text, signature_id, op_ctx))
            }
            SignatureMode::Enveloping => {
                let payload = input.load_text()?;
                roxmltree::Document::parse_with_options(
                    &payload,
                    sigtuna_xml::parsing_options(),
                )
                .map_err(|e| Error::XmlParse(format!("payload: {e}")))?;
                let inner = strip_prolog(&payload).to_owned();
                let template = build_signature_template(&SignatureTemplate {
                    signature_id: &signature_id,
                    c14n: opts.c14n,
                    payload: PayloadRef::Object {
                        ref_id: &payload_ref_id,
                        object_id: &object_id,
                    },
                    key_info_certs: chain,
                    signed_props_xml: &signed_props.to_xml(),
                    enveloping_payload: Some(&inner),
                    object_id: &object_id,
                });
                Ok((template, signature_id, op_ctx))
            }
            SignatureMode::Detached => {
                let uri = input.detached_reference_uri()?;
                if let crate::input::ResourceKind::File(path) = input.kind() {
                    if let Some(parent) = path.parent() {
                        op_ctx.base_dir = Some(parent.to_string_lossy().into_owned());
                    }
                }
                let template = build_signature_template(&SignatureTemplate {
                    signature_id: &signature_id,
                    c14n: opts.c14n,
                    payload: PayloadRef::Detached {
                        ref_id: &payload_ref_id,
                        uri: &uri,
                    },
                    key_info_certs: chain,
                    signed_props_xml: &signed_props.to_xml(),
                    enveloping_payload: None,
                    object_id: &object_id,
                });
                Ok((template, signature_id, op_ctx))
            }
        }
    }
}

/// How the payload reference is expressed.
pub(crate) enum PayloadRef<'a> {
    Enveloped {
        ref_id: &'a str,
    },
    Object {
        ref_id: &'a str,
        object_id: &'a str,
    },
    Detached {
        ref_id: &'a str,
        uri: &'a str,
    },
    /// A counter-signature's single reference to an outer SignatureValue.
    CounterSignature {
        ref_id: &'a str,
        target_uri: &'a str,
    },
}

pub(crate) struct SignatureTemplate<'a> {
    pub signature_id: &'a str,
    pub c14n: C14nMode,
    pub payload: PayloadRef<'a>,
    pub key_info_certs: &'a [Vec<u8>],
    pub signed_props_xml: &'a str,
    pub enveloping_payload: Option<&'a str>,
    pub object_id: &'a str,
}

/// Render the full `<ds:Signature>` template with empty digest and
/// signature values. Every element is written as an open/close pair.
pub(crate) fn build_signature_template(tpl: &SignatureTemplate<'_>) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let c14n_uri = tpl.c14n.uri();
    let mut w = XmlWriter::new();

    w.start_element(
        "ds:Signature",
        &[("xmlns:ds", ns::DSIG), ("Id", tpl.signature_id)],
    );

    // SignedInfo: payload reference first, SignedProperties reference
    // second. Common XAdES verifiers rely on that ordering.
    w.start_element("ds:SignedInfo", &[]);
    w.empty_element("ds:CanonicalizationMethod", &[("Algorithm", c14n_uri)]);
    w.empty_element(
        "ds:SignatureMethod",
        &[("Algorithm", algorithm::RSA_SHA256)],
    );

    match &tpl.payload {
        PayloadRef::Enveloped { ref_id } => {
            w.start_element("ds:Reference", &[("Id", ref_id), ("URI", "")]);
            w.start_element("ds:Transforms", &[]);
            w.empty_element(
                "ds:Transform",
                &[("Algorithm", algorithm::ENVELOPED_SIGNATURE)],
            );
            w.empty_element("ds:Transform", &[("Algorithm", c14n_uri)]);
            w.end_element();
        }
        PayloadRef::Object { ref_id, object_id } => {
            let uri = format!("#{object_id}");
            w.start_element("ds:Reference", &[("Id", ref_id), ("URI", &uri)]);
            w.start_element("ds:Transforms", &[]);
            w.empty_element("ds:Transform", &[("Algorithm", c14n_uri)]);
            w.end_element();
        }
        PayloadRef::Detached { ref_id, uri } => {
            w.start_element("ds:Reference", &[("Id", ref_id), ("URI", uri)]);
        }
        PayloadRef::CounterSignature { ref_id, target_uri } => {
            w.start_element(
                "ds:Reference",
                &[
                    ("Id", ref_id),
                    ("URI", target_uri),
                    ("Type", algorithm::COUNTERSIGNED_SIGNATURE_TYPE),
                ],
            );
            w.start_element("ds:Transforms", &[]);
            w.empty_element("ds:Transform", &[("Algorithm", c14n_uri)]);
            w.end_element();
        }
    }
    w.empty_element("ds:DigestMethod", &[("Algorithm", algorithm::SHA256)]);
    w.empty_element("ds:DigestValue", &[]);
    w.end_element(); // payload Reference

    let sp_uri = format!("#{}-signedprops", tpl.signature_id);
    w.start_element(
        "ds:Reference",
        &[
            ("URI", &sp_uri),
            ("Type", algorithm::SIGNED_PROPERTIES_TYPE),
        ],
    );
    w.start_element("ds:Transforms", &[]);
    w.empty_element("ds:Transform", &[("Algorithm", c14n_uri)]);
    w.end_element();
    w.empty_element("ds:DigestMethod", &[("Algorithm", algorithm::SHA256)]);
    w.empty_element("ds:DigestValue", &[]);
    w.end_element(); // SignedProperties Reference
    w.end_element(); // SignedInfo

    let sv_id = format!("{}-sigvalue", tpl.signature_id);
    w.empty_element("ds:SignatureValue", &[("Id", &sv_id)]);

    if !tpl.key_info_certs.is_empty() {
        w.start_element("ds:KeyInfo", &[]);
        w.start_element("ds:X509Data", &[]);
        for der in tpl.key_info_certs {
            w.text_element("ds:X509Certificate", &[], &engine.encode(der));
        }
        w.end_element();
        w.end_element();
    }

    if let Some(payload) = tpl.enveloping_payload {
        w.start_element("ds:Object", &[("Id", tpl.object_id)]);
        w.raw(payload);
        w.end_element();
    }

    w.start_element("ds:Object", &[]);
    w.start_element(
        "xa:QualifyingProperties",
        &[
            ("xmlns:xa", ns::XADES),
            ("Target", &format!("#{}", tpl.signature_id)),
        ],
    );
    w.raw(tpl.signed_props_xml);
    w.end_element();
    w.end_element();

    w.end_element(); // Signature
    w.into_string()
}

/// A fresh signature id; derived element ids are suffixes of it.
pub(crate) fn generate_signature_id() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "xmldsig-{:08x}{:08x}",
        rng.gen::<u32>(),
        rng.gen::<u32>()
    )
}

/// Strip an XML declaration (and leading whitespace) off a payload so it
/// can be embedded inside `<ds:Object>`.
fn strip_prolog(text: &str) -> &str {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<?xml") {
        if let Some(end) = rest.find("?>") {
            return rest[end + 2..].trim_start();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_two_references_in_order() {
        let tpl = SignatureTemplate {
            signature_id: "sig-1",
            c14n: C14nMode::Inclusive,
            payload: PayloadRef::Enveloped { ref_id: "sig-1-ref0" },
            key_info_certs: &[],
            signed_props_xml: "<xa:SignedProperties Id=\"sig-1-signedprops\"></xa:SignedProperties>",
            enveloping_payload: None,
            object_id: "sig-1-object",
        };
        let xml = build_signature_template(&tpl);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let refs: Vec<_> = doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "Reference")
            .collect();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].attribute("URI"), Some(""));
        assert_eq!(
            refs[1].attribute("Type"),
            Some(algorithm::SIGNED_PROPERTIES_TYPE)
        );
        assert_eq!(refs[1].attribute("URI"), Some("#sig-1-signedprops"));
    }

    #[test]
    fn template_has_no_self_closing_tags() {
        let tpl = SignatureTemplate {
            signature_id: "sig-1",
            c14n: C14nMode::Inclusive,
            payload: PayloadRef::Detached {
                ref_id: "sig-1-ref0",
                uri: "payload.xml",
            },
            key_info_certs: &[],
            signed_props_xml: "<xa:SignedProperties></xa:SignedProperties>",
            enveloping_payload: None,
            object_id: "sig-1-object",
        };
        let xml = build_signature_template(&tpl);
        assert!(!xml.contains("/>"));
    }

    #[test]
    fn prolog_is_stripped_for_enveloping() {
        assert_eq!(
            strip_prolog("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root></root>"),
            "<root></root>"
        );
        assert_eq!(strip_prolog("<root></root>"), "<root></root>");
    }
}
