#![forbid(unsafe_code)]

//! XML namespace constants used across the library.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XAdES v1.3.2 namespace (ETSI TS 101 903 / EN 319 132-1), the default
/// target for produced signatures.
pub const XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// Legacy XAdES v1.1.1 namespace, accepted on verify only.
pub const XADES_111: &str = "http://uri.etsi.org/01903/v1.1.1#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// Prefix the library uses for XML-DSig elements it produces.
pub const DSIG_PREFIX: &str = "ds";

/// Prefix applied to every XAdES element before it is spliced into a host
/// document, so that importing never re-declares namespaces on foreign nodes.
pub const XADES_PREFIX: &str = "xa";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const OBJECT: &str = "Object";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_SERIAL: &str = "X509IssuerSerial";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";

    // XAdES qualifying properties
    pub const QUALIFYING_PROPERTIES: &str = "QualifyingProperties";
    pub const SIGNED_PROPERTIES: &str = "SignedProperties";
    pub const SIGNED_SIGNATURE_PROPERTIES: &str = "SignedSignatureProperties";
    pub const SIGNED_DATA_OBJECT_PROPERTIES: &str = "SignedDataObjectProperties";
    pub const UNSIGNED_PROPERTIES: &str = "UnsignedProperties";
    pub const UNSIGNED_SIGNATURE_PROPERTIES: &str = "UnsignedSignatureProperties";

    pub const SIGNING_TIME: &str = "SigningTime";
    pub const SIGNING_CERTIFICATE: &str = "SigningCertificate";
    pub const SIGNING_CERTIFICATE_V2: &str = "SigningCertificateV2";
    pub const CERT: &str = "Cert";
    pub const CERT_DIGEST: &str = "CertDigest";
    pub const ISSUER_SERIAL: &str = "IssuerSerial";
    pub const ISSUER_SERIAL_V2: &str = "IssuerSerialV2";

    pub const SIGNATURE_POLICY_IDENTIFIER: &str = "SignaturePolicyIdentifier";
    pub const SIGNATURE_POLICY_IMPLIED: &str = "SignaturePolicyImplied";
    pub const SIGNATURE_POLICY_ID: &str = "SignaturePolicyId";
    pub const SIG_POLICY_ID: &str = "SigPolicyId";
    pub const SIG_POLICY_HASH: &str = "SigPolicyHash";
    pub const IDENTIFIER: &str = "Identifier";

    pub const SIGNATURE_PRODUCTION_PLACE: &str = "SignatureProductionPlace";
    pub const SIGNATURE_PRODUCTION_PLACE_V2: &str = "SignatureProductionPlaceV2";
    pub const CITY: &str = "City";
    pub const STATE_OR_PROVINCE: &str = "StateOrProvince";
    pub const POSTAL_CODE: &str = "PostalCode";
    pub const COUNTRY_NAME: &str = "CountryName";

    pub const SIGNER_ROLE: &str = "SignerRole";
    pub const SIGNER_ROLE_V2: &str = "SignerRoleV2";
    pub const CLAIMED_ROLES: &str = "ClaimedRoles";
    pub const CLAIMED_ROLE: &str = "ClaimedRole";

    pub const DATA_OBJECT_FORMAT: &str = "DataObjectFormat";
    pub const MIME_TYPE: &str = "MimeType";

    pub const SIGNATURE_TIME_STAMP: &str = "SignatureTimeStamp";
    pub const ENCAPSULATED_TIME_STAMP: &str = "EncapsulatedTimeStamp";
    pub const COUNTER_SIGNATURE: &str = "CounterSignature";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const TARGET: &str = "Target";
    pub const OBJECT_REFERENCE: &str = "ObjectReference";
    pub const PREFIX_LIST: &str = "PrefixList";
    pub const QUALIFIER: &str = "Qualifier";
}
