#![forbid(unsafe_code)]

/// Errors produced by the Sigtuna XAdES library.
///
/// The first group is the verification-failure taxonomy surfaced to callers;
/// the second group covers ambient parsing/crypto/IO failures. Every fatal
/// kind propagates; only [`Error::TimestampInconclusive`] is downgraded to a
/// logged warning by the verification flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid resource input: {0}")]
    InvalidInput(String),

    #[error("document already contains a signature: {0}")]
    DocumentConflict(String),

    #[error("missing or malformed XAdES structure: {0}")]
    StructuralMismatch(String),

    #[error("reference digest mismatch: {0}")]
    ReferenceDigestMismatch(String),

    #[error("signature value verification failed: {0}")]
    SignatureCryptoInvalid(String),

    #[error("signing certificate binding mismatch: {0}")]
    CertificateBindingMismatch(String),

    #[error("time-stamp token invalid: {0}")]
    TimestampInvalid(String),

    #[error("time-stamp token inconclusive: {0}")]
    TimestampInconclusive(String),

    #[error("counter-signature invalid: {0}")]
    CounterSignatureInvalid(String),

    #[error("signature policy document unavailable: {0}")]
    PolicyMissing(String),

    #[error("signature policy digest mismatch: {0}")]
    PolicyDigestMismatch(String),

    #[error("external fetch failed: {0}")]
    ExternalFetchFailed(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("ASN.1 error: {0}")]
    Asn1(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
