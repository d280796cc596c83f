#![forbid(unsafe_code)]

//! RFC 3161 time-stamp token (TST) handling.
//!
//! The core signing/verification flows talk to a time-stamp authority only
//! through the [`TimestampAuthority`] trait: `request_tst` turns the
//! canonical `<SignatureValue>` octets into a DER token, and `verify_tst`
//! checks a token against those octets. The transport (TSA HTTP exchange,
//! OCSP fetches) lives behind the trait; an unreachable responder surfaces
//! as [`TstVerdict::Inconclusive`], never as a hard failure here.

pub mod mock;
pub mod token;

use sigtuna_core::{Error, Result};

/// Outcome of validating a time-stamp token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TstVerdict {
    /// Imprint matches and the token signature verifies.
    Valid,
    /// The token could not be fully validated (e.g. the signer certificate
    /// is not embedded and no issuer/OCSP lookup is available).
    Inconclusive(String),
    /// Imprint mismatch or invalid token signature.
    Invalid(String),
}

/// A time-stamp authority as seen by the signing and verification flows.
pub trait TimestampAuthority {
    /// Produce a DER time-stamp token whose message imprint is the digest of
    /// `message` under the given digest algorithm URI.
    fn request_tst(&self, message: &[u8], digest_uri: &str) -> Result<Vec<u8>>;

    /// Validate a DER time-stamp token against the original message octets.
    fn verify_tst(&self, tst_der: &[u8], message: &[u8]) -> Result<TstVerdict>;
}

/// The built-in validator: checks CMS tokens with [`token::validate_token`]
/// but has no transport, so it cannot request new tokens.
pub struct TokenValidator;

impl TimestampAuthority for TokenValidator {
    fn request_tst(&self, _message: &[u8], _digest_uri: &str) -> Result<Vec<u8>> {
        Err(Error::ExternalFetchFailed(
            "no TSA transport configured".into(),
        ))
    }

    fn verify_tst(&self, tst_der: &[u8], message: &[u8]) -> Result<TstVerdict> {
        token::validate_token(tst_der, message)
    }
}

/// Map a digest algorithm URI to its ASN.1 OID.
pub fn digest_oid(digest_uri: &str) -> Result<der::asn1::ObjectIdentifier> {
    use sigtuna_core::algorithm;
    let oid = match digest_uri {
        algorithm::SHA1 => token::OID_SHA1,
        algorithm::SHA256 => token::OID_SHA256,
        algorithm::SHA384 => token::OID_SHA384,
        algorithm::SHA512 => token::OID_SHA512,
        _ => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "TST digest: {digest_uri}"
            )))
        }
    };
    Ok(oid)
}

/// Map an ASN.1 digest OID back to its algorithm URI.
pub fn digest_uri_for_oid(oid: &der::asn1::ObjectIdentifier) -> Result<&'static str> {
    use sigtuna_core::algorithm;
    let uri = if *oid == token::OID_SHA1 {
        algorithm::SHA1
    } else if *oid == token::OID_SHA256 {
        algorithm::SHA256
    } else if *oid == token::OID_SHA384 {
        algorithm::SHA384
    } else if *oid == token::OID_SHA512 {
        algorithm::SHA512
    } else {
        return Err(Error::UnsupportedAlgorithm(format!("TST digest OID: {oid}")));
    };
    Ok(uri)
}
