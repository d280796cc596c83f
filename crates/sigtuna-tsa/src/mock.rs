#![forbid(unsafe_code)]

//! Deterministic in-process time-stamp authority.
//!
//! Issues bare `TSTInfo` structures (no CMS wrapper, no TSA signature) whose
//! message imprint echoes the digest of the request. Intended for tests and
//! offline pipelines where the imprint binding itself is what matters.

use crate::{TimestampAuthority, TstVerdict};
use der::asn1::{Int, ObjectIdentifier, OctetString};
use der::{DateTime, Decode, Encode};
use sigtuna_core::{Error, Result};
use spki::AlgorithmIdentifierOwned;
use x509_tsp::{MessageImprint, TspVersion, TstInfo};

const MOCK_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1");

/// A mock TSA with a fixed generation time and running serial.
pub struct MockTsa {
    gen_time: DateTime,
}

impl MockTsa {
    /// Create a mock TSA stamping at the given time.
    pub fn new(gen_time: DateTime) -> Self {
        Self { gen_time }
    }

    /// A mock TSA with a fixed, arbitrary generation time.
    pub fn fixed() -> Result<Self> {
        let gen_time = DateTime::new(2026, 1, 1, 0, 0, 0)
            .map_err(|e| Error::Asn1(format!("mock TSA time: {e}")))?;
        Ok(Self::new(gen_time))
    }
}

impl TimestampAuthority for MockTsa {
    fn request_tst(&self, message: &[u8], digest_uri: &str) -> Result<Vec<u8>> {
        let digest = sigtuna_crypto::digest::digest(digest_uri, message)?;
        let tst = TstInfo {
            version: TspVersion::V1,
            policy: MOCK_POLICY,
            message_imprint: MessageImprint {
                hash_algorithm: AlgorithmIdentifierOwned {
                    oid: crate::digest_oid(digest_uri)?,
                    parameters: None,
                },
                hashed_message: OctetString::new(digest)
                    .map_err(|e| Error::Asn1(format!("MessageImprint: {e}")))?,
            },
            serial_number: Int::new(&[0x01])
                .map_err(|e| Error::Asn1(format!("serial: {e}")))?,
            gen_time: der::asn1::GeneralizedTime::from_date_time(self.gen_time),
            accuracy: None,
            ordering: false,
            nonce: None,
            tsa: None,
            extensions: None,
        };
        tst.to_der()
            .map_err(|e| Error::Asn1(format!("TSTInfo encoding: {e}")))
    }

    fn verify_tst(&self, tst_der: &[u8], message: &[u8]) -> Result<TstVerdict> {
        let tst_info = match TstInfo::from_der(tst_der) {
            Ok(t) => t,
            Err(e) => return Ok(TstVerdict::Invalid(format!("malformed TSTInfo: {e}"))),
        };
        match crate::token::check_imprint(&tst_info, message)? {
            Some(verdict) => Ok(verdict),
            None => Ok(TstVerdict::Valid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtuna_core::algorithm;

    #[test]
    fn issued_token_verifies_against_same_message() {
        let tsa = MockTsa::fixed().unwrap();
        let token = tsa.request_tst(b"signature value", algorithm::SHA256).unwrap();
        assert_eq!(
            tsa.verify_tst(&token, b"signature value").unwrap(),
            TstVerdict::Valid
        );
    }

    #[test]
    fn tampered_message_is_invalid() {
        let tsa = MockTsa::fixed().unwrap();
        let token = tsa.request_tst(b"signature value", algorithm::SHA256).unwrap();
        assert!(matches!(
            tsa.verify_tst(&token, b"tampered value").unwrap(),
            TstVerdict::Invalid(_)
        ));
    }

    #[test]
    fn imprint_echoes_the_requested_digest() {
        let tsa = MockTsa::fixed().unwrap();
        let token = tsa.request_tst(b"abc", algorithm::SHA256).unwrap();
        let tst = TstInfo::from_der(&token).unwrap();
        let expected = sigtuna_crypto::digest::digest(algorithm::SHA256, b"abc").unwrap();
        assert_eq!(tst.message_imprint.hashed_message.as_bytes(), expected);
    }
}
