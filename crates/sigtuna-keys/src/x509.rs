#![forbid(unsafe_code)]

//! X.509 certificate identity helpers for the signing-certificate binding.
//!
//! Extracts serial numbers and canonical issuer names, computes certificate
//! digests, and encodes/decodes the `IssuerSerial` structure
//! (`SEQUENCE { GeneralNames, CertificateSerialNumber }`, RFC 5035) carried
//! base64-encoded inside `<IssuerSerialV2>`.

use der::{Decode, Encode, Sequence};
use sigtuna_core::Error;
use x509_cert::ext::pkix::name::{GeneralName, GeneralNames};
use x509_cert::serial_number::SerialNumber;

pub use x509_cert::Certificate;

/// `IssuerSerial` as used by ESS signing-certificate attributes.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IssuerSerial {
    pub issuer: GeneralNames,
    pub serial_number: SerialNumber,
}

/// Parse a DER certificate.
pub fn parse_cert(der_data: &[u8]) -> Result<Certificate, Error> {
    Certificate::from_der(der_data)
        .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))
}

/// The certificate's serial number as minimal big-endian bytes.
pub fn serial_bytes(cert: &Certificate) -> Vec<u8> {
    trim_serial(cert.tbs_certificate.serial_number.as_bytes())
}

/// Strip leading zero octets so serials compare as big integers.
pub fn trim_serial(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    if first == bytes.len() {
        vec![0]
    } else {
        bytes[first..].to_vec()
    }
}

/// Render a serial number as a decimal string (how `<X509SerialNumber>`
/// carries it). Serials routinely exceed u128, so this is long division
/// over the byte string.
pub fn serial_decimal(bytes: &[u8]) -> String {
    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = (*d as u32) * 256 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    digits
        .iter()
        .rev()
        .map(|d| char::from(b'0' + d))
        .collect()
}

/// The issuer DN in its canonical RFC 4514 string form.
pub fn issuer_canonical(cert: &Certificate) -> String {
    cert.tbs_certificate.issuer.to_string()
}

/// The subject DN in its canonical RFC 4514 string form.
pub fn subject_canonical(cert: &Certificate) -> String {
    cert.tbs_certificate.subject.to_string()
}

/// Normalize a DN string for comparison: whitespace around separators is
/// not significant, attribute types compare case-insensitively.
pub fn canonical_dn(dn: &str) -> String {
    dn.split(',')
        .map(|component| {
            let component = component.trim();
            match component.split_once('=') {
                Some((attr, value)) => {
                    format!("{}={}", attr.trim().to_ascii_uppercase(), value.trim())
                }
                None => component.to_owned(),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Compare two DN strings in canonical form.
pub fn dn_equal(a: &str, b: &str) -> bool {
    canonical_dn(a) == canonical_dn(b)
}

/// Digest the DER-encoded certificate under the given digest algorithm URI.
pub fn cert_digest(der_data: &[u8], digest_uri: &str) -> Result<Vec<u8>, Error> {
    sigtuna_crypto::digest::digest(digest_uri, der_data)
}

/// Build the DER `IssuerSerial` for a certificate: the issuer DN as a
/// `directoryName` GeneralName plus the certificate serial.
pub fn issuer_serial_der(cert: &Certificate) -> Result<Vec<u8>, Error> {
    let issuer = GeneralName::DirectoryName(cert.tbs_certificate.issuer.clone());
    let value = IssuerSerial {
        issuer: vec![issuer],
        serial_number: cert.tbs_certificate.serial_number.clone(),
    };
    value
        .to_der()
        .map_err(|e| Error::Asn1(format!("IssuerSerial encoding: {e}")))
}

/// Decode a DER `IssuerSerial` into (canonical issuer DN, serial bytes).
///
/// Only the `directoryName` alternative carries an issuer DN; other
/// GeneralName forms are skipped.
pub fn parse_issuer_serial(der_data: &[u8]) -> Result<(Option<String>, Vec<u8>), Error> {
    let value = IssuerSerial::from_der(der_data)
        .map_err(|e| Error::Asn1(format!("IssuerSerial decoding: {e}")))?;
    let issuer_dn = value.issuer.iter().find_map(|gn| match gn {
        GeneralName::DirectoryName(name) => Some(name.to_string()),
        _ => None,
    });
    Ok((issuer_dn, trim_serial(value.serial_number.as_bytes())))
}

/// Extract the RSA public key from a certificate.
pub fn rsa_public_key(cert: &Certificate) -> Result<rsa::RsaPublicKey, Error> {
    use spki::DecodePublicKey;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
    rsa::RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| Error::Certificate(format!("not an RSA public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_decimal_handles_large_values() {
        assert_eq!(serial_decimal(&[0x00]), "0");
        assert_eq!(serial_decimal(&[0x01]), "1");
        assert_eq!(serial_decimal(&[0x01, 0x00]), "256");
        // 2^64 = 18446744073709551616
        assert_eq!(
            serial_decimal(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0]),
            "18446744073709551616"
        );
    }

    #[test]
    fn trim_serial_strips_leading_zeroes() {
        assert_eq!(trim_serial(&[0, 0, 0x05]), vec![0x05]);
        assert_eq!(trim_serial(&[0, 0]), vec![0]);
        assert_eq!(trim_serial(&[0x80]), vec![0x80]);
    }

    #[test]
    fn dn_comparison_ignores_spacing_and_attr_case() {
        assert!(dn_equal("CN=Test, O=Example", "cn=Test,o=Example"));
        assert!(!dn_equal("CN=Test,O=Example", "CN=Other,O=Example"));
    }
}
