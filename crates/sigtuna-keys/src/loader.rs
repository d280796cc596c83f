#![forbid(unsafe_code)]

//! Key and certificate loading from PEM and DER.

use crate::key::{Key, KeyData};
use base64::Engine;
use sigtuna_core::Error;

/// Load an RSA private key from PEM data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_pem(pem_data: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;

    // Try PKCS#8 first
    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str) {
        let public = pk.to_public_key();
        return Ok(Key::new(KeyData::Rsa {
            private: Some(pk),
            public,
        }));
    }

    // Try PKCS#1
    use pkcs1::DecodeRsaPrivateKey;
    let pk = rsa::RsaPrivateKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))?;
    let public = pk.to_public_key();
    Ok(Key::new(KeyData::Rsa {
        private: Some(pk),
        public,
    }))
}

/// Load an RSA private key from DER data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_der(der_data: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;
    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der_data) {
        let public = pk.to_public_key();
        return Ok(Key::new(KeyData::Rsa {
            private: Some(pk),
            public,
        }));
    }

    use pkcs1::DecodeRsaPrivateKey;
    let pk = rsa::RsaPrivateKey::from_pkcs1_der(der_data)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key DER: {e}")))?;
    let public = pk.to_public_key();
    Ok(Key::new(KeyData::Rsa {
        private: Some(pk),
        public,
    }))
}

/// Load an RSA private key, auto-detecting PEM or DER.
pub fn load_rsa_private_auto(data: &[u8]) -> Result<Key, Error> {
    if looks_like_pem(data) {
        load_rsa_private_pem(data)
    } else {
        load_rsa_private_der(data)
    }
}

/// Load a certificate, auto-detecting PEM or DER. Returns the DER bytes.
pub fn load_certificate_auto(data: &[u8]) -> Result<Vec<u8>, Error> {
    if looks_like_pem(data) {
        let ders = pem_certificates(data)?;
        ders.into_iter()
            .next()
            .ok_or_else(|| Error::Certificate("no CERTIFICATE block in PEM".into()))
    } else {
        Ok(data.to_vec())
    }
}

/// Extract every `CERTIFICATE` block from PEM data as DER bytes.
pub fn pem_certificates(pem_data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Certificate(format!("invalid PEM encoding: {e}")))?;

    let mut certs = Vec::new();
    let mut body = String::new();
    let mut in_cert = false;
    for line in pem_str.lines() {
        let line = line.trim();
        if line == "-----BEGIN CERTIFICATE-----" {
            in_cert = true;
            body.clear();
        } else if line == "-----END CERTIFICATE-----" {
            in_cert = false;
            let der = base64::engine::general_purpose::STANDARD
                .decode(&body)
                .map_err(|e| Error::Certificate(format!("invalid PEM base64: {e}")))?;
            certs.push(der);
        } else if in_cert {
            body.push_str(line);
        }
    }
    Ok(certs)
}

fn looks_like_pem(data: &[u8]) -> bool {
    std::str::from_utf8(data)
        .map(|s| s.contains("-----BEGIN"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_certificate_blocks_are_extracted() {
        // A syntactically valid PEM wrapper around trivial content; the DER
        // inside is not parsed at this layer.
        let pem = "-----BEGIN CERTIFICATE-----\nAAEC\n-----END CERTIFICATE-----\n";
        let certs = pem_certificates(pem.as_bytes()).unwrap();
        assert_eq!(certs, vec![vec![0x00, 0x01, 0x02]]);
    }

    #[test]
    fn non_pem_data_is_passed_through_as_der() {
        let der = [0x30, 0x03, 0x02, 0x01, 0x01];
        assert_eq!(load_certificate_auto(&der).unwrap(), der.to_vec());
    }
}
