#![forbid(unsafe_code)]

//! RFC 3161 request building and CMS token validation.

use crate::TstVerdict;
use der::asn1::{Int, ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use rand::RngCore;
use sigtuna_core::{Error, Result};
use spki::AlgorithmIdentifierOwned;
use x509_tsp::{MessageImprint, TimeStampReq, TspVersion, TstInfo};

pub const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
pub const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
pub const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_SHA1_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// Build a DER `TimeStampReq` for the digest of `message` under the given
/// digest URI. A transport layer (out of scope here) POSTs these bytes to a
/// TSA with content type `application/timestamp-query`.
pub fn build_timestamp_request(message: &[u8], digest_uri: &str) -> Result<Vec<u8>> {
    let digest = sigtuna_crypto::digest::digest(digest_uri, message)?;
    let imprint = MessageImprint {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: crate::digest_oid(digest_uri)?,
            parameters: None,
        },
        hashed_message: OctetString::new(digest)
            .map_err(|e| Error::Asn1(format!("MessageImprint: {e}")))?,
    };

    let mut nonce_bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    // High bit clear keeps the INTEGER positive.
    nonce_bytes[0] &= 0x7f;

    let req = TimeStampReq {
        version: TspVersion::V1,
        message_imprint: imprint,
        req_policy: None,
        nonce: Some(Int::new(&nonce_bytes).map_err(|e| Error::Asn1(format!("nonce: {e}")))?),
        cert_req: true,
        extensions: None,
    };
    req.to_der()
        .map_err(|e| Error::Asn1(format!("TimeStampReq encoding: {e}")))
}

/// Validate a full CMS time-stamp token (a `ContentInfo` holding a
/// `SignedData` whose content is a `TSTInfo`) against the original message.
///
/// Checks, in order:
/// 1. the `MessageImprint` equals the digest of `message` under the hash
///    the token declares;
/// 2. the signer's `message-digest` attribute equals the digest of the
///    encapsulated `TSTInfo`;
/// 3. the signer signature over the signed attributes verifies with the
///    embedded certificate.
///
/// A token without an embedded signer certificate is `Inconclusive`: the
/// issuer could only be obtained through an online lookup, which is a
/// collaborator concern.
pub fn validate_token(tst_der: &[u8], message: &[u8]) -> Result<TstVerdict> {
    use cms::content_info::ContentInfo;
    use cms::signed_data::SignedData;

    let content_info = match ContentInfo::from_der(tst_der) {
        Ok(ci) => ci,
        Err(e) => return Ok(TstVerdict::Invalid(format!("not a CMS token: {e}"))),
    };

    let signed_data = {
        let content_der = content_info
            .content
            .to_der()
            .map_err(|e| Error::Asn1(format!("CMS content: {e}")))?;
        match SignedData::from_der(&content_der) {
            Ok(sd) => sd,
            Err(e) => return Ok(TstVerdict::Invalid(format!("not CMS SignedData: {e}"))),
        }
    };

    let Some(econtent) = signed_data.encap_content_info.econtent.as_ref() else {
        return Ok(TstVerdict::Invalid("no encapsulated TSTInfo".into()));
    };
    let tst_bytes = match econtent.decode_as::<OctetString>() {
        Ok(os) => os.as_bytes().to_vec(),
        Err(e) => return Ok(TstVerdict::Invalid(format!("eContent not OCTET STRING: {e}"))),
    };
    let tst_info = match TstInfo::from_der(&tst_bytes) {
        Ok(t) => t,
        Err(e) => return Ok(TstVerdict::Invalid(format!("malformed TSTInfo: {e}"))),
    };

    // 1. Message imprint binds the token to the canonical SignatureValue.
    if let Some(verdict) = check_imprint(&tst_info, message)? {
        return Ok(verdict);
    }

    // 2 + 3. Signer info over the encapsulated content.
    verify_signer(&signed_data, &tst_bytes)
}

/// Check the message imprint of an already-decoded `TSTInfo`.
pub fn check_imprint(tst_info: &TstInfo, message: &[u8]) -> Result<Option<TstVerdict>> {
    let digest_uri = match crate::digest_uri_for_oid(&tst_info.message_imprint.hash_algorithm.oid)
    {
        Ok(uri) => uri,
        Err(_) => {
            return Ok(Some(TstVerdict::Invalid(format!(
                "unsupported imprint hash {}",
                tst_info.message_imprint.hash_algorithm.oid
            ))))
        }
    };
    let computed = sigtuna_crypto::digest::digest(digest_uri, message)?;
    if computed != tst_info.message_imprint.hashed_message.as_bytes() {
        return Ok(Some(TstVerdict::Invalid(
            "message imprint does not match signature value".into(),
        )));
    }
    Ok(None)
}

/// Verify the first signer of the token's `SignedData` over the
/// encapsulated `TSTInfo` bytes.
fn verify_signer(
    signed_data: &cms::signed_data::SignedData,
    tst_bytes: &[u8],
) -> Result<TstVerdict> {
    use cms::cert::CertificateChoices;

    let Some(signer) = signed_data.signer_infos.0.iter().next() else {
        return Ok(TstVerdict::Invalid("no SignerInfo in token".into()));
    };

    let Some(cert) = signed_data.certificates.as_ref().and_then(|set| {
        set.0.iter().find_map(|c| match c {
            CertificateChoices::Certificate(cert) => Some(cert),
            _ => None,
        })
    }) else {
        return Ok(TstVerdict::Inconclusive(
            "TSA certificate not embedded; issuer lookup unavailable".into(),
        ));
    };

    let digest_uri = match crate::digest_uri_for_oid(&signer.digest_alg.oid) {
        Ok(uri) => uri,
        Err(_) => {
            return Ok(TstVerdict::Invalid(format!(
                "unsupported signer digest {}",
                signer.digest_alg.oid
            )))
        }
    };

    // With signed attributes present the signature covers their DER SET; the
    // message-digest attribute must then match the TSTInfo digest.
    let signed_bytes = match signer.signed_attrs.as_ref() {
        Some(attrs) => {
            let tst_digest = sigtuna_crypto::digest::digest(digest_uri, tst_bytes)?;
            let Some(md_attr) = attrs.iter().find(|a| a.oid == OID_MESSAGE_DIGEST) else {
                return Ok(TstVerdict::Invalid("no message-digest attribute".into()));
            };
            let md_ok = md_attr
                .values
                .iter()
                .next()
                .and_then(|v| v.decode_as::<OctetString>().ok())
                .map(|os| os.as_bytes() == tst_digest.as_slice())
                .unwrap_or(false);
            if !md_ok {
                return Ok(TstVerdict::Invalid(
                    "message-digest attribute does not match TSTInfo".into(),
                ));
            }
            attrs
                .to_der()
                .map_err(|e| Error::Asn1(format!("signed attributes: {e}")))?
        }
        None => tst_bytes.to_vec(),
    };

    // Resolve the hash actually bound to the signature algorithm.
    let sig_alg_oid = &signer.signature_algorithm.oid;
    let sig_hash_uri = if *sig_alg_oid == OID_RSA_ENCRYPTION {
        digest_uri
    } else if *sig_alg_oid == OID_SHA1_WITH_RSA {
        sigtuna_core::algorithm::SHA1
    } else if *sig_alg_oid == OID_SHA256_WITH_RSA {
        sigtuna_core::algorithm::SHA256
    } else if *sig_alg_oid == OID_SHA384_WITH_RSA {
        sigtuna_core::algorithm::SHA384
    } else if *sig_alg_oid == OID_SHA512_WITH_RSA {
        sigtuna_core::algorithm::SHA512
    } else {
        return Ok(TstVerdict::Invalid(format!(
            "unsupported token signature algorithm {sig_alg_oid}"
        )));
    };

    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("TSA SPKI: {e}")))?;
    let public_key = {
        use spki::DecodePublicKey;
        match rsa::RsaPublicKey::from_public_key_der(&spki_der) {
            Ok(pk) => pk,
            Err(e) => {
                return Ok(TstVerdict::Invalid(format!("TSA key not RSA: {e}")));
            }
        }
    };

    let sig_bytes = signer.signature.as_bytes();
    let ok = verify_rsa(&public_key, sig_hash_uri, &signed_bytes, sig_bytes)?;
    if ok {
        Ok(TstVerdict::Valid)
    } else {
        Ok(TstVerdict::Invalid("token signature does not verify".into()))
    }
}

fn verify_rsa(
    public_key: &rsa::RsaPublicKey,
    hash_uri: &str,
    data: &[u8],
    sig_bytes: &[u8],
) -> Result<bool> {
    use signature::Verifier;
    let sig = match rsa::pkcs1v15::Signature::try_from(sig_bytes) {
        Ok(s) => s,
        Err(_) => return Ok(false),
    };
    macro_rules! do_verify {
        ($hasher:ty) => {{
            let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
            Ok(vk.verify(data, &sig).is_ok())
        }};
    }
    match hash_uri {
        sigtuna_core::algorithm::SHA1 => do_verify!(sha1::Sha1),
        sigtuna_core::algorithm::SHA256 => do_verify!(sha2::Sha256),
        sigtuna_core::algorithm::SHA384 => do_verify!(sha2::Sha384),
        sigtuna_core::algorithm::SHA512 => do_verify!(sha2::Sha512),
        other => Err(Error::UnsupportedAlgorithm(format!("token hash: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_invalid_not_an_error() {
        let verdict = validate_token(b"not a token", b"message").unwrap();
        assert!(matches!(verdict, TstVerdict::Invalid(_)));
    }

    #[test]
    fn request_carries_the_message_digest() {
        let der_bytes =
            build_timestamp_request(b"canonical bytes", sigtuna_core::algorithm::SHA256).unwrap();
        let req = TimeStampReq::from_der(&der_bytes).unwrap();
        let expected =
            sigtuna_crypto::digest::digest(sigtuna_core::algorithm::SHA256, b"canonical bytes")
                .unwrap();
        assert_eq!(req.message_imprint.hashed_message.as_bytes(), expected);
        assert_eq!(req.message_imprint.hash_algorithm.oid, OID_SHA256);
        assert!(req.cert_req);
    }
}
