//! End-to-end sign/verify flows over fixed test keys.

use crate::input::{ResourceInput, ResourceKind};
use crate::sign::{SignOptions, SignatureMode, XadesSigner};
use crate::verify::{VerifyOptions, XadesVerifier};
use chrono::TimeZone;
use sigtuna_core::{ns, Error};
use sigtuna_dsig::{DsigContext, SignatureSelector};
use sigtuna_keys::loader;
use sigtuna_keys::Key;
use sigtuna_tsa::mock::MockTsa;
use std::path::PathBuf;

const SIGNER_KEY_PEM: &[u8] = include_bytes!("../testdata/signer_key.pem");
const SIGNER_CERT_PEM: &[u8] = include_bytes!("../testdata/signer_cert.pem");
const COUNTER_KEY_PEM: &[u8] = include_bytes!("../testdata/counter_key.pem");
const COUNTER_CERT_PEM: &[u8] = include_bytes!("../testdata/counter_cert.pem");
const OTHER_CERT_PEM: &[u8] = include_bytes!("../testdata/other_cert.pem");

const PAYLOAD: &str = "<root><data>x</data></root>";

fn signer_key() -> Key {
    let cert = loader::pem_certificates(SIGNER_CERT_PEM).unwrap().remove(0);
    loader::load_rsa_private_pem(SIGNER_KEY_PEM)
        .unwrap()
        .with_cert(cert)
}

fn counter_key() -> Key {
    let cert = loader::pem_certificates(COUNTER_CERT_PEM).unwrap().remove(0);
    loader::load_rsa_private_pem(COUNTER_KEY_PEM)
        .unwrap()
        .with_cert(cert)
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sigtuna-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn inline_input(payload: &str) -> ResourceInput {
    ResourceInput::new(
        ResourceKind::XmlTree(payload.to_owned()),
        false,
        Some(temp_dir()),
        Some("signed".into()),
    )
    .unwrap()
}

fn fixed_opts(mode: SignatureMode) -> SignOptions {
    SignOptions {
        mode,
        signature_id: Some("xmldsig-e2e0001".into()),
        signing_time: Some(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
        ..SignOptions::default()
    }
}

fn sign_payload() -> String {
    XadesSigner::new()
        .sign_document(&inline_input(PAYLOAD), signer_key(), &fixed_opts(SignatureMode::Enveloped))
        .unwrap()
        .text
}

#[test]
fn enveloped_sign_then_verify() {
    let signed = sign_payload();
    assert!(signed.starts_with("<root>"));
    assert!(signed.contains("<ds:Signature"));

    let report = XadesVerifier::new()
        .verify_text(&signed, &VerifyOptions::default())
        .unwrap();
    assert_eq!(report.signature_id.as_deref(), Some("xmldsig-e2e0001"));
    assert_eq!(report.timestamps, 0);
    assert_eq!(report.counter_signatures, 0);
}

#[test]
fn payload_tampering_is_a_reference_digest_mismatch() {
    let signed = sign_payload();
    let tampered = signed.replace("<data>x</data>", "<data>y</data>");
    assert_ne!(signed, tampered);

    let err = XadesVerifier::new()
        .verify_text(&tampered, &VerifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::ReferenceDigestMismatch(_)), "{err}");
}

#[test]
fn signature_value_tampering_is_a_crypto_failure() {
    let signed = sign_payload();
    // Flip a chunk of the base64 signature value without breaking base64.
    let start = signed.find("-sigvalue\">").unwrap() + "-sigvalue\">".len();
    let mut tampered = signed.clone();
    tampered.replace_range(start..start + 4, "AAAA");
    if tampered == signed {
        tampered.replace_range(start..start + 4, "BBBB");
    }

    let err = XadesVerifier::new()
        .verify_text(&tampered, &VerifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::SignatureCryptoInvalid(_)), "{err}");
}

#[test]
fn signing_is_deterministic_given_fixed_time_and_id() {
    let a = sign_payload();
    let b = sign_payload();
    assert_eq!(a, b);
}

#[test]
fn host_root_gains_no_xades_namespace() {
    let signed = sign_payload();
    let root_tag = &signed[..signed.find('>').unwrap()];
    assert!(!root_tag.contains("xmlns:xa"));
    assert!(!root_tag.contains("xmlns:ds"));
}

#[test]
fn already_signed_document_conflicts() {
    let signed = sign_payload();
    let input = inline_input(&signed);
    let err = XadesSigner::new()
        .sign_document(&input, signer_key(), &fixed_opts(SignatureMode::Enveloped))
        .unwrap_err();
    assert!(matches!(err, Error::DocumentConflict(_)), "{err}");
}

#[test]
fn substituted_certificate_fails_binding_before_anything_else() {
    let signed = sign_payload();
    let signer_b64 = {
        use base64::Engine;
        let der = loader::pem_certificates(SIGNER_CERT_PEM).unwrap().remove(0);
        base64::engine::general_purpose::STANDARD.encode(der)
    };
    let other_b64 = {
        use base64::Engine;
        let der = loader::pem_certificates(OTHER_CERT_PEM).unwrap().remove(0);
        base64::engine::general_purpose::STANDARD.encode(der)
    };
    let swapped = signed.replace(&signer_b64, &other_b64);
    assert_ne!(swapped, signed);

    let err = XadesVerifier::new()
        .verify_text(&swapped, &VerifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::CertificateBindingMismatch(_)), "{err}");
}

#[test]
fn enveloping_sign_then_verify() {
    let signed = XadesSigner::new()
        .sign_document(
            &inline_input(PAYLOAD),
            signer_key(),
            &fixed_opts(SignatureMode::Enveloping),
        )
        .unwrap()
        .text;
    assert!(signed.starts_with("<ds:Signature"));
    assert!(signed.contains("<root><data>x</data></root>"));

    XadesVerifier::new()
        .verify_text(&signed, &VerifyOptions::default())
        .unwrap();
}

#[test]
fn detached_url_reference_is_percent_encoded_and_verifies() {
    let dir = temp_dir();
    let payload_path = dir.join("payload.xml");
    std::fs::write(&payload_path, PAYLOAD).unwrap();
    let url = format!("file://{}", payload_path.display());

    let input = ResourceInput::detached_url(url.clone()).unwrap();
    let signed = XadesSigner::new()
        .sign_document(&input, signer_key(), &fixed_opts(SignatureMode::Detached))
        .unwrap()
        .text;
    assert!(signed.contains(&format!(
        "URI=\"{}\"",
        sigtuna_transforms::uri::percent_encode(&url)
    )));

    XadesVerifier::new()
        .verify_text(&signed, &VerifyOptions::default())
        .unwrap();
}

#[test]
fn detached_file_reference_uses_basename() {
    let dir = temp_dir();
    let payload_path = dir.join("detached-payload.xml");
    std::fs::write(&payload_path, PAYLOAD).unwrap();

    let input = ResourceInput::detached_file(&payload_path).unwrap();
    let signed = XadesSigner::new()
        .sign_document(&input, signer_key(), &fixed_opts(SignatureMode::Detached))
        .unwrap()
        .text;
    assert!(signed.contains("URI=\"detached-payload.xml\""));

    let opts = VerifyOptions {
        detached_base_dir: Some(dir.to_string_lossy().into_owned()),
        ..VerifyOptions::default()
    };
    XadesVerifier::new().verify_text(&signed, &opts).unwrap();

    // Tampering with the external payload must break the reference.
    std::fs::write(&payload_path, "<root><data>y</data></root>").unwrap();
    let err = XadesVerifier::new().verify_text(&signed, &opts).unwrap_err();
    assert!(matches!(err, Error::ReferenceDigestMismatch(_)), "{err}");
    std::fs::write(&payload_path, PAYLOAD).unwrap();
}

#[test]
fn timestamped_signature_verifies_and_binds_the_signature_value() {
    let tsa = MockTsa::fixed().unwrap();
    let mut signer = XadesSigner::new();
    signer.set_tsa(&tsa);
    let opts = SignOptions {
        add_timestamp: true,
        ..fixed_opts(SignatureMode::Enveloped)
    };
    let signed = signer
        .sign_document(&inline_input(PAYLOAD), signer_key(), &opts)
        .unwrap()
        .text;
    assert!(signed.contains("SignatureTimeStamp"));
    assert!(signed.contains("EncapsulatedTimeStamp"));

    let verify_opts = VerifyOptions {
        tsa: Some(&tsa),
        ..VerifyOptions::default()
    };
    let report = XadesVerifier::new().verify_text(&signed, &verify_opts).unwrap();
    assert_eq!(report.timestamps, 1);

    // Mutating SignatureValue after timestamping invalidates the token
    // imprint. The time-stamp layer reports it even though full
    // verification would already have failed on the crypto check.
    let start = signed.find("-sigvalue\">").unwrap() + "-sigvalue\">".len();
    let mut tampered = signed.clone();
    tampered.replace_range(start..start + 4, "AAAA");
    if tampered == signed {
        tampered.replace_range(start..start + 4, "BBBB");
    }

    let doc = roxmltree::Document::parse_with_options(&tampered, sigtuna_xml::parsing_options())
        .unwrap();
    let sig = sigtuna_dsig::verify::find_signature(&doc, SignatureSelector::FirstTopLevel)
        .unwrap();
    let err = crate::timestamp::validate(&doc, sig, &tsa).unwrap_err();
    assert!(matches!(err, Error::TimestampInvalid(_)), "{err}");
}

#[test]
fn counter_signature_full_cycle() {
    let signed = sign_payload();

    let signer = XadesSigner::new();
    let cs_opts = SignOptions {
        signature_id: Some("xmldsig-e2e0002".into()),
        ..fixed_opts(SignatureMode::Enveloped)
    };
    let countersigned =
        crate::countersign::counter_sign(&signer, &signed, counter_key(), &cs_opts)
            .unwrap()
            .text;
    assert!(countersigned.contains("CounterSignature"));

    let report = XadesVerifier::new()
        .verify_text(&countersigned, &VerifyOptions::default())
        .unwrap();
    assert_eq!(report.counter_signatures, 1);

    // Tampering with the nested SignatureValue breaks the counter-signature
    // while the outer signature stays valid.
    let start = countersigned
        .find("xmldsig-e2e0002-sigvalue\">")
        .unwrap()
        + "xmldsig-e2e0002-sigvalue\">".len();
    let mut tampered = countersigned.clone();
    tampered.replace_range(start..start + 4, "AAAA");
    if tampered == countersigned {
        tampered.replace_range(start..start + 4, "BBBB");
    }

    let ctx = DsigContext::new();
    let outcome = sigtuna_dsig::verify::verify(
        &ctx,
        &tampered,
        SignatureSelector::FirstTopLevel,
        None,
    )
    .unwrap();
    assert!(outcome.is_valid(), "outer signature must stay valid");

    let err = XadesVerifier::new()
        .verify_text(&tampered, &VerifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::CounterSignatureInvalid(_)), "{err}");
}

#[test]
fn outer_payload_tampering_leaves_counter_signature_intact() {
    let signed = sign_payload();
    let signer = XadesSigner::new();
    let cs_opts = SignOptions {
        signature_id: Some("xmldsig-e2e0003".into()),
        ..fixed_opts(SignatureMode::Enveloped)
    };
    let countersigned =
        crate::countersign::counter_sign(&signer, &signed, counter_key(), &cs_opts)
            .unwrap()
            .text;

    let tampered = countersigned.replace("<data>x</data>", "<data>y</data>");

    // Outer verification fails on the payload reference.
    let err = XadesVerifier::new()
        .verify_text(&tampered, &VerifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::ReferenceDigestMismatch(_)), "{err}");

    // The counter-signature covers only the outer SignatureValue, which is
    // unchanged, so it still validates on its own.
    let doc = roxmltree::Document::parse_with_options(&tampered, sigtuna_xml::parsing_options())
        .unwrap();
    let outer = sigtuna_dsig::verify::find_signature(&doc, SignatureSelector::FirstTopLevel)
        .unwrap();
    let ctx = DsigContext::new();
    let count =
        crate::countersign::validate(&doc, outer, &tampered, &ctx, None).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn legacy_v111_serial_mismatch_is_a_binding_failure() {
    use base64::Engine;
    let cert_der = loader::pem_certificates(SIGNER_CERT_PEM).unwrap().remove(0);
    let digest =
        sigtuna_keys::x509::cert_digest(&cert_der, sigtuna_core::algorithm::SHA256).unwrap();
    let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);
    let cert = sigtuna_keys::x509::parse_cert(&cert_der).unwrap();
    let issuer = sigtuna_keys::x509::issuer_canonical(&cert);

    // A v1.1.1 qualifying-properties block whose SigningCertificate serial
    // disagrees with the KeyInfo certificate.
    let xml = format!(
        r##"<ds:Signature xmlns:ds="{dsig}" Id="legacy-sig"><ds:Object><QualifyingProperties xmlns="{xades111}" Target="#legacy-sig"><SignedProperties Id="legacy-sp"><SignedSignatureProperties><SigningTime>2003-01-01T00:00:00Z</SigningTime><SigningCertificate><Cert><CertDigest><ds:DigestMethod Algorithm="{sha256}"></ds:DigestMethod><ds:DigestValue>{digest_b64}</ds:DigestValue></CertDigest><IssuerSerial><ds:X509IssuerName>{issuer}</ds:X509IssuerName><ds:X509SerialNumber>12345</ds:X509SerialNumber></IssuerSerial></Cert></SigningCertificate></SignedSignatureProperties></SignedProperties></QualifyingProperties></ds:Object></ds:Signature>"##,
        dsig = ns::DSIG,
        xades111 = ns::XADES_111,
        sha256 = sigtuna_core::algorithm::SHA256,
    );
    let doc = roxmltree::Document::parse(&xml).unwrap();
    let sig = doc.root_element();
    let err = crate::certbind::verify_binding(sig, &cert_der).unwrap_err();
    assert!(matches!(err, Error::CertificateBindingMismatch(_)), "{err}");
}

#[test]
fn external_signing_produces_the_same_bytes_a_local_signer_signs() {
    use base64::Engine;
    use signature::{SignatureEncoding, Signer};

    let key = signer_key();
    let chain = key.x509_chain.clone();
    let signer = XadesSigner::new();
    let opts = fixed_opts(SignatureMode::Enveloped);

    let (template, signature_id, bytes) = signer
        .prepare_signed_info(&inline_input(PAYLOAD), &chain, &opts)
        .unwrap();
    assert_eq!(signature_id, "xmldsig-e2e0001");
    assert!(!bytes.is_empty());
    assert!(!template.contains("<ds:DigestValue></ds:DigestValue>"));

    // Sign out of process (here: directly with the RSA key) and splice the
    // value into the template.
    let private = match &key.data {
        sigtuna_keys::KeyData::Rsa {
            private: Some(pk), ..
        } => pk.clone(),
        _ => unreachable!(),
    };
    let rsa_signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private);
    let sig_bytes = rsa_signer.sign(&bytes);
    let sig_b64 =
        base64::engine::general_purpose::STANDARD.encode(sig_bytes.to_vec());

    let marker = "\"></ds:SignatureValue>";
    let pos = template.find(marker).unwrap();
    let mut external = template.clone();
    external.insert_str(pos + 2, &sig_b64);

    XadesVerifier::new()
        .verify_text(&external, &VerifyOptions::default())
        .unwrap();

    // And it matches what the in-process signer produces.
    let local = sign_payload();
    assert_eq!(external, local);
}
