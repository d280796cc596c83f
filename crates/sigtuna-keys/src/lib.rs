#![forbid(unsafe_code)]

//! Key and certificate management for the Sigtuna XAdES library.
//!
//! Loads RSA keys and X.509 certificates from PEM or DER, and provides the
//! certificate identity helpers the signing-certificate binding needs
//! (serial, canonical issuer DN, cert digest, IssuerSerial DER).

pub mod key;
pub mod loader;
pub mod x509;

pub use key::{Key, KeyData};
