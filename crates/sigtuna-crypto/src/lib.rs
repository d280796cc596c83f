#![forbid(unsafe_code)]

//! Cryptographic primitives for the Sigtuna XAdES library.
//!
//! Digests (SHA-256 emitted; SHA-1/384/512 accepted on verify) and RSA
//! PKCS#1 v1.5 signatures (RSA-SHA256 emitted by default).

pub mod digest;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use sign::{SignatureAlgorithm, SigningKey};
