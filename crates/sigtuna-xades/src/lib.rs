#![forbid(unsafe_code)]

//! XAdES signature production and verification.
//!
//! Extends baseline XML-DSig with the ETSI qualifying-properties model:
//! a `<xades:SignedProperties>` block covered by a second `<Reference>`,
//! the SigningCertificateV2 binding, RFC 3161 signature time-stamps
//! (XAdES-T) and counter-signatures.
//!
//! The flows are synchronous and single-threaded per operation: a sign or
//! verify call owns its document exclusively, and nothing is written to
//! disk until an operation has fully succeeded.

pub mod certbind;
pub mod countersign;
pub mod input;
pub mod policy;
pub mod properties;
pub mod sign;
pub mod splice;
pub mod timestamp;
pub mod verify;

pub use input::{ResourceInput, ResourceKind};
pub use policy::{DefaultPolicy, PolicyStrategy};
pub use properties::{ProductionPlace, SignerRole};
pub use sign::{SignOptions, SignatureMode, SignedDocument, XadesSigner};
pub use verify::{VerificationReport, VerifyOptions, XadesVerifier};

#[cfg(test)]
mod e2e;
