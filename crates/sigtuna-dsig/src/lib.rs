#![forbid(unsafe_code)]

//! XML Digital Signature processing for the Sigtuna XAdES library.
//!
//! Implements the reference engine and the SignedInfo driver:
//!
//! - signing fills a template whose `<DigestValue>` and `<SignatureValue>`
//!   elements are empty, then canonicalizes `<SignedInfo>` and signs it;
//! - verification re-resolves every `<Reference>`, recomputes its digest,
//!   and checks `<SignatureValue>` over the canonical `<SignedInfo>`.
//!
//! Documents with duplicate ID values are always rejected: signature
//! wrapping attacks rely on a second element claiming a registered id.

pub mod context;
pub mod sign;
pub mod verify;

pub use context::DsigContext;
pub use verify::{SignatureSelector, VerifyOutcome};
