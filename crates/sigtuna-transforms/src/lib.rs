#![forbid(unsafe_code)]

//! Transform chain engine for XAdES references.
//!
//! Each `<Reference>` carries a sequence of transforms applied in order; the
//! last transform's output is the octet stream that gets digested.

pub mod enveloped;
pub mod pipeline;
pub mod uri;

pub use pipeline::{C14nTransform, Transform, TransformData};
