#![forbid(unsafe_code)]

//! Core types for the Sigtuna XAdES library: error taxonomy, namespace
//! constants and algorithm URIs shared by every other crate.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
