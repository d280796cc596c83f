#![forbid(unsafe_code)]

//! XML document abstraction for the Sigtuna XAdES library.
//!
//! Provides a thin layer over `roxmltree`, plus the `NodeSet` operations
//! needed for canonicalization and signature transforms, and a writer that
//! always emits explicit open/close tag pairs so that serialized output is
//! digest-stable across round trips.

pub mod document;
pub mod nodeset;
pub mod writer;
pub mod xpath;

pub use document::XmlDocument;
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Parsing options used everywhere: DTDs are tolerated because real-world
/// signed documents occasionally carry them.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    }
}
