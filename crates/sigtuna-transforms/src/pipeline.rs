#![forbid(unsafe_code)]

//! Transform trait and data model.

use sigtuna_core::Error;
use sigtuna_xml::NodeSet;

/// Data flowing through the transform chain.
pub enum TransformData {
    /// XML node set (for XML-aware transforms like C14N).
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Raw binary data (detached external content).
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to the octet stream to be digested. An XML node set that was
    /// never explicitly canonicalized goes through inclusive C14N, per the
    /// XML-DSig processing model.
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data.clone()),
            TransformData::Xml { xml_text, node_set } => sigtuna_c14n::canonicalize(
                xml_text,
                sigtuna_c14n::C14nMode::Inclusive,
                node_set.as_ref(),
                &[],
            ),
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: sigtuna_c14n::C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: sigtuna_c14n::C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        match input {
            TransformData::Xml { xml_text, node_set } => {
                let bytes = sigtuna_c14n::canonicalize(
                    &xml_text,
                    self.mode,
                    node_set.as_ref(),
                    &self.inclusive_prefixes,
                )?;
                Ok(TransformData::Binary(bytes))
            }
            TransformData::Binary(data) => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?;
                let bytes =
                    sigtuna_c14n::canonicalize(text, self.mode, None, &self.inclusive_prefixes)?;
                Ok(TransformData::Binary(bytes))
            }
        }
    }
}
