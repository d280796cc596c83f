#![forbid(unsafe_code)]

//! Resource descriptors for documents under signature.

use sigtuna_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Where the payload comes from.
#[derive(Debug, Clone)]
pub enum ResourceKind {
    /// A file on disk.
    File(PathBuf),
    /// Raw bytes supplied inline.
    Bytes(Vec<u8>),
    /// An XML document supplied inline as text.
    XmlTree(String),
    /// A URL. Only `file://` URLs are resolvable locally; anything else
    /// requires detached mode, where the URL is referenced, not fetched.
    Url(String),
}

/// A payload descriptor with its signing disposition.
///
/// When the signature is not detached and the payload does not come from a
/// file, there is no natural place to write the output, so both a save
/// location and a save name must be supplied up front.
#[derive(Debug, Clone)]
pub struct ResourceInput {
    kind: ResourceKind,
    detached: bool,
    save_location: Option<PathBuf>,
    save_name: Option<String>,
}

impl ResourceInput {
    pub fn new(
        kind: ResourceKind,
        detached: bool,
        save_location: Option<PathBuf>,
        save_name: Option<String>,
    ) -> Result<Self> {
        if !detached
            && !matches!(kind, ResourceKind::File(_))
            && (save_location.is_none() || save_name.is_none())
        {
            return Err(Error::InvalidInput(
                "inline or URL payloads need an explicit save location and name \
                 unless the signature is detached"
                    .into(),
            ));
        }
        Ok(Self {
            kind,
            detached,
            save_location,
            save_name,
        })
    }

    /// Convenience: an enveloped signature over a file.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(ResourceKind::File(path.into()), false, None, None)
    }

    /// Convenience: a detached signature over a file.
    pub fn detached_file(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(ResourceKind::File(path.into()), true, None, None)
    }

    /// Convenience: a detached signature over a URL.
    pub fn detached_url(url: impl Into<String>) -> Result<Self> {
        Self::new(ResourceKind::Url(url.into()), true, None, None)
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Load the payload as XML text (enveloped / enveloping modes).
    pub fn load_text(&self) -> Result<String> {
        let bytes = self.load_bytes()?;
        String::from_utf8(bytes).map_err(|e| Error::XmlParse(format!("payload not UTF-8: {e}")))
    }

    /// Load the payload as raw bytes.
    pub fn load_bytes(&self) -> Result<Vec<u8>> {
        match &self.kind {
            ResourceKind::File(path) => Ok(std::fs::read(path)?),
            ResourceKind::Bytes(bytes) => Ok(bytes.clone()),
            ResourceKind::XmlTree(text) => Ok(text.clone().into_bytes()),
            ResourceKind::Url(url) => {
                if let Some(path) = url.strip_prefix("file://") {
                    Ok(std::fs::read(path)?)
                } else {
                    Err(Error::ExternalFetchFailed(format!(
                        "cannot fetch {url}: only file:// URLs resolve locally"
                    )))
                }
            }
        }
    }

    /// The `Reference/@URI` value for detached mode: the basename for file
    /// payloads, the percent-encoded URL for URL payloads.
    pub fn detached_reference_uri(&self) -> Result<String> {
        match &self.kind {
            ResourceKind::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::InvalidInput("file payload has no basename".into())),
            ResourceKind::Url(url) => Ok(sigtuna_transforms::uri::percent_encode(url)),
            _ => Err(Error::InvalidInput(
                "detached signing needs a file or URL payload".into(),
            )),
        }
    }

    /// Directory the output is written into.
    pub fn output_dir(&self) -> Result<PathBuf> {
        if let Some(loc) = &self.save_location {
            return Ok(loc.clone());
        }
        if let ResourceKind::File(path) = &self.kind {
            return Ok(path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")));
        }
        Err(Error::InvalidInput("no save location available".into()))
    }

    /// Configured output file name, if any.
    pub fn save_name(&self) -> Option<&str> {
        self.save_name.as_deref()
    }
}

/// Append `.xml` when the name has no extension.
pub fn ensure_xml_extension(name: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_owned()
    } else {
        format!("{name}.xml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_payload_without_save_target_is_rejected() {
        let err = ResourceInput::new(
            ResourceKind::Bytes(b"<a></a>".to_vec()),
            false,
            None,
            None,
        );
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn inline_payload_with_save_target_is_accepted() {
        let input = ResourceInput::new(
            ResourceKind::XmlTree("<a></a>".into()),
            false,
            Some(PathBuf::from("/tmp")),
            Some("out".into()),
        );
        assert!(input.is_ok());
    }

    #[test]
    fn detached_inline_needs_no_save_target() {
        let input = ResourceInput::new(ResourceKind::Url("file://p.xml".into()), true, None, None);
        assert!(input.is_ok());
    }

    #[test]
    fn detached_uri_for_file_is_the_basename() {
        let input = ResourceInput::detached_file("/some/dir/payload.xml").unwrap();
        assert_eq!(input.detached_reference_uri().unwrap(), "payload.xml");
    }

    #[test]
    fn detached_uri_for_url_is_percent_encoded() {
        let input = ResourceInput::detached_url("file://payload with space.xml").unwrap();
        assert_eq!(
            input.detached_reference_uri().unwrap(),
            "file://payload%20with%20space.xml"
        );
    }

    #[test]
    fn xml_extension_is_appended_when_missing() {
        assert_eq!(ensure_xml_extension("out"), "out.xml");
        assert_eq!(ensure_xml_extension("out.xml"), "out.xml");
        assert_eq!(ensure_xml_extension("out.sig"), "out.sig");
    }
}
