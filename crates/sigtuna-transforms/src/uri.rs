#![forbid(unsafe_code)]

//! Reference URI resolution.
//!
//! Handles the three URI shapes a XAdES `<Reference>` can carry:
//! - Empty URI ("") — the whole document minus comments
//! - Same-document references ("#id")
//! - External references (detached mode) — resolved to raw bytes from disk,
//!   via an explicit URL→file mapping or relative to a base directory

use sigtuna_core::Error;
use sigtuna_xml::nodeset::NodeSet;
use sigtuna_xml::xpath;
use std::collections::HashMap;

/// Resolved reference data — either an XML node set or raw external bytes.
pub enum ResolvedUri {
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    Binary(Vec<u8>),
}

/// Resolve a reference URI against a parsed document.
pub fn resolve(
    uri: &str,
    doc: &roxmltree::Document<'_>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    xml: &str,
    url_maps: &[(String, String)],
    base_dir: Option<&str>,
) -> Result<ResolvedUri, Error> {
    if uri.is_empty() {
        // Whole document; per W3C spec section 4.3.3.3 a non-XPointer URI
        // excludes comment nodes.
        let ns = NodeSet::all_without_comments(doc);
        Ok(ResolvedUri::Xml {
            xml_text: xml.to_owned(),
            node_set: Some(ns),
        })
    } else if let Some(id) = xpath::parse_same_document_ref(uri) {
        let node = xpath::resolve_id(doc, id_map, id)?;
        let ns = NodeSet::tree_without_comments(node);
        Ok(ResolvedUri::Xml {
            xml_text: xml.to_owned(),
            node_set: Some(ns),
        })
    } else {
        resolve_external(uri, url_maps, base_dir).map(ResolvedUri::Binary)
    }
}

/// Resolve an external (detached) URI to raw bytes.
fn resolve_external(
    uri: &str,
    url_maps: &[(String, String)],
    base_dir: Option<&str>,
) -> Result<Vec<u8>, Error> {
    for (map_url, file_path) in url_maps {
        if uri == map_url || uri.starts_with(map_url.as_str()) {
            return std::fs::read(file_path)
                .map_err(|e| Error::ExternalFetchFailed(format!("{file_path}: {e}")));
        }
    }

    let decoded = percent_decode(uri);

    // file:// URLs resolve to the named local path.
    if let Some(path) = decoded.strip_prefix("file://") {
        return std::fs::read(path)
            .map_err(|e| Error::ExternalFetchFailed(format!("{path}: {e}")));
    }

    // No scheme: treat as a local file, relative to the base directory first.
    if !decoded.contains("://") {
        if let Some(base) = base_dir {
            let path = std::path::Path::new(base).join(&decoded);
            if path.exists() {
                return std::fs::read(&path)
                    .map_err(|e| Error::ExternalFetchFailed(format!("{}: {e}", path.display())));
            }
        }
        let path = std::path::Path::new(&decoded);
        if path.exists() {
            return std::fs::read(path)
                .map_err(|e| Error::ExternalFetchFailed(format!("{decoded}: {e}")));
        }
    }

    Err(Error::InvalidUri(format!(
        "external URI not resolvable: {uri}"
    )))
}

/// Percent-encode a URI for use in a `Reference/@URI` attribute, leaving the
/// characters RFC 3986 allows in a URI untouched.
pub fn percent_encode(uri: &str) -> String {
    const ALLOWED: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~:/?#[]@!$&'()*+,;=%";
    let mut out = String::with_capacity(uri.len());
    for byte in uri.bytes() {
        if ALLOWED.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Decode percent-escapes in a URI.
pub fn percent_decode(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(h), Some(l)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((h * 16 + l) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_keeps_uri_characters() {
        assert_eq!(percent_encode("file://payload.xml"), "file://payload.xml");
        assert_eq!(
            percent_encode("http://example.org/a?b=c#d"),
            "http://example.org/a?b=c#d"
        );
    }

    #[test]
    fn encode_escapes_spaces_and_non_ascii() {
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("å"), "%C3%A5");
    }

    #[test]
    fn decode_reverses_encode() {
        for input in ["file://payload.xml", "a b", "å", "x%y"] {
            assert_eq!(percent_decode(&percent_encode(input)), input);
        }
    }
}
