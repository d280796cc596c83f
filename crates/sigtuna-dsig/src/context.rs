#![forbid(unsafe_code)]

//! DSig context — reference-resolution configuration shared by the sign and
//! verify paths. Key material is passed per call, never stored here, so one
//! context can process many documents without state leaking between them.

/// Context for XML-DSig operations.
#[derive(Default)]
pub struct DsigContext {
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// URL-to-file mappings for external (detached) URI resolution.
    pub url_maps: Vec<(String, String)>,
    /// Base directory for resolving relative external URI references.
    pub base_dir: Option<String>,
}

impl DsigContext {
    /// Create a new DSig context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ID attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        self.id_attrs.push(name.to_owned());
    }

    /// Map an external URI to a local file path.
    pub fn add_url_map(&mut self, url: &str, file_path: &str) {
        self.url_maps.push((url.to_owned(), file_path.to_owned()));
    }
}
