//! Extension to MIME type lookup for the static-resource fallback.
//!
//! The table is loaded once at startup, either from a properties-style file
//! (`ext=type` per line, `#` comments) or from the built-in defaults.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

const BUILTIN: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain; charset=utf-8"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("pdf", "application/pdf"),
    ("wasm", "application/wasm"),
];

#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    types: HashMap<String, String>,
}

impl MimeTable {
    pub fn builtin() -> Self {
        Self {
            types: BUILTIN
                .iter()
                .map(|(ext, ty)| (ext.to_string(), ty.to_string()))
                .collect(),
        }
    }

    /// Loads the table from `path`, falling back to the built-in table when
    /// the file cannot be read.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };

        match fs::read_to_string(path) {
            Ok(text) => {
                let table = Self::parse(&text);
                debug!(path = %path.display(), entries = table.len(), "MIME table loaded");
                table
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "MIME table unreadable, using built-in types");
                Self::builtin()
            }
        }
    }

    /// Parses `ext=type` lines. Blank lines and `#`/`!` comments are ignored.
    pub fn parse(text: &str) -> Self {
        let types = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .filter_map(|line| line.split_once(['=', ':']))
            .map(|(ext, ty)| (ext.trim().to_ascii_lowercase(), ty.trim().to_string()))
            .filter(|(ext, ty)| !ext.is_empty() && !ty.is_empty())
            .collect();
        Self { types }
    }

    /// MIME type for the extension of `path`, if the table knows it.
    pub fn lookup(&self, path: &str) -> Option<&str> {
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        self.types.get(&ext.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
