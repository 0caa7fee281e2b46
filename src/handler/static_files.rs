//! Static-resource fallback.
//!
//! Requests no handler claimed are mapped onto files below a root directory.
//! The request path is already percent-decoded by the parser; any `..`
//! component, or a resolved path outside the root, is rejected with 403.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StaticFileError;
use crate::http::mime::MimeTable;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// File served for a request to `/`.
pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    mime: MimeTable,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, mime: MimeTable) -> Self {
        Self {
            root: root.into(),
            mime,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a request path onto a file below the root.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let relative = request_path.trim_start_matches('/');
        let relative = if relative.is_empty() { INDEX_FILE } else { relative };

        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StaticFileError::Forbidden(request_path.to_string()));
                }
            }
        }

        // Symlinks may still point outside; compare canonical forms when the
        // file exists.
        if let (Ok(canonical), Ok(root)) = (resolved.canonicalize(), self.root.canonicalize()) {
            if !canonical.starts_with(&root) {
                return Err(StaticFileError::Forbidden(request_path.to_string()));
            }
        }

        Ok(resolved)
    }

    /// Reads the file behind `request_path` and its content type, if known.
    pub fn load(&self, request_path: &str) -> Result<(Vec<u8>, Option<&str>), StaticFileError> {
        let path = self.resolve(request_path)?;

        if path.is_dir() {
            return Err(StaticFileError::NotFound(request_path.to_string()));
        }

        let bytes = fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StaticFileError::NotFound(request_path.to_string()),
            _ => StaticFileError::Io {
                path: path.display().to_string(),
                source,
            },
        })?;

        let mime = self.mime.lookup(&path.to_string_lossy());
        Ok((bytes, mime))
    }

    /// Builds the response for `request_path`, turning failures into error
    /// pages.
    pub fn serve(&self, request_path: &str) -> Response {
        match self.load(request_path) {
            Ok((bytes, mime)) => {
                debug!(path = request_path, bytes = bytes.len(), "static resource served");
                let mut builder = ResponseBuilder::new(StatusCode::Ok);
                if let Some(mime) = mime {
                    builder = builder.header("Content-Type", mime);
                }
                builder.body(bytes).build()
            }
            Err(e) => {
                match &e {
                    StaticFileError::Io { .. } => warn!(error = %e, "static resource failed"),
                    _ => debug!(error = %e, "static resource unavailable"),
                }
                Response::error(e.status_code(), request_path)
            }
        }
    }
}
