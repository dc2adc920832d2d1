// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-addressed flat blob store.
//!
//! Oversize evidence payloads are written here and referenced from the log
//! by an `artifacts://{sha256}.bin` URL. Identical content always lands at
//! the same path, so concurrent identical writes are harmless.

use mace_canon::sha256_hex;
use std::io;
use std::path::{Path, PathBuf};

const URL_SCHEME: &str = "artifacts://";

/// A directory of immutable, hash-named blobs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Use `dir` as the blob directory; created lazily on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist `content` and return its `artifacts://` URL.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors from directory creation or the write.
    pub fn save(&self, content: &[u8]) -> io::Result<String> {
        let filename = format!("{}.bin", sha256_hex(content));
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&filename);
        if !path.exists() {
            std::fs::write(&path, content)?;
        }
        tracing::debug!(artifact = %filename, bytes = content.len(), "artifact stored");
        Ok(format!("{URL_SCHEME}{filename}"))
    }

    /// Load the blob behind an `artifacts://` URL.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed URL or a filename that escapes the
    /// store directory; `NotFound` when the blob is missing.
    pub fn load(&self, url: &str) -> io::Result<Vec<u8>> {
        let Some(filename) = url.strip_prefix(URL_SCHEME) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not an artifact url: {url}"),
            ));
        };
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "artifact filename escapes the store",
            ));
        }
        std::fs::read(self.dir.join(filename))
    }

    /// The directory blobs live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
