//! Content-addressed static assets.
//!
//! Asset URLs embed the SHA-256 of the file's bytes as the second-to-last
//! dot segment of the file name (`site.<hash>.css`). A request for the
//! hashed name can be cached forever; a request for the plain name must be
//! revalidated. Files are read on every resolution, nothing is cached here.

use std::io;
use std::path::{Component, Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a hex SHA-256 digest.
pub const HASH_LENGTH: usize = 64;

/// `Cache-Control` for a request that named the current content hash.
pub const CACHE_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// `Cache-Control` for every other asset request.
pub const CACHE_REVALIDATE: &str = "public, no-cache";

/// Bytes considered when sniffing a content type.
const SNIFF_LENGTH: usize = 512;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset path must not be empty")]
    EmptyPath,

    #[error("content hash must be {HASH_LENGTH} characters, got {0}")]
    InvalidHashLength(usize),

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to read asset {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Everything needed to reference one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetDescriptor {
    /// Path relative to the static root, without hash.
    pub path: String,
    /// Hex SHA-256 of the content.
    pub hash: String,
    /// `path` with the hash embedded.
    pub hashed_path: String,
    /// Sub-resource integrity value (`sha256-<base64>`).
    pub integrity: String,
}

impl AssetDescriptor {
    /// Describe `bytes` found at logical `path`.
    pub fn from_bytes(path: &str, bytes: &[u8]) -> Result<Self, AssetError> {
        let digest = Sha256::digest(bytes);
        let hash = hex::encode(digest);
        let hashed_path = embed_hash(path, &hash)?;
        Ok(Self {
            path: path.to_string(),
            integrity: format!("sha256-{}", STANDARD.encode(digest)),
            hash,
            hashed_path,
        })
    }

    /// `Cache-Control` for a request that asked for `requested`.
    pub fn cache_control(&self, requested: &str) -> &'static str {
        if requested == self.hashed_path {
            CACHE_IMMUTABLE
        } else {
            CACHE_REVALIDATE
        }
    }
}

/// Split a path into `(directory including trailing '/', base name)`.
fn split_base(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    }
}

/// Insert `hash` before the extension of the base name.
///
/// `css/site.css` becomes `css/site.<hash>.css`; `LICENSE` becomes
/// `LICENSE.<hash>`.
pub fn embed_hash(path: &str, hash: &str) -> Result<String, AssetError> {
    if path.is_empty() {
        return Err(AssetError::EmptyPath);
    }
    if hash.len() != HASH_LENGTH {
        return Err(AssetError::InvalidHashLength(hash.len()));
    }

    let (dir, base) = split_base(path);
    Ok(match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{dir}{stem}.{hash}.{ext}"),
        None => format!("{path}.{hash}"),
    })
}

/// Remove an embedded hash from the base name, if one is recognized.
///
/// A segment is taken to be a hash purely by its length, so a dotted name
/// whose middle segment happens to be 64 characters long is stripped too.
pub fn strip_hash(path: &str) -> String {
    let (dir, base) = split_base(path);
    let segments: Vec<&str> = base.split('.').collect();

    match segments.as_slice() {
        // name.<hash>, as produced for extension-less files
        [stem, hash] if !stem.is_empty() && hash.len() == HASH_LENGTH => {
            format!("{dir}{stem}")
        }
        [rest @ .., hash, ext] if !rest.is_empty() && hash.len() == HASH_LENGTH => {
            format!("{dir}{}.{ext}", rest.join("."))
        }
        _ => path.to_string(),
    }
}

/// Content type for a response serving `path`.
///
/// `.css` and `.js` are fixed; everything else is sniffed from the content.
pub fn content_type(path: &str, bytes: &[u8]) -> &'static str {
    if path.ends_with(".css") {
        return "text/css";
    }
    if path.ends_with(".js") {
        return "application/javascript";
    }
    sniff(&bytes[..bytes.len().min(SNIFF_LENGTH)])
}

fn sniff(head: &[u8]) -> &'static str {
    // infer's text matchers drop the charset, so text is classified below
    if let Some(kind) = infer::get(head)
        && kind.matcher_type() != infer::MatcherType::Text
    {
        return kind.mime_type();
    }

    let text = head.trim_ascii_start();
    let lower: Vec<u8> = text.iter().take(16).map(u8::to_ascii_lowercase).collect();
    if [&b"<!doctype html"[..], b"<html", b"<head", b"<body"]
        .iter()
        .any(|tag| lower.starts_with(tag))
    {
        return "text/html; charset=utf-8";
    }

    // A multi-byte character may be cut at the sniff boundary.
    let valid_utf8 = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    let has_control = head
        .iter()
        .any(|b| b.is_ascii_control() && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0c));
    if valid_utf8 && !has_control {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

/// Resolves assets below a static root directory.
#[derive(Debug, Clone)]
pub struct StaticAssets {
    root: PathBuf,
}

impl StaticAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the file at logical `path` and describe it.
    pub async fn load(&self, path: &str) -> Result<(AssetDescriptor, Vec<u8>), AssetError> {
        let file = self.file_path(path)?;
        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| io_error(path, e))?;
        let descriptor = AssetDescriptor::from_bytes(path, &bytes)?;
        Ok((descriptor, bytes))
    }

    /// Blocking variant of [`load`](Self::load) for template helpers, which
    /// run inside synchronous rendering.
    pub fn resolve_blocking(&self, path: &str) -> Result<AssetDescriptor, AssetError> {
        let file = self.file_path(path)?;
        let bytes = std::fs::read(&file).map_err(|e| io_error(path, e))?;
        AssetDescriptor::from_bytes(path, &bytes)
    }

    /// Map a logical path to a file below the root, refusing traversal.
    fn file_path(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return Err(AssetError::EmptyPath);
        }
        if relative.contains('\\') || relative.contains('\0') {
            return Err(AssetError::NotFound(path.to_string()));
        }
        let safe = Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AssetError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, source: io::Error) -> AssetError {
    match source.kind() {
        // a directory or a path through a file is as good as missing
        io::ErrorKind::NotFound | io::ErrorKind::IsADirectory | io::ErrorKind::NotADirectory => {
            AssetError::NotFound(path.to_string())
        }
        _ => AssetError::Io {
            path: path.to_string(),
            source,
        },
    }
}
