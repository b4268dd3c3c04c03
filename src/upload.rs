use std::path::{Path, PathBuf};

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Error)]
#[error("Failed to save upload to {path}: {source}")]
pub struct UploadError {
    path: String,
    #[source]
    source: std::io::Error,
}

/// True when the text after the last `.` is an allowed image extension.
pub fn allowed_file(filename: &str) -> bool {
    extension(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn extension(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

/// Reduces a client-supplied name to a flat, ASCII-only file name.
///
/// Accented letters are decomposed (NFKD) and reduced to their ASCII base,
/// `/` becomes whitespace, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped, then leading/trailing `.` and `_` are
/// trimmed. The result may be empty.
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' { ' ' } else { c })
        .collect();

    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c == '_')
        .to_string()
}

/// Writes uploads under a directory using collision-free names.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        UploadStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name under which `filename` is stored: a fresh UUID, the sanitized
    /// stem when anything survives sanitizing, and the lowercased extension.
    pub fn storage_name(filename: &str) -> String {
        let key = Uuid::new_v4();
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext.to_ascii_lowercase())),
            None => (filename, None),
        };

        let mut name = key.to_string();
        let stem = secure_filename(stem);
        if !stem.is_empty() {
            name.push('_');
            name.push_str(&stem);
        }
        if let Some(ext) = ext.map(|e| secure_filename(&e)).filter(|e| !e.is_empty()) {
            name.push('.');
            name.push_str(&ext);
        }
        name
    }

    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, UploadError> {
        let path = self.dir.join(Self::storage_name(filename));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| UploadError {
                path: path.display().to_string(),
                source,
            })?;
        Ok(path)
    }
}
