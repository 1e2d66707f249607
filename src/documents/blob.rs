//! Blob storage on the local filesystem, served back under `/blobs`.

use std::path::{Component, Path, PathBuf};

use super::BlobStorage;
use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative blob path under the root, refusing anything that could
    /// escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(path);
        let contained = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(AppError::Validation(format!("Invalid blob path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStorage for LocalBlobStorage {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Upload(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| AppError::Upload(format!("Cannot write blob {}: {}", path, e)))?;

        tracing::debug!("Stored blob {}", path);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, AppError> {
        let full = self.resolve(path)?;
        if !tokio::fs::try_exists(&full).await? {
            return Err(AppError::NotFound(format!("Blob {} not found", path)));
        }
        Ok(format!("{}/blobs/{}", self.public_base_url, encode_path(path)))
    }
}

/// Percent-encode each segment of a blob path, keeping the separators.
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (LocalBlobStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = LocalBlobStorage::new(temp_dir.path(), "http://localhost:8080/");
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_put_then_resolve_url() {
        let (storage, dir) = storage();
        storage
            .put("resumesFiles/cv.pdf-1700000000000", b"%PDF".to_vec())
            .await
            .unwrap();

        let on_disk = std::fs::read(dir.path().join("resumesFiles/cv.pdf-1700000000000")).unwrap();
        assert_eq!(on_disk, b"%PDF");

        let url = storage
            .download_url("resumesFiles/cv.pdf-1700000000000")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:8080/blobs/resumesFiles/cv.pdf-1700000000000");
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let (storage, _dir) = storage();
        let result = storage.download_url("resumesFiles/nothing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let (storage, _dir) = storage();
        for path in ["", "/etc/passwd", "../outside", "a/../../b", "./a"] {
            let result = storage.put(path, vec![1]).await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{}", path);
        }
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("cover Letters/My CV.pdf"), "cover%20Letters/My%20CV.pdf");
        assert_eq!(encode_path("a/b-c_d.e~f"), "a/b-c_d.e~f");
    }
}
