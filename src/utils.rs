//! Utility functions for directory provisioning and atomic file writes

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Create a directory and its parents if they do not exist
///
/// Idempotent: an existing directory is not an error.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| Error::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Sibling path used while a file is being written
///
/// # Examples
///
/// ```
/// use grid_sync::utils::partial_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(
///     partial_path(Path::new("images/demo/abc-300.jpg")),
///     PathBuf::from("images/demo/abc-300.jpg.part")
/// );
/// ```
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Write `contents` to `path` through a temporary sibling and a rename, so
/// readers never observe a half-written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent).await?;
    }
    let tmp = partial_path(path);
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e.into());
    }
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_dir_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("images").join("demo");

        ensure_dir(&path).await.unwrap();
        ensure_dir(&path).await.unwrap();
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_ensure_dir_fails_on_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("occupied");
        std::fs::write(&path, "not a directory").unwrap();

        let err = ensure_dir(&path).await.unwrap_err();
        assert!(matches!(err, Error::CreateDir { .. }));
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parent_and_leaves_no_partial() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("meta").join("demo.json");

        write_atomic(&path, b"{}").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
        assert!(!partial_path(&path).exists());

        write_atomic(&path, b"{\"a\": 1}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\": 1}");
    }
}
