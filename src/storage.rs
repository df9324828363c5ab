//! Local storage: staged uploads, the downloads folder and cache cleanup

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name used when a picked document has no usable display name
const FALLBACK_NAME: &str = "temp";

/// A local file staged for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFile {
    pub path: PathBuf,
    pub display_name: String,
    pub size: u64,
}

/// An opened download destination
pub struct DownloadTarget {
    pub path: PathBuf,
    pub file: tokio::fs::File,
}

/// Where downloaded content is written
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Create (or truncate) the destination for `file_name`
    async fn create(&self, file_name: &str, mime_type: &str) -> io::Result<DownloadTarget>;
}

/// Reduce an arbitrary display name to a single safe path component
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();
    let trimmed = last.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Delete everything below `root`, leaving `root` itself in place.
///
/// Returns the number of removed entries. A missing root counts as empty.
pub fn purge_dir(root: &Path) -> io::Result<u64> {
    if !root.exists() {
        return Ok(0);
    }
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut removed = 0u64;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        // symlinks are removed, never followed
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            removed += purge_dir(&path)?;
            fs::remove_dir(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// App-owned directories
#[derive(Debug, Clone)]
pub struct LocalStorage {
    pub cache_dir: PathBuf,
    pub files_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(cache_dir: PathBuf, files_dir: PathBuf) -> Self {
        Self { cache_dir, files_dir }
    }

    /// Copy a picked document into the cache directory under its display name
    pub async fn stage_picked_file(
        &self,
        source: &Path,
        display_name: Option<&str>,
    ) -> io::Result<PickedFile> {
        let name = display_name
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .or_else(|| source.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_default();
        let display_name = sanitize_file_name(&name);

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let staged = self.cache_dir.join(&display_name);
        let size = tokio::fs::copy(source, &staged).await?;
        debug!("Staged {} as {} ({} bytes)", source.display(), staged.display(), size);

        Ok(PickedFile {
            path: staged,
            display_name,
            size,
        })
    }

    /// Wipe the cache and files directories
    pub async fn purge(&self) -> io::Result<u64> {
        let dirs = [self.cache_dir.clone(), self.files_dir.clone()];
        let removed = tokio::task::spawn_blocking(move || -> io::Result<u64> {
            let mut total = 0;
            for dir in &dirs {
                match purge_dir(dir) {
                    Ok(n) => total += n,
                    Err(e) => warn!("Failed to purge {}: {}", dir.display(), e),
                }
            }
            Ok(total)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        info!("Purged {} cached entries", removed);
        Ok(removed)
    }
}

/// Plain directory used as the downloads location
pub struct DownloadsFolder {
    dir: PathBuf,
}

impl DownloadsFolder {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The platform downloads directory, falling back to `./downloads`
    pub fn platform_default() -> PathBuf {
        dirs::download_dir().unwrap_or_else(|| PathBuf::from("downloads"))
    }
}

#[async_trait]
impl DownloadSink for DownloadsFolder {
    async fn create(&self, file_name: &str, mime_type: &str) -> io::Result<DownloadTarget> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(sanitize_file_name(file_name));
        let file = tokio::fs::File::create(&path).await?;
        debug!("Writing {} download to {}", mime_type, path.display());
        Ok(DownloadTarget { path, file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("dir\\evil.txt"), "evil.txt");
        assert_eq!(sanitize_file_name(""), "temp");
        assert_eq!(sanitize_file_name(".."), "temp");
        assert_eq!(sanitize_file_name("a\u{0007}b"), "ab");
    }

    #[test]
    fn test_purge_dir_removes_nested_tree_keeps_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("top.txt"), b"1").unwrap();
        fs::write(root.join("a/mid.txt"), b"2").unwrap();
        fs::write(root.join("a/b/c/deep.txt"), b"3").unwrap();

        let removed = purge_dir(&root).unwrap();
        // 3 files + 3 directories
        assert_eq!(removed, 6);
        assert!(root.exists());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_purge_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(purge_dir(&dir.path().join("nope")).unwrap(), 0);
    }

    #[test]
    fn test_purge_file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();
        assert!(purge_dir(&file).is_err());
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_stage_picked_file_uses_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("content-1234");
        fs::write(&source, b"png bytes").unwrap();
        let storage = LocalStorage::new(dir.path().join("cache"), dir.path().join("files"));

        let picked = storage.stage_picked_file(&source, Some("photo.png")).await.unwrap();
        assert_eq!(picked.display_name, "photo.png");
        assert_eq!(picked.size, 9);
        assert_eq!(picked.path, dir.path().join("cache").join("photo.png"));

        let fallback = storage.stage_picked_file(&source, Some("  ")).await.unwrap();
        assert_eq!(fallback.display_name, "content-1234");
    }

    #[tokio::test]
    async fn test_storage_purge_wipes_both_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("cache"), dir.path().join("files"));
        fs::create_dir_all(&storage.cache_dir).unwrap();
        fs::create_dir_all(storage.files_dir.join("nested")).unwrap();
        fs::write(storage.cache_dir.join("x"), b"x").unwrap();
        fs::write(storage.files_dir.join("nested/y"), b"y").unwrap();

        assert_eq!(storage.purge().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_downloads_folder_creates_sanitized_target() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DownloadsFolder::new(dir.path().join("downloads"));
        let target = sink.create("../a.txt", "text/plain").await.unwrap();
        assert_eq!(target.path, dir.path().join("downloads").join("a.txt"));
        assert!(target.path.exists());
    }
}
