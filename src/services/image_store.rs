//! src/services/image_store.rs
//!
//! ImageStore: keeps item photos on local disk beneath
//! `root/uploads/`. Records only ever hold the storage-relative path
//! (`uploads/<file>`), so the deployment root can move without rewriting rows.

use bytes::Bytes;
use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Directory (relative to the root) that holds every stored image.
pub const UPLOAD_DIR: &str = "uploads";

const MAX_EXTENSION_LEN: usize = 8;

#[derive(Clone, Debug)]
pub struct ImageStore {
    /// Deployment root; images live in `root/uploads`.
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute directory holding the images.
    pub fn upload_dir(&self) -> PathBuf {
        self.root.join(UPLOAD_DIR)
    }

    /// Persist `bytes` and return the storage-relative path.
    ///
    /// Writes to a temp file first, fsyncs, then renames into place so a
    /// crash never leaves a half-written image under its final name.
    pub async fn store(&self, bytes: Bytes, suggested_name: &str) -> io::Result<String> {
        let dir = self.upload_dir();
        fs::create_dir_all(&dir).await?;

        let file_name = format!(
            "image-{}-{}{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension_of(suggested_name)
        );
        let final_path = dir.join(&file_name);
        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = write_synced(&tmp_path, &bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        debug!("stored image {} ({} bytes)", final_path.display(), bytes.len());
        Ok(format!("{}/{}", UPLOAD_DIR, file_name))
    }

    /// Delete a stored image. A file that is already gone is not an error.
    pub async fn release(&self, relative_path: &str) -> io::Result<()> {
        let path = self.resolve(relative_path)?;
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed image {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("image {} already missing", path.display());
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Open a stored image for streaming out.
    pub async fn open(&self, relative_path: &str) -> io::Result<File> {
        let path = self.resolve(relative_path)?;
        File::open(&path).await
    }

    /// Map a storage-relative path onto disk, refusing anything that could
    /// escape the upload directory.
    fn resolve(&self, relative_path: &str) -> io::Result<PathBuf> {
        let normalized = normalize_image_path(relative_path);
        let rel = Path::new(&normalized);
        let safe = rel.starts_with(UPLOAD_DIR)
            && rel.components().count() > 1
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid image path `{}`", relative_path),
            ));
        }
        Ok(self.root.join(rel))
    }
}

/// Reduce any stored image path to its storage-relative form.
///
/// Older rows may carry an absolute path from whatever machine wrote them;
/// everything before the last `uploads` segment is dropped and Windows
/// separators become `/`.
pub fn normalize_image_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let lower = unified.to_ascii_lowercase();
    match lower.rfind(UPLOAD_DIR) {
        Some(idx) => unified[idx..].to_string(),
        None => unified,
    }
}

/// Lowercased `.ext` of the suggested name, or empty if it has none usable.
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_absolute_prefix() {
        assert_eq!(
            normalize_image_path("/srv/app/server/uploads/image-1.jpg"),
            "uploads/image-1.jpg"
        );
        assert_eq!(
            normalize_image_path("C:\\app\\server\\Uploads\\image-2.png"),
            "Uploads/image-2.png"
        );
        assert_eq!(normalize_image_path("uploads/image-3.gif"), "uploads/image-3.gif");
    }

    #[test]
    fn extension_is_lowercased_and_sanitized() {
        assert_eq!(extension_of("Wallet.JPG"), ".jpg");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of("weird.j/pg"), "");
    }

    #[tokio::test]
    async fn store_then_release_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImageStore::new(dir.path());

        let rel = images
            .store(Bytes::from_static(b"fake-png"), "keys.png")
            .await
            .unwrap();
        assert!(rel.starts_with("uploads/image-"));
        assert!(rel.ends_with(".png"));
        assert!(!Path::new(&rel).is_absolute());

        let on_disk = dir.path().join(&rel);
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"fake-png");

        images.release(&rel).await.unwrap();
        assert!(!on_disk.exists());

        // already gone
        images.release(&rel).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_paths_outside_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImageStore::new(dir.path());

        for bad in ["uploads/../secret", "etc/passwd", "uploads", "/uploads-evil/x"] {
            let err = images.release(bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{bad}");
        }
    }
}
