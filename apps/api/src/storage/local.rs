use super::{BackendKind, BoxedReader, Storage};
use crate::auth::jwt::create_media_link_token;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Media stored under a directory on the local filesystem.
///
/// Keys map to relative paths below `root`. Writes land in a sibling `.part`
/// file first and are renamed into place, so readers never see half a file.
pub struct LocalStorage {
    root: PathBuf,
    url_prefix: String,
    /// Signs the `?sig=` token on URLs handed out by `signed_url`.
    link_secret: String,
}

impl LocalStorage {
    pub fn new(root: PathBuf, url_prefix: String, link_secret: String) -> Self {
        Self {
            root,
            url_prefix,
            link_secret,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.trim().is_empty() || escapes {
            return Err(AppError::Validation(format!("Invalid storage key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn part_path(dest: &Path) -> PathBuf {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        dest.with_file_name(format!("{}.{}.part", name, uuid::Uuid::new_v4()))
    }

    async fn ensure_parent(dest: &Path) -> AppResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::StorageWrite(format!("{}: {}", parent.display(), e)))?;
        }
        Ok(())
    }

    async fn commit(part: &Path, dest: &Path) -> AppResult<()> {
        if let Err(e) = fs::rename(part, dest).await {
            let _ = fs::remove_file(part).await;
            return Err(AppError::StorageWrite(format!("{}: {}", dest.display(), e)));
        }
        Ok(())
    }
}

fn read_error(key: &str, e: std::io::Error) -> AppError {
    if e.kind() == ErrorKind::NotFound {
        AppError::NotFound(format!("Object not found: {}", key))
    } else {
        AppError::StorageRead(format!("{}: {}", key, e))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn save(&self, mut reader: BoxedReader, key: &str) -> AppResult<String> {
        let dest = self.path_for(key)?;
        Self::ensure_parent(&dest).await?;
        let part = Self::part_path(&dest);

        let written = async {
            let mut file = fs::File::create(&part).await?;
            let copied = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(copied)
        }
        .await;

        match written {
            Ok(bytes) => {
                Self::commit(&part, &dest).await?;
                debug!("Saved {} ({} bytes)", key, bytes);
                Ok(key.to_string())
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                Err(AppError::StorageWrite(format!("{}: {}", key, e)))
            }
        }
    }

    async fn write_bytes(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> AppResult<()> {
        let dest = self.path_for(key)?;
        Self::ensure_parent(&dest).await?;
        let part = Self::part_path(&dest);

        if let Err(e) = fs::write(&part, &bytes).await {
            let _ = fs::remove_file(&part).await;
            return Err(AppError::StorageWrite(format!("{}: {}", key, e)));
        }
        Self::commit(&part, &dest).await
    }

    async fn size(&self, key: &str) -> AppResult<Option<u64>> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::StorageRead(format!("{}: {}", key, e))),
        }
    }

    async fn read_bytes(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| read_error(key, e))
    }

    async fn open_reader(&self, key: &str) -> AppResult<BoxedReader> {
        let path = self.path_for(key)?;
        let file = fs::File::open(&path).await.map_err(|e| read_error(key, e))?;
        Ok(Box::pin(file))
    }

    async fn download_to_local_path(&self, key: &str, destination: &Path) -> AppResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&path, destination)
            .await
            .map(|_| ())
            .map_err(|e| read_error(key, e))
    }

    async fn delete(&self, key: &str) {
        let Ok(path) = self.path_for(key) else {
            return;
        };
        match fs::remove_file(&path).await {
            Ok(()) => debug!("Deleted {}", key),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", key, e),
        }
    }

    async fn delete_prefix(&self, prefix: &str) {
        let Ok(path) = self.path_for(prefix.trim_end_matches('/')) else {
            return;
        };
        match fs::remove_dir_all(&path).await {
            Ok(()) => debug!("Deleted prefix {}", prefix),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete prefix {}: {}", prefix, e),
        }
    }

    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        content_disposition: Option<&str>,
    ) -> AppResult<String> {
        self.path_for(key)?;
        let key = key.trim_start_matches('/');
        let token = create_media_link_token(key, content_disposition, ttl, &self.link_secret)?;
        Ok(format!(
            "{}/{}?sig={}",
            self.url_prefix.trim_end_matches('/'),
            key,
            token
        ))
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.path_for(key).ok()
    }
}
