//! Uniform access to the media store.
//!
//! Everything above this module talks to `dyn Storage`; the concrete backend is
//! chosen once at startup from `storage.backend` in the config.

pub mod keys;
mod local;
mod s3;

pub use local::LocalStorage;
pub use s3::S3Storage;

use crate::config::{StorageBackendKind, StorageConfig};
use crate::error::AppResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn backend_name(&self) -> &'static str {
        self.backend().as_str()
    }

    /// Consumes `reader` completely and stores it under `key`.
    ///
    /// A failed save never leaves an object that `exists` would report.
    async fn save(&self, reader: BoxedReader, key: &str) -> AppResult<String>;

    async fn write_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<()>;

    /// Size in bytes, `None` when the key is absent.
    async fn size(&self, key: &str) -> AppResult<Option<u64>>;

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.size(key).await?.is_some())
    }

    async fn read_bytes(&self, key: &str) -> AppResult<Vec<u8>>;

    async fn open_reader(&self, key: &str) -> AppResult<BoxedReader>;

    async fn download_to_local_path(&self, key: &str, destination: &Path) -> AppResult<()>;

    /// Best-effort; a missing key is not an error.
    async fn delete(&self, key: &str);

    /// Best-effort removal of every key under `prefix`.
    async fn delete_prefix(&self, prefix: &str);

    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        content_disposition: Option<&str>,
    ) -> AppResult<String>;

    /// Filesystem path of `key` when the backend is a local disk.
    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

pub type SharedStorage = Arc<dyn Storage>;

/// `link_secret` signs local media links; object storage presigns with its own credentials.
pub async fn build_storage(config: &StorageConfig, link_secret: &str) -> AppResult<SharedStorage> {
    match config.backend {
        StorageBackendKind::Local => {
            tracing::info!("Using local media storage at {:?}", config.media_root);
            Ok(Arc::new(LocalStorage::new(
                config.media_root.clone(),
                config.media_url_prefix.clone(),
                link_secret.to_string(),
            )))
        }
        StorageBackendKind::S3 => {
            tracing::info!("Using object storage bucket {}", config.bucket);
            Ok(Arc::new(S3Storage::new(config).await?))
        }
    }
}

pub fn content_disposition_attachment(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

pub fn guess_content_type(key: &str) -> String {
    if key.ends_with(".zip") {
        return "application/zip".to_string();
    }
    match Path::new(key).extension() {
        Some(_) => mime_guess::from_path(key)
            .first_or_octet_stream()
            .to_string(),
        None => "image/jpeg".to_string(),
    }
}
