use super::{guess_content_type, BackendKind, BoxedReader, Storage};
use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream, Client};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// S3-compatible object storage. Objects only become visible once a PUT
/// completes, so a failed upload never shows up in `size`/`exists`.
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: &StorageConfig) -> AppResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(AppError::Internal(
                "storage.bucket must be set for the s3 backend".to_string(),
            ));
        }

        let endpoint_url = config
            .endpoint_url
            .clone()
            .or_else(|| std::env::var("AWS_ENDPOINT_URL").ok());

        // a hung call surfaces as a retryable storage error instead of stalling the request
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.operation_timeout_seconds.max(1)))
            .build();
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .timeout_config(timeouts);
        if let Some(endpoint) = &endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }
        if let Some(region) = &config.region {
            config_loader = config_loader.region(aws_config::Region::new(region.clone()));
        }

        let sdk_config = config_loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        // MinIO and friends need path-style addressing
        if endpoint_url.is_some() {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    async fn put(&self, key: &str, body: ByteStream, content_type: &str) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::StorageWrite(format!("PUT {}: {}", key, e)))?;
        debug!("S3 PUT success: key={}", key);
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
    ) -> AppResult<aws_sdk_s3::operation::get_object::GetObjectOutput> {
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    AppError::NotFound(format!("Object not found: {}", key))
                } else {
                    AppError::StorageRead(format!("GET {}: {}", key, e))
                }
            })
    }
}

#[async_trait]
impl Storage for S3Storage {
    fn backend(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn save(&self, mut reader: BoxedReader, key: &str) -> AppResult<String> {
        // Spool to disk first so the PUT has a known length and the input is fully consumed.
        let spool = tempfile::NamedTempFile::new()
            .map_err(|e| AppError::StorageWrite(format!("spool for {}: {}", key, e)))?;
        let spool_path = spool.path().to_path_buf();

        let mut file = tokio::fs::File::create(&spool_path)
            .await
            .map_err(|e| AppError::StorageWrite(format!("spool for {}: {}", key, e)))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| AppError::StorageWrite(format!("spool for {}: {}", key, e)))?;
        file.flush()
            .await
            .map_err(|e| AppError::StorageWrite(format!("spool for {}: {}", key, e)))?;
        drop(file);

        let body = ByteStream::from_path(&spool_path)
            .await
            .map_err(|e| AppError::StorageWrite(format!("spool for {}: {}", key, e)))?;
        self.put(key, body, &guess_content_type(key)).await?;
        Ok(key.to_string())
    }

    async fn write_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<()> {
        debug!("S3 PUT (bytes): bucket={}, key={}, size={} bytes", self.bucket, key, bytes.len());
        self.put(key, ByteStream::from(bytes), content_type).await
    }

    async fn size(&self, key: &str) -> AppResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(head.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if missing {
                    Ok(None)
                } else {
                    Err(AppError::StorageRead(format!("HEAD {}: {}", key, e)))
                }
            }
        }
    }

    async fn read_bytes(&self, key: &str) -> AppResult<Vec<u8>> {
        let output = self.get(key).await?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::StorageRead(format!("GET {}: {}", key, e)))?;
        Ok(data.to_vec())
    }

    async fn open_reader(&self, key: &str) -> AppResult<BoxedReader> {
        let output = self.get(key).await?;
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn download_to_local_path(&self, key: &str, destination: &Path) -> AppResult<()> {
        let output = self.get(key).await?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut reader = output.body.into_async_read();
        let mut file = tokio::fs::File::create(destination).await?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| AppError::StorageRead(format!("GET {}: {}", key, e)))?;
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) {
        // DeleteObject succeeds for missing keys
        if let Err(e) = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            warn!("Failed to delete {}: {}", key, e);
        }
    }

    async fn delete_prefix(&self, prefix: &str) {
        let mut continuation: Option<String> = None;
        loop {
            let listing = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await;

            let listing = match listing {
                Ok(l) => l,
                Err(e) => {
                    warn!("Failed to list prefix {}: {}", prefix, e);
                    return;
                }
            };

            for object in listing.contents() {
                if let Some(key) = object.key() {
                    self.delete(key).await;
                }
            }

            match listing.next_continuation_token() {
                Some(token) if listing.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
    }

    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        content_disposition: Option<&str>,
    ) -> AppResult<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Internal(format!("Invalid signed URL lifetime: {}", e)))?;

        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(disposition) = content_disposition {
            request = request.response_content_disposition(disposition);
        }

        let presigned = request
            .presigned(presigning)
            .await
            .map_err(|e| AppError::StorageRead(format!("presign {}: {}", key, e)))?;
        Ok(presigned.uri().to_string())
    }
}
