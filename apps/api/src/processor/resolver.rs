use crate::config::DerivativeConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Photo, Variant};
use crate::processor::derivatives::{open_original, render_variant};
use crate::processor::watermark::WatermarkSnapshot;
use crate::storage::{keys, BackendKind, SharedStorage, Storage};
use image::GenericImageView;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub backend: BackendKind,
    pub key: String,
    /// True when this call rendered and uploaded the artifact.
    pub generated: bool,
    /// Oriented dimensions of the original, known only when it was decoded.
    pub source_dimensions: Option<(u32, u32)>,
}

/// Guarantees a derivative exists in storage before handing back its key.
///
/// Holds no database handle; callers persist keys and dimensions themselves in
/// short writes once resolution is done. Concurrent misses on the same key may
/// both render, and the last upload wins.
pub struct DerivativeResolver {
    storage: SharedStorage,
    config: DerivativeConfig,
    renders: AtomicU64,
    /// Parent of per-render scratch dirs; the system temp dir when unset.
    scratch_root: Option<PathBuf>,
}

impl DerivativeResolver {
    pub fn new(storage: SharedStorage, config: DerivativeConfig) -> Self {
        Self {
            storage,
            config,
            renders: AtomicU64::new(0),
            scratch_root: None,
        }
    }

    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = Some(root);
        self
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn config(&self) -> &DerivativeConfig {
        &self.config
    }

    /// Number of times the image engine has run through this resolver.
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    pub async fn resolve(
        &self,
        photo: &Photo,
        variant_name: &str,
        snapshot: &Arc<WatermarkSnapshot>,
    ) -> AppResult<ResolvedAsset> {
        let variant: Variant = variant_name.parse()?;
        self.resolve_variant(photo, variant, snapshot).await
    }

    pub async fn resolve_variant(
        &self,
        photo: &Photo,
        variant: Variant,
        snapshot: &Arc<WatermarkSnapshot>,
    ) -> AppResult<ResolvedAsset> {
        let backend = self.storage.backend();

        if variant == Variant::Original && !snapshot.applies_to(Variant::Original) {
            if !self.storage.exists(&photo.original_key).await? {
                return Err(source_missing(photo));
            }
            return Ok(ResolvedAsset {
                backend,
                key: photo.original_key.clone(),
                generated: false,
                source_dimensions: None,
            });
        }

        let key = keys::photo_variant_key(photo, variant);

        // zero-length objects are leftovers from an interrupted write
        if let Some(size) = self.storage.size(&key).await? {
            if size > 0 {
                debug!("Derivative cache hit: {}", key);
                return Ok(ResolvedAsset {
                    backend,
                    key,
                    generated: false,
                    source_dimensions: None,
                });
            }
        }

        debug!("Derivative cache miss: {}", key);
        let dimensions = self.generate(photo, variant, &key, snapshot).await?;
        info!(
            "Generated {} for photo {} ({}x{}) at {}",
            variant, photo.id, dimensions.0, dimensions.1, key
        );

        Ok(ResolvedAsset {
            backend,
            key,
            generated: true,
            source_dimensions: Some(dimensions),
        })
    }

    async fn generate(
        &self,
        photo: &Photo,
        variant: Variant,
        key: &str,
        snapshot: &Arc<WatermarkSnapshot>,
    ) -> AppResult<(u32, u32)> {
        // removed on drop, whichever way this function exits
        let prefix = format!("photo-{}-", photo.id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let local_path = scratch
            .path()
            .join(format!("original.{}", photo.original_extension()));

        self.storage
            .download_to_local_path(&photo.original_key, &local_path)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => source_missing(photo),
                other => other,
            })?;

        let config = self.config.clone();
        let snapshot = Arc::clone(snapshot);
        let (bytes, dimensions) = tokio::task::spawn_blocking(move || {
            let source = open_original(&local_path)?;
            let dimensions = source.dimensions();
            let bytes = render_variant(&source, variant, &config, &snapshot)?;
            Ok::<_, AppError>((bytes, dimensions))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Derivative task failed: {}", e)))??;

        self.renders.fetch_add(1, Ordering::Relaxed);

        self.storage
            .write_bytes(key, bytes, "image/jpeg")
            .await
            .map_err(|e| match e {
                AppError::StorageWrite(_) => e,
                other => AppError::StorageWrite(other.to_string()),
            })?;

        drop(scratch);
        Ok(dimensions)
    }
}

fn source_missing(photo: &Photo) -> AppError {
    AppError::NotFound(format!("Original for photo {} not found", photo.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrandSettings, DownloadSize, WatermarkPosition};
    use crate::processor::derivatives::{decode_tolerant, encode_jpeg, make_longest_edge};
    use crate::test_utils::{jpeg_bytes, photo_fixture, solid_logo, test_storage, CountingStorage};

    fn resolver_over(storage: &Arc<CountingStorage>) -> DerivativeResolver {
        DerivativeResolver::new(storage.clone(), DerivativeConfig::default())
    }

    #[tokio::test]
    async fn test_second_resolve_is_a_cache_hit() {
        let (_dir, storage) = test_storage();
        let photo = photo_fixture(3, "abc", "portrait.jpg");
        storage
            .write_bytes(&photo.original_key, jpeg_bytes(1600, 1200), "image/jpeg")
            .await
            .unwrap();
        storage.reset_counts();

        let resolver = resolver_over(&storage);
        let snapshot = Arc::new(WatermarkSnapshot::disabled());

        let first = resolver.resolve(&photo, "web", &snapshot).await.unwrap();
        let first_bytes = storage.read_bytes(&first.key).await.unwrap();
        let second = resolver.resolve(&photo, "web", &snapshot).await.unwrap();
        let second_bytes = storage.read_bytes(&second.key).await.unwrap();

        assert!(first.generated);
        assert!(!second.generated);
        assert_eq!(first.key, "3/downloads/web/abc");
        assert_eq!(first.key, second.key);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(storage.write_count(), 1);
        assert_eq!(resolver.render_count(), 1);
        assert_eq!(first.source_dimensions, Some((1600, 1200)));
    }

    #[tokio::test]
    async fn test_unknown_variant() {
        let (_dir, storage) = test_storage();
        let resolver = resolver_over(&storage);
        let photo = photo_fixture(1, "x", "x.jpg");
        let err = resolver
            .resolve(&photo, "poster", &Arc::new(WatermarkSnapshot::disabled()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidVariant(_)));
    }

    #[tokio::test]
    async fn test_missing_original_is_not_found() {
        let (_dir, storage) = test_storage();
        let resolver = resolver_over(&storage);
        let photo = photo_fixture(1, "gone", "gone.jpg");
        let snapshot = Arc::new(WatermarkSnapshot::disabled());

        let err = resolver.resolve(&photo, "thumb", &snapshot).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = resolver.resolve(&photo, "original", &snapshot).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_original_is_unprocessable() {
        let (_dir, storage) = test_storage();
        let photo = photo_fixture(2, "bad", "bad.jpg");
        storage
            .write_bytes(&photo.original_key, b"garbage".to_vec(), "image/jpeg")
            .await
            .unwrap();
        storage.reset_counts();

        let resolver = resolver_over(&storage);
        let err = resolver
            .resolve(&photo, "preview", &Arc::new(WatermarkSnapshot::disabled()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnprocessableAsset(_)));
        assert_eq!(storage.write_count(), 0);
        assert!(!storage.exists("2/previews/bad").await.unwrap());
    }

    #[tokio::test]
    async fn test_original_bypasses_generation_without_watermark() {
        let (_dir, storage) = test_storage();
        let photo = photo_fixture(5, "orig", "orig.jpg");
        storage
            .write_bytes(&photo.original_key, jpeg_bytes(64, 64), "image/jpeg")
            .await
            .unwrap();
        storage.reset_counts();

        let resolver = resolver_over(&storage);
        let resolved = resolver
            .resolve(&photo, "original", &Arc::new(WatermarkSnapshot::disabled()))
            .await
            .unwrap();
        assert_eq!(resolved.key, photo.original_key);
        assert!(!resolved.generated);
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_length_cache_entry_is_regenerated() {
        let (_dir, storage) = test_storage();
        let photo = photo_fixture(6, "z", "z.jpg");
        storage
            .write_bytes(&photo.original_key, jpeg_bytes(400, 300), "image/jpeg")
            .await
            .unwrap();
        storage
            .write_bytes("6/thumbs/z", Vec::new(), "image/jpeg")
            .await
            .unwrap();

        let resolver = resolver_over(&storage);
        let resolved = resolver
            .resolve(&photo, "thumb", &Arc::new(WatermarkSnapshot::disabled()))
            .await
            .unwrap();
        assert!(resolved.generated);
        assert!(storage.size("6/thumbs/z").await.unwrap().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_watermarked_medium_end_to_end() {
        let (_dir, storage) = test_storage();
        let photo = photo_fixture(11, "file-1", "ceremony.jpg");
        storage
            .write_bytes(&photo.original_key, jpeg_bytes(4000, 3000), "image/jpeg")
            .await
            .unwrap();
        storage.reset_counts();

        let snapshot = Arc::new(WatermarkSnapshot::new(
            BrandSettings {
                wm_enabled: true,
                wm_use_logo: true,
                wm_opacity: 0.3,
                wm_position: WatermarkPosition::BottomRight,
                wm_scale: 0.2,
                ..BrandSettings::default()
            },
            Some(solid_logo(200, 100, [255, 255, 255, 255])),
        ));
        let resolver = resolver_over(&storage);

        let resolved = resolver
            .resolve_variant(&photo, Variant::Download(DownloadSize::Medium), &snapshot)
            .await
            .unwrap();
        assert_eq!(resolved.key, "11/downloads/medium/file-1");

        let bytes = storage.read_bytes(&resolved.key).await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let source = decode_tolerant(&jpeg_bytes(4000, 3000)).unwrap();
        let plain = encode_jpeg(&make_longest_edge(&source, 1200), 90).unwrap();
        let marked = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let unmarked = image::load_from_memory(&plain).unwrap().to_rgb8();
        assert_eq!(marked.dimensions(), (1200, 900));

        // mark is 240x120 with 24px padding: inside differs, outside matches
        let brightness = |img: &image::RgbImage, x: u32, y: u32| {
            img.get_pixel(x, y).0.iter().map(|c| *c as i32).sum::<i32>()
        };
        assert!(brightness(&marked, 1050, 810) > brightness(&unmarked, 1050, 810) + 30);
        assert!((brightness(&marked, 600, 300) - brightness(&unmarked, 600, 300)).abs() < 30);
        assert!((brightness(&marked, 1190, 890) - brightness(&unmarked, 1190, 890)).abs() < 30);

        let again = resolver
            .resolve_variant(&photo, Variant::Download(DownloadSize::Medium), &snapshot)
            .await
            .unwrap();
        assert!(!again.generated);
        assert_eq!(resolver.render_count(), 1);
        assert_eq!(storage.write_count(), 1);
    }

    fn scratch_is_empty(root: &std::path::Path) -> bool {
        std::fs::read_dir(root).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_scratch_is_removed_on_every_exit() {
        let (_dir, storage) = test_storage();
        let scratch = tempfile::tempdir().unwrap();
        let resolver = resolver_over(&storage).with_scratch_root(scratch.path().to_path_buf());
        let snapshot = Arc::new(WatermarkSnapshot::disabled());

        let good = photo_fixture(7, "good", "good.jpg");
        storage
            .write_bytes(&good.original_key, jpeg_bytes(300, 200), "image/jpeg")
            .await
            .unwrap();
        resolver.resolve(&good, "thumb", &snapshot).await.unwrap();
        assert!(scratch_is_empty(scratch.path()));

        let corrupt = photo_fixture(7, "corrupt", "corrupt.jpg");
        storage
            .write_bytes(&corrupt.original_key, b"garbage".to_vec(), "image/jpeg")
            .await
            .unwrap();
        let err = resolver.resolve(&corrupt, "preview", &snapshot).await.unwrap_err();
        assert!(matches!(err, AppError::UnprocessableAsset(_)));
        assert!(scratch_is_empty(scratch.path()));

        storage.set_fail_writes(true);
        let err = resolver.resolve(&good, "web", &snapshot).await.unwrap_err();
        assert!(matches!(err, AppError::StorageWrite(_)));
        assert!(scratch_is_empty(scratch.path()));
    }
}
