#![cfg(test)]

use crate::app::create_app;
use crate::auth::jwt::create_access_token;
use crate::auth::password::hash_password;
use crate::auth::AppState;
use crate::config::{Config, DerivativeConfig};
use crate::database::{init_database, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::Photo;
use crate::processor::DerivativeResolver;
use crate::storage::{BackendKind, BoxedReader, LocalStorage, SharedStorage, Storage};
use async_trait::async_trait;
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Create a scratch SQLite database pool with full schema applied.
///
/// Every pooled connection must see the same data, so the database lives in a
/// temporary file rather than in `:memory:`.
pub fn create_test_db() -> DbPool {
    let path = tempfile::Builder::new()
        .prefix("studio-test-")
        .suffix(".sqlite")
        .tempfile()
        .expect("Failed to create scratch database file")
        .into_temp_path()
        .keep()
        .expect("Failed to keep scratch database file");

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
        Ok(())
    });

    let pool = Pool::builder()
        .max_size(5)
        .build(manager)
        .expect("Failed to create test database pool");

    let conn = pool.get().expect("Failed to get connection from pool");
    init_database(&conn).expect("Failed to initialize test database schema");

    pool
}

/// Test fixture: Create a user in the test database
pub fn create_test_user(pool: &DbPool, username: &str, role: &str) -> i64 {
    let conn = pool.get().expect("Failed to get connection");
    conn.execute(
        "INSERT INTO users (username, email, role, is_active) VALUES (?, ?, ?, 1)",
        rusqlite::params![username, format!("{}@example.com", username), role],
    )
    .expect("Failed to insert test user");
    conn.last_insert_rowid()
}

/// Test fixture: Create a gallery, optionally protected by `password`
pub fn create_test_gallery(
    pool: &DbPool,
    owner_id: i64,
    is_public: bool,
    password: Option<&str>,
) -> i64 {
    let hash = password.map(|p| hash_password(p).expect("Failed to hash password"));
    let conn = pool.get().expect("Failed to get connection");
    conn.execute(
        "INSERT INTO galleries (owner_id, title, is_public, password_hash) VALUES (?, ?, ?, ?)",
        rusqlite::params![owner_id, "Test Gallery", is_public, hash],
    )
    .expect("Failed to insert test gallery");
    conn.last_insert_rowid()
}

/// Test fixture: Create a photo row whose original lives at `{gallery}/original/{file_id}.jpg`
pub fn create_test_photo(pool: &DbPool, gallery_id: i64, filename: &str, order_index: i64) -> Photo {
    let file_id = uuid::Uuid::new_v4().simple().to_string();
    let original_key = format!("{}/original/{}.jpg", gallery_id, file_id);
    let conn = pool.get().expect("Failed to get connection");
    conn.execute(
        "INSERT INTO photos (gallery_id, file_id, filename, extension, original_key, order_index)
         VALUES (?, ?, ?, 'jpg', ?, ?)",
        rusqlite::params![gallery_id, file_id, filename, original_key, order_index],
    )
    .expect("Failed to insert test photo");
    let id = conn.last_insert_rowid();

    let mut photo = photo_fixture(gallery_id, &file_id, filename);
    photo.id = id;
    photo.order_index = order_index;
    photo
}

pub fn set_download_limit(pool: &DbPool, gallery_id: i64, limit: Option<i64>) {
    let conn = pool.get().expect("Failed to get connection");
    conn.execute(
        "UPDATE galleries SET download_limit = ? WHERE id = ?",
        rusqlite::params![limit, gallery_id],
    )
    .expect("Failed to set download limit");
}

/// A photo that exists only in memory.
pub fn photo_fixture(gallery_id: i64, file_id: &str, filename: &str) -> Photo {
    Photo {
        id: 1,
        gallery_id,
        file_id: Some(file_id.to_string()),
        filename: filename.to_string(),
        extension: "jpg".to_string(),
        original_key: format!("{}/original/{}.jpg", gallery_id, file_id),
        preview_key: None,
        thumb_key: None,
        width: None,
        height: None,
        order_index: 0,
        is_cover: false,
        created_at: "2024-01-15 10:30:00".to_string(),
    }
}

/// `LocalStorage` that counts object writes and can be told to refuse them.
pub struct CountingStorage {
    inner: LocalStorage,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl CountingStorage {
    /// Links are signed with the default config secret, matching `create_test_app`.
    pub fn new(root: PathBuf) -> Self {
        Self {
            inner: LocalStorage::new(
                root,
                "/media".to_string(),
                Config::default().security.secret_key,
            ),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self, key: &str) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::StorageWrite(format!("{}: writes disabled", key)));
        }
        Ok(())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for CountingStorage {
    fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    async fn save(&self, reader: BoxedReader, key: &str) -> AppResult<String> {
        self.check_writable(key)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.save(reader, key).await
    }

    async fn write_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<()> {
        self.check_writable(key)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_bytes(key, bytes, content_type).await
    }

    async fn size(&self, key: &str) -> AppResult<Option<u64>> {
        self.inner.size(key).await
    }

    async fn read_bytes(&self, key: &str) -> AppResult<Vec<u8>> {
        self.inner.read_bytes(key).await
    }

    async fn open_reader(&self, key: &str) -> AppResult<BoxedReader> {
        self.inner.open_reader(key).await
    }

    async fn download_to_local_path(&self, key: &str, destination: &Path) -> AppResult<()> {
        self.inner.download_to_local_path(key, destination).await
    }

    async fn delete(&self, key: &str) {
        self.inner.delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) {
        self.inner.delete_prefix(prefix).await
    }

    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        content_disposition: Option<&str>,
    ) -> AppResult<String> {
        self.inner.signed_url(key, ttl, content_disposition).await
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.inner.local_path(key)
    }
}

/// Counting storage rooted in a fresh temp dir; keep the `TempDir` alive for the test.
pub fn test_storage() -> (TempDir, Arc<CountingStorage>) {
    let dir = tempfile::tempdir().expect("Failed to create temp media root");
    let storage = Arc::new(CountingStorage::new(dir.path().to_path_buf()));
    (dir, storage)
}

/// Dark diagonal gradient, so a white mark is always visible on top of it.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 160 / width.max(1)) as u8;
        let g = (y * 160 / height.max(1)) as u8;
        let b = ((x + y) * 80 / (width + height).max(1)) as u8;
        Rgb([r, g, b])
    });
    DynamicImage::ImageRgb8(image)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient_image(width, height)
        .write_to(&mut out, ImageFormat::Jpeg)
        .expect("Failed to encode test jpeg");
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    solid_logo(width, height, [255, 255, 255, 200])
        .write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode test png");
    out.into_inner()
}

pub fn solid_logo(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

/// A router wired to scratch database and media root.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storage: Arc<CountingStorage>,
    _media: TempDir,
}

impl TestApp {
    pub fn pool(&self) -> &DbPool {
        &self.state.pool
    }

    pub fn bearer(&self, user_id: i64, role: &str) -> String {
        let token = create_access_token(user_id, "tester", role, &self.state.config)
            .expect("Failed to create access token");
        format!("Bearer {}", token)
    }
}

/// Create a test app without a derivative worker pool.
pub fn create_test_app() -> TestApp {
    let pool = create_test_db();
    let (media, storage) = test_storage();
    let config = Arc::new(Config::default());
    let shared: SharedStorage = storage.clone();
    let resolver = Arc::new(DerivativeResolver::new(
        shared.clone(),
        DerivativeConfig::default(),
    ));
    let state = AppState {
        config,
        pool,
        storage: shared,
        resolver,
        queue: None,
    };
    TestApp {
        router: create_app(state.clone()),
        state,
        storage,
        _media: media,
    }
}
