use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::PathBuf;

pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("STUDIO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/data"))
});

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("config.yaml"));
pub static DATABASE_PATH: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("database.sqlite"));
pub static MEDIA_ROOT: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("media"));

pub static IMAGE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"]
        .into_iter()
        .collect()
});

pub const DEFAULT_THUMB_BOX: u32 = 320;
pub const DEFAULT_PREVIEW_BOX: u32 = 1280;
pub const DEFAULT_LARGE_EDGE: u32 = 2048;
pub const DEFAULT_MEDIUM_EDGE: u32 = 1200;
pub const DEFAULT_WEB_EDGE: u32 = 1024;
pub const DEFAULT_THUMB_QUALITY: u8 = 85;
pub const DEFAULT_PREVIEW_QUALITY: u8 = 90;
pub const DEFAULT_DOWNLOAD_QUALITY: u8 = 90;

pub const WATERMARK_MIN_MARK_PX: u32 = 64;
pub const WATERMARK_PADDING_FRACTION: f32 = 0.02;

pub const DEFAULT_GALLERY_TOKEN_MINUTES: i64 = 60;
pub const DEFAULT_SIGNED_URL_SECONDS: u64 = 3600;
pub const DEFAULT_QUOTA_WINDOW_SECONDS: i64 = 24 * 3600;
pub const DEFAULT_FAVORITES_LIMIT: i64 = 50;

pub const GALLERY_COOKIE_PREFIX: &str = "gallery_access_";
