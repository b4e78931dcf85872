use crate::constants::{
    DEFAULT_DOWNLOAD_QUALITY, DEFAULT_FAVORITES_LIMIT, DEFAULT_GALLERY_TOKEN_MINUTES,
    DEFAULT_LARGE_EDGE, DEFAULT_MEDIUM_EDGE, DEFAULT_PREVIEW_BOX, DEFAULT_PREVIEW_QUALITY,
    DEFAULT_QUOTA_WINDOW_SECONDS, DEFAULT_SIGNED_URL_SECONDS, DEFAULT_THUMB_BOX,
    DEFAULT_THUMB_QUALITY, DEFAULT_WEB_EDGE, MEDIA_ROOT, WATERMARK_MIN_MARK_PX,
    WATERMARK_PADDING_FRACTION,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    #[serde(default = "default_access_token_expire_minutes")]
    pub access_token_expire_minutes: i64,
    #[serde(default = "default_gallery_token_expire_minutes")]
    pub gallery_token_expire_minutes: i64,
}

fn default_secret_key() -> String {
    "change-me-in-production-use-openssl-rand-hex-32".to_string()
}

fn default_access_token_expire_minutes() -> i64 {
    30
}

fn default_gallery_token_expire_minutes() -> i64 {
    DEFAULT_GALLERY_TOKEN_MINUTES
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            access_token_expire_minutes: default_access_token_expire_minutes(),
            gallery_token_expire_minutes: default_gallery_token_expire_minutes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_media_url_prefix")]
    pub media_url_prefix: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_signed_url_seconds")]
    pub signed_url_seconds: u64,
    /// Upper bound for a single object storage call.
    #[serde(default = "default_operation_timeout_seconds")]
    pub operation_timeout_seconds: u64,
}

fn default_media_root() -> PathBuf {
    MEDIA_ROOT.clone()
}

fn default_media_url_prefix() -> String {
    "/media".to_string()
}

fn default_signed_url_seconds() -> u64 {
    DEFAULT_SIGNED_URL_SECONDS
}

fn default_operation_timeout_seconds() -> u64 {
    60
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            media_root: default_media_root(),
            media_url_prefix: default_media_url_prefix(),
            bucket: String::new(),
            endpoint_url: None,
            region: None,
            signed_url_seconds: default_signed_url_seconds(),
            operation_timeout_seconds: default_operation_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeConfig {
    #[serde(default = "default_thumb_box")]
    pub thumb_box: u32,
    #[serde(default = "default_preview_box")]
    pub preview_box: u32,
    #[serde(default = "default_large_edge")]
    pub large_edge: u32,
    #[serde(default = "default_medium_edge")]
    pub medium_edge: u32,
    #[serde(default = "default_web_edge")]
    pub web_edge: u32,
    #[serde(default = "default_thumb_quality")]
    pub thumb_quality: u8,
    #[serde(default = "default_preview_quality")]
    pub preview_quality: u8,
    #[serde(default = "default_download_quality")]
    pub download_quality: u8,
    #[serde(default = "default_min_mark_px")]
    pub min_mark_px: u32,
    #[serde(default = "default_padding_fraction")]
    pub padding_fraction: f32,
}

fn default_thumb_box() -> u32 {
    DEFAULT_THUMB_BOX
}

fn default_preview_box() -> u32 {
    DEFAULT_PREVIEW_BOX
}

fn default_large_edge() -> u32 {
    DEFAULT_LARGE_EDGE
}

fn default_medium_edge() -> u32 {
    DEFAULT_MEDIUM_EDGE
}

fn default_web_edge() -> u32 {
    DEFAULT_WEB_EDGE
}

fn default_thumb_quality() -> u8 {
    DEFAULT_THUMB_QUALITY
}

fn default_preview_quality() -> u8 {
    DEFAULT_PREVIEW_QUALITY
}

fn default_download_quality() -> u8 {
    DEFAULT_DOWNLOAD_QUALITY
}

fn default_min_mark_px() -> u32 {
    WATERMARK_MIN_MARK_PX
}

fn default_padding_fraction() -> f32 {
    WATERMARK_PADDING_FRACTION
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            thumb_box: default_thumb_box(),
            preview_box: default_preview_box(),
            large_edge: default_large_edge(),
            medium_edge: default_medium_edge(),
            web_edge: default_web_edge(),
            thumb_quality: default_thumb_quality(),
            preview_quality: default_preview_quality(),
            download_quality: default_download_quality(),
            min_mark_px: default_min_mark_px(),
            padding_fraction: default_padding_fraction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    /// Applied to galleries without their own limit; `None` means unlimited.
    #[serde(default)]
    pub default_download_limit: Option<i64>,
}

fn default_window_seconds() -> i64 {
    DEFAULT_QUOTA_WINDOW_SECONDS
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            default_download_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoritesConfig {
    #[serde(default = "default_favorites_limit")]
    pub default_limit: i64,
}

fn default_favorites_limit() -> i64 {
    DEFAULT_FAVORITES_LIMIT
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        Self {
            default_limit: default_favorites_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub num_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_worker_count(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub derivatives: DerivativeConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub favorites: FavoritesConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }
}

pub fn load_config(config_path: &Path) -> Config {
    if !config_path.exists() {
        return Config::default();
    }

    match fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

pub fn save_default_config(config_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).map_err(|e| std::io::Error::other(e.to_string()))?;
    fs::write(config_path, yaml)
}
