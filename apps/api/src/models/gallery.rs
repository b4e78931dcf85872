use crate::utils::datetime::parse_datetime;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Gallery {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub password_hash: Option<String>,
    pub password_expires_at: Option<String>,
    pub download_count: i64,
    pub download_limit: Option<i64>,
    pub download_reset_at: Option<String>,
    pub favorites_limit: i64,
    pub created_at: String,
}

impl Gallery {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Gallery {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            is_public: row.get(4)?,
            password_hash: row.get(5)?,
            password_expires_at: row.get(6)?,
            download_count: row.get(7)?,
            download_limit: row.get(8)?,
            download_reset_at: row.get(9)?,
            favorites_limit: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    pub fn has_password(&self) -> bool {
        self.password_hash
            .as_deref()
            .map(|h| !h.is_empty())
            .unwrap_or(false)
    }

    /// True when a password expiry is set and has passed. Unparseable timestamps count as expired.
    pub fn password_expired(&self, now: DateTime<Utc>) -> bool {
        match self.password_expires_at.as_deref() {
            None | Some("") => false,
            Some(raw) => parse_datetime(raw).map(|at| at <= now).unwrap_or(true),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGalleryRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub download_limit: Option<i64>,
    #[serde(default)]
    pub favorites_limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub has_password: bool,
    pub password_expires_at: Option<String>,
    pub download_limit: Option<i64>,
    pub favorites_limit: i64,
    pub created_at: String,
}

impl From<&Gallery> for GalleryResponse {
    fn from(gallery: &Gallery) -> Self {
        GalleryResponse {
            id: gallery.id,
            title: gallery.title.clone(),
            description: gallery.description.clone(),
            is_public: gallery.is_public,
            has_password: gallery.has_password(),
            password_expires_at: gallery.password_expires_at.clone(),
            download_limit: gallery.download_limit,
            favorites_limit: gallery.favorites_limit,
            created_at: gallery.created_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryAccessResponse {
    pub gallery_id: i64,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    /// `None` keeps the current password, an empty string clears it.
    pub password: Option<String>,
    /// Replaces any previous expiry; `None` removes it.
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStatusResponse {
    pub has_password: bool,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatusResponse {
    pub download_count: i64,
    pub download_limit: Option<i64>,
    pub reset_at: Option<String>,
}
