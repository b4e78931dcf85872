use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Photo {
    pub id: i64,
    pub gallery_id: i64,
    pub file_id: Option<String>,
    pub filename: String,
    pub extension: String,
    pub original_key: String,
    pub preview_key: Option<String>,
    pub thumb_key: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub order_index: i64,
    pub is_cover: bool,
    pub created_at: String,
}

impl Photo {
    /// Maps a row selected with the column order used in `queries::photos`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Photo {
            id: row.get(0)?,
            gallery_id: row.get(1)?,
            file_id: row.get(2)?,
            filename: row.get(3)?,
            extension: row.get(4)?,
            original_key: row.get(5)?,
            preview_key: row.get(6)?,
            thumb_key: row.get(7)?,
            width: row.get(8)?,
            height: row.get(9)?,
            order_index: row.get(10)?,
            is_cover: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    /// Identifier used in cache keys: the upload file id, or the row id for legacy rows.
    pub fn stable_id(&self) -> String {
        match self.file_id.as_deref() {
            Some(file_id) if !file_id.is_empty() => file_id.to_string(),
            _ => self.id.to_string(),
        }
    }

    pub fn base_name(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("photo-{}", self.id))
    }

    pub fn original_extension(&self) -> String {
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() {
            "jpg".to_string()
        } else {
            ext.to_ascii_lowercase()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoResponse {
    pub id: i64,
    pub gallery_id: i64,
    pub filename: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub order_index: i64,
    pub is_cover: bool,
    pub thumb_url: String,
    pub preview_url: String,
    pub created_at: String,
}

impl PhotoResponse {
    pub fn from_photo(photo: &Photo) -> Self {
        let base = format!("/api/galleries/{}/photos/{}", photo.gallery_id, photo.id);
        PhotoResponse {
            id: photo.id,
            gallery_id: photo.gallery_id,
            filename: photo.filename.clone(),
            width: photo.width,
            height: photo.height,
            order_index: photo.order_index,
            is_cover: photo.is_cover,
            thumb_url: format!("{}/thumb", base),
            preview_url: format!("{}/preview", base),
            created_at: photo.created_at.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoListResponse {
    pub photos: Vec<PhotoResponse>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: i64,
    pub file_id: String,
    pub filename: String,
    pub queued: bool,
}
