use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesResponse {
    pub photo_ids: Vec<i64>,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggleResponse {
    pub photo_id: i64,
    pub favorited: bool,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct FavoritesLimitRequest {
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct FavoriteExportRow {
    pub photo_id: i64,
    pub filename: String,
    pub selector: String,
    pub created_at: String,
}
