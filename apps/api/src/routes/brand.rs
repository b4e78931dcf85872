use axum::{
    body::Body,
    extract::{Query, State},
    routing::{get, put},
    Json, Router,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use crate::auth::{AppState, RequireInternal};
use crate::brand::{get_settings, update_settings, upload_logo};
use crate::error::AppResult;
use crate::models::{BrandSettings, UploadQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/brand", get(get_brand).put(put_brand))
        .route("/brand/logo", put(put_logo))
}

async fn get_brand(
    State(state): State<AppState>,
    RequireInternal(user): RequireInternal,
) -> AppResult<Json<BrandSettings>> {
    let conn = state.pool.get()?;
    Ok(Json(get_settings(&conn, user.id)?))
}

async fn put_brand(
    State(state): State<AppState>,
    RequireInternal(user): RequireInternal,
    Json(settings): Json<BrandSettings>,
) -> AppResult<Json<BrandSettings>> {
    let saved = update_settings(&state.pool, state.storage.as_ref(), user.id, settings).await?;
    Ok(Json(saved))
}

async fn put_logo(
    State(state): State<AppState>,
    RequireInternal(user): RequireInternal,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> AppResult<Json<BrandSettings>> {
    let stream = body
        .into_data_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let saved = upload_logo(
        &state.pool,
        state.storage.as_ref(),
        user.id,
        &query.filename,
        Box::pin(StreamReader::new(stream)),
    )
    .await?;
    Ok(Json(saved))
}
