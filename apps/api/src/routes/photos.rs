use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use axum_extra::extract::CookieJar;
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::delivery::{deliver, Delivery};
use super::{open_gallery, quota_policy, signed_url_ttl};
use crate::access::{load_gallery, require_owner, reserve_downloads};
use crate::auth::{AppState, CurrentUser, OptionalUser};
use crate::brand::load_snapshot;
use crate::database::{execute_query, fetch_all, fetch_one, queries, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{
    Photo, PhotoDownloadQuery, PhotoListResponse, PhotoResponse, UploadQuery, UploadResponse,
    Variant,
};
use crate::processor::archive::entry_name;
use crate::processor::{delete_photo, ingest_original, ResolvedAsset};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/galleries/:gallery_id/photos",
            get(list_photos).post(upload_photo),
        )
        .route(
            "/galleries/:gallery_id/photos/:photo_id",
            get(download_photo).delete(remove_photo),
        )
        .route("/galleries/:gallery_id/photos/:photo_id/thumb", get(get_thumb))
        .route("/galleries/:gallery_id/photos/:photo_id/preview", get(get_preview))
}

fn load_photo(pool: &DbPool, gallery_id: i64, photo_id: i64) -> AppResult<Photo> {
    let conn = pool.get()?;
    fetch_one(
        &conn,
        queries::photos::SELECT_BY_ID_IN_GALLERY,
        &[&photo_id, &gallery_id],
        Photo::from_row,
    )?
    .ok_or_else(|| AppError::NotFound(format!("Photo {} not found", photo_id)))
}

/// Persists a lazily generated thumb/preview key and first-seen dimensions.
fn record_derivative(pool: &DbPool, photo: &Photo, variant: Variant, resolved: &ResolvedAsset) -> AppResult<()> {
    let conn = pool.get()?;
    let (thumb, preview) = match variant {
        Variant::Thumb if photo.thumb_key.as_deref() != Some(resolved.key.as_str()) => (Some(&resolved.key), None),
        Variant::Preview if photo.preview_key.as_deref() != Some(resolved.key.as_str()) => (None, Some(&resolved.key)),
        _ => (None, None),
    };
    if thumb.is_some() || preview.is_some() {
        let none: Option<u32> = None;
        execute_query(
            &conn,
            queries::photos::UPDATE_DERIVATIVES,
            &[&thumb, &preview, &none, &none, &photo.id],
        )?;
    }
    if let Some((width, height)) = resolved.source_dimensions {
        execute_query(
            &conn,
            queries::photos::UPDATE_DIMENSIONS_IF_MISSING,
            &[&width, &height, &photo.id],
        )?;
    }
    Ok(())
}

async fn list_photos(
    State(state): State<AppState>,
    user: OptionalUser,
    Path(gallery_id): Path<i64>,
    jar: CookieJar,
) -> AppResult<Json<PhotoListResponse>> {
    let open = open_gallery(&state, gallery_id, user, &jar)?;
    let conn = state.pool.get()?;
    let photos = fetch_all(
        &conn,
        queries::photos::SELECT_FOR_GALLERY,
        &[&open.gallery.id],
        Photo::from_row,
    )?;
    Ok(Json(PhotoListResponse {
        photos: photos.iter().map(PhotoResponse::from_photo).collect(),
    }))
}

async fn upload_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(gallery_id): Path<i64>,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;

    let stream = body
        .into_data_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let reader = StreamReader::new(stream);

    let photo = ingest_original(
        &state.pool,
        state.storage.as_ref(),
        state.queue.as_ref(),
        gallery_id,
        &query.filename,
        Box::pin(reader),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: photo.id,
            file_id: photo.stable_id(),
            filename: photo.filename,
            queued: state.queue.is_some(),
        }),
    ))
}

async fn remove_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((gallery_id, photo_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;
    delete_photo(&state.pool, state.storage.as_ref(), gallery_id, photo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn serve_display_variant(
    state: AppState,
    user: OptionalUser,
    jar: CookieJar,
    gallery_id: i64,
    photo_id: i64,
    variant: Variant,
) -> AppResult<Response> {
    let open = open_gallery(&state, gallery_id, user, &jar)?;
    let photo = load_photo(&state.pool, gallery_id, photo_id)?;
    let snapshot = load_snapshot(&state.pool, state.storage.as_ref(), open.gallery.owner_id).await?;

    let resolved = state.resolver.resolve_variant(&photo, variant, &snapshot).await?;
    if let Err(e) = record_derivative(&state.pool, &photo, variant, &resolved) {
        debug!("Could not record {} for photo {}: {}", variant, photo.id, e);
    }

    deliver(
        state.storage.as_ref(),
        Delivery {
            key: &resolved.key,
            filename: None,
            link_only: false,
            ttl: signed_url_ttl(&state.config),
        },
    )
    .await
}

async fn get_thumb(
    State(state): State<AppState>,
    user: OptionalUser,
    Path((gallery_id, photo_id)): Path<(i64, i64)>,
    jar: CookieJar,
) -> AppResult<Response> {
    serve_display_variant(state, user, jar, gallery_id, photo_id, Variant::Thumb).await
}

async fn get_preview(
    State(state): State<AppState>,
    user: OptionalUser,
    Path((gallery_id, photo_id)): Path<(i64, i64)>,
    jar: CookieJar,
) -> AppResult<Response> {
    serve_display_variant(state, user, jar, gallery_id, photo_id, Variant::Preview).await
}

async fn download_photo(
    State(state): State<AppState>,
    user: OptionalUser,
    Path((gallery_id, photo_id)): Path<(i64, i64)>,
    Query(query): Query<PhotoDownloadQuery>,
    jar: CookieJar,
) -> AppResult<Response> {
    let variant = Variant::from_download_size(query.size.as_deref().unwrap_or("original"))?;
    let open = open_gallery(&state, gallery_id, user, &jar)?;
    let photo = load_photo(&state.pool, gallery_id, photo_id)?;
    open.check_quota(&state)?;
    let snapshot = load_snapshot(&state.pool, state.storage.as_ref(), open.gallery.owner_id).await?;

    let resolved = state.resolver.resolve_variant(&photo, variant, &snapshot).await?;
    debug!("Photo {} {} download granted via {:?}", photo.id, variant, open.grant);

    if !open.bypasses_quota() {
        reserve_downloads(
            &state.pool,
            gallery_id,
            1,
            quota_policy(&state.config),
            chrono::Utc::now(),
        )?;
    }

    let filename = entry_name(&photo, variant, &resolved.key);
    deliver(
        state.storage.as_ref(),
        Delivery {
            key: &resolved.key,
            filename: Some(&filename),
            link_only: query.link_only,
            ttl: signed_url_ttl(&state.config),
        },
    )
    .await
}
