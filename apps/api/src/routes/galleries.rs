use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::{open_gallery, quota_policy};
use crate::access::cookie::build_gallery_cookie;
use crate::access::quota::quota_status;
use crate::access::{load_gallery, require_owner, reset_quota};
use crate::auth::jwt::create_gallery_token;
use crate::auth::password::{hash_password, verify_and_migrate};
use crate::auth::{AppState, CurrentUser, OptionalUser, RequireInternal};
use crate::database::{execute_query, fetch_one, insert_returning_id, queries};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateGalleryRequest, Gallery, GalleryAccessResponse, GalleryResponse,
    PasswordStatusResponse, QuotaStatusResponse, SetPasswordRequest, UnlockRequest,
};
use crate::processor::{delete_gallery, WorkerStats};
use crate::utils::datetime::{format_datetime, parse_datetime};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/galleries", post(create_gallery))
        .route("/galleries/:gallery_id", get(get_gallery).delete(remove_gallery))
        .route("/galleries/:gallery_id/unlock", post(unlock_gallery))
        .route("/galleries/:gallery_id/password", put(set_password))
        .route("/galleries/:gallery_id/quota", get(get_quota))
        .route("/galleries/:gallery_id/quota/reset", post(reset_gallery_quota))
        .route("/studio/derivatives", get(derivative_stats))
}

async fn create_gallery(
    State(state): State<AppState>,
    RequireInternal(user): RequireInternal,
    Json(request): Json<CreateGalleryRequest>,
) -> AppResult<(StatusCode, Json<GalleryResponse>)> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if request.download_limit.map(|l| l < 0).unwrap_or(false) || request.favorites_limit < 0 {
        return Err(AppError::Validation("Limits cannot be negative".to_string()));
    }

    let conn = state.pool.get()?;
    let gallery_id = insert_returning_id(
        &conn,
        queries::galleries::INSERT,
        &[
            &user.id,
            &title,
            &request.description,
            &request.is_public,
            &request.download_limit,
            &request.favorites_limit,
        ],
    )?;
    let gallery = fetch_one(&conn, queries::galleries::SELECT_BY_ID, &[&gallery_id], Gallery::from_row)?
        .ok_or_else(|| AppError::Internal(format!("Gallery {} vanished after insert", gallery_id)))?;

    info!("User {} created gallery {}", user.id, gallery_id);
    Ok((StatusCode::CREATED, Json(GalleryResponse::from(&gallery))))
}

async fn get_gallery(
    State(state): State<AppState>,
    user: OptionalUser,
    Path(gallery_id): Path<i64>,
    jar: CookieJar,
) -> AppResult<Json<GalleryResponse>> {
    let open = open_gallery(&state, gallery_id, user, &jar)?;
    Ok(Json(GalleryResponse::from(&open.gallery)))
}

async fn remove_gallery(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(gallery_id): Path<i64>,
) -> AppResult<StatusCode> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;
    delete_gallery(&state.pool, state.storage.as_ref(), gallery_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unlock_gallery(
    State(state): State<AppState>,
    Path(gallery_id): Path<i64>,
    Json(request): Json<UnlockRequest>,
) -> AppResult<Response> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    let hash = gallery
        .password_hash
        .clone()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::BadRequest("Gallery is not password protected".to_string()))?;

    if gallery.password_expired(Utc::now()) {
        return Err(AppError::Authentication("Gallery access has expired".to_string()));
    }

    let password = request.password;
    let (valid, migrated) = tokio::task::spawn_blocking(move || verify_and_migrate(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password check failed: {}", e)))?;

    if !valid {
        warn!("Failed unlock attempt for gallery {}", gallery_id);
        return Err(AppError::Authentication("Invalid password".to_string()));
    }

    if let Some(new_hash) = migrated {
        let conn = state.pool.get()?;
        execute_query(
            &conn,
            queries::galleries::UPDATE_PASSWORD,
            &[&new_hash, &gallery.password_expires_at, &gallery_id],
        )?;
        info!("Upgraded legacy password hash for gallery {}", gallery_id);
    }

    let (token, expires_in) = create_gallery_token(gallery_id, &state.config)?;
    let cookie = build_gallery_cookie(gallery_id, &token, expires_in, &state.config);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(GalleryAccessResponse {
            gallery_id,
            expires_in,
        }),
    )
        .into_response())
}

async fn set_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(gallery_id): Path<i64>,
    Json(request): Json<SetPasswordRequest>,
) -> AppResult<Json<PasswordStatusResponse>> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;

    let expires_at = match request.expires_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let at = parse_datetime(raw)
                .ok_or_else(|| AppError::Validation(format!("Invalid expiry timestamp: {}", raw)))?;
            Some(format_datetime(&at))
        }
        None => None,
    };

    let hash = match request.password {
        Some(password) if password.is_empty() => None,
        Some(password) => Some(
            tokio::task::spawn_blocking(move || hash_password(&password))
                .await
                .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))??,
        ),
        None => gallery.password_hash.clone().filter(|h| !h.is_empty()),
    };
    let expires_at = hash.as_ref().and(expires_at);

    let conn = state.pool.get()?;
    execute_query(
        &conn,
        queries::galleries::UPDATE_PASSWORD,
        &[&hash, &expires_at, &gallery_id],
    )?;

    info!(
        "Password for gallery {} {}",
        gallery_id,
        if hash.is_some() { "set" } else { "cleared" }
    );
    Ok(Json(PasswordStatusResponse {
        has_password: hash.is_some(),
        expires_at,
    }))
}

async fn get_quota(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(gallery_id): Path<i64>,
) -> AppResult<Json<QuotaStatusResponse>> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;
    let status = quota_status(&state.pool, gallery_id, quota_policy(&state.config), Utc::now())?;
    Ok(Json(status))
}

async fn reset_gallery_quota(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(gallery_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;
    reset_quota(&state.pool, gallery_id)?;
    Ok(Json(json!({ "galleryId": gallery_id, "downloadCount": 0 })))
}

async fn derivative_stats(
    State(state): State<AppState>,
    RequireInternal(_user): RequireInternal,
) -> AppResult<Json<Option<WorkerStats>>> {
    Ok(Json(state.queue.as_ref().map(|q| q.stats())))
}
