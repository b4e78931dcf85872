use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use axum_extra::extract::CookieJar;

use super::{open_gallery, OpenGallery};
use crate::access::favorites::{
    add_favorite, export_csv, export_rows, list_favorites, remove_favorite, selector_for,
    set_favorites_limit,
};
use crate::access::{load_gallery, require_owner};
use crate::auth::{AppState, CurrentUser, OptionalUser};
use crate::error::AppResult;
use crate::models::{FavoriteToggleResponse, FavoritesLimitRequest, FavoritesResponse};
use crate::storage::content_disposition_attachment;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/galleries/:gallery_id/favorites", get(get_favorites))
        .route(
            "/galleries/:gallery_id/favorites/limit",
            put(update_limit),
        )
        .route(
            "/galleries/:gallery_id/favorites/export.csv",
            get(export_favorites),
        )
        .route(
            "/galleries/:gallery_id/favorites/:photo_id",
            put(favorite_photo).delete(unfavorite_photo),
        )
}

fn selector(open: &OpenGallery) -> String {
    selector_for(open.user.as_ref(), open.access_cookie.as_deref())
}

async fn get_favorites(
    State(state): State<AppState>,
    user: OptionalUser,
    Path(gallery_id): Path<i64>,
    jar: CookieJar,
) -> AppResult<Json<FavoritesResponse>> {
    let open = open_gallery(&state, gallery_id, user, &jar)?;
    let response = list_favorites(
        &state.pool,
        &open.gallery,
        &selector(&open),
        state.config.favorites.default_limit,
    )?;
    Ok(Json(response))
}

async fn favorite_photo(
    State(state): State<AppState>,
    user: OptionalUser,
    Path((gallery_id, photo_id)): Path<(i64, i64)>,
    jar: CookieJar,
) -> AppResult<Json<FavoriteToggleResponse>> {
    let open = open_gallery(&state, gallery_id, user, &jar)?;
    let response = add_favorite(
        &state.pool,
        &open.gallery,
        photo_id,
        &selector(&open),
        state.config.favorites.default_limit,
    )?;
    Ok(Json(response))
}

async fn unfavorite_photo(
    State(state): State<AppState>,
    user: OptionalUser,
    Path((gallery_id, photo_id)): Path<(i64, i64)>,
    jar: CookieJar,
) -> AppResult<Json<FavoriteToggleResponse>> {
    let open = open_gallery(&state, gallery_id, user, &jar)?;
    let response = remove_favorite(&state.pool, gallery_id, photo_id, &selector(&open))?;
    Ok(Json(response))
}

async fn update_limit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(gallery_id): Path<i64>,
    Json(request): Json<FavoritesLimitRequest>,
) -> AppResult<Json<FavoritesResponse>> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;
    set_favorites_limit(&state.pool, gallery_id, request.limit)?;

    let gallery = load_gallery(&state.pool, gallery_id)?;
    let response = list_favorites(
        &state.pool,
        &gallery,
        &selector_for(Some(&user), None),
        state.config.favorites.default_limit,
    )?;
    Ok(Json(response))
}

async fn export_favorites(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(gallery_id): Path<i64>,
) -> AppResult<Response> {
    let gallery = load_gallery(&state.pool, gallery_id)?;
    require_owner(&gallery, &user)?;

    let csv = export_csv(&export_rows(&state.pool, gallery_id)?);
    let filename = format!("gallery-{}-favorites.csv", gallery_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition_attachment(&filename)),
        ],
        csv,
    )
        .into_response())
}
