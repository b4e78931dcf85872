use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::delivery::{deliver, streamed_attachment, Delivery};
use super::{open_gallery, quota_policy, signed_url_ttl};
use crate::access::reserve_downloads;
use crate::auth::{AppState, OptionalUser};
use crate::brand::load_snapshot;
use crate::database::{fetch_all, queries};
use crate::error::{AppError, AppResult};
use crate::models::{ArchiveDownloadQuery, ArchiveMode, Photo, Variant};
use crate::processor::archive::archive_filename;
use crate::processor::{ensure_cached_archive, stream_archive};
use crate::storage::BackendKind;

pub fn router() -> Router<AppState> {
    Router::new().route("/galleries/:gallery_id/download", get(download_gallery))
}

async fn download_gallery(
    State(state): State<AppState>,
    user: OptionalUser,
    Path(gallery_id): Path<i64>,
    Query(query): Query<ArchiveDownloadQuery>,
    jar: CookieJar,
) -> AppResult<Response> {
    let variant = Variant::from_download_size(query.size.as_deref().unwrap_or("original"))?;
    let open = open_gallery(&state, gallery_id, user, &jar)?;

    let mode = query.mode.unwrap_or(match state.storage.backend() {
        BackendKind::Remote => ArchiveMode::Cached,
        BackendKind::Local => ArchiveMode::Stream,
    });
    if mode == ArchiveMode::Stream && query.link_only {
        return Err(AppError::BadRequest(
            "A link is only available for cached archives".to_string(),
        ));
    }

    open.check_quota(&state)?;

    let photos = {
        let conn = state.pool.get()?;
        fetch_all(&conn, queries::photos::SELECT_FOR_GALLERY, &[&gallery_id], Photo::from_row)?
    };
    if photos.is_empty() {
        return Err(AppError::NotFound("Gallery has no photos".to_string()));
    }

    let snapshot = load_snapshot(&state.pool, state.storage.as_ref(), open.gallery.owner_id).await?;
    let filename = archive_filename(gallery_id, variant);

    // quota is reserved once the archive is known to have content
    let reserve = || -> AppResult<()> {
        if !open.bypasses_quota() {
            reserve_downloads(&state.pool, gallery_id, 1, quota_policy(&state.config), Utc::now())?;
        }
        Ok(())
    };

    match mode {
        ArchiveMode::Stream => {
            let body = stream_archive(Arc::clone(&state.resolver), photos, variant, snapshot).await?;
            reserve()?;
            info!("Streaming {} archive of gallery {}", variant, gallery_id);
            streamed_attachment(body, &filename)
        }
        ArchiveMode::Cached => {
            let key = ensure_cached_archive(
                &state.resolver,
                gallery_id,
                &photos,
                variant,
                &snapshot,
                query.rebuild,
            )
            .await?;
            reserve()?;
            deliver(
                state.storage.as_ref(),
                Delivery {
                    key: &key,
                    filename: Some(&filename),
                    link_only: query.link_only,
                    ttl: signed_url_ttl(&state.config),
                },
            )
            .await
        }
    }
}
