//! The single place that decides how stored bytes reach a client.
//!
//! Remote backends answer with a redirect to a signed URL. Local disks stream
//! the file directly. `link_only` returns the URL as JSON on either backend.
//! Local links only open through [`media_router`], which checks their `sig` token.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::auth::jwt::verify_media_link_token;
use crate::auth::AppState;
use crate::error::{AppError, AppResult};
use crate::models::DownloadLinkResponse;
use crate::storage::{content_disposition_attachment, guess_content_type, BackendKind, Storage};

pub struct Delivery<'a> {
    pub key: &'a str,
    /// Set for downloads; triggers `Content-Disposition: attachment`.
    pub filename: Option<&'a str>,
    pub link_only: bool,
    pub ttl: Duration,
}

pub async fn deliver(storage: &dyn Storage, delivery: Delivery<'_>) -> AppResult<Response> {
    let disposition = delivery.filename.map(content_disposition_attachment);

    if delivery.link_only {
        let url = storage
            .signed_url(delivery.key, delivery.ttl, disposition.as_deref())
            .await?;
        let filename = delivery
            .filename
            .map(str::to_string)
            .unwrap_or_else(|| key_basename(delivery.key));
        return Ok(Json(DownloadLinkResponse { url, filename }).into_response());
    }

    match (storage.backend(), storage.local_path(delivery.key)) {
        (BackendKind::Local, Some(path)) => {
            serve_file(path, &guess_content_type(delivery.key), disposition.as_deref()).await
        }
        _ => {
            let url = storage
                .signed_url(delivery.key, delivery.ttl, disposition.as_deref())
                .await?;
            Ok(Redirect::temporary(&url).into_response())
        }
    }
}

pub async fn serve_file(
    path: PathBuf,
    content_type: &str,
    disposition: Option<&str>,
) -> AppResult<Response> {
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found".to_string()))
        }
        Err(e) => return Err(AppError::StorageRead(e.to_string())),
    };
    let length = file.metadata().await?.len();
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, length);

    if let Some(value) = disposition {
        response = response.header(header::CONTENT_DISPOSITION, value);
    }

    response
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Response for an archive built on the fly.
pub fn streamed_attachment(body: Body, filename: &str) -> AppResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, content_disposition_attachment(filename))
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct MediaLinkQuery {
    sig: Option<String>,
}

/// Serves `{prefix}/*key` for local links minted by `signed_url`.
pub fn media_router(prefix: &str) -> Router<AppState> {
    Router::new().route(&format!("{}/*key", prefix), get(get_media_link))
}

async fn get_media_link(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<MediaLinkQuery>,
) -> AppResult<Response> {
    let token = query
        .sig
        .ok_or_else(|| AppError::Authentication("Media link is not signed".to_string()))?;
    let claims = verify_media_link_token(&token, &key, &state.config.security.secret_key)
        .ok_or_else(|| AppError::Authentication("Media link is invalid or expired".to_string()))?;
    let path = state
        .storage
        .local_path(&claims.sub)
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    serve_file(path, &guess_content_type(&claims.sub), claims.disposition.as_deref()).await
}

fn key_basename(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}
