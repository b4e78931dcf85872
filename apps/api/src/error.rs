use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid variant: {0}")]
    InvalidVariant(String),

    #[error("Unprocessable asset: {0}")]
    UnprocessableAsset(String),

    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    #[error("Storage read failed: {0}")]
    StorageRead(String),

    #[error("Download quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl AppError {
    /// Storage failures are transient from the caller's point of view.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StorageWrite(_) | AppError::StorageRead(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidVariant(_) | AppError::UnprocessableAsset(_) | AppError::Image(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::StorageRead(_) => StatusCode::BAD_GATEWAY,
            AppError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StorageWrite(_)
            | AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Io(_)
            | AppError::Zip(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidVariant(msg)
            | AppError::UnprocessableAsset(msg)
            | AppError::QuotaExceeded(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::StorageWrite(msg) => {
                tracing::error!("Storage write error: {}", msg);
                "Storage write failed".to_string()
            }
            AppError::StorageRead(msg) => {
                tracing::error!("Storage read error: {}", msg);
                "Storage read failed".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg.clone()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                "Connection pool error".to_string()
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {}", e);
                "Invalid token".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "IO error".to_string()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                "JSON parsing error".to_string()
            }
            AppError::Image(e) => {
                tracing::warn!("Image error: {}", e);
                "Image could not be processed".to_string()
            }
            AppError::Zip(e) => {
                tracing::error!("Archive error: {}", e);
                "Archive could not be built".to_string()
            }
        };

        let body = Json(json!({ "detail": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
