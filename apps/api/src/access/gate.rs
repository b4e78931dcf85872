use crate::auth::jwt::verify_gallery_token;
use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::{fetch_one, queries, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::Gallery;
use chrono::{DateTime, Utc};

/// Why a request was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGrant {
    Owner,
    Token,
    Public,
}

/// Who is asking: an optional authenticated user plus an optional gallery token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Visitor<'a> {
    pub user: Option<&'a CurrentUser>,
    pub gallery_token: Option<&'a str>,
}

impl<'a> Visitor<'a> {
    pub fn is_owner_of(&self, gallery: &Gallery) -> bool {
        self.user.map(|u| u.id == gallery.owner_id).unwrap_or(false)
    }

    /// Owners and studio staff never consume download quota.
    pub fn bypasses_quota(&self, gallery: &Gallery) -> bool {
        self.is_owner_of(gallery) || self.user.map(|u| u.is_internal()).unwrap_or(false)
    }
}

pub fn load_gallery(pool: &DbPool, gallery_id: i64) -> AppResult<Gallery> {
    let conn = pool.get()?;
    fetch_one(&conn, queries::galleries::SELECT_BY_ID, &[&gallery_id], Gallery::from_row)?
        .ok_or_else(|| AppError::NotFound(format!("Gallery {} not found", gallery_id)))
}

pub fn check_access(
    gallery: &Gallery,
    visitor: &Visitor<'_>,
    config: &Config,
    now: DateTime<Utc>,
) -> AppResult<AccessGrant> {
    if visitor.is_owner_of(gallery) {
        return Ok(AccessGrant::Owner);
    }

    if gallery.has_password() {
        if gallery.password_expired(now) {
            return Err(AppError::Authentication("Gallery access has expired".to_string()));
        }
        return match visitor.gallery_token {
            Some(token) if verify_gallery_token(token, gallery.id, config) => Ok(AccessGrant::Token),
            _ => Err(AppError::Authentication("Gallery password required".to_string())),
        };
    }

    if gallery.is_public {
        Ok(AccessGrant::Public)
    } else {
        Err(AppError::Authentication("Gallery is private".to_string()))
    }
}

pub fn require_owner(gallery: &Gallery, user: &CurrentUser) -> AppResult<()> {
    if gallery.owner_id == user.id {
        Ok(())
    } else {
        Err(AppError::Authorization("Only the gallery owner can do this".to_string()))
    }
}

/// Loads the gallery and checks the visitor may see it.
pub fn authorize(
    pool: &DbPool,
    gallery_id: i64,
    visitor: &Visitor<'_>,
    config: &Config,
) -> AppResult<(Gallery, AccessGrant)> {
    let gallery = load_gallery(pool, gallery_id)?;
    let grant = check_access(&gallery, visitor, config, Utc::now())?;
    Ok((gallery, grant))
}
