mod brand;
pub mod delivery;
mod downloads;
mod favorites;
mod galleries;
mod photos;

use axum::Router;
use axum_extra::extract::CookieJar;
use std::time::Duration;

use crate::access::cookie::gallery_token_from_jar;
use crate::access::{authorize, ensure_quota_available, AccessGrant, QuotaPolicy, Visitor};
use crate::auth::{AppState, CurrentUser, OptionalUser};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::Gallery;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(galleries::router())
        .merge(photos::router())
        .merge(downloads::router())
        .merge(favorites::router())
        .merge(brand::router())
}

/// A gallery the current visitor has been let into.
pub(crate) struct OpenGallery {
    pub gallery: Gallery,
    pub grant: AccessGrant,
    pub user: Option<CurrentUser>,
    pub access_cookie: Option<String>,
}

impl OpenGallery {
    pub fn bypasses_quota(&self) -> bool {
        self.visitor().bypasses_quota(&self.gallery)
    }

    /// Refuses an exhausted visitor before anything is rendered or zipped.
    pub fn check_quota(&self, state: &AppState) -> AppResult<()> {
        if self.bypasses_quota() {
            return Ok(());
        }
        ensure_quota_available(
            &state.pool,
            self.gallery.id,
            1,
            quota_policy(&state.config),
            chrono::Utc::now(),
        )
    }

    fn visitor(&self) -> Visitor<'_> {
        Visitor {
            user: self.user.as_ref(),
            gallery_token: self.access_cookie.as_deref(),
        }
    }
}

pub(crate) fn open_gallery(
    state: &AppState,
    gallery_id: i64,
    user: OptionalUser,
    jar: &CookieJar,
) -> AppResult<OpenGallery> {
    let access_cookie = gallery_token_from_jar(jar, gallery_id);
    let OptionalUser(user) = user;
    let visitor = Visitor {
        user: user.as_ref(),
        gallery_token: access_cookie.as_deref(),
    };
    let (gallery, grant) = authorize(&state.pool, gallery_id, &visitor, &state.config)?;
    Ok(OpenGallery {
        gallery,
        grant,
        user,
        access_cookie,
    })
}

pub(crate) fn quota_policy(config: &Config) -> QuotaPolicy {
    QuotaPolicy {
        window_seconds: config.quota.window_seconds,
        default_limit: config.quota.default_download_limit,
    }
}

pub(crate) fn signed_url_ttl(config: &Config) -> Duration {
    Duration::from_secs(config.storage.signed_url_seconds)
}
