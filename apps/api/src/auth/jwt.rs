use crate::config::Config;
use crate::error::AppResult;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const ACCESS_TOKEN_TYPE: &str = "access";
const GALLERY_TOKEN_TYPE: &str = "gallery";
const MEDIA_LINK_TYPE: &str = "media";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Proof that a visitor unlocked one password-protected gallery.
#[derive(Debug, Serialize, Deserialize)]
pub struct GalleryClaims {
    pub sub: String,
    pub gallery_id: i64,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Expiring permission to fetch one stored object from local disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct MediaLinkClaims {
    /// Storage key the link was issued for.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

pub fn create_access_token(user_id: i64, username: &str, role: &str, config: &Config) -> AppResult<String> {
    let expiration = Utc::now() + Duration::minutes(config.security.access_token_expire_minutes);

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp(),
        token_type: ACCESS_TOKEN_TYPE.to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.security.secret_key.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_access_token(token: &str, config: &Config) -> Option<Claims> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.security.secret_key.as_bytes()),
        &validation(),
    ) {
        Ok(data) if data.claims.token_type == ACCESS_TOKEN_TYPE => Some(data.claims),
        _ => None,
    }
}

/// Returns the token and its lifetime in seconds.
pub fn create_gallery_token(gallery_id: i64, config: &Config) -> AppResult<(String, i64)> {
    let now = Utc::now();
    let ttl = Duration::minutes(config.security.gallery_token_expire_minutes);

    let claims = GalleryClaims {
        sub: format!("gallery:{}", gallery_id),
        gallery_id,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
        token_type: GALLERY_TOKEN_TYPE.to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.security.secret_key.as_bytes()),
    )?;

    Ok((token, ttl.num_seconds()))
}

/// True only for an unexpired gallery token issued for exactly `gallery_id`.
pub fn verify_gallery_token(token: &str, gallery_id: i64, config: &Config) -> bool {
    match decode::<GalleryClaims>(
        token,
        &DecodingKey::from_secret(config.security.secret_key.as_bytes()),
        &validation(),
    ) {
        Ok(data) => {
            data.claims.token_type == GALLERY_TOKEN_TYPE
                && data.claims.gallery_id == gallery_id
                && data.claims.sub == format!("gallery:{}", gallery_id)
        }
        Err(_) => false,
    }
}

pub fn create_media_link_token(
    key: &str,
    disposition: Option<&str>,
    ttl: std::time::Duration,
    secret: &str,
) -> AppResult<String> {
    let ttl = Duration::seconds(ttl.as_secs().max(1) as i64);
    let claims = MediaLinkClaims {
        sub: key.to_string(),
        disposition: disposition.map(str::to_string),
        exp: (Utc::now() + ttl).timestamp(),
        token_type: MEDIA_LINK_TYPE.to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Claims of an unexpired media link issued for exactly `key`.
pub fn verify_media_link_token(token: &str, key: &str, secret: &str) -> Option<MediaLinkClaims> {
    match decode::<MediaLinkClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation(),
    ) {
        Ok(data) if data.claims.token_type == MEDIA_LINK_TYPE && data.claims.sub == key => {
            Some(data.claims)
        }
        _ => None,
    }
}
