use crate::auth::jwt::decode_access_token;
use crate::config::Config;
use crate::database::{fetch_one, queries, DbPool};
use crate::error::AppError;
use crate::processor::{DerivativeQueue, DerivativeResolver};
use crate::storage::SharedStorage;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use std::sync::Arc;

/// Roles that manage galleries rather than view them.
const INTERNAL_ROLES: [&str; 3] = ["admin", "staff", "photographer"];

#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: String,
}

impl CurrentUser {
    pub fn is_internal(&self) -> bool {
        INTERNAL_ROLES.contains(&self.role.as_str())
    }
}

/// Present when the request carries a valid bearer token; anonymous otherwise.
#[derive(Clone, Debug)]
pub struct OptionalUser(pub Option<CurrentUser>);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DbPool,
    pub storage: SharedStorage,
    pub resolver: Arc<DerivativeResolver>,
    pub queue: Option<DerivativeQueue>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    if from_header.is_some() {
        return from_header;
    }

    // Fall back to query parameter
    parts
        .uri
        .query()
        .and_then(|query| serde_urlencoded::from_str::<TokenQuery>(query).ok())
        .and_then(|params| params.token)
}

struct UserRow {
    id: i64,
    username: String,
    email: Option<String>,
    role: String,
    is_active: i32,
}

fn load_user(app_state: &AppState, token: &str) -> Result<CurrentUser, AppError> {
    let claims = decode_access_token(token, &app_state.config)
        .ok_or_else(|| AppError::Authentication("Invalid or expired token".to_string()))?;

    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Authentication("Invalid token".to_string()))?;

    let conn = app_state.pool.get().map_err(AppError::Pool)?;

    let user = fetch_one(&conn, queries::users::SELECT_USER_FOR_TOKEN, &[&user_id], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            is_active: row.get(4)?,
        })
    })?
    .ok_or_else(|| AppError::Authentication("User not found".to_string()))?;

    if user.is_active == 0 {
        return Err(AppError::Authentication("User is inactive".to_string()));
    }

    Ok(CurrentUser {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
    })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Authentication("Not authenticated".to_string()))?;
        load_user(&app_state, &token)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        // a bad token on a public route is treated as no token
        let user = bearer_token(parts).and_then(|token| load_user(&app_state, &token).ok());
        Ok(OptionalUser(user))
    }
}

// Helper trait for extracting AppState from state
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

impl FromRef<AppState> for AppState {
    fn from_ref(input: &AppState) -> Self {
        input.clone()
    }
}

// Internal-role extractor
pub struct RequireInternal(pub CurrentUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireInternal
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !user.is_internal() {
            return Err(AppError::Authorization("Studio access required".to_string()));
        }

        Ok(RequireInternal(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> CurrentUser {
        CurrentUser {
            id: 1,
            username: "u".to_string(),
            email: None,
            role: role.to_string(),
        }
    }

    #[test]
    fn test_internal_roles() {
        assert!(user("admin").is_internal());
        assert!(user("photographer").is_internal());
        assert!(user("staff").is_internal());
        assert!(!user("client").is_internal());
    }

    #[test]
    fn test_bearer_token_sources() {
        let (parts, _) = axum::http::Request::builder()
            .uri("/api/galleries/1?token=from-query")
            .header(AUTHORIZATION, "Bearer from-header")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts).as_deref(), Some("from-header"));

        let (parts, _) = axum::http::Request::builder()
            .uri("/api/galleries/1?token=from-query")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts).as_deref(), Some("from-query"));
    }
}
