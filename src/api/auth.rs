//! Registration, login and bearer-token sessions.
//!
//! Tokens are 32 random bytes, hex encoded. Only their SHA-256 hash is stored,
//! so a leaked database does not leak usable sessions.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_password, validate_username};
use crate::db::{Account, AccountResponse, LoginRequest, LoginResponse, RegisterRequest};
use crate::{AppState, DbPool};

/// Format of `sessions.expires_at`, comparable with SQLite's `datetime('now')`.
const SESSION_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Bearer token from the Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Open a session for `account_id`. Returns the raw token and its expiry.
pub async fn create_session(
    db: &DbPool,
    account_id: &str,
    ttl_hours: u64,
) -> Result<(String, String), ApiError> {
    let expires_at = i64::try_from(ttl_hours)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| {
            tracing::error!(ttl_hours, "Session lifetime is out of range");
            ApiError::internal("Session lifetime is out of range")
        })?
        .format(SESSION_EXPIRY_FORMAT)
        .to_string();
    let token = generate_token();

    sqlx::query("INSERT INTO sessions (id, account_id, token_hash, expires_at) VALUES (?, ?, ?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(hash_token(&token))
        .bind(&expires_at)
        .execute(db)
        .await?;

    Ok((token, expires_at))
}

/// The account behind a live session token, if any.
pub async fn resolve_session(db: &DbPool, token: &str) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"
        SELECT a.* FROM accounts a
        JOIN sessions s ON s.account_id = a.id
        WHERE s.token_hash = ? AND s.expires_at > datetime('now')
        "#,
    )
    .bind(hash_token(token))
    .fetch_optional(db)
    .await
}

pub async fn revoke_session(db: &DbPool, token: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("username", validate_username(&request.username));
    errors.check(
        "password",
        validate_password(&request.password, state.config.auth.min_password_length),
    );
    errors.finish()?;

    let account = state
        .accounts
        .register(&request.username, &request.password)
        .await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let account = state
        .accounts
        .authenticate(&request.username, &request.password)
        .await?;

    let (token, expires_at) =
        create_session(&state.db, &account.id, state.config.auth.session_ttl_hours).await?;

    tracing::info!(account = %account.id, username = %account.username, "Login");

    Ok(Json(LoginResponse {
        token,
        expires_at,
        account: AccountResponse::from(account),
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !revoke_session(&state.db, token).await? {
        return Err(ApiError::unauthorized("Session is invalid or expired"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Rejects requests without a live session and stashes the account for handlers.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let account = resolve_session(&state.db, token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Session is invalid or expired"))?;

    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}

/// The signed-in account. Reuses the middleware's lookup when present.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for Account {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(account) = parts.extensions.get::<Account>() {
            return Ok(account.clone());
        }

        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        resolve_session(&state.db, token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Session is invalid or expired"))
    }
}
