//! Session and role middleware.
//!
//! Callers authenticate either with an `Authorization: Bearer` header or the
//! session cookie set by `/api/auth/login`. Validated claims become an
//! [`AuthenticatedUser`] request extension; route guards build on top of it.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::shared::errors::ApiError;
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub admin: bool,
}

/// Authenticated user context extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    pub fn anonymous() -> Self {
        Self {
            user_id: Uuid::nil(),
            email: None,
            is_admin: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user_id.is_nil()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "unauthorized", "message": "Authentication required"})),
            ))
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hash failed: {e}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn issue_token(user_id: Uuid, is_admin: bool, secret: &str, ttl_hours: i64) -> String {
    let now = Utc::now();
    let claims = TokenClaims {
        sub: user_id.to_string(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
        iat: now.timestamp(),
        admin: is_admin,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap_or_default()
}

pub fn validate_token(token: &str, secret: &str) -> Option<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["sub", "exp"]);
    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .ok()
}

/// Path prefixes that serve pages rather than JSON; unauthenticated requests
/// there are redirected instead of receiving 401.
pub fn login_redirect_target(path: &str) -> Option<&'static str> {
    if path == "/app" || path.starts_with("/app/") {
        Some("/login")
    } else {
        None
    }
}

fn token_from_request(request: &Request<Body>, cookies: &Cookies, cookie_name: &str) -> Option<String> {
    if let Some(value) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(value.to_string());
    }
    cookies.get(cookie_name).map(|c| c.value().to_string())
}

/// Resolve the caller into an [`AuthenticatedUser`] extension. Invalid or
/// absent credentials fall back to anonymous; route guards decide rejection.
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie_name = state.config.auth.session_cookie.clone();
    let user = token_from_request(&request, &cookies, &cookie_name)
        .and_then(|token| validate_token(&token, &state.config.auth.jwt_secret))
        .and_then(|claims| {
            let user_id = Uuid::parse_str(&claims.sub).ok()?;
            Some(AuthenticatedUser {
                user_id,
                email: None,
                is_admin: claims.admin,
            })
        })
        .unwrap_or_else(AuthenticatedUser::anonymous);

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Reject unauthenticated callers: page prefixes redirect to the login page,
/// API paths get 401 JSON.
pub async fn require_authentication_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .unwrap_or_else(AuthenticatedUser::anonymous);

    if !user.is_authenticated() {
        if let Some(target) = login_redirect_target(request.uri().path()) {
            return Err(Redirect::to(target).into_response());
        }
        return Err(ApiError::Unauthorized("Authentication required".to_string()).into_response());
    }

    Ok(next.run(request).await)
}

pub async fn require_admin_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let is_admin = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.is_admin)
        .unwrap_or(false);

    if !is_admin {
        return Err(ApiError::Forbidden("Admin access required".to_string()).into_response());
    }

    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub is_admin: bool,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut conn = state.conn.get()?;

    let row: Option<(Uuid, String, bool, bool)> = users::table
        .filter(users::email.eq(&req.email))
        .select((
            users::id,
            users::password_hash,
            users::is_active,
            users::is_admin,
        ))
        .first(&mut conn)
        .optional()?;

    let Some((user_id, password_hash, is_active, is_admin)) = row else {
        // Burn a verification anyway so the timing does not reveal whether
        // the address exists.
        let _ = verify_password(&req.password, "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    };

    if !is_active || !verify_password(&req.password, &password_hash) {
        warn!("failed login attempt for {}", req.email);
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = issue_token(
        user_id,
        is_admin,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_hours,
    );

    let mut cookie = Cookie::new(state.config.auth.session_cookie.clone(), token.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.add(cookie);

    Ok(Json(LoginResponse {
        token,
        user_id,
        is_admin,
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> Json<serde_json::Value> {
    let mut cookie = Cookie::new(state.config.auth.session_cookie.clone(), "");
    cookie.set_path("/");
    cookies.remove(cookie);
    Json(serde_json::json!({"success": true}))
}

pub async fn me(user: AuthenticatedUser) -> Result<Json<serde_json::Value>, ApiError> {
    if !user.is_authenticated() {
        return Err(ApiError::Unauthorized("Authentication required".to_string()));
    }
    Ok(Json(serde_json::json!({
        "user_id": user.user_id,
        "is_admin": user.is_admin,
    })))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let id = Uuid::new_v4();
        let token = issue_token(id, true, "secret", 1);
        let claims = validate_token(&token, "secret").expect("valid token");
        assert_eq!(claims.sub, id.to_string());
        assert!(claims.admin);
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let token = issue_token(Uuid::new_v4(), false, "secret", 1);
        assert!(validate_token(&token, "other").is_none());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter2").expect("hash");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn page_prefixes_redirect_api_paths_do_not() {
        assert_eq!(login_redirect_target("/app/leads"), Some("/login"));
        assert_eq!(login_redirect_target("/app"), Some("/login"));
        assert_eq!(login_redirect_target("/api/leads"), None);
        assert_eq!(login_redirect_target("/application"), None);
    }

    #[test]
    fn anonymous_user_is_not_authenticated() {
        assert!(!AuthenticatedUser::anonymous().is_authenticated());
    }
}
