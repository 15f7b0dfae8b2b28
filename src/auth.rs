use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use cookie::{Cookie, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::{Session, User},
    repository::RepositoryState,
};

/// Name of the cookie carrying the signed session reference.
pub const SESSION_COOKIE: &str = "sessionid";

/// Where anonymous visitors of login-required routes are sent.
pub const LOGIN_URL: &str = "/login/";

// --- Passwords ---

/// hash_password
///
/// Argon2id with a random salt, encoded as a PHC string.
pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

/// verify_password
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            false
        }
    }
}

/// authenticate
///
/// Checks a username/password pair. Inactive users are returned as well; it is
/// up to the caller to refuse them a session.
pub async fn authenticate(
    repo: &RepositoryState,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    let Some(user) = repo.find_user_by_username(username).await? else {
        return Ok(None);
    };
    Ok(verify_password(password, &user.password).then_some(user))
}

// --- Session Tokens ---

/// SessionClaims
///
/// Payload of the session cookie. `sid` points at the server-side session row,
/// which is what logout deletes.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The user the session belongs to.
    pub sub: Uuid,
    /// The `sessions.id` this token refers to.
    pub sid: Uuid,
    pub exp: usize,
    pub iat: usize,
}

pub fn encode_session_token(config: &AppConfig, session: &Session) -> Result<String, AppError> {
    let claims = SessionClaims {
        sub: session.user_id,
        sid: session.id,
        exp: session.expires_at.timestamp() as usize,
        iat: session.created_at.timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )?)
}

pub fn decode_session_token(config: &AppConfig, token: &str) -> Option<SessionClaims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.session_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| tracing::debug!(error = %e, "rejected session token"))
    .ok()
}

/// start_session
///
/// Opens a session for `user`, stamps `last_login` and returns the cookie to set.
pub async fn start_session(
    repo: &RepositoryState,
    config: &AppConfig,
    user: &User,
) -> Result<Cookie<'static>, AppError> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(config.session_ttl_hours);
    let session = repo.create_session(user.id, expires_at).await?;
    repo.record_login(user.id, now).await?;

    let token = encode_session_token(config, &session)?;
    Ok(Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::hours(config.session_ttl_hours))
        .build())
}

/// Login page URL remembering where the visitor was headed.
pub fn login_redirect(next: &str) -> String {
    format!("{LOGIN_URL}?next={next}")
}

/// Cookie that makes the browser forget the session.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}

fn session_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value).filter_map(Result::ok))
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

// --- Extractor ---

/// SessionUser
///
/// The logged-in user behind the request, resolved from the session cookie.
///
/// Resolution: decode the signed token, load the session row it names (which
/// must exist, be unexpired and belong to the token's subject), then load the
/// user, who must still be active. Any failure redirects to the login page with
/// the requested path in `next`.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user: User,
    pub session_id: Uuid,
}

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let next = parts.uri.path().to_string();
        let to_login = || Redirect::to(&login_redirect(&next)).into_response();

        let claims = session_token(parts)
            .and_then(|token| decode_session_token(&config, &token))
            .ok_or_else(to_login)?;

        let session = repo
            .get_session(claims.sid)
            .await
            .map_err(|e| AppError::from(e).into_response())?
            .filter(|session| session.user_id == claims.sub && !session.is_expired(Utc::now()))
            .ok_or_else(to_login)?;

        let user = repo
            .get_user(session.user_id)
            .await
            .map_err(|e| AppError::from(e).into_response())?
            .filter(|user| user.is_active)
            .ok_or_else(to_login)?;

        Ok(SessionUser {
            user,
            session_id: session.id,
        })
    }
}
