//! Bearer principal extraction.
//!
//! Flow Overview: read `Authorization: Bearer <token>`, resolve the token to a
//! subject, then look the subject up. Every failure is a uniform `401`.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::{
    auth::{self, AuthState},
    error::{Error, Result},
    store::{User, UserRepository},
};

/// Extract the raw token from an `Authorization` header; the scheme is case-insensitive.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Resolve the request's bearer token into a user, or fail with [`Error::Unauthorized`].
pub async fn require_user(
    headers: &HeaderMap,
    auth: &AuthState,
    users: &dyn UserRepository,
) -> Result<User> {
    let token = bearer_token(headers).ok_or(Error::Unauthorized)?;
    auth::resolve_identity(auth, users, token).await
}
