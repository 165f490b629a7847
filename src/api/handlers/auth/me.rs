use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::{principal::require_user, types::UserResponse};
use crate::{api::error::ErrorDetail, auth::AuthState, store::Repositories};

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The authenticated user.", body = UserResponse),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorDetail),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
/// Return the user the bearer token was issued for.
pub async fn me(
    headers: HeaderMap,
    repos: Extension<Repositories>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_user(&headers, &auth_state, repos.users.as_ref()).await {
        Ok(user) => Json(UserResponse::from(user)).into_response(),
        Err(err) => err.into_response(),
    }
}
