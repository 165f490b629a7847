use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::{principal::require_user, types::ChangePasswordRequest};
use crate::{
    api::error::{json_rejection, ErrorDetail, ValidationDetail},
    auth::{self, AuthState},
    store::Repositories,
};

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed."),
        (status = 400, description = "Old password is incorrect or new password is weak.", body = ValidationDetail),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorDetail),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
/// Replace the caller's password after checking the old one.
pub async fn change_password(
    headers: HeaderMap,
    repos: Extension<Repositories>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> impl IntoResponse {
    let user = match require_user(&headers, &auth_state, repos.users.as_ref()).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    let request = match payload {
        Ok(Json(request)) => request,
        Err(err) => return json_rejection(&err).into_response(),
    };

    match auth::change_password(
        repos.users.as_ref(),
        &user,
        &request.old_password,
        &request.new_password,
    )
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
