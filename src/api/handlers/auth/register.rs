use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use super::types::{RegisterRequest, UserResponse};
use crate::{
    api::error::{json_rejection, ValidationDetail},
    auth,
    store::Repositories,
};

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created.", body = UserResponse),
        (status = 400, description = "Email already registered, invalid email, weak password or malformed body.", body = ValidationDetail),
    ),
    tag = "auth"
)]
/// Create an account from an email and password.
pub async fn register(
    repos: Extension<Repositories>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(err) => return json_rejection(&err).into_response(),
    };

    match auth::register(repos.users.as_ref(), &request.email, &request.password).await {
        Ok(user) => (StatusCode::CREATED, Json(UserResponse::from(user))).into_response(),
        Err(err) => err.into_response(),
    }
}
