use axum::{
    extract::{rejection::FormRejection, Extension, Form},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::types::{LoginForm, TokenResponse};
use crate::{
    api::error::{form_rejection, ErrorDetail, ValidationDetail},
    auth::{self, AuthState},
    store::Repositories,
};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued.", body = TokenResponse),
        (status = 400, description = "Malformed or incomplete form body.", body = ValidationDetail),
        (status = 401, description = "Invalid credentials.", body = ErrorDetail),
    ),
    tag = "auth"
)]
/// Exchange email (`username`) and password for a bearer token.
pub async fn login(
    repos: Extension<Repositories>,
    auth_state: Extension<Arc<AuthState>>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> impl IntoResponse {
    let form = match form {
        Ok(Form(form)) => form,
        Err(err) => return form_rejection(&err).into_response(),
    };

    match auth::login(&auth_state, repos.users.as_ref(), &form.username, &form.password).await {
        Ok(token) => Json(TokenResponse::bearer(token)).into_response(),
        Err(err) => err.into_response(),
    }
}
