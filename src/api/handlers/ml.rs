use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use super::auth::require_user;
use crate::{
    api::error::{json_rejection, ErrorDetail, ValidationDetail},
    auth::AuthState,
    inference::{self, Classification, IrisFeatures, ModelStore},
    store::Repositories,
};

#[utoipa::path(
    post,
    path = "/ml/predict",
    request_body = IrisFeatures,
    responses(
        (status = 200, description = "Predicted label and class probabilities.", body = Classification),
        (status = 400, description = "Malformed body or measurements outside 0..=100 cm.", body = ValidationDetail),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorDetail),
    ),
    security(("bearer" = [])),
    tag = "ml"
)]
/// Classify one iris sample and record the prediction for the caller.
pub async fn predict(
    headers: HeaderMap,
    repos: Extension<Repositories>,
    auth_state: Extension<Arc<AuthState>>,
    models: Extension<Arc<ModelStore>>,
    payload: Result<Json<IrisFeatures>, JsonRejection>,
) -> impl IntoResponse {
    let user = match require_user(&headers, &auth_state, repos.users.as_ref()).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    let features = match payload {
        Ok(Json(features)) => features,
        Err(err) => return json_rejection(&err).into_response(),
    };

    match inference::predict(&models, repos.predictions.as_ref(), &user, features).await {
        Ok(classification) => Json(classification).into_response(),
        Err(err) => err.into_response(),
    }
}
