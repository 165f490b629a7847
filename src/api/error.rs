//! HTTP mapping for [`crate::Error`].

use axum::{
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::error::{Error, FieldError};

/// `{"detail": "..."}` error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub detail: String,
}

/// `{"detail": [{"field": .., "message": ..}]}` validation error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationDetail {
    pub detail: Vec<FieldError>,
}

impl IntoResponse for Error {
    /// Storage, model and internal failures are logged here and surfaced as a
    /// bare `500` without the cause.
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
                Json(json!({ "detail": "Invalid credentials" })),
            )
                .into_response(),
            Self::Conflict(message) | Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": message }))).into_response()
            }
            Self::Validation(fields) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": fields }))).into_response()
            }
            Self::NotFound(entity) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": format!("{entity} not found") })),
            )
                .into_response(),
            Self::Store(err) => {
                error!("Database error: {err}");
                internal()
            }
            Self::Model(err) => {
                error!("Model error: {err}");
                internal()
            }
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                internal()
            }
        }
    }
}

/// A JSON body that parsed but did not fit the request type is reported against
/// `body` with the deserializer's message, which names the offending field.
/// Syntax, content-type and size failures stay a flat `400`.
pub(crate) fn json_rejection(err: &JsonRejection) -> Error {
    debug!("Rejected JSON body: {err}");
    match err {
        JsonRejection::JsonDataError(err) => Error::field("body", err.body_text()),
        _ => Error::BadRequest("Invalid request body"),
    }
}

pub(crate) fn form_rejection(err: &FormRejection) -> Error {
    debug!("Rejected form body: {err}");
    match err {
        FormRejection::FailedToDeserializeForm(err) => Error::field("body", err.body_text()),
        FormRejection::FailedToDeserializeFormBody(err) => Error::field("body", err.body_text()),
        _ => Error::BadRequest("Invalid request body"),
    }
}

pub(crate) fn query_rejection(err: &QueryRejection) -> Error {
    debug!("Rejected query string: {err}");
    match err {
        QueryRejection::FailedToDeserializeQueryString(err) => {
            Error::field("query", err.body_text())
        }
        _ => Error::BadRequest("Invalid query string"),
    }
}

fn internal() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": "Internal server error" })),
    )
        .into_response()
}
