use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{inference::ModelError, store::StoreError};

/// A single failed input field, surfaced to clients as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Failures of the account, item and inference flows.
///
/// Every variant is terminal for the current call. The flows only return an
/// error before their single write, so a failed call leaves storage untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing, malformed or expired token, unknown subject, or bad credentials.
    #[error("invalid credentials")]
    Unauthorized,
    #[error("{0}")]
    Conflict(&'static str),
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
