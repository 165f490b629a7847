//! Persistence for users, items and predictions.
//!
//! Each entity has its own repository trait so the flows never see `sqlx`.
//! [`postgres::PgStore`] implements all of them over a single pool; every call
//! is one auto-committed statement.

pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::inference::IrisFeatures;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("duplicate record")]
    Duplicate,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Name and description of an item; used for both create and full replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFields {
    pub name: String,
    pub description: Option<String>,
}

/// Listing window over items, newest id first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFilter {
    /// Case-insensitive substring of the name.
    pub q: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub user_id: i64,
    pub features: IrisFeatures,
    pub pred_label: String,
    pub pred_confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: i64,
    pub user_id: i64,
    pub features: IrisFeatures,
    pub pred_label: String,
    pub pred_confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; `email` must already be normalized.
    /// Returns [`StoreError::Duplicate`] if the email is taken.
    async fn insert(&self, email: &str, hashed_password: &str) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Returns `false` when no user has that id.
    async fn update_password(&self, id: i64, hashed_password: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn create(&self, fields: &ItemFields) -> Result<Item, StoreError>;

    async fn list(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Item>, StoreError>;

    /// Replace name and description; `None` when the item does not exist.
    async fn update(&self, id: i64, fields: &ItemFields) -> Result<Option<Item>, StoreError>;

    /// Returns `false` when the item does not exist.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn insert(&self, prediction: &NewPrediction) -> Result<Prediction, StoreError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// The repositories handed to the flows and HTTP handlers.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub predictions: Arc<dyn PredictionRepository>,
    pub health: Arc<dyn HealthCheck>,
}

impl Repositories {
    /// Use one backend for every entity.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: UserRepository + ItemRepository + PredictionRepository + HealthCheck + 'static,
    {
        Self {
            users: backend.clone(),
            items: backend.clone(),
            predictions: backend.clone(),
            health: backend,
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
