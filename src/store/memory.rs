//! In-process repositories for tests that drive the flows and router without Postgres.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    HealthCheck, Item, ItemFields, ItemFilter, ItemRepository, NewPrediction, Prediction,
    PredictionRepository, StoreError, User, UserRepository,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    items: Vec<Item>,
    predictions: Vec<Prediction>,
    next_user_id: i64,
    next_item_id: i64,
    next_prediction_id: i64,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn predictions(&self) -> Vec<Prediction> {
        self.tables().predictions.clone()
    }

    pub(crate) fn items(&self) -> Vec<Item> {
        self.tables().items.clone()
    }

    pub(crate) fn user(&self, email: &str) -> Option<User> {
        self.tables()
            .users
            .iter()
            .find(|user| user.email == email)
            .cloned()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, email: &str, hashed_password: &str) -> Result<User, StoreError> {
        let mut tables = self.tables();
        if tables.users.iter().any(|user| user.email == email) {
            return Err(StoreError::Duplicate);
        }
        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.user(email))
    }

    async fn update_password(&self, id: i64, hashed_password: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables.users.iter_mut().find(|user| user.id == id) {
            Some(user) => {
                user.hashed_password = hashed_password.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ItemRepository for MemoryStore {
    async fn create(&self, fields: &ItemFields) -> Result<Item, StoreError> {
        let mut tables = self.tables();
        tables.next_item_id += 1;
        let item = Item {
            id: tables.next_item_id,
            name: fields.name.clone(),
            description: fields.description.clone(),
            created_at: Utc::now(),
        };
        tables.items.push(item.clone());
        Ok(item)
    }

    async fn list(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let needle = filter.q.as_deref().map(str::to_lowercase);
        let mut items: Vec<Item> = self
            .tables()
            .items
            .iter()
            .filter(|item| {
                needle
                    .as_deref()
                    .map_or(true, |needle| item.name.to_lowercase().contains(needle))
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(items
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(0))
            .take(usize::try_from(filter.limit).unwrap_or(0))
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Item>, StoreError> {
        Ok(self.tables().items.iter().find(|item| item.id == id).cloned())
    }

    async fn update(&self, id: i64, fields: &ItemFields) -> Result<Option<Item>, StoreError> {
        let mut tables = self.tables();
        Ok(tables
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .map(|item| {
                item.name = fields.name.clone();
                item.description = fields.description.clone();
                item.clone()
            }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let before = tables.items.len();
        tables.items.retain(|item| item.id != id);
        Ok(tables.items.len() < before)
    }
}

#[async_trait]
impl PredictionRepository for MemoryStore {
    async fn insert(&self, prediction: &NewPrediction) -> Result<Prediction, StoreError> {
        let mut tables = self.tables();
        if !tables.users.iter().any(|user| user.id == prediction.user_id) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        tables.next_prediction_id += 1;
        let record = Prediction {
            id: tables.next_prediction_id,
            user_id: prediction.user_id,
            features: prediction.features,
            pred_label: prediction.pred_label.clone(),
            pred_confidence: prediction.pred_confidence,
            created_at: Utc::now(),
        };
        tables.predictions.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
