use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    types::Json,
    Connection, Row,
};
use std::time::Duration;
use tracing::{info_span, Instrument};

use super::{
    HealthCheck, Item, ItemFields, ItemFilter, ItemRepository, NewPrediction, Prediction,
    PredictionRepository, StoreError, User, UserRepository,
};
use crate::inference::IrisFeatures;

/// Postgres-backed implementation of every repository.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Escape `LIKE` metacharacters so `q` matches literally.
fn like_pattern(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len() + 2);
    escaped.push('%');
    for ch in q.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        hashed_password: row.try_get("hashed_password")?,
        created_at: row.try_get("created_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, email: &str, hashed_password: &str) -> Result<User, StoreError> {
        let query = r"
            INSERT INTO users (email, hashed_password)
            VALUES ($1, $2)
            RETURNING id, email, hashed_password, created_at
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        match sqlx::query(query)
            .bind(email)
            .bind(hashed_password)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
        {
            Ok(row) => Ok(user_from_row(&row)?),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate),
            Err(err) => Err(StoreError::Database(err)),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, email, hashed_password, created_at
            FROM users
            WHERE email = $1
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn update_password(&self, id: i64, hashed_password: &str) -> Result<bool, StoreError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
        let result = sqlx::query("UPDATE users SET hashed_password = $2 WHERE id = $1")
            .bind(id)
            .bind(hashed_password)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ItemRepository for PgStore {
    async fn create(&self, fields: &ItemFields) -> Result<Item, StoreError> {
        let query = r"
            INSERT INTO items (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        let row = sqlx::query(query)
            .bind(&fields.name)
            .bind(fields.description.as_deref())
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(item_from_row(&row)?)
    }

    async fn list(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let query = r"
            SELECT id, name, description, created_at
            FROM items
            WHERE $1::text IS NULL OR name ILIKE $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
        ";
        let pattern = filter.q.as_deref().map(like_pattern);
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let rows = sqlx::query(query)
            .bind(pattern)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;
        rows.iter()
            .map(|row| item_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn get(&self, id: i64) -> Result<Option<Item>, StoreError> {
        let query = r"
            SELECT id, name, description, created_at
            FROM items
            WHERE id = $1
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    async fn update(&self, id: i64, fields: &ItemFields) -> Result<Option<Item>, StoreError> {
        let query = r"
            UPDATE items
            SET name = $2, description = $3
            WHERE id = $1
            RETURNING id, name, description, created_at
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
        let row = sqlx::query(query)
            .bind(id)
            .bind(&fields.name)
            .bind(fields.description.as_deref())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PredictionRepository for PgStore {
    async fn insert(&self, prediction: &NewPrediction) -> Result<Prediction, StoreError> {
        let query = r"
            INSERT INTO predictions (user_id, features, pred_label, pred_confidence)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, features, pred_label, pred_confidence, created_at
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        let row = sqlx::query(query)
            .bind(prediction.user_id)
            .bind(Json(&prediction.features))
            .bind(&prediction.pred_label)
            .bind(prediction.pred_confidence)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        let Json(features): Json<IrisFeatures> = row.try_get("features")?;
        Ok(Prediction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            features,
            pred_label: row.try_get("pred_label")?,
            pred_confidence: row.try_get("pred_confidence")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
