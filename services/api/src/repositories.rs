//! Repositories for database operations

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Read access to user accounts owned by the auth service
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Account creation time, `None` for unknown users
    async fn member_since(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>>;
}

/// User repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn member_since(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT created_at
            FROM users
            WHERE id = $1 AND is_active
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("created_at")))
    }
}
