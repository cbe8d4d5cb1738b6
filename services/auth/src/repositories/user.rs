//! User repository for database operations

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, UpdateProfile, User};

/// The username or email was taken between the availability check and the insert
#[derive(Debug, thiserror::Error)]
#[error("username or email already registered")]
pub struct DuplicateUser;

/// Persistence of user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user; a taken username or email fails with [`DuplicateUser`]
    async fn create(&self, new_user: &NewUser) -> Result<User>;

    /// Find a user by username or email (case-insensitive for email)
    async fn find_by_username_or_email(&self, username_or_email: &str) -> Result<Option<User>>;

    /// Find a user by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Whether the username or the email is already taken
    async fn exists(&self, username: &str, email: &str) -> Result<bool>;

    /// Apply a profile update, returning the updated user
    async fn update_profile(&self, id: Uuid, update: &UpdateProfile) -> Result<Option<User>>;

    /// Replace the stored password hash
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;
}

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, bio, \
     is_active, created_at, updated_at";

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        bio: row.get("bio"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
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
    async fn create(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new user: {}", new_user.username);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => anyhow::Error::new(DuplicateUser),
            _ => anyhow::Error::new(e),
        })?;

        Ok(user_from_row(&row))
    }

    async fn find_by_username_or_email(&self, username_or_email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE username = $1 OR LOWER(email) = LOWER($1)
            "#
        ))
        .bind(username_or_email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn exists(&self, username: &str, email: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users WHERE username = $1 OR LOWER(email) = LOWER($2)
            ) AS taken
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("taken"))
    }

    async fn update_profile(&self, id: Uuid, update: &UpdateProfile) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                bio = COALESCE($4, bio),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.bio)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        info!("Password changed for user {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod memory {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Users kept in a map, for router tests
    #[derive(Clone, Default)]
    pub struct MemoryUserRepository {
        users: Arc<Mutex<HashMap<Uuid, User>>>,
    }

    impl MemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl UserRepository for MemoryUserRepository {
        async fn create(&self, new_user: &NewUser) -> Result<User> {
            let mut users = self.users.lock().await;
            if users.values().any(|u| {
                u.username == new_user.username || u.email.eq_ignore_ascii_case(&new_user.email)
            }) {
                return Err(DuplicateUser.into());
            }

            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4(),
                username: new_user.username.clone(),
                email: new_user.email.clone(),
                password_hash: new_user.password_hash.clone(),
                first_name: new_user.first_name.clone(),
                last_name: new_user.last_name.clone(),
                bio: String::new(),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn find_by_username_or_email(
            &self,
            username_or_email: &str,
        ) -> Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .await
                .values()
                .find(|u| {
                    u.username == username_or_email
                        || u.email.eq_ignore_ascii_case(username_or_email)
                })
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
            Ok(self.users.lock().await.get(&id).cloned())
        }

        async fn exists(&self, username: &str, email: &str) -> Result<bool> {
            Ok(self
                .users
                .lock()
                .await
                .values()
                .any(|u| u.username == username || u.email.eq_ignore_ascii_case(email)))
        }

        async fn update_profile(&self, id: Uuid, update: &UpdateProfile) -> Result<Option<User>> {
            let mut users = self.users.lock().await;
            let Some(user) = users.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(first_name) = &update.first_name {
                user.first_name = first_name.clone();
            }
            if let Some(last_name) = &update.last_name {
                user.last_name = last_name.clone();
            }
            if let Some(bio) = &update.bio {
                user.bio = bio.clone();
            }
            user.updated_at = Utc::now();
            Ok(Some(user.clone()))
        }

        async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
            if let Some(user) = self.users.lock().await.get_mut(&id) {
                user.password_hash = password_hash.to_string();
            }
            Ok(())
        }
    }
}

#[cfg(test)]
pub use memory::MemoryUserRepository;
