use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::users::repo_types::User;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("insert user: {0}")]
    Insert(#[source] sqlx::Error),
    #[error("select user: {0}")]
    Select(#[source] sqlx::Error),
    #[error("update user: {0}")]
    Update(#[source] sqlx::Error),
}

/// Storage primitives for users. No business rules live here.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new row carrying every attribute of `user`.
    async fn create(&self, user: &User) -> Result<(), StoreError>;
    /// `Ok(None)` when no row matches; errors are reserved for storage failures.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Overwrite the mutable columns of the row matching `user.id`.
    /// Zero affected rows is not an error here; callers load the row first.
    async fn update(&self, user: &User) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(StoreError::Insert)?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, password, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(StoreError::Select)?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn update(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET first_name = $1, last_name = $2, email = $3, password = $4, updated_at = $5
             WHERE id = $6
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&self.db)
        .await
        .map_err(StoreError::Update)?;
        Ok(())
    }
}
