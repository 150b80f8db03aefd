use crate::domain::error::DomainError;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info};

/// Follow edges. The schema allows duplicate `(user, author)` rows; callers
/// go through [`FollowRepository::insert_if_absent`] to avoid creating them.
#[async_trait]
pub trait FollowRepository: Send + Sync {
    /// Inserts the edge unless one already exists. Returns whether a row was added.
    async fn insert_if_absent(&self, user_id: i64, author_id: i64) -> Result<bool, DomainError>;
    /// Removes every `(user, author)` edge and returns how many there were.
    async fn delete_all(&self, user_id: i64, author_id: i64) -> Result<u64, DomainError>;
    async fn exists(&self, user_id: i64, author_id: i64) -> Result<bool, DomainError>;
    async fn count_followers(&self, author_id: i64) -> Result<i64, DomainError>;
    async fn count_following(&self, user_id: i64) -> Result<i64, DomainError>;
}

#[derive(Clone)]
pub struct PostgresFollowRepository {
    pool: PgPool,
}

impl PostgresFollowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowRepository for PostgresFollowRepository {
    async fn insert_if_absent(&self, user_id: i64, author_id: i64) -> Result<bool, DomainError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO follows (user_id, author_id)
            SELECT $1, $2
            WHERE NOT EXISTS (
                SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(author_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to insert follow {} -> {}: {}", user_id, author_id, e);
            DomainError::Internal(format!("database error: {}", e))
        })?;

        let created = inserted.rows_affected() > 0;
        if created {
            info!(user_id, author_id, "follow created");
        }
        Ok(created)
    }

    async fn delete_all(&self, user_id: i64, author_id: i64) -> Result<u64, DomainError> {
        let deleted = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("failed to delete follow {} -> {}: {}", user_id, author_id, e);
                DomainError::Internal(e.to_string())
            })?;

        if deleted.rows_affected() > 0 {
            info!(user_id, author_id, "follow removed");
        }
        Ok(deleted.rows_affected())
    }

    async fn exists(&self, user_id: i64, author_id: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::Internal(e.to_string()))
    }

    async fn count_followers(&self, author_id: i64) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(e.to_string()))
    }

    async fn count_following(&self, user_id: i64) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(e.to_string()))
    }
}
