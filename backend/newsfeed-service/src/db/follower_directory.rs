use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// Durable store of follow edges
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FollowerDirectory: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool>;

    /// Exact number of followers of `user_id`
    async fn follower_count(&self, user_id: Uuid) -> Result<u64>;

    /// Every follower of `user_id`
    async fn follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Accounts followed by `user_id` that have at least `threshold` followers
    async fn celebrities_followed_by(&self, user_id: Uuid, threshold: u64) -> Result<Vec<Uuid>>;
}

pub struct PgFollowerDirectory {
    pool: PgPool,
}

impl PgFollowerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowerDirectory for PgFollowerDirectory {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn follower_count(&self, user_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM followers WHERE followee_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT follower_id FROM followers WHERE followee_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn celebrities_followed_by(&self, user_id: Uuid, threshold: u64) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT f.followee_id
            FROM followers f
            WHERE f.follower_id = $1
              AND (
                SELECT COUNT(*) FROM followers c WHERE c.followee_id = f.followee_id
              ) >= $2
            "#,
        )
        .bind(user_id)
        .bind(threshold as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
