use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;
use uuid::Uuid;

use super::keys::{user_hash, FOLLOWER_COUNT_FIELD};
use super::{CacheError, CacheResult};

/// Follower counts cached without expiry; refreshed only on a miss.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FollowerCountCache: Send + Sync {
    async fn get(&self, user_id: Uuid) -> CacheResult<Option<u64>>;
    async fn set(&self, user_id: Uuid, count: u64) -> CacheResult<()>;
}

#[derive(Clone)]
pub struct RedisFollowerCountCache {
    conn: ConnectionManager,
}

impl RedisFollowerCountCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FollowerCountCache for RedisFollowerCountCache {
    async fn get(&self, user_id: Uuid) -> CacheResult<Option<u64>> {
        let key = user_hash(user_id);
        let raw: Option<String> = redis::cmd("HGET")
            .arg(&key)
            .arg(FOLLOWER_COUNT_FIELD)
            .query_async(&mut self.conn.clone())
            .await?;

        match raw {
            // A cached zero is still a hit
            Some(value) => value
                .parse::<u64>()
                .map(Some)
                .map_err(|_| CacheError::InvalidData {
                    key,
                    reason: format!("followerCount '{}' is not a count", value),
                }),
            None => {
                debug!(user_id = %user_id, "Follower count cache miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, user_id: Uuid, count: u64) -> CacheResult<()> {
        redis::cmd("HSET")
            .arg(user_hash(user_id))
            .arg(FOLLOWER_COUNT_FIELD)
            .arg(count)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }
}
