//! Redis-backed caches for the fan-out pipeline
//!
//! - Inbox cache: bounded sorted sets (score = creation time in ms) for private
//!   inboxes and celebrity public timelines
//! - Follower count cache: lazily filled counts used by the celebrity classifier

pub mod follower_count;
pub mod inbox;
pub mod keys;

pub use follower_count::{FollowerCountCache, RedisFollowerCountCache};
pub use inbox::{InboxStore, RedisInboxCache};
pub use keys::InboxKey;

use redis::aio::ConnectionManager;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid cache data in {key}: {reason}")]
    InvalidData { key: String, reason: String },

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Open a managed, auto-reconnecting Redis connection
pub async fn connect(redis_url: &str) -> CacheResult<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}

/// Ping Redis; used by the health endpoint
pub async fn ping(conn: &ConnectionManager) -> CacheResult<()> {
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn.clone())
        .await
        .map_err(|e| {
            warn!("Redis PING failed: {}", e);
            CacheError::Redis(e)
        })?;
    Ok(())
}
