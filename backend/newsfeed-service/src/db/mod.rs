//! Durable store adapters
//!
//! The service only needs a handful of lookups from the relational store, so each
//! concern sits behind a small trait with a PostgreSQL implementation.
//!
//! Expected tables:
//! - `users(id, handle)`
//! - `posts(id, user_id, content, photo_url, created_at)`
//! - `followers(follower_id, followee_id)` with a unique pair

pub mod follower_directory;
pub mod post_store;

pub use follower_directory::{FollowerDirectory, PgFollowerDirectory};
pub use post_store::{PgPostStore, PostStore};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::DatabaseConfig;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.url)
        .await
}
