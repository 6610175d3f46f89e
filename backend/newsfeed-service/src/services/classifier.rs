/// Celebrity classification
///
/// Decides whether an author's posts are pushed to every follower inbox or left
/// in the author's public timeline to be pulled at read time. The follower count
/// comes from the cache; a miss recomputes it from the directory and stores it.
/// Counts never expire, so a classification may lag the true follower count.
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::FollowerCountCache;
use crate::db::FollowerDirectory;
use crate::error::Result;

/// How a post is propagated
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// Written into every follower's private inbox
    Push,
    /// Written once into the author's public timeline
    Pull,
}

pub struct CelebrityClassifier {
    counts: Arc<dyn FollowerCountCache>,
    directory: Arc<dyn FollowerDirectory>,
    threshold: u64,
}

impl CelebrityClassifier {
    pub fn new(
        counts: Arc<dyn FollowerCountCache>,
        directory: Arc<dyn FollowerDirectory>,
        threshold: u64,
    ) -> Self {
        Self {
            counts,
            directory,
            threshold,
        }
    }

    /// Follower count, from cache or recomputed on a miss
    pub async fn follower_count(&self, user_id: Uuid) -> Result<u64> {
        if let Some(count) = self.counts.get(user_id).await? {
            return Ok(count);
        }

        let count = self.directory.follower_count(user_id).await?;

        // Concurrent misses may both write; the value is the same either way.
        if let Err(e) = self.counts.set(user_id, count).await {
            warn!(user_id = %user_id, error = %e, "Failed to cache follower count");
        }

        debug!(user_id = %user_id, count, "Follower count recomputed");
        Ok(count)
    }

    pub async fn is_celebrity(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.follower_count(user_id).await? >= self.threshold)
    }

    pub async fn classify(&self, user_id: Uuid) -> Result<FanoutMode> {
        Ok(if self.is_celebrity(user_id).await? {
            FanoutMode::Pull
        } else {
            FanoutMode::Push
        })
    }
}
