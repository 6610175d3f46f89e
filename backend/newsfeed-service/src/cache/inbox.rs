//! Bounded inbox sorted sets
//!
//! Every write is `ZADD key score postId` followed by
//! `ZREMRANGEBYRANK key 0 -(N+1)` inside one MULTI/EXEC, which keeps only the
//! newest N members.
//! Re-adding an existing post id with the same score is a no-op, so replayed
//! events leave the set unchanged.
//!
//! Reads walk from newest to oldest with `ZREVRANGEBYSCORE`, using an exclusive
//! upper bound `(cursor` for every page after the first.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use uuid::Uuid;

use super::keys::InboxKey;
use super::{CacheError, CacheResult};
use crate::models::InboxEntry;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Add entries to one key and trim it to capacity.
    async fn append_entries(&self, key: &InboxKey, entries: &[InboxEntry]) -> CacheResult<()>;

    /// Add one entry to many keys in a single transactional round trip, trimming each.
    ///
    /// Fails as a whole; callers that need per-key isolation fall back to
    /// `append_entries` for each key.
    async fn fan_out_entry(&self, keys: &[InboxKey], entry: InboxEntry) -> CacheResult<()>;

    /// Newest-first entries with score strictly below `before` (all when `None`).
    async fn read_page(
        &self,
        key: &InboxKey,
        before: Option<i64>,
        limit: usize,
    ) -> CacheResult<Vec<InboxEntry>>;

    /// `read_page` against several keys in one pipelined call; one result per key, in order.
    async fn read_many_paged(
        &self,
        keys: &[InboxKey],
        before: Option<i64>,
        limit_per_key: usize,
    ) -> CacheResult<Vec<Vec<InboxEntry>>>;
}

/// Redis implementation of [`InboxStore`]
#[derive(Clone)]
pub struct RedisInboxCache {
    conn: ConnectionManager,
    capacity: usize,
}

impl RedisInboxCache {
    pub fn new(conn: ConnectionManager, capacity: usize) -> Self {
        Self { conn, capacity }
    }
}

/// One MULTI/EXEC transaction adding `entries` to every key and trimming each to
/// `capacity`, so no reader observes a key above capacity.
fn write_pipeline(capacity: usize, keys: &[String], entries: &[InboxEntry]) -> redis::Pipeline {
    let trim_stop = -(capacity as isize + 1);
    let mut pipe = redis::pipe();
    pipe.atomic();

    for key in keys {
        let mut zadd = redis::cmd("ZADD");
        zadd.arg(key);
        for entry in entries {
            zadd.arg(entry.score).arg(entry.post_id.to_string());
        }
        pipe.add_command(zadd).ignore();
        pipe.cmd("ZREMRANGEBYRANK")
            .arg(key)
            .arg(0)
            .arg(trim_stop)
            .ignore();
    }
    pipe
}

fn range_cmd(key: &str, before: Option<i64>, limit: usize) -> redis::Cmd {
    let max = match before {
        Some(cursor) => format!("({}", cursor),
        None => "+inf".to_string(),
    };

    let mut cmd = redis::cmd("ZREVRANGEBYSCORE");
    cmd.arg(key)
        .arg(max)
        .arg("-inf")
        .arg("WITHSCORES")
        .arg("LIMIT")
        .arg(0)
        .arg(limit);
    cmd
}

/// Decode a flat `member, score, member, score, ...` reply.
pub(crate) fn parse_scored_members(key: &str, raw: Vec<String>) -> CacheResult<Vec<InboxEntry>> {
    if raw.len() % 2 != 0 {
        return Err(CacheError::InvalidData {
            key: key.to_string(),
            reason: format!("odd WITHSCORES reply length {}", raw.len()),
        });
    }

    raw.chunks_exact(2)
        .map(|pair| {
            let post_id = Uuid::parse_str(&pair[0]).map_err(|e| CacheError::InvalidData {
                key: key.to_string(),
                reason: format!("member '{}' is not a post id: {}", pair[0], e),
            })?;
            let score = parse_score(&pair[1]).ok_or_else(|| CacheError::InvalidData {
                key: key.to_string(),
                reason: format!("score '{}' is not a timestamp", pair[1]),
            })?;
            Ok(InboxEntry::new(post_id, score))
        })
        .collect()
}

fn parse_score(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    // Redis may format large scores in exponent form
    let v = raw.parse::<f64>().ok()?;
    if v.is_finite() {
        Some(v.round() as i64)
    } else {
        None
    }
}

#[async_trait]
impl InboxStore for RedisInboxCache {
    async fn append_entries(&self, key: &InboxKey, entries: &[InboxEntry]) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let key = key.to_string();
        let pipe = write_pipeline(self.capacity, std::slice::from_ref(&key), entries);

        pipe.query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| {
                warn!("Redis inbox write failed for {}: {}", key, e);
                CacheError::Redis(e)
            })?;

        debug!("Appended {} entries to {}", entries.len(), key);
        Ok(())
    }

    async fn fan_out_entry(&self, keys: &[InboxKey], entry: InboxEntry) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
        let pipe = write_pipeline(self.capacity, &names, std::slice::from_ref(&entry));

        pipe.query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| {
                warn!(
                    post_id = %entry.post_id,
                    keys = keys.len(),
                    "Redis fan-out pipeline failed: {}", e
                );
                CacheError::Redis(e)
            })?;

        debug!(post_id = %entry.post_id, keys = keys.len(), "Fan-out pipeline written");
        Ok(())
    }

    async fn read_page(
        &self,
        key: &InboxKey,
        before: Option<i64>,
        limit: usize,
    ) -> CacheResult<Vec<InboxEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = key.to_string();
        let raw: Vec<String> = range_cmd(&key, before, limit)
            .query_async(&mut self.conn.clone())
            .await?;

        parse_scored_members(&key, raw)
    }

    async fn read_many_paged(
        &self,
        keys: &[InboxKey],
        before: Option<i64>,
        limit_per_key: usize,
    ) -> CacheResult<Vec<Vec<InboxEntry>>> {
        if keys.is_empty() || limit_per_key == 0 {
            return Ok(vec![Vec::new(); keys.len()]);
        }

        let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
        let mut pipe = redis::pipe();
        for name in &names {
            pipe.add_command(range_cmd(name, before, limit_per_key));
        }

        let replies: Vec<Vec<String>> = pipe.query_async(&mut self.conn.clone()).await?;

        names
            .iter()
            .zip(replies)
            .map(|(name, raw)| parse_scored_members(name, raw))
            .collect()
    }
}
