//! In-memory fakes of the store, cache and broker seams
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use event_schema::{DeadLetterRecord, PostCreatedEvent};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use newsfeed_service::cache::{CacheError, CacheResult, FollowerCountCache, InboxKey, InboxStore};
use newsfeed_service::config::FeedConfig;
use newsfeed_service::db::{FollowerDirectory, PostStore};
use newsfeed_service::error::{AppError, Result};
use newsfeed_service::kafka::{DeadLetterSink, PostEventPublisher};
use newsfeed_service::models::{InboxEntry, NewPost, PostAuthor, PostDetail};
use newsfeed_service::services::{CelebrityClassifier, FanoutOutcome, FanoutService, TimelineService};
use resilience::RetryConfig;

pub const THRESHOLD: u64 = 1000;
pub const BASE_TS: i64 = 1_700_000_000_000;

/// Sorted sets with Redis ordering and trim semantics
pub struct MemoryInbox {
    sets: Mutex<HashMap<String, HashMap<Uuid, i64>>>,
    capacity: usize,
    writes: Mutex<HashMap<String, usize>>,
    failing_keys: Mutex<HashSet<String>>,
    batch_down: Mutex<bool>,
}

impl MemoryInbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
            capacity,
            writes: Mutex::new(HashMap::new()),
            failing_keys: Mutex::new(HashSet::new()),
            batch_down: Mutex::new(false),
        }
    }

    pub fn fail_key(&self, key: &InboxKey) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn set_batch_down(&self, down: bool) {
        *self.batch_down.lock().unwrap() = down;
    }

    pub fn entries(&self, key: &InboxKey) -> Vec<InboxEntry> {
        let sets = self.sets.lock().unwrap();
        let mut entries: Vec<InboxEntry> = sets
            .get(&key.to_string())
            .map(|set| set.iter().map(|(id, s)| InboxEntry::new(*id, *s)).collect())
            .unwrap_or_default();
        sort_desc(&mut entries);
        entries
    }

    pub fn count_of(&self, key: &InboxKey, post_id: Uuid) -> usize {
        self.entries(key)
            .iter()
            .filter(|e| e.post_id == post_id)
            .count()
    }

    /// Writes to keys of the form `inbox:private:*`
    pub fn private_writes(&self) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with("inbox:private:"))
            .map(|(_, n)| *n)
            .sum()
    }

    fn write(&self, key: &InboxKey, entries: &[InboxEntry]) -> CacheResult<()> {
        let name = key.to_string();
        if self.failing_keys.lock().unwrap().contains(&name) {
            return Err(CacheError::Unavailable(format!("{} unreachable", name)));
        }

        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(name.clone()).or_default();
        for entry in entries {
            set.insert(entry.post_id, entry.score);
        }

        // ZREMRANGEBYRANK key 0 -(N+1): drop the lowest ranks beyond capacity
        if set.len() > self.capacity {
            let mut ranked: Vec<(i64, String, Uuid)> = set
                .iter()
                .map(|(id, score)| (*score, id.to_string(), *id))
                .collect();
            ranked.sort();
            let excess = ranked.len() - self.capacity;
            for (_, _, id) in ranked.into_iter().take(excess) {
                set.remove(&id);
            }
        }

        *self.writes.lock().unwrap().entry(name).or_default() += 1;
        Ok(())
    }

    fn read(&self, key: &InboxKey, before: Option<i64>, limit: usize) -> Vec<InboxEntry> {
        let mut entries: Vec<InboxEntry> = self
            .entries(key)
            .into_iter()
            .filter(|e| before.map_or(true, |b| e.score < b))
            .collect();
        entries.truncate(limit);
        entries
    }
}

fn sort_desc(entries: &mut [InboxEntry]) {
    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.post_id.to_string().cmp(&a.post_id.to_string()))
    });
}

#[async_trait]
impl InboxStore for MemoryInbox {
    async fn append_entries(&self, key: &InboxKey, entries: &[InboxEntry]) -> CacheResult<()> {
        self.write(key, entries)
    }

    async fn fan_out_entry(&self, keys: &[InboxKey], entry: InboxEntry) -> CacheResult<()> {
        if *self.batch_down.lock().unwrap() {
            return Err(CacheError::Unavailable("pipeline down".into()));
        }
        let failing = self.failing_keys.lock().unwrap().clone();
        if keys.iter().any(|k| failing.contains(&k.to_string())) {
            return Err(CacheError::Unavailable("pipeline error".into()));
        }
        for key in keys {
            self.write(key, &[entry])?;
        }
        Ok(())
    }

    async fn read_page(
        &self,
        key: &InboxKey,
        before: Option<i64>,
        limit: usize,
    ) -> CacheResult<Vec<InboxEntry>> {
        Ok(self.read(key, before, limit))
    }

    async fn read_many_paged(
        &self,
        keys: &[InboxKey],
        before: Option<i64>,
        limit_per_key: usize,
    ) -> CacheResult<Vec<Vec<InboxEntry>>> {
        Ok(keys
            .iter()
            .map(|k| self.read(k, before, limit_per_key))
            .collect())
    }
}

/// Users and follow edges
#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<HashSet<Uuid>>,
    /// followee -> followers
    followers: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    pub count_queries: AtomicUsize,
}

impl MemoryDirectory {
    pub fn add_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.users.lock().unwrap().insert(id);
        id
    }

    pub fn follow(&self, follower: Uuid, followee: Uuid) {
        let mut followers = self.followers.lock().unwrap();
        let list = followers.entry(followee).or_default();
        if !list.contains(&follower) {
            list.push(follower);
        }
    }

    /// Create `n` users who all follow `followee`
    pub fn add_followers(&self, followee: Uuid, n: usize) -> Vec<Uuid> {
        (0..n)
            .map(|_| {
                let f = self.add_user();
                self.follow(f, followee);
                f
            })
            .collect()
    }
}

#[async_trait]
impl FollowerDirectory for MemoryDirectory {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.users.lock().unwrap().contains(&user_id))
    }

    async fn follower_count(&self, user_id: Uuid) -> Result<u64> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .followers
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|f| f.len() as u64)
            .unwrap_or(0))
    }

    async fn follower_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .followers
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn celebrities_followed_by(&self, user_id: Uuid, threshold: u64) -> Result<Vec<Uuid>> {
        Ok(self
            .followers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, f)| f.len() as u64 >= threshold && f.contains(&user_id))
            .map(|(followee, _)| *followee)
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryCounts {
    counts: Mutex<HashMap<Uuid, u64>>,
}

impl MemoryCounts {
    pub fn preset(&self, user_id: Uuid, count: u64) {
        self.counts.lock().unwrap().insert(user_id, count);
    }
}

#[async_trait]
impl FollowerCountCache for MemoryCounts {
    async fn get(&self, user_id: Uuid) -> CacheResult<Option<u64>> {
        Ok(self.counts.lock().unwrap().get(&user_id).copied())
    }

    async fn set(&self, user_id: Uuid, count: u64) -> CacheResult<()> {
        self.counts.lock().unwrap().insert(user_id, count);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPosts {
    posts: Mutex<HashMap<Uuid, PostDetail>>,
    next_ts: Mutex<i64>,
}

impl MemoryPosts {
    pub fn insert(&self, author: Uuid, score: i64) -> PostDetail {
        let post = PostDetail {
            id: Uuid::new_v4(),
            content: format!("post at {}", score),
            photo_url: None,
            user: PostAuthor {
                id: author,
                handle: format!("user-{}", &author.to_string()[..8]),
            },
            created_at: Utc
                .timestamp_millis_opt(score)
                .single()
                .expect("valid timestamp"),
        };
        self.posts.lock().unwrap().insert(post.id, post.clone());
        post
    }

    pub fn delete(&self, post_id: Uuid) {
        self.posts.lock().unwrap().remove(&post_id);
    }
}

#[async_trait]
impl PostStore for MemoryPosts {
    async fn create_post(&self, author_id: Uuid, post: NewPost) -> Result<PostDetail> {
        let score = {
            let mut next = self.next_ts.lock().unwrap();
            *next += 1;
            BASE_TS + *next
        };
        let mut detail = self.insert(author_id, score);
        detail.content = post.content;
        detail.photo_url = post.photo_url;
        self.posts.lock().unwrap().insert(detail.id, detail.clone());
        Ok(detail)
    }

    async fn get_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostDetail>> {
        let posts = self.posts.lock().unwrap();
        // Reverse order so callers cannot rely on store ordering
        Ok(ids.iter().rev().filter_map(|id| posts.get(id).cloned()).collect())
    }
}

#[derive(Default)]
pub struct MemoryDeadLetters {
    pub records: Mutex<Vec<DeadLetterRecord>>,
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetters {
    async fn send(&self, record: DeadLetterRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPublisher {
    pub events: Mutex<Vec<PostCreatedEvent>>,
    pub failures_left: AtomicUsize,
}

#[async_trait]
impl PostEventPublisher for MemoryPublisher {
    async fn publish(&self, event: &PostCreatedEvent) -> Result<()> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(AppError::Kafka("leader not available".into()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Fan-out and timeline wired to shared in-memory backends
pub struct Harness {
    pub directory: Arc<MemoryDirectory>,
    pub counts: Arc<MemoryCounts>,
    pub inbox: Arc<MemoryInbox>,
    pub posts: Arc<MemoryPosts>,
    pub dead_letters: Arc<MemoryDeadLetters>,
    pub fanout: FanoutService,
    pub timeline: TimelineService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(500, FeedConfig::default())
    }

    pub fn with_config(capacity: usize, feed: FeedConfig) -> Self {
        let directory = Arc::new(MemoryDirectory::default());
        let counts = Arc::new(MemoryCounts::default());
        let inbox = Arc::new(MemoryInbox::new(capacity));
        let posts = Arc::new(MemoryPosts::default());
        let dead_letters = Arc::new(MemoryDeadLetters::default());

        let classifier = Arc::new(CelebrityClassifier::new(
            counts.clone(),
            directory.clone(),
            THRESHOLD,
        ));
        let fanout = FanoutService::new(
            classifier,
            directory.clone(),
            inbox.clone(),
            dead_letters.clone(),
            RetryConfig::fixed(2, Duration::from_millis(1)),
            "new_posts",
        );
        let timeline = TimelineService::new(
            directory.clone(),
            inbox.clone(),
            posts.clone(),
            feed,
            THRESHOLD,
        );

        Self {
            directory,
            counts,
            inbox,
            posts,
            dead_letters,
            fanout,
            timeline,
        }
    }

    /// Store a post and deliver its post-created event once
    pub async fn post(&self, author: Uuid, score: i64) -> Uuid {
        let post = self.posts.insert(author, score);
        self.deliver(&PostCreatedEvent::new(post.id, author, post.created_at))
            .await;
        post.id
    }

    pub async fn deliver(&self, event: &PostCreatedEvent) -> FanoutOutcome {
        let payload = event.to_payload().expect("encodable event");
        self.fanout
            .handle_payload(&payload, Some(&event.key()), None)
            .await
    }
}
