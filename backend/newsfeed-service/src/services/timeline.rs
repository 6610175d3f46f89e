/// Timeline assembly
///
/// A page is built from the reader's private inbox plus the public timeline of
/// every celebrity they follow and the reader's own public timeline, so a
/// celebrity sees their own posts. The sources are read concurrently, merged by post
/// id (higher score wins), sorted newest first, cut to the page size and then
/// hydrated from the post store in that order.
///
/// Per-source limits may be smaller than the page size. A source that returned
/// exactly its limit may hold older entries that were not read, so anything older
/// than that source's oldest returned entry is held back for the next page.
/// Without this, a small k1/k2 would let the next cursor jump past unread entries.
///
/// Cursors are exclusive: the next page starts strictly below the last score.
/// Posts sharing the exact boundary score can therefore be skipped between pages.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};
use uuid::Uuid;

use crate::cache::{InboxKey, InboxStore};
use crate::config::FeedConfig;
use crate::db::{FollowerDirectory, PostStore};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{FeedResponse, InboxEntry, PostDetail};

/// Entries read from one source together with the limit used for the read
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub entries: Vec<InboxEntry>,
    pub limit: usize,
}

impl SourcePage {
    pub fn new(entries: Vec<InboxEntry>, limit: usize) -> Self {
        Self { entries, limit }
    }

    /// The source may hold more entries than were read
    fn is_saturated(&self) -> bool {
        self.limit > 0 && self.entries.len() >= self.limit
    }

    fn oldest_score(&self) -> Option<i64> {
        self.entries.iter().map(|e| e.score).min()
    }
}

/// Merged, ordered page of entries before hydration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedPage {
    pub entries: Vec<InboxEntry>,
    pub next_cursor: Option<i64>,
}

/// Merge source pages into one page of at most `page_size` entries.
pub fn merge_sources(sources: &[SourcePage], page_size: usize) -> MergedPage {
    let mut merged: HashMap<Uuid, i64> = HashMap::new();
    for entry in sources.iter().flat_map(|s| s.entries.iter()) {
        merged
            .entry(entry.post_id)
            .and_modify(|score| *score = (*score).max(entry.score))
            .or_insert(entry.score);
    }

    let frontier = sources
        .iter()
        .filter(|s| s.is_saturated())
        .filter_map(SourcePage::oldest_score)
        .max();

    let mut entries: Vec<InboxEntry> = merged
        .into_iter()
        .map(|(post_id, score)| InboxEntry::new(post_id, score))
        .filter(|e| frontier.map_or(true, |f| e.score >= f))
        .collect();

    // Newest first; post id breaks ties so equal scores order deterministically
    entries.sort_by(|a, b| b.score.cmp(&a.score).then(b.post_id.cmp(&a.post_id)));
    entries.truncate(page_size);

    let may_have_more = entries.len() == page_size || frontier.is_some();
    let next_cursor = if may_have_more {
        entries.last().map(|e| e.score)
    } else {
        None
    };

    MergedPage {
        entries,
        next_cursor,
    }
}

/// Reorder hydrated posts to match `order`, dropping ids the store did not return.
pub fn order_posts(order: &[InboxEntry], posts: Vec<PostDetail>) -> Vec<PostDetail> {
    let mut by_id: HashMap<Uuid, PostDetail> = posts.into_iter().map(|p| (p.id, p)).collect();
    order
        .iter()
        .filter_map(|entry| by_id.remove(&entry.post_id))
        .collect()
}

pub struct TimelineService {
    directory: Arc<dyn FollowerDirectory>,
    inbox: Arc<dyn InboxStore>,
    posts: Arc<dyn PostStore>,
    config: FeedConfig,
    celebrity_threshold: u64,
}

impl TimelineService {
    pub fn new(
        directory: Arc<dyn FollowerDirectory>,
        inbox: Arc<dyn InboxStore>,
        posts: Arc<dyn PostStore>,
        config: FeedConfig,
        celebrity_threshold: u64,
    ) -> Self {
        Self {
            directory,
            inbox,
            posts,
            config,
            celebrity_threshold,
        }
    }

    pub fn default_page_size(&self) -> usize {
        self.config.page_size
    }

    /// Assemble one feed page for `user_id`, older than `cursor` when given.
    pub async fn get_feed(
        &self,
        user_id: Uuid,
        cursor: Option<i64>,
        page_size: usize,
    ) -> Result<FeedResponse> {
        let started = Instant::now();
        let result = self.assemble(user_id, cursor, page_size).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AppError::UserNotFound(_)) => "not_found",
            Err(_) => "error",
        };
        metrics::observe_feed_request(outcome, started.elapsed());

        result
    }

    async fn assemble(
        &self,
        user_id: Uuid,
        cursor: Option<i64>,
        page_size: usize,
    ) -> Result<FeedResponse> {
        let exists = self
            .directory
            .user_exists(user_id)
            .await
            .map_err(|e| feed_unavailable("user lookup", e))?;
        if !exists {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }

        let celebrities = self
            .directory
            .celebrities_followed_by(user_id, self.celebrity_threshold)
            .await
            .map_err(|e| feed_unavailable("celebrity lookup", e))?;
        let celebrity_keys: Vec<InboxKey> = celebrities
            .into_iter()
            .filter(|id| *id != user_id)
            .chain(std::iter::once(user_id))
            .map(InboxKey::CelebrityPublic)
            .collect();

        let k1 = self.config.private_inbox_limit;
        let k2 = self.config.celebrity_timeline_limit;
        let private_key = InboxKey::Private(user_id);

        let (private, public) = tokio::try_join!(
            self.inbox.read_page(&private_key, cursor, k1),
            self.inbox.read_many_paged(&celebrity_keys, cursor, k2),
        )
        .map_err(|e| feed_unavailable("inbox read", e))?;

        let mut sources = Vec::with_capacity(public.len() + 1);
        sources.push(SourcePage::new(private, k1));
        sources.extend(public.into_iter().map(|entries| SourcePage::new(entries, k2)));

        let page = merge_sources(&sources, page_size);

        debug!(
            user_id = %user_id,
            public_sources = celebrity_keys.len(),
            entries = page.entries.len(),
            next_cursor = ?page.next_cursor,
            "Merged feed sources"
        );

        if page.entries.is_empty() {
            return Ok(FeedResponse {
                next_cursor: page.next_cursor,
                posts: Vec::new(),
            });
        }

        let ids: Vec<Uuid> = page.entries.iter().map(|e| e.post_id).collect();
        let hydrated = self
            .posts
            .get_posts_by_ids(&ids)
            .await
            .map_err(|e| feed_unavailable("post hydration", e))?;

        Ok(FeedResponse {
            next_cursor: page.next_cursor,
            posts: order_posts(&page.entries, hydrated),
        })
    }
}

fn feed_unavailable(stage: &str, err: impl std::fmt::Display) -> AppError {
    error!(stage, error = %err, "Feed assembly failed");
    AppError::FeedUnavailable(format!("{}: {}", stage, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u128, score: i64) -> InboxEntry {
        InboxEntry::new(Uuid::from_u128(n), score)
    }

    fn ids(page: &MergedPage) -> Vec<u128> {
        page.entries.iter().map(|e| e.post_id.as_u128()).collect()
    }

    #[test]
    fn test_merge_orders_newest_first() {
        let sources = vec![
            SourcePage::new(vec![entry(1, 300), entry(2, 100)], 10),
            SourcePage::new(vec![entry(3, 200)], 10),
        ];

        let page = merge_sources(&sources, 10);
        assert_eq!(ids(&page), vec![1, 3, 2]);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_duplicate_post_keeps_higher_score() {
        let sources = vec![
            SourcePage::new(vec![entry(1, 100)], 10),
            SourcePage::new(vec![entry(1, 250), entry(2, 200)], 10),
        ];

        let page = merge_sources(&sources, 10);
        assert_eq!(page.entries, vec![entry(1, 250), entry(2, 200)]);
    }

    #[test]
    fn test_full_page_sets_cursor() {
        let sources = vec![SourcePage::new(
            vec![entry(1, 500), entry(2, 400), entry(3, 300)],
            10,
        )];

        let page = merge_sources(&sources, 2);
        assert_eq!(ids(&page), vec![1, 2]);
        assert_eq!(page.next_cursor, Some(400));
    }

    #[test]
    fn test_saturated_source_holds_back_older_entries() {
        // The inbox returned its full limit of 2; the celebrity timeline has an
        // entry older than anything the inbox returned.
        let sources = vec![
            SourcePage::new(vec![entry(1, 500), entry(2, 400)], 2),
            SourcePage::new(vec![entry(3, 450), entry(4, 100)], 10),
        ];

        let page = merge_sources(&sources, 10);
        assert_eq!(ids(&page), vec![1, 3, 2]);
        assert_eq!(page.next_cursor, Some(400));
    }

    #[test]
    fn test_empty_sources() {
        let page = merge_sources(&[SourcePage::new(vec![], 10)], 10);
        assert!(page.entries.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_order_posts_drops_missing() {
        use crate::models::PostAuthor;
        use chrono::Utc;

        let post = |n: u128| PostDetail {
            id: Uuid::from_u128(n),
            content: format!("post {}", n),
            photo_url: None,
            user: PostAuthor {
                id: Uuid::nil(),
                handle: "a".into(),
            },
            created_at: Utc::now(),
        };

        let order = vec![entry(3, 3), entry(1, 2), entry(2, 1)];
        let ordered = order_posts(&order, vec![post(1), post(3)]);

        let got: Vec<u128> = ordered.iter().map(|p| p.id.as_u128()).collect();
        assert_eq!(got, vec![3, 1]);
    }
}
