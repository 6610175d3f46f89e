/// Fan-out of post-created events into inbox caches
///
/// For every event the author is classified:
/// - celebrity (pull): one entry in the author's public timeline
/// - ordinary (push): one entry in every follower's private inbox, written in a
///   single pipelined round trip
///
/// Every write trims the target set to the newest N entries. Replaying an event
/// re-adds the same member with the same score, so handling is idempotent and
/// at-least-once delivery is safe.
///
/// Transient failures (classification, follower lookup, whole-batch cache errors)
/// are retried with backoff. When the batch pipeline fails, each key is written on
/// its own so one bad key does not block the rest; keys that still fail are
/// reported. Malformed payloads and exhausted retries go to the dead-letter sink.
use chrono::Utc;
use event_schema::{DeadLetterRecord, PostCreatedEvent};
use resilience::{with_retry_if, RetryConfig, RetryError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheError, InboxKey, InboxStore};
use crate::db::FollowerDirectory;
use crate::error::{AppError, Result};
use crate::kafka::DeadLetterSink;
use crate::metrics;
use crate::models::InboxEntry;
use crate::services::classifier::{CelebrityClassifier, FanoutMode};

/// Result of fanning out one post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub mode: FanoutMode,
    /// Keys the entry was meant for
    pub targeted: usize,
    /// Keys whose write failed even after the per-key fallback
    pub failed_keys: Vec<String>,
}

/// What happened to one broker message. Every variant means the message may be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutOutcome {
    Delivered(FanoutReport),
    /// Payload could not be decoded
    Rejected { reason: String },
    /// Fan-out gave up after retries
    DeadLettered {
        post_id: Uuid,
        attempts: u32,
        error: String,
    },
}

pub struct FanoutService {
    classifier: Arc<CelebrityClassifier>,
    directory: Arc<dyn FollowerDirectory>,
    inbox: Arc<dyn InboxStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry: RetryConfig,
    source_topic: String,
}

impl FanoutService {
    pub fn new(
        classifier: Arc<CelebrityClassifier>,
        directory: Arc<dyn FollowerDirectory>,
        inbox: Arc<dyn InboxStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
        retry: RetryConfig,
        source_topic: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            directory,
            inbox,
            dead_letters,
            retry,
            source_topic: source_topic.into(),
        }
    }

    /// Handle one raw broker message.
    ///
    /// `broker_timestamp_ms` is used as the score when the event has no `createdAt`.
    pub async fn handle_payload(
        &self,
        payload: &[u8],
        key: Option<&str>,
        broker_timestamp_ms: Option<i64>,
    ) -> FanoutOutcome {
        let event = match PostCreatedEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(key = ?key, error = %e, "Rejecting malformed post-created payload");
                let record = DeadLetterRecord::new(
                    &self.source_topic,
                    key.map(str::to_string),
                    payload,
                    e.to_string(),
                    0,
                );
                self.dead_letter(record, "malformed").await;
                metrics::record_fanout_event("rejected");
                return FanoutOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let score = event
            .created_at
            .or(broker_timestamp_ms)
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        match self.handle_event(&event, score).await {
            Ok(report) => {
                metrics::record_fanout_event("delivered");
                FanoutOutcome::Delivered(report)
            }
            Err(e) => {
                let attempts = e.attempts();
                let error = e.into_inner().to_string();
                error!(
                    post_id = %event.id,
                    author_id = %event.user_id,
                    attempts,
                    error = %error,
                    "Fan-out failed, dead-lettering event"
                );
                let record = DeadLetterRecord::new(
                    &self.source_topic,
                    Some(event.key()),
                    payload,
                    error.clone(),
                    attempts,
                );
                self.dead_letter(record, "exhausted").await;
                metrics::record_fanout_event("dead_lettered");
                FanoutOutcome::DeadLettered {
                    post_id: event.id,
                    attempts,
                    error,
                }
            }
        }
    }

    /// Fan out a decoded event with the configured retry policy
    pub async fn handle_event(
        &self,
        event: &PostCreatedEvent,
        score: i64,
    ) -> std::result::Result<FanoutReport, RetryError<AppError>> {
        let entry = InboxEntry::new(event.id, score);

        with_retry_if(
            self.retry.clone(),
            || self.fan_out(event.user_id, entry),
            AppError::is_transient,
        )
        .await
    }

    async fn fan_out(&self, author_id: Uuid, entry: InboxEntry) -> Result<FanoutReport> {
        let mode = self.classifier.classify(author_id).await?;

        let report = match mode {
            FanoutMode::Pull => {
                self.inbox
                    .append_entries(&InboxKey::CelebrityPublic(author_id), &[entry])
                    .await?;
                FanoutReport {
                    post_id: entry.post_id,
                    author_id,
                    mode,
                    targeted: 1,
                    failed_keys: Vec::new(),
                }
            }
            FanoutMode::Push => {
                let followers = self.directory.follower_ids(author_id).await?;
                let keys: Vec<InboxKey> = followers.into_iter().map(InboxKey::Private).collect();
                let failed_keys = self.write_batch(&keys, entry).await?;

                FanoutReport {
                    post_id: entry.post_id,
                    author_id,
                    mode,
                    targeted: keys.len(),
                    failed_keys,
                }
            }
        };

        let mode_label = match report.mode {
            FanoutMode::Push => "push",
            FanoutMode::Pull => "pull",
        };
        metrics::record_fanout_targets(mode_label, report.targeted - report.failed_keys.len());
        if !report.failed_keys.is_empty() {
            metrics::record_cache_write_failures(report.failed_keys.len());
        }

        info!(
            post_id = %report.post_id,
            author_id = %author_id,
            mode = mode_label,
            targeted = report.targeted,
            failed = report.failed_keys.len(),
            "Fan-out completed"
        );

        Ok(report)
    }

    /// Pipelined write with per-key fallback. Returns the keys that still failed.
    ///
    /// Fails as a whole only if not a single key could be written, so the caller
    /// retries an outage instead of reporting every follower as failed.
    async fn write_batch(&self, keys: &[InboxKey], entry: InboxEntry) -> Result<Vec<String>> {
        if keys.is_empty() {
            debug!(post_id = %entry.post_id, "Author has no followers, nothing to push");
            return Ok(Vec::new());
        }

        let batch_error = match self.inbox.fan_out_entry(keys, entry).await {
            Ok(()) => return Ok(Vec::new()),
            Err(e) => e,
        };

        warn!(
            post_id = %entry.post_id,
            keys = keys.len(),
            error = %batch_error,
            "Batch inbox write failed, falling back to per-key writes"
        );

        let mut failed = Vec::new();
        for key in keys {
            if let Err(e) = self.inbox.append_entries(key, &[entry]).await {
                warn!(key = %key, error = %e, "Inbox write failed");
                failed.push(key.to_string());
            }
        }

        if failed.len() == keys.len() {
            return Err(AppError::Cache(CacheError::Unavailable(format!(
                "all {} inbox writes failed: {}",
                keys.len(),
                batch_error
            ))));
        }

        Ok(failed)
    }

    async fn dead_letter(&self, record: DeadLetterRecord, reason: &str) {
        metrics::record_dead_letter(reason);
        if let Err(e) = self.dead_letters.send(record).await {
            // Nothing left to do; the message is still committed.
            error!(error = %e, "Failed to write dead-letter record");
        }
    }
}
