/// Post creation and announcement
///
/// Persists a post, publishes its post-created event for the fan-out consumers
/// and queues live notifications. A stored post whose event could not be
/// published is reported as an error; fan-out would otherwise never see it.
use event_schema::PostCreatedEvent;
use resilience::{with_retry_if, RetryConfig};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{FollowerDirectory, PostStore};
use crate::error::{AppError, Result};
use crate::kafka::PostEventPublisher;
use crate::models::{NewPost, PostDetail};
use crate::websocket::{PushDispatcher, PushJob, RefreshHint};

pub struct PostAnnouncer {
    posts: Arc<dyn PostStore>,
    publisher: Arc<dyn PostEventPublisher>,
    directory: Arc<dyn FollowerDirectory>,
    dispatcher: PushDispatcher,
    retry: RetryConfig,
}

impl PostAnnouncer {
    pub fn new(
        posts: Arc<dyn PostStore>,
        publisher: Arc<dyn PostEventPublisher>,
        directory: Arc<dyn FollowerDirectory>,
        dispatcher: PushDispatcher,
        retry: RetryConfig,
    ) -> Self {
        Self {
            posts,
            publisher,
            directory,
            dispatcher,
            retry,
        }
    }

    pub async fn announce(&self, author_id: Uuid, new_post: NewPost) -> Result<PostDetail> {
        if new_post.content.trim().is_empty() {
            return Err(AppError::BadRequest("content must not be empty".into()));
        }

        if !self.directory.user_exists(author_id).await? {
            return Err(AppError::UserNotFound(author_id.to_string()));
        }

        let post = self.posts.create_post(author_id, new_post).await?;
        let event = PostCreatedEvent::new(post.id, author_id, post.created_at);

        with_retry_if(
            self.retry.clone(),
            || self.publisher.publish(&event),
            AppError::is_transient,
        )
        .await
        .map_err(|e| {
            let attempts = e.attempts();
            let err = e.into_inner();
            warn!(post_id = %post.id, attempts, error = %err, "Post stored but event not published");
            AppError::EventPublish(err.to_string())
        })?;

        info!(post_id = %post.id, author_id = %author_id, "Post created and announced");

        self.notify(&post).await;
        Ok(post)
    }

    async fn notify(&self, post: &PostDetail) {
        let author_id = post.user.id;

        self.dispatcher.dispatch(PushJob::NotifyAuthor {
            author_id,
            post: post.clone(),
        });

        let follower_ids = match self.directory.follower_ids(author_id).await {
            Ok(ids) => ids.into_iter().filter(|id| *id != author_id).collect::<Vec<_>>(),
            Err(e) => {
                warn!(author_id = %author_id, error = %e, "Skipping follower refresh hints");
                return;
            }
        };

        if follower_ids.is_empty() {
            return;
        }

        self.dispatcher.dispatch(PushJob::NotifyFollowers {
            follower_ids,
            hint: RefreshHint {
                post_id: post.id,
                author_id,
                created_at: post.score(),
            },
        });
    }
}
