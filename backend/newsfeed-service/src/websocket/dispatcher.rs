/// Push job queue and chunked delivery worker
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::hub::PushHub;
use super::messages::{PushFrame, RefreshHint};
use crate::models::PostDetail;

#[derive(Debug, Clone)]
pub enum PushJob {
    /// `post:new` to the author's own connections
    NotifyAuthor { author_id: Uuid, post: PostDetail },
    /// `feed:refresh-needed` to every live connection of each follower
    NotifyFollowers {
        follower_ids: Vec<Uuid>,
        hint: RefreshHint,
    },
}

/// Producer side of the push queue
#[derive(Clone)]
pub struct PushDispatcher {
    tx: mpsc::Sender<PushJob>,
}

impl PushDispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PushJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting; a full or stopped queue drops the job.
    pub fn dispatch(&self, job: PushJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                warn!("Push job dropped: {}", e);
                false
            }
        }
    }
}

pub struct PushWorker {
    hub: PushHub,
    jobs: mpsc::Receiver<PushJob>,
    chunk_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl PushWorker {
    pub fn new(
        hub: PushHub,
        jobs: mpsc::Receiver<PushJob>,
        chunk_size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            hub,
            jobs,
            chunk_size: chunk_size.max(1),
            shutdown,
        }
    }

    /// Run until shutdown or until every dispatcher is dropped
    pub async fn run(mut self) {
        info!("Push worker started");

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown signal received, stopping push worker");
                        break;
                    }
                }
                job = self.jobs.recv() => match job {
                    Some(job) => {
                        self.process(job).await;
                    }
                    None => break,
                },
            }
        }

        info!("Push worker stopped");
    }

    /// Deliver one job; returns the number of frames accepted by connections
    pub async fn process(&self, job: PushJob) -> usize {
        match job {
            PushJob::NotifyAuthor { author_id, post } => {
                self.hub.send_to_user(author_id, &PushFrame::PostNew(post))
            }
            PushJob::NotifyFollowers { follower_ids, hint } => {
                self.deliver_chunked(&follower_ids, &PushFrame::FeedRefreshNeeded(hint))
                    .await
            }
        }
    }

    async fn deliver_chunked(&self, recipients: &[Uuid], frame: &PushFrame) -> usize {
        let mut delivered = 0;

        for (index, chunk) in recipients.chunks(self.chunk_size).enumerate() {
            if index > 0 {
                tokio::task::yield_now().await;
                // In-flight chunks finish; no further chunks after shutdown
                if *self.shutdown.borrow() {
                    info!(
                        remaining = recipients.len() - index * self.chunk_size,
                        "Shutdown during push fan-out, skipping remaining chunks"
                    );
                    break;
                }
            }

            for user_id in chunk {
                delivered += self.hub.send_to_user(*user_id, frame);
            }
        }

        debug!(
            event = frame.event_name(),
            recipients = recipients.len(),
            delivered,
            "Push fan-out finished"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint() -> RefreshHint {
        RefreshHint {
            post_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: 1,
        }
    }

    #[tokio::test]
    async fn test_followers_delivered_across_chunks() {
        let hub = PushHub::new(4);
        let followers: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let mut receivers: Vec<_> = followers.iter().map(|f| hub.register(*f).1).collect();

        let (_tx, shutdown) = watch::channel(false);
        let (_dispatcher, jobs) = PushDispatcher::new(4);
        let worker = PushWorker::new(hub, jobs, 2, shutdown);

        let delivered = worker
            .process(PushJob::NotifyFollowers {
                follower_ids: followers,
                hint: hint(),
            })
            .await;

        assert_eq!(delivered, 5);
        for rx in receivers.iter_mut() {
            assert!(matches!(
                rx.recv().await,
                Some(PushFrame::FeedRefreshNeeded(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_further_chunks() {
        let hub = PushHub::new(4);
        let followers: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let _receivers: Vec<_> = followers.iter().map(|f| hub.register(*f).1).collect();

        let (tx, shutdown) = watch::channel(false);
        let (_dispatcher, jobs) = PushDispatcher::new(4);
        let worker = PushWorker::new(hub, jobs, 1, shutdown);
        tx.send(true).unwrap();

        let delivered = worker
            .process(PushJob::NotifyFollowers {
                follower_ids: followers,
                hint: hint(),
            })
            .await;

        // The first chunk is already in flight
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_dispatcher_dropped() {
        let hub = PushHub::new(4);
        let author = Uuid::new_v4();
        let (_, mut rx) = hub.register(author);

        let (_tx, shutdown) = watch::channel(false);
        let (dispatcher, jobs) = PushDispatcher::new(4);
        let worker = PushWorker::new(hub, jobs, 10, shutdown);

        assert!(dispatcher.dispatch(PushJob::NotifyFollowers {
            follower_ids: vec![author],
            hint: hint(),
        }));
        drop(dispatcher);

        worker.run().await;
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_full_queue_drops_job() {
        let (dispatcher, _jobs) = PushDispatcher::new(1);
        let job = PushJob::NotifyFollowers {
            follower_ids: vec![],
            hint: hint(),
        };
        assert!(dispatcher.dispatch(job.clone()));
        assert!(!dispatcher.dispatch(job));
    }
}
