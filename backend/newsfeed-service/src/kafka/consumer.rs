//! Fan-out consumer for the post-created topic
//!
//! Offsets are committed manually once a message has been handled, whatever the
//! outcome: delivered, rejected or dead-lettered. A crash before the commit
//! replays the message, which the idempotent inbox writes absorb.

use event_schema::{check_post_created_type, EVENT_TYPE_HEADER};
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::ClientConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::services::{FanoutOutcome, FanoutService};

pub struct FanoutConsumer {
    consumer: StreamConsumer,
    service: Arc<FanoutService>,
    shutdown_rx: watch::Receiver<bool>,
    worker: usize,
}

impl FanoutConsumer {
    pub fn new(
        config: &KafkaConfig,
        service: Arc<FanoutService>,
        shutdown_rx: watch::Receiver<bool>,
        worker: usize,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.fanout_group_id)
            .set("client.id", format!("{}-{}", config.fanout_group_id, worker))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .map_err(|e| AppError::Kafka(format!("Failed to create Kafka consumer: {e}")))?;

        consumer
            .subscribe(&[&config.post_created_topic])
            .map_err(|e| AppError::Kafka(format!("Failed to subscribe to topic: {e}")))?;

        info!(
            brokers = %config.brokers,
            topic = %config.post_created_topic,
            group_id = %config.fanout_group_id,
            worker,
            "Fan-out consumer initialized"
        );

        Ok(Self {
            consumer,
            service,
            shutdown_rx,
            worker,
        })
    }

    /// Consume until the shutdown signal fires
    pub async fn run(self) -> Result<()> {
        let Self {
            consumer,
            service,
            mut shutdown_rx,
            worker,
        } = self;

        info!(worker, "Starting fan-out consumer loop");
        let mut stream = consumer.stream();

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(worker, "Shutdown signal received, stopping consumer");
                        break;
                    }
                }

                message = stream.next() => match message {
                    Some(Ok(msg)) => {
                        handle_message(&service, &msg).await;
                        if let Err(e) = consumer.commit_message(&msg, CommitMode::Async) {
                            warn!(worker, "Failed to commit Kafka offset: {}", e);
                        }
                    }
                    Some(Err(e)) => {
                        error!(worker, error = %e, "Kafka consumer error");
                    }
                    None => {
                        warn!(worker, "Message stream ended unexpectedly");
                        break;
                    }
                },
            }
        }

        info!(worker, "Fan-out consumer stopped");
        Ok(())
    }
}

async fn handle_message(service: &FanoutService, msg: &BorrowedMessage<'_>) {
    if let Err(e) = check_post_created_type(header_value(msg, EVENT_TYPE_HEADER)) {
        debug!(offset = msg.offset(), "Skipping message: {}", e);
        metrics::record_fanout_event("skipped");
        return;
    }

    let key = msg.key().and_then(|k| std::str::from_utf8(k).ok());
    let payload = msg.payload().unwrap_or_default();
    let broker_timestamp = msg.timestamp().to_millis();

    match service.handle_payload(payload, key, broker_timestamp).await {
        FanoutOutcome::Delivered(report) if !report.failed_keys.is_empty() => {
            warn!(
                post_id = %report.post_id,
                failed = report.failed_keys.len(),
                partition = msg.partition(),
                offset = msg.offset(),
                "Fan-out partially failed"
            );
        }
        FanoutOutcome::Delivered(_) => {}
        FanoutOutcome::Rejected { reason } => {
            warn!(partition = msg.partition(), offset = msg.offset(), reason = %reason, "Message rejected");
        }
        FanoutOutcome::DeadLettered { post_id, attempts, .. } => {
            warn!(post_id = %post_id, attempts, offset = msg.offset(), "Message dead-lettered");
        }
    }
}

fn header_value<'a, M: Message>(message: &'a M, key: &str) -> Option<&'a str> {
    message
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == key)
                .and_then(|header| header.value)
        })
        .and_then(|value| std::str::from_utf8(value).ok())
}
