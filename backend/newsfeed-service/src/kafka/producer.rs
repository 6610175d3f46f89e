use async_trait::async_trait;
use event_schema::{PostCreatedEvent, EVENT_TYPE_HEADER, POST_CREATED_EVENT_TYPE};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use resilience::{with_timeout, TimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Publishes post-created events. One attempt per call; callers own the retry policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostEventPublisher: Send + Sync {
    async fn publish(&self, event: &PostCreatedEvent) -> Result<()>;
}

/// Kafka producer wrapper for post-created events
#[derive(Clone)]
pub struct KafkaPostEventPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaPostEventPublisher {
    pub fn new(producer: FutureProducer, topic: String, timeout: Duration) -> Self {
        Self {
            producer,
            topic,
            timeout,
        }
    }

    /// Wait for in-flight messages before shutdown
    pub fn flush(&self) {
        if let Err(e) = self.producer.flush(self.timeout) {
            warn!("Kafka producer flush failed: {}", e);
        }
    }

    /// Lightweight health check by fetching topic metadata
    pub fn health_check(&self) -> Result<()> {
        self.producer
            .client()
            .fetch_metadata(Some(&self.topic), self.timeout)
            .map(|_| ())
            .map_err(AppError::from)
    }
}

#[async_trait]
impl PostEventPublisher for KafkaPostEventPublisher {
    async fn publish(&self, event: &PostCreatedEvent) -> Result<()> {
        let payload = event
            .to_payload()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let key = event.key();

        debug!("Publishing post-created to topic {} (key={})", self.topic, key);

        let send = async {
            let record = FutureRecord::to(&self.topic)
                .key(&key)
                .payload(&payload)
                .headers(OwnedHeaders::new().insert(Header {
                    key: EVENT_TYPE_HEADER,
                    value: Some(POST_CREATED_EVENT_TYPE),
                }));

            self.producer
                .send(record, self.timeout)
                .await
                .map(|_| ())
                .map_err(|(e, _)| AppError::from(e))
        };

        match with_timeout(self.timeout, send).await {
            Ok(()) => Ok(()),
            Err(TimeoutError::Inner(e)) => Err(e),
            Err(TimeoutError::Elapsed(after)) => {
                warn!("Kafka send timed out after {:?}", after);
                Err(AppError::Kafka(format!("publish timed out after {:?}", after)))
            }
        }
    }
}
