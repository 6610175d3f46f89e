use async_trait::async_trait;
use event_schema::DeadLetterRecord;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{AppError, Result};

/// Destination for events the fan-out pipeline gave up on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, record: DeadLetterRecord) -> Result<()>;
}

pub struct KafkaDeadLetterSink {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaDeadLetterSink {
    pub fn new(producer: FutureProducer, topic: String, timeout: Duration) -> Self {
        Self {
            producer,
            topic,
            timeout,
        }
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn send(&self, record: DeadLetterRecord) -> Result<()> {
        let payload = record
            .to_payload()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let key = record.key.clone().unwrap_or_default();

        debug!(
            topic = %self.topic,
            key = %key,
            attempts = record.attempts,
            "Sending event to dead-letter topic"
        );

        let message = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(message, self.timeout).await {
            Ok(_) => Ok(()),
            Err((e, _)) => {
                error!(topic = %self.topic, error = %e, "Dead-letter publish failed");
                Err(AppError::Kafka(e.to_string()))
            }
        }
    }
}
