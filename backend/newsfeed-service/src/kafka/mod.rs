//! Kafka glue for the post-created topic
//!
//! - `producer`: publishes post-created events at creation time
//! - `consumer`: fan-out consumer group reading the topic
//! - `dead_letter`: records events that could not be fanned out

pub mod consumer;
pub mod dead_letter;
pub mod producer;

pub use consumer::FanoutConsumer;
pub use dead_letter::{DeadLetterSink, KafkaDeadLetterSink};
pub use producer::{KafkaPostEventPublisher, PostEventPublisher};

use rdkafka::producer::FutureProducer;
use rdkafka::ClientConfig;

use crate::config::KafkaConfig;
use crate::error::{AppError, Result};

/// Producer shared by the event publisher and the dead-letter sink
pub fn create_producer(config: &KafkaConfig) -> Result<FutureProducer> {
    ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("message.timeout.ms", config.publish_timeout_ms.to_string())
        .set("queue.buffering.max.messages", "100000")
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .set("compression.type", "lz4")
        .create()
        .map_err(AppError::from)
}
