use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub fanout: FanoutConfig,
    pub feed: FeedConfig,
    pub push: PushConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub post_created_topic: String,
    pub fanout_group_id: String,
    pub dlq_topic: String,
    pub consumer_concurrency: usize,
    pub publish_timeout_ms: u64,
}

impl KafkaConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            post_created_topic: event_schema::DEFAULT_POST_CREATED_TOPIC.to_string(),
            fanout_group_id: "fan-out-service".to_string(),
            dlq_topic: "new_posts.dlq".to_string(),
            consumer_concurrency: 1,
            publish_timeout_ms: 5000,
        }
    }
}

/// Fan-out write path tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Follower count at or above which an author is pulled instead of pushed
    pub celebrity_threshold: u64,
    /// Maximum entries kept per inbox or public timeline (N)
    pub inbox_capacity: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            celebrity_threshold: 1000,
            inbox_capacity: 500,
            max_retries: 3,
            initial_backoff_ms: 100,
        }
    }
}

impl FanoutConfig {
    pub fn retry_config(&self) -> resilience::RetryConfig {
        resilience::RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            ..Default::default()
        }
    }
}

/// Read path tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub page_size: usize,
    /// Entries read from the private inbox per request (k1)
    pub private_inbox_limit: usize,
    /// Entries read from each followed celebrity timeline per request (k2)
    pub celebrity_timeline_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            private_inbox_limit: 10,
            celebrity_timeline_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub chunk_size: usize,
    pub queue_capacity: usize,
    pub connection_buffer: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            queue_capacity: 1024,
            connection_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

const DEV_JWT_SECRET: &str = "development-only-secret";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; real deployments inject the environment.
        let _ = dotenvy::dotenv();

        let app = AppConfig {
            env: env_or("APP_ENV", "development"),
            port: parse_or("APP_PORT", 8000)?,
            log_level: env_or("LOG_LEVEL", "info"),
        };

        let kafka_defaults = KafkaConfig::default();
        let fanout_defaults = FanoutConfig::default();
        let feed_defaults = FeedConfig::default();
        let push_defaults = PushConfig::default();

        let jwt_secret = match std::env::var("JWT_ACCESS_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if app.is_development() => DEV_JWT_SECRET.to_string(),
            _ => return Err(ConfigError::Missing("JWT_ACCESS_SECRET")),
        };

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            },
            kafka: KafkaConfig {
                brokers: env_or("KAFKA_BROKERS", &kafka_defaults.brokers),
                post_created_topic: env_or(
                    "KAFKA_POST_CREATED_TOPIC",
                    &kafka_defaults.post_created_topic,
                ),
                fanout_group_id: env_or("KAFKA_FANOUT_GROUP_ID", &kafka_defaults.fanout_group_id),
                dlq_topic: env_or("KAFKA_DLQ_TOPIC", &kafka_defaults.dlq_topic),
                consumer_concurrency: parse_or(
                    "KAFKA_CONSUMER_CONCURRENCY",
                    kafka_defaults.consumer_concurrency,
                )?,
                publish_timeout_ms: parse_or(
                    "KAFKA_PUBLISH_TIMEOUT_MS",
                    kafka_defaults.publish_timeout_ms,
                )?,
            },
            fanout: FanoutConfig {
                celebrity_threshold: parse_or(
                    "CELEBRITY_THRESHOLD",
                    fanout_defaults.celebrity_threshold,
                )?,
                inbox_capacity: parse_or("INBOX_CAPACITY", fanout_defaults.inbox_capacity)?,
                max_retries: parse_or("FANOUT_MAX_RETRIES", fanout_defaults.max_retries)?,
                initial_backoff_ms: parse_or(
                    "FANOUT_INITIAL_BACKOFF_MS",
                    fanout_defaults.initial_backoff_ms,
                )?,
            },
            feed: FeedConfig {
                page_size: parse_or("FEED_PAGE_SIZE", feed_defaults.page_size)?,
                private_inbox_limit: parse_or(
                    "FEED_PRIVATE_INBOX_LIMIT",
                    feed_defaults.private_inbox_limit,
                )?,
                celebrity_timeline_limit: parse_or(
                    "FEED_CELEBRITY_TIMELINE_LIMIT",
                    feed_defaults.celebrity_timeline_limit,
                )?,
            },
            push: PushConfig {
                chunk_size: parse_or("PUSH_CHUNK_SIZE", push_defaults.chunk_size)?,
                queue_capacity: parse_or("PUSH_QUEUE_CAPACITY", push_defaults.queue_capacity)?,
                connection_buffer: parse_or(
                    "PUSH_CONNECTION_BUFFER",
                    push_defaults.connection_buffer,
                )?,
            },
            auth: AuthConfig { jwt_secret },
            app,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero: [(&'static str, u64); 12] = [
            ("APP_PORT", self.app.port as u64),
            ("DATABASE_MAX_CONNECTIONS", self.database.max_connections as u64),
            ("KAFKA_CONSUMER_CONCURRENCY", self.kafka.consumer_concurrency as u64),
            ("KAFKA_PUBLISH_TIMEOUT_MS", self.kafka.publish_timeout_ms),
            ("CELEBRITY_THRESHOLD", self.fanout.celebrity_threshold),
            ("INBOX_CAPACITY", self.fanout.inbox_capacity as u64),
            ("FEED_PAGE_SIZE", self.feed.page_size as u64),
            ("FEED_PRIVATE_INBOX_LIMIT", self.feed.private_inbox_limit as u64),
            ("FEED_CELEBRITY_TIMELINE_LIMIT", self.feed.celebrity_timeline_limit as u64),
            ("PUSH_CHUNK_SIZE", self.push.chunk_size as u64),
            ("PUSH_QUEUE_CAPACITY", self.push.queue_capacity as u64),
            ("PUSH_CONNECTION_BUFFER", self.push.connection_buffer as u64),
        ];

        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero(key));
            }
        }

        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}
