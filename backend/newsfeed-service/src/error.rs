use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Feed could not be assembled; distinct from an empty page.
    #[error("Failed to fetch feed: {0}")]
    FeedUnavailable(String),

    /// Post was stored but its event could not be published.
    #[error("Failed to publish event: {0}")]
    EventPublish(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::InvalidCursor(_) => "INVALID_CURSOR",
            AppError::Authentication(_) => "UNAUTHORIZED",
            AppError::UserNotFound(_) => "USER_NOT_FOUND",
            AppError::FeedUnavailable(_) => "FEED_FAILED_FETCH",
            AppError::EventPublish(_) => "EVENT_PUBLISH_FAILED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::Kafka(_) => "KAFKA_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Cache(_)
                | AppError::Kafka(_)
                | AppError::EventPublish(_)
                | AppError::FeedUnavailable(_)
        )
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::UserNotFound(_) => StatusCode::NOT_FOUND,
            AppError::FeedUnavailable(_) | AppError::EventPublish(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for AppError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        AppError::Kafka(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
