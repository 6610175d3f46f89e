/// Event schemas for the newsfeed broker topics
///
/// The post-created topic carries one JSON object per message, keyed by post id so
/// that redeliveries of the same post land on the same partition:
///
/// ```json
/// { "id": "<postId>", "userId": "<authorId>", "createdAt": 1718000000000 }
/// ```
///
/// `createdAt` (epoch milliseconds) is optional for compatibility with producers that
/// only send ids. Payloads are decoded strictly: a missing or non-UUID id is an error,
/// never coerced.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default topic for post-created events
pub const DEFAULT_POST_CREATED_TOPIC: &str = "new_posts";

/// Header carrying the event type tag
pub const EVENT_TYPE_HEADER: &str = "event_type";

/// Tag value for post-created events
pub const POST_CREATED_EVENT_TYPE: &str = "post-created";

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed {event_type} payload: {source}")]
    Malformed {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected event type '{0}'")]
    UnexpectedEventType(String),

    #[error("invalid createdAt timestamp {0}")]
    InvalidTimestamp(i64),

    #[error("failed to encode {event_type}: {source}")]
    Encode {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A post was durably recorded and needs to be fanned out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreatedEvent {
    /// Post id, also the message key
    pub id: Uuid,
    /// Author id
    pub user_id: Uuid,
    /// Creation time in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl PostCreatedEvent {
    pub fn new(id: Uuid, user_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            created_at: Some(created_at.timestamp_millis()),
        }
    }

    /// Partition key: the post id
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, SchemaError> {
        serde_json::to_vec(self).map_err(|source| SchemaError::Encode {
            event_type: POST_CREATED_EVENT_TYPE,
            source,
        })
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, SchemaError> {
        let event: Self =
            serde_json::from_slice(payload).map_err(|source| SchemaError::Malformed {
                event_type: POST_CREATED_EVENT_TYPE,
                source,
            })?;

        if let Some(ts) = event.created_at {
            if ts < 0 {
                return Err(SchemaError::InvalidTimestamp(ts));
            }
        }

        Ok(event)
    }
}

/// Accept a message whose event-type header is absent or tagged post-created.
pub fn check_post_created_type(header: Option<&str>) -> Result<(), SchemaError> {
    match header {
        None | Some(POST_CREATED_EVENT_TYPE) => Ok(()),
        Some(other) => Err(SchemaError::UnexpectedEventType(other.to_string())),
    }
}

/// Record written to the dead-letter topic when an event cannot be fanned out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub source_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Original payload, lossily decoded as UTF-8
    pub payload: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(
        source_topic: impl Into<String>,
        key: Option<String>,
        payload: &[u8],
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            source_topic: source_topic.into(),
            key,
            payload: String::from_utf8_lossy(payload).into_owned(),
            error: error.into(),
            attempts,
            failed_at: Utc::now(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, SchemaError> {
        serde_json::to_vec(self).map_err(|source| SchemaError::Encode {
            event_type: "dead-letter",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_post_created_wire_format() {
        let id = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        let user_id = Uuid::parse_str("987fcdeb-51a2-4bc4-a567-890123456789").unwrap();
        let created = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        let event = PostCreatedEvent::new(id, user_id, created);
        let json: serde_json::Value =
            serde_json::from_slice(&event.to_payload().unwrap()).unwrap();

        assert_eq!(json["id"], "123e4567-e89b-12d3-a456-426614174000");
        assert_eq!(json["userId"], "987fcdeb-51a2-4bc4-a567-890123456789");
        assert_eq!(json["createdAt"], 1_700_000_000_123i64);
        assert_eq!(event.key(), "123e4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn test_minimal_payload_without_created_at() {
        let json = br#"{
            "id": "123e4567-e89b-12d3-a456-426614174000",
            "userId": "987fcdeb-51a2-4bc4-a567-890123456789"
        }"#;

        let event = PostCreatedEvent::from_payload(json).unwrap();
        assert_eq!(event.created_at, None);
    }

    #[test]
    fn test_rejects_non_uuid_ids() {
        let json = br#"{ "id": "42", "userId": "987fcdeb-51a2-4bc4-a567-890123456789" }"#;
        assert!(matches!(
            PostCreatedEvent::from_payload(json),
            Err(SchemaError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_missing_author() {
        let json = br#"{ "id": "123e4567-e89b-12d3-a456-426614174000" }"#;
        assert!(PostCreatedEvent::from_payload(json).is_err());
    }

    #[test]
    fn test_rejects_snake_case_shape() {
        // Older producers emitted post_id/user_id; those are not silently coerced.
        let json = br#"{
            "post_id": "123e4567-e89b-12d3-a456-426614174000",
            "user_id": "987fcdeb-51a2-4bc4-a567-890123456789"
        }"#;
        assert!(PostCreatedEvent::from_payload(json).is_err());
    }

    #[test]
    fn test_rejects_negative_timestamp() {
        let json = br#"{
            "id": "123e4567-e89b-12d3-a456-426614174000",
            "userId": "987fcdeb-51a2-4bc4-a567-890123456789",
            "createdAt": -5
        }"#;
        assert!(matches!(
            PostCreatedEvent::from_payload(json),
            Err(SchemaError::InvalidTimestamp(-5))
        ));
    }

    #[test]
    fn test_event_type_header() {
        assert!(check_post_created_type(None).is_ok());
        assert!(check_post_created_type(Some("post-created")).is_ok());
        assert!(matches!(
            check_post_created_type(Some("post-deleted")),
            Err(SchemaError::UnexpectedEventType(t)) if t == "post-deleted"
        ));
    }

    #[test]
    fn test_dead_letter_record_keeps_payload() {
        let record = DeadLetterRecord::new(
            "new_posts",
            Some("k".to_string()),
            b"{not json",
            "malformed",
            1,
        );
        let json: serde_json::Value =
            serde_json::from_slice(&record.to_payload().unwrap()).unwrap();
        assert_eq!(json["sourceTopic"], "new_posts");
        assert_eq!(json["payload"], "{not json");
        assert_eq!(json["attempts"], 1);
    }
}
