use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author summary embedded in every post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub id: Uuid,
    pub handle: String,
}

/// Hydrated post as returned by the feed and post endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub user: PostAuthor,
    pub created_at: DateTime<Utc>,
}

impl PostDetail {
    /// Inbox score for this post: creation time in epoch milliseconds
    pub fn score(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}

/// Body of `POST /api/v1/posts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub content: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

/// One member of an inbox or public timeline sorted set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InboxEntry {
    pub post_id: Uuid,
    /// Creation time in epoch milliseconds
    pub score: i64,
}

impl InboxEntry {
    pub fn new(post_id: Uuid, score: i64) -> Self {
        Self { post_id, score }
    }
}

/// One page of a user's feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    /// Pass back as `nextCursor` to get the next older page; null at end of feed
    pub next_cursor: Option<i64>,
    pub posts: Vec<PostDetail>,
}

/// Query string of `GET /api/v1/feed`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    /// Kept as text so a malformed cursor maps to INVALID_CURSOR instead of a generic 400
    pub next_cursor: Option<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_post_detail_wire_names() {
        let post = PostDetail {
            id: Uuid::nil(),
            content: "hello".to_string(),
            photo_url: Some("https://cdn/p.jpg".to_string()),
            user: PostAuthor {
                id: Uuid::nil(),
                handle: "alice".to_string(),
            },
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        };

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["photoURL"], "https://cdn/p.jpg");
        assert_eq!(json["user"]["handle"], "alice");
        assert!(json.get("createdAt").is_some());
        assert_eq!(post.score(), 1_700_000_000_000);
    }

    #[test]
    fn test_feed_response_null_cursor() {
        let response = FeedResponse {
            next_cursor: None,
            posts: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["nextCursor"].is_null());
    }

    #[test]
    fn test_new_post_optional_photo() {
        let post: NewPost = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(post.photo_url, None);
    }
}
