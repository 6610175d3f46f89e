/// Frames pushed over the live channel
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PostDetail;

pub const POST_NEW_EVENT: &str = "post:new";
pub const FEED_REFRESH_EVENT: &str = "feed:refresh-needed";

/// `{ "event": ..., "payload": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum PushFrame {
    /// Sent to the author's own connections with the hydrated post
    #[serde(rename = "post:new")]
    PostNew(PostDetail),

    /// Sent to followers; a hint to re-fetch, not the content
    #[serde(rename = "feed:refresh-needed")]
    FeedRefreshNeeded(RefreshHint),
}

impl PushFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            PushFrame::PostNew(_) => POST_NEW_EVENT,
            PushFrame::FeedRefreshNeeded(_) => FEED_REFRESH_EVENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshHint {
    pub post_id: Uuid,
    pub author_id: Uuid,
    /// Epoch milliseconds
    pub created_at: i64,
}

/// Lifecycle of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid connection transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    pub fn transition(self, to: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;

        match (self, to) {
            (Connecting, Authenticated) | (Authenticated, Open) => Ok(to),
            (Connecting | Authenticated | Open, Closed) => Ok(Closed),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_frame_shape() {
        let frame = PushFrame::FeedRefreshNeeded(RefreshHint {
            post_id: Uuid::nil(),
            author_id: Uuid::nil(),
            created_at: 1_700_000_000_000,
        });

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event"], "feed:refresh-needed");
        assert_eq!(json["payload"]["createdAt"], 1_700_000_000_000i64);
        assert!(json["payload"].get("postId").is_some());
        assert!(json["payload"].get("content").is_none());
        assert_eq!(frame.event_name(), FEED_REFRESH_EVENT);
    }

    #[test]
    fn test_state_machine() {
        use ConnectionState::*;

        let state = Connecting.transition(Authenticated).unwrap();
        let state = state.transition(Open).unwrap();
        assert_eq!(state.transition(Closed).unwrap(), Closed);

        assert!(Connecting.transition(Open).is_err());
        assert!(Closed.transition(Open).is_err());
        assert!(Closed.transition(Closed).is_err());
        assert_eq!(Connecting.transition(Closed).unwrap(), Closed);
    }
}
