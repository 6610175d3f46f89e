//! Cache key scheme for inboxes and follower counts
//!
//! - `inbox:private:{user_id}` → sorted set of post ids pushed to a follower
//! - `inbox:celebrity:public:{user_id}` → sorted set of a celebrity's own posts
//! - `user:{user_id}` → hash holding the cached `followerCount`
//!
//! A celebrity owns both inbox families: their public timeline, and a private
//! inbox fed by the ordinary authors they follow.

use std::fmt;
use uuid::Uuid;

/// Hash field carrying the cached follower count
pub const FOLLOWER_COUNT_FIELD: &str = "followerCount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboxKey {
    /// Push target: posts fanned out to this follower
    Private(Uuid),
    /// Pull source: this celebrity's own posts
    CelebrityPublic(Uuid),
}

impl fmt::Display for InboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboxKey::Private(id) => write!(f, "inbox:private:{}", id),
            InboxKey::CelebrityPublic(id) => write!(f, "inbox:celebrity:public:{}", id),
        }
    }
}

/// Hash key holding per-user counters
pub fn user_hash(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}
