//! Service layer for the newsfeed pipeline
//!
//! - `classifier`: push vs pull decision per author
//! - `fanout`: consumes post-created events into inbox caches
//! - `timeline`: merges inbox and celebrity timelines into feed pages
//! - `post_announcer`: creates posts, publishes their events, queues live notifications

pub mod classifier;
pub mod fanout;
pub mod post_announcer;
pub mod timeline;

pub use classifier::{CelebrityClassifier, FanoutMode};
pub use fanout::{FanoutOutcome, FanoutReport, FanoutService};
pub use post_announcer::PostAnnouncer;
pub use timeline::{merge_sources, order_posts, MergedPage, SourcePage, TimelineService};
