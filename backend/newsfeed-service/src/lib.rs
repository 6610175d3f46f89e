//! Feed delivery for a social network
//!
//! Posts are fanned out on write into bounded per-user inboxes, except for
//! celebrity authors whose posts stay in a public timeline and are merged in at
//! read time. Live connections receive a notification when a post is created.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod kafka;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod security;
pub mod services;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{
    CelebrityClassifier, FanoutMode, FanoutOutcome, FanoutReport, FanoutService, PostAnnouncer,
    TimelineService,
};
