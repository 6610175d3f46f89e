//! HTTP surface
//!
//! - `GET /api/v1/feed`, `POST /api/v1/posts`: bearer-authenticated REST
//! - `GET /ws`: live channel upgrade, token checked before the upgrade
//! - `GET /health`, `GET /health/ready`

pub mod feed;
pub mod health;
pub mod posts;
pub mod websocket;

pub use feed::get_feed;
pub use health::{liveness, readiness, HealthState};
pub use posts::create_post;
pub use websocket::live_channel;

use actix_web::web;
use std::sync::Arc;

use crate::middleware::JwtAuthMiddleware;
use crate::security::JwtValidator;

/// Register every route. Shared state is expected as `app_data` on the `App`.
pub fn configure(cfg: &mut web::ServiceConfig, validator: Arc<JwtValidator>) {
    cfg.service(
        web::scope("/api/v1")
            .wrap(JwtAuthMiddleware::new(validator))
            .service(get_feed)
            .service(create_post),
    )
    .service(live_channel)
    .route("/health", web::get().to(liveness))
    .route("/health/ready", web::get().to(readiness));
}
