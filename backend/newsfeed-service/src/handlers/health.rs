use actix_web::{web, HttpResponse};
use redis::aio::ConnectionManager;
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;

use crate::cache;

/// Dependencies probed by the readiness check
#[derive(Clone)]
pub struct HealthState {
    pub db: PgPool,
    pub redis: ConnectionManager,
}

pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn readiness(state: web::Data<HealthState>) -> HttpResponse {
    let db_ok = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Readiness: database check failed: {}", e);
            false
        }
    };
    let redis_ok = cache::ping(&state.redis).await.is_ok();

    let body = json!({
        "status": if db_ok && redis_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "redis": redis_ok,
    });

    if db_ok && redis_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
