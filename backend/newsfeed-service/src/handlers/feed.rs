use actix_web::{get, web, HttpResponse};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::middleware::UserId;
use crate::models::FeedQuery;
use crate::services::TimelineService;

const MAX_LIMIT: usize = 100;

/// Parse `nextCursor`; absent or empty means the first page.
pub fn parse_cursor(raw: Option<&str>) -> Result<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::InvalidCursor(value.to_string())),
    }
}

fn page_size(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_LIMIT)
}

#[get("/feed")]
pub async fn get_feed(
    user: UserId,
    query: web::Query<FeedQuery>,
    timeline: web::Data<TimelineService>,
) -> Result<HttpResponse> {
    let cursor = parse_cursor(query.next_cursor.as_deref())?;
    let limit = page_size(query.limit, timeline.default_page_size());

    debug!(user_id = %user.0, cursor = ?cursor, limit, "Getting feed");

    let response = timeline.get_feed(user.0, cursor, limit).await?;
    Ok(HttpResponse::Ok().json(response))
}
