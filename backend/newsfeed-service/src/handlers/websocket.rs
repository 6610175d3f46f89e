use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::security::JwtValidator;
use crate::websocket::{LiveSession, PushHub};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Token from `?token=`, falling back to the Authorization header
fn extract_token<'a>(req: &'a HttpRequest, params: &'a WsParams) -> Option<&'a str> {
    params
        .token
        .as_deref()
        .or_else(|| {
            req.headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Live channel upgrade. Rejected with 401 before the handshake when the token is missing or invalid.
#[get("/ws")]
pub async fn live_channel(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<WsParams>,
    validator: web::Data<JwtValidator>,
    hub: web::Data<PushHub>,
) -> Result<HttpResponse, Error> {
    let token = extract_token(&req, &params)
        .ok_or_else(|| AppError::Authentication("Missing live channel token".to_string()))?;
    let user_id = validator.validate(token)?;

    debug!(user_id = %user_id, "Upgrading live channel");
    ws::start(LiveSession::new(user_id, hub.get_ref().clone()), &req, stream)
}
