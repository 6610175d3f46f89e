use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::hub::{ConnectionId, PushHub};
use super::messages::{ConnectionState, PushFrame};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One authenticated live-channel connection.
///
/// Frames arrive from the hub through the connection's buffer and are written
/// as JSON text. When the hub drops the sender (failed send or deregister) the
/// frame stream ends and the session closes.
pub struct LiveSession {
    user_id: Uuid,
    connection_id: Option<ConnectionId>,
    hub: PushHub,
    state: ConnectionState,
    hb: Instant,
    hb_interval: Duration,
    client_timeout: Duration,
}

impl LiveSession {
    /// The token is already verified; the hub registration happens once the actor starts.
    pub fn new(user_id: Uuid, hub: PushHub) -> Self {
        Self {
            user_id,
            connection_id: None,
            hub,
            state: ConnectionState::Authenticated,
            hb: Instant::now(),
            hb_interval: HEARTBEAT_INTERVAL,
            client_timeout: CLIENT_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.hb_interval = interval;
        self.client_timeout = timeout;
        self
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, to: ConnectionState) {
        match self.state.transition(to) {
            Ok(next) => self.state = next,
            Err(e) => debug!(user_id = %self.user_id, "{}", e),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.hb_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                warn!(user_id = %act.user_id, "Live channel heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for LiveSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (connection_id, frames) = self.hub.register(self.user_id);
        self.connection_id = Some(connection_id);
        self.set_state(ConnectionState::Open);
        info!(
            user_id = %self.user_id,
            connection_id = %connection_id,
            "Live channel opened"
        );

        self.hb(ctx);
        ctx.add_stream(ReceiverStream::new(frames));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.set_state(ConnectionState::Closed);
        if let Some(connection_id) = self.connection_id.take() {
            self.hub.deregister(self.user_id, connection_id);
            info!(
                user_id = %self.user_id,
                connection_id = %connection_id,
                "Live channel closed"
            );
        }
    }
}

impl StreamHandler<PushFrame> for LiveSession {
    fn handle(&mut self, frame: PushFrame, ctx: &mut Self::Context) {
        match serde_json::to_string(&frame) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!(event = frame.event_name(), "Failed to encode push frame: {}", e),
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!(user_id = %self.user_id, "Push buffer closed");
        ctx.stop();
    }
}

// Client frames are only used for liveness
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for LiveSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Live channel close received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!(user_id = %self.user_id, "Live channel protocol error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}
