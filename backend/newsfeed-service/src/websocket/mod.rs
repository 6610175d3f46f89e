//! Realtime push hub
//!
//! Live connections register per user in [`PushHub`]. Post announcements become
//! [`PushJob`]s on the [`PushDispatcher`] queue; a single [`PushWorker`] delivers
//! them in chunks. Delivery is best-effort: a connection whose buffer is full or
//! closed is dropped, and nothing is replayed.

pub mod dispatcher;
pub mod hub;
pub mod messages;
pub mod session;

pub use dispatcher::{PushDispatcher, PushJob, PushWorker};
pub use hub::{ConnectionId, PushHub};
pub use messages::{ConnectionState, PushFrame, RefreshHint};
pub use session::LiveSession;
