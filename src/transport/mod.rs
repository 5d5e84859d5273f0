//! Chat transport boundary
//!
//! Inbound events carry a user id, a chat id and either free text or an opaque
//! button code. Outbound replies are plain text plus an optional button grid.
//! Delivery is best-effort on both sides.

mod console;

pub use console::ConsoleTransport;

use crate::custody::UserId;
use crate::session::Reply;
use crate::Result;
use async_trait::async_trait;

pub type ChatId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    /// Raw action code from a button press, parsed by the engine
    Action(String),
    /// Anything the transport could not classify (stickers, edits, ...)
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub payload: Payload,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Next inbound event, `None` once the transport is closed
    async fn next_event(&self) -> Option<InboundEvent>;

    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<()>;
}
