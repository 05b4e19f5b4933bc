//! Chat transport capability
//!
//! The conversational surface is an external collaborator; the core needs
//! only a way to receive user text and send replies. Message delivery
//! guarantees (ordering, retries, menus) stay on the transport's side of
//! this trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::UserId;

/// Minimal duplex text channel to the user.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver a reply to a user.
    async fn send(&self, user: UserId, text: &str) -> Result<()>;

    /// Wait for the next inbound message. None means the transport closed.
    async fn receive(&mut self) -> Result<Option<(UserId, String)>>;
}
