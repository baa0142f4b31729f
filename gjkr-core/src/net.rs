//! The broadcast channel members talk through.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::NetError,
    messages::{Message, NetMessage},
    Ciphersuite,
};

/// A channel delivering every message sent by one member to all members of
/// the group, including the sender.
#[async_trait]
pub trait BroadcastChannel<C: Ciphersuite>: Send + Sync {
    /// Broadcast a message to the group.
    async fn send(&self, message: Message<C>) -> Result<(), NetError>;

    /// Receive every message broadcast after this call. Dropping the
    /// receiver unsubscribes.
    fn subscribe(&self) -> mpsc::Receiver<NetMessage<C>>;
}
