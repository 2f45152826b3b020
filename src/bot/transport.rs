/// Chat transport abstraction
///
/// The command router talks to the chat platform only through this trait,
/// so the same routing logic runs against Discord, a test harness, or any
/// other frontend that can deliver text.

use crate::error::QmResult;
use async_trait::async_trait;

/// Outbound side of a chat integration
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message to a channel
    async fn reply(&self, channel_id: &str, text: &str) -> QmResult<()>;

    /// Deliver a message to a user's private inbox
    ///
    /// Credentials ride this path. Implementations must return
    /// `QmError::DeliveryFailed` when the recipient cannot receive
    /// private messages, so the caller can return the account to stock.
    async fn send_private(&self, recipient_id: &str, text: &str) -> QmResult<()>;
}
