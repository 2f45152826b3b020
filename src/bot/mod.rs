/// Chat-bot surface: per-guild settings, the command router, and the
/// transport abstraction used to deliver replies and credentials.
pub mod router;
pub mod settings;
pub mod transport;

pub use router::CommandRouter;
pub use settings::{BotSettings, SettingsManager, SettingsUpdate};
pub use transport::ChatTransport;

use crate::allocation::Requester;

/// One inbound chat message, already stripped of transport details
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Guild the message was sent in; `None` for direct messages
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub author: Requester,
    pub content: String,
}
