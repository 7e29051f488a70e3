use async_trait::async_trait;

use crate::error::ChatError;
use crate::peer::PeerRef;
use crate::types::{
    ChatEvent, ChatTarget, DialogFolder, EntityInfo, ForumTopic, ForwardedRef, InboundMessage,
    NotifySettings,
};

/// Sentinel `mute_until` meaning "muted forever".
pub const MUTE_FOREVER: i64 = i32::MAX as i64;

#[async_trait]
/// Trait contract for the chat-protocol capability.
///
/// Every operation returns `Result` so callers can apply the monitor's
/// failure taxonomy (log-and-skip vs. fatal) explicitly; adapters that lack
/// an operation report [`ChatError::Unsupported`] instead of panicking.
pub trait ChatClient: Send + Sync {
    /// Awaits the next inbound event (new message or reaction update).
    async fn next_event(&self) -> Result<ChatEvent, ChatError>;

    async fn get_entity(&self, target: &ChatTarget) -> Result<EntityInfo, ChatError>;

    /// Sends plain text, optionally into a forum thread; returns the new
    /// message id.
    async fn send_message(
        &self,
        target: &ChatTarget,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, ChatError>;

    /// Forwards an existing message; `None` when the transport does not
    /// report the created copy.
    async fn forward_message(
        &self,
        from: PeerRef,
        message_id: i64,
        target: &ChatTarget,
    ) -> Result<Option<ForwardedRef>, ChatError>;

    async fn dialog_folders(&self) -> Result<Vec<DialogFolder>, ChatError>;

    async fn notify_settings(&self, peer: PeerRef) -> Result<NotifySettings, ChatError>;

    async fn update_notify_settings(
        &self,
        peer: PeerRef,
        settings: NotifySettings,
    ) -> Result<(), ChatError>;

    /// Lists forum topics matching `query` by title.
    async fn forum_topics(&self, peer: PeerRef, query: &str) -> Result<Vec<ForumTopic>, ChatError>;

    async fn create_forum_topic(&self, peer: PeerRef, title: &str) -> Result<(), ChatError>;

    /// Full text-bearing history of a chat, newest first, for dataset export.
    async fn history(&self, target: &ChatTarget) -> Result<Vec<InboundMessage>, ChatError>;
}
