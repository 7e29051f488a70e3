//! ChatClient capability boundary for Sift.
//!
//! Everything the monitor needs from the chat protocol lives behind the
//! [`ChatClient`] trait: entity resolution, dialog folders, message
//! send/forward primitives, notification settings, and the inbound event
//! stream. Internal logic only ever sees the canonical marked chat-id scheme
//! and the tagged [`PeerRef`] union; transport-specific shapes stop at the
//! adapter.

mod bot_api;
mod client;
mod error;
mod names;
mod peer;
mod types;

pub use bot_api::{BotApiClient, BotApiConfig};
pub use client::{ChatClient, MUTE_FOREVER};
pub use error::ChatError;
pub use names::NameResolver;
pub use peer::{canonical_chat_id, peer_from_canonical, PeerRef};
pub use types::{
    deep_link, ChatEvent, ChatKind, ChatScope, ChatTarget, DialogFolder, EntityInfo, ForumTopic,
    ForwardedRef, InboundMessage, NotifySettings, ReactionUpdate, SenderInfo,
};
