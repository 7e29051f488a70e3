use serde::{Deserialize, Serialize};

use crate::peer::{channel_internal_id, peer_from_canonical, PeerRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ChatKind` values.
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
/// Destination or lookup handle: a canonical chat id or a named entity
/// (username or invite/profile link).
pub enum ChatTarget {
    Chat(i64),
    Name(String),
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Resolved entity as seen at the adapter boundary.
pub struct EntityInfo {
    /// Canonical marked chat id.
    pub id: i64,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_forum: bool,
}

impl EntityInfo {
    pub fn peer(&self) -> PeerRef {
        peer_from_canonical(self.id)
    }

    /// Human-readable name: title, then username, then person name, then id.
    pub fn display_name(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        if let Some(username) = self.username.as_deref().filter(|u| !u.trim().is_empty()) {
            return username.to_string();
        }
        let person = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !person.is_empty() {
            return person;
        }
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Chat the message arrived in, with whatever naming the transport included.
pub struct ChatScope {
    /// Canonical marked chat id.
    pub id: i64,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `SenderInfo` used across Sift components.
pub struct SenderInfo {
    pub id: Option<i64>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One inbound chat message, already normalized to canonical ids.
pub struct InboundMessage {
    pub id: i64,
    pub chat: ChatScope,
    pub sender: Option<SenderInfo>,
    pub text: Option<String>,
}

impl InboundMessage {
    /// Deep link to this message, resolvable only for channel posts.
    pub fn url(&self) -> Option<String> {
        deep_link(&self.chat, self.id)
    }
}

/// Returns a `t.me/c/...` deep link when the chat is a channel and both ids
/// are usable.
pub fn deep_link(chat: &ChatScope, message_id: i64) -> Option<String> {
    if chat.kind != ChatKind::Channel || message_id <= 0 {
        return None;
    }
    channel_internal_id(chat.id).map(|internal| format!("https://t.me/c/{internal}/{message_id}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Reaction-count change on one message.
pub struct ReactionUpdate {
    pub chat: ChatScope,
    pub message_id: i64,
    /// Emoji added by this update (already diffed against the prior state).
    pub added: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Enumerates supported `ChatEvent` values.
pub enum ChatEvent {
    Message(InboundMessage),
    Reactions(ReactionUpdate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One dialog folder with its member peers.
pub struct DialogFolder {
    pub title: String,
    pub include_peers: Vec<PeerRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Forum discussion topic inside a megagroup.
pub struct ForumTopic {
    pub id: i64,
    pub title: String,
    pub top_message: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Notification settings subset the monitor cares about.
pub struct NotifySettings {
    pub mute_until: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Handle to a message created by a forward, enough to build its deep link.
pub struct ForwardedRef {
    pub chat: ChatScope,
    pub message_id: i64,
}

impl ForwardedRef {
    pub fn url(&self) -> Option<String> {
        deep_link(&self.chat, self.message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_scope(id: i64) -> ChatScope {
        ChatScope {
            id,
            kind: ChatKind::Channel,
            title: Some("alerts".to_string()),
            username: None,
        }
    }

    #[test]
    fn unit_deep_link_for_channel_posts() {
        let scope = channel_scope(-1_001_234_567_890);
        assert_eq!(
            deep_link(&scope, 5).as_deref(),
            Some("https://t.me/c/1234567890/5")
        );
    }

    #[test]
    fn unit_deep_link_absent_for_private_and_bad_ids() {
        let private = ChatScope {
            id: 42,
            kind: ChatKind::Private,
            title: None,
            username: None,
        };
        assert_eq!(deep_link(&private, 5), None);
        assert_eq!(deep_link(&channel_scope(-1_001_234_567_890), 0), None);
    }

    #[test]
    fn unit_display_name_prefers_title_then_username_then_person() {
        let mut entity = EntityInfo {
            id: -1_001_000_000_001,
            kind: ChatKind::Channel,
            title: Some("Deals".to_string()),
            username: Some("deals".to_string()),
            first_name: None,
            last_name: None,
            is_forum: false,
        };
        assert_eq!(entity.display_name(), "Deals");
        entity.title = None;
        assert_eq!(entity.display_name(), "deals");
        entity.username = None;
        entity.first_name = Some("Ada".to_string());
        entity.last_name = Some("L".to_string());
        assert_eq!(entity.display_name(), "Ada L");
        entity.first_name = None;
        entity.last_name = None;
        assert_eq!(entity.display_name(), "-1001000000001");
    }
}
