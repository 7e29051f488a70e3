use std::collections::VecDeque;
use std::sync::Mutex;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use async_trait::async_trait;

use crate::client::ChatClient;
use crate::error::ChatError;
use crate::peer::{canonical_chat_id, PeerRef};
use crate::types::{
    ChatEvent, ChatKind, ChatScope, ChatTarget, DialogFolder, EntityInfo, ForumTopic, ForwardedRef,
    InboundMessage, NotifySettings, ReactionUpdate, SenderInfo,
};

#[derive(Debug, Clone)]
/// Public struct `BotApiConfig` used across Sift components.
pub struct BotApiConfig {
    pub api_base: String,
    pub token: String,
    pub request_timeout_ms: u64,
    pub poll_timeout_seconds: u64,
}

impl Default for BotApiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            token: String::new(),
            request_timeout_ms: 90_000,
            poll_timeout_seconds: 25,
        }
    }
}

#[derive(Debug, Default)]
struct PollState {
    offset: i64,
    queue: VecDeque<ChatEvent>,
}

/// Bot HTTP API adapter for [`ChatClient`].
///
/// Covers the operations the bot surface exposes; user-session-only
/// operations (dialog folders, notify settings, history export) report
/// [`ChatError::Unsupported`] and are absorbed by the resolver layers.
pub struct BotApiClient {
    http: reqwest::Client,
    config: BotApiConfig,
    poll: Mutex<PollState>,
}

impl BotApiClient {
    pub fn new(config: BotApiConfig) -> Result<Self, ChatError> {
        if config.token.trim().is_empty() {
            return Err(ChatError::Api("bot token must not be empty".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;
        Ok(Self {
            http,
            config,
            poll: Mutex::new(PollState::default()),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base.trim_end_matches('/'),
            self.config.token.trim()
        )
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChatError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&params)
            .send()
            .await?;
        let status = response.status();
        let raw = response.text().await?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|_| ChatError::Transport(format!("{method} returned status {status}")))?;
        if value.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(value.get("result").cloned().unwrap_or(Value::Null));
        }
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        Err(ChatError::Api(format!("{method}: {description}")))
    }

    fn chat_id_value(target: &ChatTarget) -> Value {
        match target {
            ChatTarget::Chat(id) => json!(id),
            ChatTarget::Name(name) => json!(normalize_handle(name)),
        }
    }
}

#[async_trait]
impl ChatClient for BotApiClient {
    async fn next_event(&self) -> Result<ChatEvent, ChatError> {
        loop {
            if let Some(event) = self
                .poll
                .lock()
                .ok()
                .and_then(|mut state| state.queue.pop_front())
            {
                return Ok(event);
            }

            let offset = self.poll.lock().map(|state| state.offset).unwrap_or(0);
            let result = self
                .call(
                    "getUpdates",
                    json!({
                        "offset": offset,
                        "timeout": self.config.poll_timeout_seconds,
                        "allowed_updates": ["message", "message_reaction"],
                    }),
                )
                .await?;
            let updates = result.as_array().cloned().unwrap_or_default();
            let mut state = self
                .poll
                .lock()
                .map_err(|_| ChatError::Transport("poll state mutex is poisoned".to_string()))?;
            for update in &updates {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    state.offset = state.offset.max(update_id + 1);
                }
                match parse_update(update) {
                    Some(event) => state.queue.push_back(event),
                    None => debug!("skipping update without a supported payload"),
                }
            }
        }
    }

    async fn get_entity(&self, target: &ChatTarget) -> Result<EntityInfo, ChatError> {
        let result = self
            .call("getChat", json!({ "chat_id": Self::chat_id_value(target) }))
            .await
            .map_err(|error| ChatError::Resolve {
                target: target.to_string(),
                reason: error.to_string(),
            })?;
        parse_entity(&result).ok_or_else(|| ChatError::Resolve {
            target: target.to_string(),
            reason: "malformed chat object".to_string(),
        })
    }

    async fn send_message(
        &self,
        target: &ChatTarget,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, ChatError> {
        let mut params = json!({
            "chat_id": Self::chat_id_value(target),
            "text": text,
        });
        if let Some(thread_id) = reply_to {
            params["message_thread_id"] = json!(thread_id);
        }
        let result = self.call("sendMessage", params).await?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ChatError::Transport("sendMessage returned no message id".to_string()))
    }

    async fn forward_message(
        &self,
        from: PeerRef,
        message_id: i64,
        target: &ChatTarget,
    ) -> Result<Option<ForwardedRef>, ChatError> {
        let result = self
            .call(
                "forwardMessage",
                json!({
                    "chat_id": Self::chat_id_value(target),
                    "from_chat_id": canonical_chat_id(from),
                    "message_id": message_id,
                }),
            )
            .await?;
        let forwarded = result
            .get("chat")
            .and_then(parse_scope)
            .zip(result.get("message_id").and_then(Value::as_i64))
            .map(|(chat, message_id)| ForwardedRef { chat, message_id });
        Ok(forwarded)
    }

    async fn dialog_folders(&self) -> Result<Vec<DialogFolder>, ChatError> {
        Err(ChatError::Unsupported(
            "dialog folders require a user-session transport",
        ))
    }

    async fn notify_settings(&self, _peer: PeerRef) -> Result<NotifySettings, ChatError> {
        Err(ChatError::Unsupported(
            "notification settings require a user-session transport",
        ))
    }

    async fn update_notify_settings(
        &self,
        _peer: PeerRef,
        _settings: NotifySettings,
    ) -> Result<(), ChatError> {
        Err(ChatError::Unsupported(
            "notification settings require a user-session transport",
        ))
    }

    async fn forum_topics(
        &self,
        _peer: PeerRef,
        _query: &str,
    ) -> Result<Vec<ForumTopic>, ChatError> {
        Err(ChatError::Unsupported(
            "forum topic listing requires a user-session transport",
        ))
    }

    async fn create_forum_topic(&self, peer: PeerRef, title: &str) -> Result<(), ChatError> {
        self.call(
            "createForumTopic",
            json!({ "chat_id": canonical_chat_id(peer), "name": title }),
        )
        .await?;
        Ok(())
    }

    async fn history(&self, _target: &ChatTarget) -> Result<Vec<InboundMessage>, ChatError> {
        Err(ChatError::Unsupported(
            "history export requires a user-session transport",
        ))
    }
}

/// Reduces a username or link reference to the `@handle` form the bot API
/// accepts.
fn normalize_handle(reference: &str) -> String {
    let mut handle = reference.trim().to_string();
    if handle.contains("//") {
        handle = handle
            .split('?')
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
    }
    if handle.starts_with('@') {
        handle
    } else {
        format!("@{handle}")
    }
}

fn parse_chat_kind(kind: &str) -> ChatKind {
    match kind {
        "private" => ChatKind::Private,
        "group" => ChatKind::Group,
        _ => ChatKind::Channel,
    }
}

fn parse_scope(chat: &Value) -> Option<ChatScope> {
    Some(ChatScope {
        id: chat.get("id").and_then(Value::as_i64)?,
        kind: parse_chat_kind(chat.get("type").and_then(Value::as_str).unwrap_or("private")),
        title: chat
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        username: chat
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn parse_entity(chat: &Value) -> Option<EntityInfo> {
    let scope = parse_scope(chat)?;
    Some(EntityInfo {
        id: scope.id,
        kind: scope.kind,
        title: scope.title,
        username: scope.username,
        first_name: chat
            .get("first_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        last_name: chat
            .get("last_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_forum: chat.get("is_forum").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn parse_message(message: &Value) -> Option<InboundMessage> {
    let chat = message.get("chat").and_then(parse_scope)?;
    let id = message.get("message_id").and_then(Value::as_i64)?;
    let sender = message.get("from").map(|from| SenderInfo {
        id: from.get("id").and_then(Value::as_i64),
        username: from
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string),
    });
    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(InboundMessage {
        id,
        chat,
        sender,
        text,
    })
}

fn reaction_emojis(list: Option<&Value>) -> Vec<String> {
    list.and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("emoji").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_update(update: &Value) -> Option<ChatEvent> {
    if let Some(message) = update.get("message") {
        return parse_message(message).map(ChatEvent::Message);
    }
    if let Some(reaction) = update.get("message_reaction") {
        let chat = reaction.get("chat").and_then(parse_scope)?;
        let message_id = reaction.get("message_id").and_then(Value::as_i64)?;
        let old = reaction_emojis(reaction.get("old_reaction"));
        let added = reaction_emojis(reaction.get("new_reaction"))
            .into_iter()
            .filter(|emoji| !old.contains(emoji))
            .collect();
        return Some(ChatEvent::Reactions(ReactionUpdate {
            chat,
            message_id,
            added,
        }));
    }
    None
}
