use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sift_core::safe_name::{safe_name, SAFE_NAME_FALLBACK};
use tracing::debug;

use crate::client::ChatClient;
use crate::error::ChatError;
use crate::types::{ChatKind, ChatTarget, EntityInfo, InboundMessage};

/// Resolves display names for chats and peers, memoizing both the resolved
/// entities and their filesystem-safe names.
///
/// Both caches grow for the process lifetime and are never evicted; peer
/// cardinality is expected to stay small relative to how long the monitor
/// runs.
pub struct NameResolver {
    client: Arc<dyn ChatClient>,
    names: Mutex<HashMap<String, String>>,
    entities: Mutex<HashMap<String, EntityInfo>>,
}

impl NameResolver {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            names: Mutex::new(HashMap::new()),
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `target` through the entity cache.
    pub async fn entity(&self, target: &ChatTarget) -> Result<EntityInfo, ChatError> {
        let key = target.to_string();
        if let Some(cached) = self
            .entities
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).cloned())
        {
            return Ok(cached);
        }
        let entity = self.client.get_entity(target).await?;
        if let Ok(mut cache) = self.entities.lock() {
            cache.insert(key, entity.clone());
        }
        Ok(entity)
    }

    /// Canonical chat id behind `target`.
    pub async fn target_chat_id(&self, target: &ChatTarget) -> Result<i64, ChatError> {
        Ok(self.entity(target).await?.id)
    }

    /// Display name for `target`; with `safe` the result is normalized for
    /// filesystem use and cached. Never fails: unresolvable targets fall back
    /// to a slug derived from the raw reference.
    pub async fn chat_name(&self, target: &ChatTarget, safe: bool) -> String {
        if target_is_empty(target) {
            return SAFE_NAME_FALLBACK.to_string();
        }

        let key = target.to_string();
        if safe {
            if let Some(cached) = self
                .names
                .lock()
                .ok()
                .and_then(|cache| cache.get(&key).cloned())
            {
                return cached;
            }
        }

        match self.entity(target).await {
            Ok(entity) => {
                let name = entity.display_name();
                if safe {
                    let normalized = safe_name(&name);
                    if let Ok(mut cache) = self.names.lock() {
                        cache.insert(key, normalized.clone());
                    }
                    return normalized;
                }
                let trimmed = name.trim().to_string();
                if trimmed.is_empty() {
                    SAFE_NAME_FALLBACK.to_string()
                } else {
                    trimmed
                }
            }
            Err(error) => {
                debug!(target = %key, %error, "entity lookup failed, using slug");
                let slug = reference_slug(&key);
                if safe {
                    let normalized = safe_name(&slug);
                    if let Ok(mut cache) = self.names.lock() {
                        cache.insert(key, normalized.clone());
                    }
                    return normalized;
                }
                if slug.is_empty() {
                    SAFE_NAME_FALLBACK.to_string()
                } else {
                    slug
                }
            }
        }
    }

    /// Builds the provenance line appended to every forwarded annotation:
    /// chat type and name, with a markdown deep link for channel posts.
    pub async fn message_source(&self, message: &InboundMessage) -> String {
        let url = message.url();
        let private = message.chat.kind == ChatKind::Private;

        let mut name = self
            .chat_name(&ChatTarget::Chat(message.chat.id), false)
            .await;
        if private {
            if let Some(username) = message
                .sender
                .as_ref()
                .and_then(|sender| sender.username.as_deref())
            {
                name = format!("@{username}");
            }
        } else if let Some(username) = message.chat.username.as_deref() {
            name = format!("@{username}");
        }

        let base_name = if private {
            format!("{} {name}", message.chat.kind.as_str())
        } else {
            name
        };

        match url {
            Some(url) if !private => format!("Forwarded from: [{base_name}]({url})"),
            Some(url) => format!("Forwarded from: {base_name} - {url}"),
            None => format!("Forwarded from: {base_name}"),
        }
    }
}

fn target_is_empty(target: &ChatTarget) -> bool {
    match target {
        ChatTarget::Chat(id) => *id == 0,
        ChatTarget::Name(name) => name.trim().is_empty(),
    }
}

/// Derives a readable slug from a raw entity reference: usernames lose the
/// `@`, links keep their last path segment, invite hashes get an `invite_`
/// prefix.
fn reference_slug(reference: &str) -> String {
    let mut slug = reference.trim().to_string();
    if let Some(stripped) = slug.strip_prefix('@') {
        slug = stripped.to_string();
    } else if slug.contains("//") {
        let without_query = slug.split('?').next().unwrap_or_default();
        slug = without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if let Some(hash) = slug.strip_prefix('+') {
            slug = format!("invite_{hash}");
        }
    }
    slug
}
