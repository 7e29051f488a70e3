use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use sift_chat::{peer_from_canonical, ChatClient, ChatTarget, NameResolver, ReactionUpdate};
use tracing::{debug, error, info};

use crate::instance::Instance;

/// Thumbs-up marks a forwarded message as a true positive.
pub const POSITIVE_EMOJI: &str = "\u{1F44D}";
/// Thumbs-down marks a forwarded message as a false positive.
pub const NEGATIVE_EMOJI: &str = "\u{1F44E}";

/// Forwards human reaction feedback on forwarded messages into the labeled
/// true-positive / false-positive capture channels, at most once per
/// (chat, message, polarity).
///
/// The dedup sets live only for the process lifetime; a restart re-allows
/// one duplicate forward per previously reacted message. Reactions are rare
/// and the duplicate is harmless at the destination, so they are not
/// persisted.
pub struct ReactionFeedbackTracker {
    client: Arc<dyn ChatClient>,
    names: Arc<NameResolver>,
    forwarded_positive: Mutex<HashSet<(i64, i64)>>,
    forwarded_negative: Mutex<HashSet<(i64, i64)>>,
}

impl ReactionFeedbackTracker {
    pub fn new(client: Arc<dyn ChatClient>, names: Arc<NameResolver>) -> Self {
        Self {
            client,
            names,
            forwarded_positive: Mutex::new(HashSet::new()),
            forwarded_negative: Mutex::new(HashSet::new()),
        }
    }

    pub async fn handle_reaction(&self, instances: &[Instance], update: &ReactionUpdate) {
        let positive = update.added.iter().any(|emoji| emoji == POSITIVE_EMOJI);
        let negative = update.added.iter().any(|emoji| emoji == NEGATIVE_EMOJI);
        if !positive && !negative {
            debug!(
                chat = update.chat.id,
                message_id = update.message_id,
                "ignoring unrecognized reaction"
            );
            return;
        }

        for instance in instances {
            if !self.targets_chat(instance, update.chat.id).await {
                continue;
            }
            if positive {
                self.forward_feedback(
                    instance,
                    instance.true_positive_entity.as_deref(),
                    &self.forwarded_positive,
                    update,
                    "positive",
                )
                .await;
            }
            if negative {
                self.forward_feedback(
                    instance,
                    instance.false_positive_entity.as_deref(),
                    &self.forwarded_negative,
                    update,
                    "negative",
                )
                .await;
            }
        }
    }

    /// True when the reaction happened in one of the instance's forwarding
    /// destinations.
    async fn targets_chat(&self, instance: &Instance, chat_id: i64) -> bool {
        if instance.target_chat == Some(chat_id) {
            return true;
        }
        if let Some(entity) = instance.target_entity.as_deref() {
            match self
                .names
                .target_chat_id(&ChatTarget::Name(entity.to_string()))
                .await
            {
                Ok(target_id) if target_id == chat_id => return true,
                Ok(_) => {}
                Err(error) => {
                    error!(entity = %entity, %error, "failed to resolve forwarding target")
                }
            }
        }
        false
    }

    async fn forward_feedback(
        &self,
        instance: &Instance,
        destination: Option<&str>,
        seen: &Mutex<HashSet<(i64, i64)>>,
        update: &ReactionUpdate,
        polarity: &'static str,
    ) {
        let Some(destination) = destination.filter(|dest| !dest.trim().is_empty()) else {
            debug!(
                instance = %instance.name,
                polarity,
                "reaction observed but no feedback destination configured"
            );
            return;
        };

        // Mark before sending: duplicate reaction-update deliveries must not
        // produce duplicate forwards, even if the first attempt fails.
        let key = (update.chat.id, update.message_id);
        match seen.lock() {
            Ok(mut guard) => {
                if !guard.insert(key) {
                    return;
                }
            }
            Err(_) => {
                error!("feedback dedup mutex is poisoned, dropping reaction");
                return;
            }
        }

        match self
            .client
            .forward_message(
                peer_from_canonical(update.chat.id),
                update.message_id,
                &ChatTarget::Name(destination.to_string()),
            )
            .await
        {
            Ok(_) => info!(
                instance = %instance.name,
                message_id = update.message_id,
                destination = %destination,
                polarity,
                "forwarded feedback"
            ),
            Err(error) => error!(
                instance = %instance.name,
                message_id = update.message_id,
                destination = %destination,
                %error,
                "failed to forward feedback"
            ),
        }
    }
}
