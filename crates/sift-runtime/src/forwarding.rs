use std::sync::Arc;

use anyhow::Result;
use sift_chat::{peer_from_canonical, ChatClient, ChatTarget, InboundMessage, NameResolver};
use tracing::{error, info};

use crate::instance::Instance;
use crate::policy::Decision;

/// Human-readable reason line prepended to the forwarded annotation.
pub fn forward_reason_text(decision: &Decision) -> String {
    match decision {
        Decision::ForwardWord(word) => format!("word: {word}"),
        Decision::ForwardPrompt(Some(best)) => {
            let name = best.prompt_name.as_deref().unwrap_or("prompt");
            let mut reason = format!("{name}: {}/5", best.score);
            if !best.quote.is_empty() {
                reason.push_str(&format!(" - `{}`", best.quote));
            }
            if !best.reasoning.is_empty() {
                reason.push_str(&format!("\n\n{}", best.reasoning));
            }
            reason
        }
        _ => String::new(),
    }
}

/// Executes forward decisions: sends the annotation, forwards the original
/// message to every configured destination, and logs the outcome.
///
/// Forwarding is best-effort with exactly one attempt: any failure is logged
/// and the message is lost for the remaining destinations, but later
/// messages are unaffected.
pub struct ForwardingEngine {
    client: Arc<dyn ChatClient>,
    names: Arc<NameResolver>,
}

impl ForwardingEngine {
    pub fn new(client: Arc<dyn ChatClient>, names: Arc<NameResolver>) -> Self {
        Self { client, names }
    }

    pub async fn forward(&self, instance: &Instance, message: &InboundMessage, decision: &Decision) {
        let chat_name = self
            .names
            .chat_name(&ChatTarget::Chat(message.chat.id), true)
            .await;
        if let Err(error) = self
            .forward_inner(instance, message, decision, &chat_name)
            .await
        {
            error!(
                message_id = message.id,
                instance = %instance.name,
                %error,
                "failed to forward message"
            );
        }
    }

    async fn forward_inner(
        &self,
        instance: &Instance,
        message: &InboundMessage,
        decision: &Decision,
        chat_name: &str,
    ) -> Result<()> {
        let reason = forward_reason_text(decision);
        let source = self.names.message_source(message).await;
        let annotation = if reason.is_empty() {
            source
        } else {
            format!("{reason}\n\n{source}")
        };

        for destination in instance.destinations() {
            let destination_name = self.names.chat_name(&destination, true).await;
            if !instance.no_forward_message {
                self.client
                    .send_message(&destination, &annotation, None)
                    .await?;
            }
            let forwarded = self
                .client
                .forward_message(
                    peer_from_canonical(message.chat.id),
                    message.id,
                    &destination,
                )
                .await?;
            let url = forwarded.and_then(|forwarded| forwarded.url());
            info!(
                message_id = message.id,
                from = %chat_name,
                to = %destination_name,
                instance = %instance.name,
                url = url.as_deref().unwrap_or("-"),
                "forwarded message"
            );
        }
        Ok(())
    }
}
