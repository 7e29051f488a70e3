use std::collections::HashSet;

use sift_chat::ChatTarget;
use sift_config::{InstanceSpec, PromptParams, PromptSpec, TopicSpec};

/// Default acceptance threshold on the 0-5 similarity scale.
pub const DEFAULT_THRESHOLD: i64 = 4;

const RUBRIC: &str = "Evaluate message similarity: 0 - not match at all, 5 - strongly match. \
Cite most similar text fragment without change in quote field.";

#[derive(Debug, Clone, Default, PartialEq)]
/// External prompt-registry linkage, used only to hydrate prompt text.
pub struct RegistryLink {
    pub name: Option<String>,
    pub label: Option<String>,
    pub version: Option<i64>,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
/// One LLM matching rule with its cached compiled system prompt.
///
/// `compiled` is a derived field rebuilt whenever the raw text changes (at
/// construction and after registry hydration), never lazily on the hot path.
pub struct Prompt {
    pub name: Option<String>,
    text: Option<String>,
    pub threshold: i64,
    pub registry: RegistryLink,
    pub params: Option<PromptParams>,
    compiled: Option<String>,
}

impl Prompt {
    pub fn from_spec(spec: PromptSpec) -> Self {
        let mut prompt = Self {
            name: spec.name,
            text: spec.prompt,
            threshold: spec.threshold,
            registry: RegistryLink {
                name: spec.registry_name,
                label: spec.registry_label,
                version: spec.registry_version,
                kind: spec.registry_kind,
            },
            params: spec.params,
            compiled: None,
        };
        prompt.rebuild_compiled();
        prompt
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("prompt")
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Replaces the raw text and rebuilds the compiled system prompt.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
        self.rebuild_compiled();
    }

    pub fn compiled(&self) -> Option<&str> {
        self.compiled.as_deref()
    }

    /// A zero threshold falls back to the default, matching how the config
    /// has always been interpreted.
    pub fn effective_threshold(&self) -> i64 {
        if self.threshold == 0 {
            DEFAULT_THRESHOLD
        } else {
            self.threshold
        }
    }

    fn rebuild_compiled(&mut self) {
        self.compiled = self
            .text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| format!("{text}\n\n{RUBRIC}"));
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One live monitoring instance. `chat_ids` is mutated in place by periodic
/// rescans and only ever grows.
pub struct Instance {
    pub name: String,
    pub words: Vec<String>,
    pub negative_words: Vec<String>,
    pub ignore_words: Vec<String>,
    pub target_chat: Option<i64>,
    pub target_entity: Option<String>,
    pub false_positive_entity: Option<String>,
    pub true_positive_entity: Option<String>,
    pub folders: Vec<String>,
    pub entities: Vec<String>,
    pub chat_ids: HashSet<i64>,
    pub folder_mute: bool,
    pub no_forward_message: bool,
    pub prompts: Vec<Prompt>,
    pub folder_add_topic: Vec<TopicSpec>,
}

impl Instance {
    pub fn from_spec(spec: InstanceSpec) -> Self {
        Self {
            name: spec.name,
            words: spec.words,
            negative_words: spec.negative_words,
            ignore_words: spec.ignore_words,
            target_chat: spec.target_chat,
            target_entity: spec.target_entity,
            false_positive_entity: spec.false_positive_entity,
            true_positive_entity: spec.true_positive_entity,
            folders: spec.folders,
            entities: spec.entities,
            chat_ids: spec.chat_ids.into_iter().collect(),
            folder_mute: spec.folder_mute,
            no_forward_message: spec.no_forward_message,
            prompts: spec
                .prompts
                .into_iter()
                .map(|entry| Prompt::from_spec(entry.into_spec()))
                .collect(),
            folder_add_topic: spec.folder_add_topic,
        }
    }

    /// Applies a reloaded spec in place. Everything is replaced except the
    /// live chat-id set, which only gains the spec's seed ids (rescans are
    /// monotonic).
    pub fn apply_spec(&mut self, spec: InstanceSpec) {
        let mut refreshed = Instance::from_spec(spec);
        refreshed.chat_ids.extend(self.chat_ids.iter().copied());
        refreshed.name = std::mem::take(&mut self.name);
        *self = refreshed;
    }

    /// Forward destinations in configured order: raw chat id first, then the
    /// named entity.
    pub fn destinations(&self) -> Vec<ChatTarget> {
        let mut destinations = Vec::new();
        if let Some(chat_id) = self.target_chat {
            destinations.push(ChatTarget::Chat(chat_id));
        }
        if let Some(entity) = self
            .target_entity
            .as_deref()
            .filter(|entity| !entity.trim().is_empty())
        {
            destinations.push(ChatTarget::Name(entity.to_string()));
        }
        destinations
    }
}
