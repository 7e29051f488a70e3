//! YAML configuration model for the monitor.
//!
//! Keeps the historical flat single-instance layout loadable: when no
//! `instances` list is present, the top-level word/target fields are folded
//! into one synthetic `default` instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "data/config.yml";
/// Environment variable overriding the config location.
pub const CONFIG_PATH_ENV: &str = "SIFT_CONFIG";

fn default_log_level() -> String {
    "info".to_string()
}

fn default_openai_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_rescan_interval() -> u64 {
    3_600
}

fn default_flush_interval() -> u64 {
    60
}

fn default_instance_name() -> String {
    "instance".to_string()
}

fn default_threshold() -> i64 {
    4
}

fn default_registry_label() -> Option<String> {
    Some("latest".to_string())
}

fn default_registry_kind() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
/// Top-level monitor configuration.
pub struct MonitorConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default)]
    pub openai_api_base: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub registry_public_key: Option<String>,
    #[serde(default)]
    pub registry_secret_key: Option<String>,
    #[serde(default)]
    pub registry_base_url: Option<String>,
    #[serde(default)]
    pub ignore_usernames: Vec<String>,
    #[serde(default)]
    pub ignore_user_ids: Vec<i64>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_seconds: u64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
    #[serde(default)]
    pub instances: Option<Vec<InstanceSpec>>,

    // Historical flat layout, folded into a single instance when no
    // `instances` list is configured.
    #[serde(default)]
    words: Vec<String>,
    #[serde(default)]
    negative_words: Vec<String>,
    #[serde(default)]
    ignore_words: Vec<String>,
    #[serde(default)]
    folders: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    chat_ids: Vec<i64>,
    #[serde(default)]
    target_chat: Option<i64>,
    #[serde(default)]
    target_entity: Option<String>,
    #[serde(default)]
    false_positive_entity: Option<String>,
    #[serde(default)]
    true_positive_entity: Option<String>,
    #[serde(default)]
    no_forward_message: bool,
}

impl MonitorConfig {
    /// Configured instances, or the synthetic `default` instance built from
    /// the flat legacy fields.
    pub fn effective_instances(&self) -> Vec<InstanceSpec> {
        if let Some(instances) = &self.instances {
            return instances.clone();
        }
        vec![InstanceSpec {
            name: "default".to_string(),
            words: self.words.clone(),
            negative_words: self.negative_words.clone(),
            ignore_words: self.ignore_words.clone(),
            folders: self.folders.clone(),
            entities: self.entities.clone(),
            chat_ids: self.chat_ids.clone(),
            target_chat: self.target_chat,
            target_entity: self.target_entity.clone(),
            false_positive_entity: self.false_positive_entity.clone(),
            true_positive_entity: self.true_positive_entity.clone(),
            no_forward_message: self.no_forward_message,
            ..InstanceSpec::default()
        }]
    }

    /// Chat transport credentials; missing credentials are fatal at startup.
    pub fn bot_credentials(&self) -> Result<(String, String)> {
        let token = self
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .context("bot_token must be set in config")?;
        let api_base = self
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.telegram.org".to_string());
        Ok((token.to_string(), api_base))
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join("stats.json")
    }

    pub fn trace_path(&self) -> PathBuf {
        self.data_dir.join("trace_ids.json")
    }

    pub fn evals_dir(&self) -> PathBuf {
        self.data_dir.join("evals")
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_seconds)
    }

    pub fn registry_configured(&self) -> bool {
        self.registry_public_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
            && self
                .registry_secret_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
/// One monitoring instance as configured.
pub struct InstanceSpec {
    #[serde(default = "default_instance_name")]
    pub name: String,
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub negative_words: Vec<String>,
    #[serde(default)]
    pub ignore_words: Vec<String>,
    #[serde(default)]
    pub target_chat: Option<i64>,
    #[serde(default)]
    pub target_entity: Option<String>,
    #[serde(default)]
    pub false_positive_entity: Option<String>,
    #[serde(default)]
    pub true_positive_entity: Option<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    #[serde(default)]
    pub folder_mute: bool,
    #[serde(default)]
    pub no_forward_message: bool,
    #[serde(default)]
    pub prompts: Vec<PromptEntry>,
    #[serde(default)]
    pub folder_add_topic: Vec<TopicSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
/// A prompt is either bare instruction text or a full spec table.
pub enum PromptEntry {
    Text(String),
    Spec(PromptSpec),
}

impl PromptEntry {
    /// Normalizes either form into a [`PromptSpec`].
    pub fn into_spec(self) -> PromptSpec {
        match self {
            Self::Text(text) => PromptSpec {
                prompt: Some(text),
                ..PromptSpec::default()
            },
            Self::Spec(spec) => spec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// One LLM matching rule as configured.
pub struct PromptSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: i64,
    #[serde(default)]
    pub registry_name: Option<String>,
    #[serde(default = "default_registry_label")]
    pub registry_label: Option<String>,
    #[serde(default)]
    pub registry_version: Option<i64>,
    #[serde(default = "default_registry_kind")]
    pub registry_kind: String,
    #[serde(default)]
    pub params: Option<PromptParams>,
}

impl Default for PromptSpec {
    fn default() -> Self {
        Self {
            name: None,
            prompt: None,
            threshold: default_threshold(),
            registry_name: None,
            registry_label: default_registry_label(),
            registry_version: None,
            registry_kind: default_registry_kind(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
/// Per-prompt completion parameter overrides.
pub struct PromptParams {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
/// Discussion topic to auto-create in folder forum chats.
pub struct TopicSpec {
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Resolves the config path: explicit flag, then env var, then the default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
        if !env_path.trim().is_empty() {
            return PathBuf::from(env_path);
        }
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Loads and parses the YAML config. A missing file is a startup error; an
/// empty file yields all defaults.
pub fn load_config(path: &Path) -> Result<MonitorConfig> {
    if !path.exists() {
        bail!("config file not found: {}", path.display());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<MonitorConfig> {
    let effective = if raw.trim().is_empty() { "{}" } else { raw };
    let config: MonitorConfig =
        serde_yaml::from_str(effective).context("failed to parse config yaml")?;
    Ok(config)
}
