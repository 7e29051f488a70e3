use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::instance::{Instance, Prompt, RegistryLink};

#[derive(Debug, Error)]
/// Enumerates supported `RegistryError` values.
pub enum RegistryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry returned non-success status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq)]
/// Prompt text as stored in the external registry.
pub struct RegistryPrompt {
    pub text: String,
    pub version: Option<i64>,
}

#[async_trait]
/// Optional external prompt registry, injected with a no-op default when no
/// credentials are configured.
pub trait PromptRegistry: Send + Sync {
    fn enabled(&self) -> bool {
        true
    }

    /// Fetches the registry copy of a prompt; `Ok(None)` when absent.
    async fn fetch(&self, link: &RegistryLink) -> Result<Option<RegistryPrompt>, RegistryError>;

    /// Publishes `text` as a new version of the prompt.
    async fn publish(
        &self,
        link: &RegistryLink,
        text: &str,
    ) -> Result<RegistryPrompt, RegistryError>;
}

/// Default registry when no credentials are present: hydration is skipped
/// entirely.
pub struct NoopPromptRegistry;

#[async_trait]
impl PromptRegistry for NoopPromptRegistry {
    fn enabled(&self) -> bool {
        false
    }

    async fn fetch(&self, _link: &RegistryLink) -> Result<Option<RegistryPrompt>, RegistryError> {
        Ok(None)
    }

    async fn publish(
        &self,
        _link: &RegistryLink,
        text: &str,
    ) -> Result<RegistryPrompt, RegistryError> {
        Ok(RegistryPrompt {
            text: text.to_string(),
            version: None,
        })
    }
}

#[derive(Debug, Clone)]
/// Public struct `RegistryConfig` used across Sift components.
pub struct RegistryConfig {
    pub base_url: String,
    pub public_key: String,
    pub secret_key: String,
    pub request_timeout_ms: u64,
}

/// HTTP-backed prompt registry client.
pub struct HttpPromptRegistry {
    http: reqwest::Client,
    config: RegistryConfig,
}

impl HttpPromptRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;
        Ok(Self { http, config })
    }

    fn prompts_url(&self) -> String {
        format!(
            "{}/api/public/v2/prompts",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn parse_prompt(value: &Value) -> Result<RegistryPrompt, RegistryError> {
        let text = value
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistryError::InvalidResponse("prompt text is not a string".into()))?;
        Ok(RegistryPrompt {
            text: text.to_string(),
            version: value.get("version").and_then(Value::as_i64),
        })
    }
}

#[async_trait]
impl PromptRegistry for HttpPromptRegistry {
    async fn fetch(&self, link: &RegistryLink) -> Result<Option<RegistryPrompt>, RegistryError> {
        let Some(name) = link.name.as_deref() else {
            return Ok(None);
        };
        let mut request = self
            .http
            .get(format!("{}/{name}", self.prompts_url()))
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key));
        if let Some(label) = link.label.as_deref() {
            request = request.query(&[("label", label)]);
        }
        if let Some(version) = link.version {
            request = request.query(&[("version", version.to_string())]);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|error| RegistryError::InvalidResponse(error.to_string()))?;
        Self::parse_prompt(&value).map(Some)
    }

    async fn publish(
        &self,
        link: &RegistryLink,
        text: &str,
    ) -> Result<RegistryPrompt, RegistryError> {
        let Some(name) = link.name.as_deref() else {
            return Err(RegistryError::InvalidResponse(
                "cannot publish a prompt without a registry name".into(),
            ));
        };
        let labels: Vec<&str> = link.label.as_deref().into_iter().collect();
        let response = self
            .http
            .post(self.prompts_url())
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&serde_json::json!({
                "name": name,
                "prompt": text,
                "type": link.kind,
                "labels": labels,
            }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|error| RegistryError::InvalidResponse(error.to_string()))?;
        Self::parse_prompt(&value)
    }
}

/// Hydrates every registry-linked prompt of an instance: adopts the registry
/// text, publishes a new version when the local config text drifted, and
/// creates missing prompts from the local text. All failures are absorbed.
pub async fn hydrate_prompts(registry: &dyn PromptRegistry, instance: &mut Instance) {
    if !registry.enabled() {
        return;
    }
    for prompt in &mut instance.prompts {
        hydrate_prompt(registry, prompt).await;
    }
}

async fn hydrate_prompt(registry: &dyn PromptRegistry, prompt: &mut Prompt) {
    let Some(name) = prompt.registry.name.clone() else {
        return;
    };
    let local_text = prompt.text().map(str::to_string);

    let adopted = match registry.fetch(&prompt.registry).await {
        Ok(Some(remote)) => {
            match &local_text {
                Some(local) if *local != remote.text => {
                    // Local config drifted: publish it as the new version,
                    // falling back to the fetched copy when that fails.
                    match registry.publish(&prompt.registry, local).await {
                        Ok(published) => Some(published),
                        Err(error) => {
                            error!(prompt = %name, %error, "failed to publish prompt version");
                            Some(remote)
                        }
                    }
                }
                _ => Some(remote),
            }
        }
        Ok(None) => match registry
            .publish(&prompt.registry, local_text.as_deref().unwrap_or(""))
            .await
        {
            Ok(published) => Some(published),
            Err(error) => {
                error!(prompt = %name, %error, "failed to create registry prompt");
                None
            }
        },
        Err(error) => {
            error!(prompt = %name, %error, "failed to fetch registry prompt");
            None
        }
    };

    if let Some(adopted) = adopted {
        debug!(prompt = %name, version = ?adopted.version, "hydrated prompt from registry");
        if adopted.version.is_some() {
            prompt.registry.version = adopted.version;
        }
        prompt.set_text(adopted.text);
    }
}
