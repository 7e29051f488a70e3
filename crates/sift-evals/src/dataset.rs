use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sift_chat::{ChatClient, ChatTarget};
use sift_config::MonitorConfig;
use sift_core::safe_name;
use sift_runtime::{Instance, Prompt};
use sift_store::TraceStore;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Expected label for one dataset row.
pub struct EvalExpected {
    pub is_match: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One `messages.jsonl` row.
pub struct EvalRecord {
    pub input: String,
    pub expected: EvalExpected,
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// Dataset directory for one (instance, prompt, suffix) triple, with names
/// normalized for filesystem use.
pub fn eval_dir(root: &Path, instance_name: &str, prompt_name: &str, suffix: &str) -> PathBuf {
    root.join(format!(
        "{}_{}_{suffix}",
        safe_name(instance_name),
        safe_name(prompt_name)
    ))
}

/// Generates evaluation datasets for every instance that has both feedback
/// channels configured: one directory per prompt with `messages.jsonl`, a
/// `task.yml` descriptor, and a `README.md`.
pub async fn generate_datasets(
    client: Arc<dyn ChatClient>,
    config: &MonitorConfig,
    traces: &TraceStore,
    suffix: &str,
) -> Result<()> {
    let root = config.evals_dir();
    for spec in config.effective_instances() {
        let instance = Instance::from_spec(spec);
        let (Some(true_positive), Some(false_positive)) = (
            instance.true_positive_entity.as_deref(),
            instance.false_positive_entity.as_deref(),
        ) else {
            continue;
        };

        let mut records = Vec::new();
        for (channel, is_match) in [(true_positive, true), (false_positive, false)] {
            let messages = client
                .history(&ChatTarget::Name(channel.to_string()))
                .await
                .with_context(|| format!("failed to export history of {channel}"))?;
            for message in messages {
                let Some(text) = message.text.filter(|text| !text.is_empty()) else {
                    continue;
                };
                records.push(EvalRecord {
                    input: text,
                    expected: EvalExpected { is_match },
                    trace_id: traces.get(message.chat.id, message.id),
                });
            }
        }

        for prompt in &instance.prompts {
            let dir = eval_dir(&root, &instance.name, prompt.display_name(), suffix);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;

            let mut jsonl = String::new();
            for record in &records {
                jsonl.push_str(&serde_json::to_string(record).context("failed to encode row")?);
                jsonl.push('\n');
            }
            std::fs::write(dir.join("messages.jsonl"), jsonl)
                .with_context(|| format!("failed to write dataset in {}", dir.display()))?;
            std::fs::write(dir.join("task.yml"), render_task_yaml(&instance, prompt))
                .with_context(|| format!("failed to write task.yml in {}", dir.display()))?;
            std::fs::write(
                dir.join("README.md"),
                render_readme(&instance, prompt, suffix),
            )
            .with_context(|| format!("failed to write README.md in {}", dir.display()))?;

            info!(
                instance = %instance.name,
                prompt = prompt.display_name(),
                rows = records.len(),
                dir = %dir.display(),
                "wrote evaluation dataset"
            );
        }
    }
    Ok(())
}

fn render_task_yaml(instance: &Instance, prompt: &Prompt) -> String {
    let params = prompt.params.as_ref();
    let model = params
        .and_then(|params| params.model.as_deref())
        .unwrap_or("gpt-4.1");
    let temperature = params
        .and_then(|params| params.temperature)
        .unwrap_or(0.2);
    format!(
        r#"eval_name: {inst}_{prm}
dataset: ./messages.jsonl

model: {model}
modelParameters:
  temperature: {temperature}
  response_format: {{ type: json_schema }}
messages:
  - role: system
    content: |
      {prompt_text}
  - role: user
    content: |
      {{input}}

task: threshold-accuracy
threshold: {threshold}
metrics: [accuracy]
"#,
        inst = safe_name(&instance.name),
        prm = safe_name(prompt.display_name()),
        prompt_text = prompt.text().unwrap_or(""),
        threshold = prompt.effective_threshold(),
    )
}

fn render_readme(instance: &Instance, prompt: &Prompt, suffix: &str) -> String {
    format!(
        r#"# Evaluation for {inst} - {prm}

To run this evaluation:

```bash
sift run-evals --instance "{inst}" --prompt "{prm}" --suffix {suffix}
```
"#,
        inst = instance.name,
        prm = prompt.display_name(),
    )
}
