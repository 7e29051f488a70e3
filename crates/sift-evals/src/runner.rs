use std::path::Path;

use anyhow::{bail, Context, Result};
use sift_config::MonitorConfig;
use sift_runtime::{Instance, Prompt, PromptEvaluator};
use tracing::debug;

use crate::dataset::EvalRecord;

/// Minimum accuracy an evaluation run must reach to pass.
pub const ACCEPTANCE_ACCURACY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Aggregate result of one evaluation run.
pub struct EvalOutcome {
    pub total: usize,
    pub correct: usize,
}

impl EvalOutcome {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }

    pub fn passed(&self) -> bool {
        self.accuracy() >= ACCEPTANCE_ACCURACY
    }
}

/// Finds the named instance and prompt in the configuration.
pub fn select_prompt(
    config: &MonitorConfig,
    instance_name: &str,
    prompt_name: &str,
) -> Result<(Instance, Prompt)> {
    let instance = config
        .effective_instances()
        .into_iter()
        .map(Instance::from_spec)
        .find(|instance| instance.name == instance_name);
    let Some(instance) = instance else {
        bail!("instance not found: {instance_name}");
    };
    let prompt = instance
        .prompts
        .iter()
        .find(|prompt| prompt.display_name() == prompt_name)
        .cloned();
    let Some(prompt) = prompt else {
        bail!("prompt '{prompt_name}' not found in instance '{instance_name}'");
    };
    Ok((instance, prompt))
}

/// Replays a generated dataset through the evaluator and scores prediction
/// agreement: a row is correct when `score >= threshold` matches its
/// expected label.
pub async fn run_accuracy(
    evaluator: &PromptEvaluator,
    instance: &Instance,
    prompt: &Prompt,
    dataset: &Path,
) -> Result<EvalOutcome> {
    let raw = std::fs::read_to_string(dataset)
        .with_context(|| format!("failed to read dataset {}", dataset.display()))?;

    let mut outcome = EvalOutcome {
        total: 0,
        correct: 0,
    };
    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let record: EvalRecord = serde_json::from_str(line)
            .with_context(|| format!("malformed dataset row in {}", dataset.display()))?;
        let result = evaluator
            .evaluate(prompt, &record.input, &instance.name, "evals")
            .await;
        let predicted = result.score >= prompt.effective_threshold();
        outcome.total += 1;
        if predicted == record.expected.is_match {
            outcome.correct += 1;
        }
        debug!(
            score = result.score,
            predicted,
            expected = record.expected.is_match,
            "evaluated dataset row"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use sift_config::parse_config;
    use sift_runtime::{NoopTraceSink, PromptEvaluator, SharedStats};
    use sift_store::StatsStore;

    use super::{run_accuracy, select_prompt, EvalOutcome, ACCEPTANCE_ACCURACY};

    struct SequenceLlm {
        scores: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl sift_ai::LlmClient for SequenceLlm {
        async fn complete(
            &self,
            _request: sift_ai::ChatRequest,
        ) -> Result<sift_ai::ChatResponse, sift_ai::AiError> {
            let score = self.scores.lock().expect("lock").remove(0);
            Ok(sift_ai::ChatResponse {
                content: format!(r#"{{"score":{score},"quote":"","reasoning":""}}"#),
                finish_reason: Some("stop".to_string()),
                usage: sift_ai::ChatUsage::default(),
            })
        }
    }

    const CONFIG: &str = r#"
instances:
  - name: flats
    prompts:
      - name: housing
        prompt: "housing offers"
        threshold: 4
"#;

    fn evaluator(scores: Vec<i64>, dir: &tempfile::TempDir) -> PromptEvaluator {
        let stats = SharedStats::new(StatsStore::load(
            dir.path().join("stats.json"),
            Duration::from_secs(3600),
        ));
        PromptEvaluator::new(
            Some(Arc::new(SequenceLlm {
                scores: Mutex::new(scores),
            })),
            "gpt-4.1-mini",
            stats,
            Arc::new(NoopTraceSink),
        )
    }

    #[test]
    fn unit_select_prompt_reports_missing_names() {
        let config = parse_config(CONFIG).expect("config");
        assert!(select_prompt(&config, "flats", "housing").is_ok());
        let error = select_prompt(&config, "absent", "housing").expect_err("instance");
        assert!(error.to_string().contains("instance not found"));
        let error = select_prompt(&config, "flats", "absent").expect_err("prompt");
        assert!(error.to_string().contains("prompt 'absent' not found"));
    }

    #[tokio::test]
    async fn functional_run_accuracy_scores_agreement() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = dir.path().join("messages.jsonl");
        std::fs::write(
            &dataset,
            concat!(
                r#"{"input":"good","expected":{"is_match":true},"trace_id":null}"#,
                "\n",
                r#"{"input":"bad","expected":{"is_match":false},"trace_id":null}"#,
                "\n",
                r#"{"input":"missed","expected":{"is_match":true},"trace_id":null}"#,
                "\n",
            ),
        )
        .expect("write dataset");

        let config = parse_config(CONFIG).expect("config");
        let (instance, prompt) = select_prompt(&config, "flats", "housing").expect("select");
        // Scores: 5 (predicts match, correct), 1 (predicts no match,
        // correct), 1 (predicts no match, wrong).
        let evaluator = evaluator(vec![5, 1, 1], &dir);
        let outcome = run_accuracy(&evaluator, &instance, &prompt, &dataset)
            .await
            .expect("run");
        assert_eq!(
            outcome,
            EvalOutcome {
                total: 3,
                correct: 2
            }
        );
        assert!(outcome.accuracy() > 0.66 && outcome.accuracy() < 0.67);
        assert!(!outcome.passed());
    }

    #[test]
    fn unit_outcome_accuracy_edges() {
        let empty = EvalOutcome {
            total: 0,
            correct: 0,
        };
        assert_eq!(empty.accuracy(), 0.0);
        let passing = EvalOutcome {
            total: 10,
            correct: 8,
        };
        assert!(passing.accuracy() >= ACCEPTANCE_ACCURACY);
        assert!(passing.passed());
    }

    #[tokio::test]
    async fn regression_missing_dataset_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = parse_config(CONFIG).expect("config");
        let (instance, prompt) = select_prompt(&config, "flats", "housing").expect("select");
        let evaluator = evaluator(vec![], &dir);
        let error = run_accuracy(
            &evaluator,
            &instance,
            &prompt,
            &dir.path().join("absent.jsonl"),
        )
        .await
        .expect_err("missing dataset");
        assert!(error.to_string().contains("failed to read dataset"));
    }
}
