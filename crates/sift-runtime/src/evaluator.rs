use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sift_ai::{ChatMessage, ChatRequest, LlmClient, ResponseSchema};
use tracing::{debug, error};

use crate::instance::Prompt;
use crate::observe::{EvaluationRecord, TraceSink};
use crate::state::SharedStats;

/// Upper bound of the similarity scale.
pub const SCORE_MAX: i64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Result of applying one prompt to one message.
pub struct EvaluateResult {
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub reasoning: String,
}

impl EvaluateResult {
    fn clamped(mut self) -> Self {
        self.score = self.score.clamp(0, SCORE_MAX);
        self
    }
}

/// JSON schema the evaluator hands to the provider for structured output.
pub fn evaluate_result_schema() -> ResponseSchema {
    ResponseSchema {
        name: "EvaluateResult".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "score": { "type": "integer", "minimum": 0, "maximum": SCORE_MAX },
                "quote": { "type": "string" },
                "reasoning": { "type": "string" },
            },
            "required": ["score", "quote", "reasoning"],
            "additionalProperties": false,
        }),
    }
}

/// Scores messages against prompts through the Evaluator capability.
///
/// Every failure mode (missing credentials, transport errors, malformed
/// structured output) collapses to a zero-score result so one broken prompt
/// can never abort the instance's prompt scan or the keyword path.
#[derive(Clone)]
pub struct PromptEvaluator {
    client: Option<Arc<dyn LlmClient>>,
    model: String,
    stats: SharedStats,
    sink: Arc<dyn TraceSink>,
}

impl PromptEvaluator {
    pub fn new(
        client: Option<Arc<dyn LlmClient>>,
        model: impl Into<String>,
        stats: SharedStats,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            stats,
            sink,
        }
    }

    pub async fn evaluate(
        &self,
        prompt: &Prompt,
        text: &str,
        instance_name: &str,
        chat_name: &str,
    ) -> EvaluateResult {
        let Some(compiled) = prompt.compiled() else {
            return EvaluateResult::default();
        };
        let Some(client) = &self.client else {
            return EvaluateResult::default();
        };

        let params = prompt.params.as_ref();
        let request = ChatRequest {
            model: params
                .and_then(|params| params.model.clone())
                .unwrap_or_else(|| self.model.clone()),
            messages: vec![ChatMessage::system(compiled), ChatMessage::user(text)],
            response_schema: Some(evaluate_result_schema()),
            temperature: params.and_then(|params| params.temperature),
            top_p: params.and_then(|params| params.top_p),
        };

        let result = match client.complete(request).await {
            Ok(response) => {
                let result = match serde_json::from_str::<EvaluateResult>(&response.content) {
                    Ok(result) => result.clamped(),
                    Err(parse_error) => {
                        error!(
                            prompt = prompt.display_name(),
                            %parse_error,
                            "evaluator returned malformed result"
                        );
                        EvaluateResult::default()
                    }
                };
                self.stats
                    .add_tokens(instance_name, response.usage.total_tokens);
                let record = EvaluationRecord {
                    instance: instance_name.to_string(),
                    chat: chat_name.to_string(),
                    prompt: prompt.display_name().to_string(),
                    input: text.to_string(),
                    score: result.score,
                    quote: result.quote.clone(),
                    reasoning: result.reasoning.clone(),
                    tokens: response.usage.total_tokens,
                };
                if let Err(sink_error) = self.sink.record(&record) {
                    error!(%sink_error, "failed to record evaluation trace");
                }
                result
            }
            Err(error) => {
                error!(
                    prompt = prompt.display_name(),
                    instance = instance_name,
                    %error,
                    "evaluator call failed"
                );
                EvaluateResult::default()
            }
        };
        debug!(
            prompt = prompt.display_name(),
            score = result.score,
            "prompt check"
        );
        result
    }
}
