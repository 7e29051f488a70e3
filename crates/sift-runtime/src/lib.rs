//! Core decision and forwarding pipeline for the Sift monitor.
//!
//! Layering mirrors the data flow: the [`MatchPolicy`] decides per message
//! (ignore/negative filters, exact keywords, then ordered LLM prompts with
//! early exit), the [`ForwardingEngine`] executes forward decisions, the
//! [`ChatIdResolver`] keeps each instance's chat-id set fresh, and the
//! [`ReactionFeedbackTracker`] turns human reactions on forwarded messages
//! into labeled dataset captures. The [`Monitor`] wires it all to the chat
//! event stream.

mod evaluator;
mod feedback;
mod forwarding;
mod instance;
mod monitor;
mod observe;
mod policy;
mod registry;
mod resolver;
mod state;

pub use evaluator::{evaluate_result_schema, EvaluateResult, PromptEvaluator, SCORE_MAX};
pub use feedback::{ReactionFeedbackTracker, NEGATIVE_EMOJI, POSITIVE_EMOJI};
pub use forwarding::{forward_reason_text, ForwardingEngine};
pub use instance::{Instance, Prompt, RegistryLink, DEFAULT_THRESHOLD};
pub use monitor::{run_monitor, Monitor, MonitorRuntimeConfig};
pub use observe::{EvaluationRecord, JsonlTraceSink, NoopTraceSink, TraceSink};
pub use policy::{find_word, word_in_text, Decision, DropReason, MatchPolicy, PromptMatch};
pub use registry::{
    hydrate_prompts, HttpPromptRegistry, NoopPromptRegistry, PromptRegistry, RegistryConfig,
    RegistryError, RegistryPrompt,
};
pub use resolver::ChatIdResolver;
pub use state::{SharedStats, SharedTraces};
