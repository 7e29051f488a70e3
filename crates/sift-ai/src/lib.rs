//! Evaluator capability boundary for Sift.
//!
//! Defines the [`LlmClient`] trait the scoring pipeline consumes plus an
//! OpenAI-compatible HTTP implementation with JSON-schema structured output.
mod openai;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{
    AiError, ChatMessage, ChatRequest, ChatResponse, ChatUsage, LlmClient, MessageRole,
    ResponseSchema,
};
