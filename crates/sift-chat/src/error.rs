use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `ChatError` values.
pub enum ChatError {
    #[error("failed to resolve '{target}': {reason}")]
    Resolve { target: String, reason: String },
    #[error("chat API error: {0}")]
    Api(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
