use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sift_core::current_unix_timestamp_ms;

/// One evaluator call as recorded for audit.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub instance: String,
    pub chat: String,
    pub prompt: String,
    pub input: String,
    pub score: i64,
    pub quote: String,
    pub reasoning: String,
    pub tokens: u64,
}

/// Optional observability backend for evaluator calls.
///
/// Selected once at startup from credential/config presence; recording is
/// best-effort and every failure is absorbed by the caller.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: &EvaluationRecord) -> Result<()>;
}

/// Default sink when no observability backend is configured.
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record(&self, _record: &EvaluationRecord) -> Result<()> {
        Ok(())
    }
}

/// Appends evaluation records to a jsonl audit log.
pub struct JsonlTraceSink {
    path: PathBuf,
    file: Arc<Mutex<std::fs::File>>,
}

impl JsonlTraceSink {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, record: &EvaluationRecord) -> Result<()> {
        let mut payload = serde_json::to_value(record).context("failed to encode record")?;
        payload["timestamp_unix_ms"] = serde_json::json!(current_unix_timestamp_ms());
        let line = serde_json::to_string(&payload).context("failed to encode record line")?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("trace sink mutex is poisoned"))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(())
    }
}
