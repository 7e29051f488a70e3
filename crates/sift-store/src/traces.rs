use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use sift_core::write_text_atomic;
use tracing::{debug, warn};

/// Maps (chat id, message id) to the external trace id recorded for that
/// message's evaluation. Last write wins; keys are stored as strings to
/// match the on-disk JSON shape.
pub struct TraceStore {
    path: PathBuf,
    flush_interval: Duration,
    last_flush: Instant,
    dirty: bool,
    data: BTreeMap<String, BTreeMap<String, String>>,
}

impl TraceStore {
    /// Loads the store; missing or corrupt files reset to empty. A legacy
    /// flat `{message_id: trace_id}` file is nested under chat key `"0"`.
    pub fn load(path: impl Into<PathBuf>, flush_interval: Duration) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => parse_traces(&raw).unwrap_or_else(|| {
                warn!(path = %path.display(), "trace file is corrupt, resetting");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            flush_interval,
            last_flush: Instant::now(),
            dirty: false,
            data,
        }
    }

    /// Records a trace id; `None` is ignored so callers can pass through
    /// optional backend results unchecked.
    pub fn set(&mut self, chat_id: i64, message_id: i64, trace_id: Option<&str>) {
        let Some(trace_id) = trace_id else {
            return;
        };
        self.data
            .entry(chat_id.to_string())
            .or_default()
            .insert(message_id.to_string(), trace_id.to_string());
        self.dirty = true;
        if self.last_flush.elapsed() >= self.flush_interval {
            if let Err(error) = self.flush() {
                warn!(%error, "periodic trace flush failed");
            }
        }
    }

    /// Returns the trace id for the pair, or `None` when absent.
    pub fn get(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.data
            .get(&chat_id.to_string())
            .and_then(|chat| chat.get(&message_id.to_string()))
            .cloned()
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        debug!(path = %self.path.display(), "flushing trace ids");
        let mut payload =
            serde_json::to_string_pretty(&self.data).context("failed to serialize trace ids")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write trace file {}", self.path.display()))?;
        self.last_flush = Instant::now();
        self.dirty = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_traces(raw: &str) -> Option<BTreeMap<String, BTreeMap<String, String>>> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    if !object.is_empty() && object.values().all(Value::is_string) {
        // Legacy format without chat ids.
        let flat = object
            .iter()
            .map(|(message_id, trace_id)| {
                (
                    message_id.clone(),
                    trace_id.as_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        return Some(BTreeMap::from([("0".to_string(), flat)]));
    }
    serde_json::from_value(value).ok()
}
