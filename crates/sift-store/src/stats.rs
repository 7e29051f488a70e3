use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_core::{current_utc_day, write_text_atomic};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How one (instance, message) pair was handled, for counter bookkeeping.
pub enum MessageOutcome {
    NotForwarded,
    ForwardedByWord,
    ForwardedByPrompt,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Counter block mirrored at global, per-instance, and per-day granularity.
pub struct StatCounters {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub forwarded_total: u64,
    #[serde(default)]
    pub forwarded_words: u64,
    #[serde(default)]
    pub forwarded_prompt: u64,
    #[serde(default)]
    pub tokens: u64,
}

impl StatCounters {
    fn record(&mut self, outcome: MessageOutcome) {
        self.total += 1;
        match outcome {
            MessageOutcome::NotForwarded => {}
            MessageOutcome::ForwardedByWord => {
                self.forwarded_total += 1;
                self.forwarded_words += 1;
            }
            MessageOutcome::ForwardedByPrompt => {
                self.forwarded_total += 1;
                self.forwarded_prompt += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `DayCounters` used across Sift components.
pub struct DayCounters {
    #[serde(default)]
    pub stats: StatCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `InstanceCounters` used across Sift components.
pub struct InstanceCounters {
    pub name: String,
    #[serde(default)]
    pub stats: StatCounters,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub days: BTreeMap<String, DayCounters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// On-disk shape of the stats file.
pub struct StatsSnapshot {
    #[serde(default)]
    pub stats: StatCounters,
    #[serde(default)]
    pub instances: Vec<InstanceCounters>,
}

/// Collects and periodically flushes statistics about processed messages.
pub struct StatsStore {
    path: PathBuf,
    flush_interval: Duration,
    last_flush: Instant,
    dirty: bool,
    data: StatsSnapshot,
}

impl StatsStore {
    /// Loads the store from `path`. A missing or corrupt file resets to an
    /// empty snapshot; legacy flat-counter files are migrated transparently.
    pub fn load(path: impl Into<PathBuf>, flush_interval: Duration) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => parse_snapshot(&raw).unwrap_or_else(|| {
                warn!(path = %path.display(), "stats file is corrupt, resetting");
                StatsSnapshot::default()
            }),
            Err(_) => StatsSnapshot::default(),
        };
        Self {
            path,
            flush_interval,
            last_flush: Instant::now(),
            dirty: false,
            data,
        }
    }

    fn instance_entry(&mut self, name: &str) -> &mut InstanceCounters {
        let index = match self
            .data
            .instances
            .iter()
            .position(|instance| instance.name == name)
        {
            Some(index) => index,
            None => {
                self.data.instances.push(InstanceCounters {
                    name: name.to_string(),
                    ..InstanceCounters::default()
                });
                self.data.instances.len() - 1
            }
        };
        &mut self.data.instances[index]
    }

    /// Records one processed (instance, message) pair. Exactly one kind is
    /// counted per call even when a message could satisfy several rules.
    pub fn record_message(&mut self, name: &str, outcome: MessageOutcome) {
        let day = current_utc_day();
        self.data.stats.record(outcome);
        let instance = self.instance_entry(name);
        instance.stats.record(outcome);
        instance.days.entry(day).or_default().stats.record(outcome);
        self.mark_dirty();
    }

    /// Credits evaluator token usage to the instance; zero is a no-op.
    pub fn add_tokens(&mut self, name: &str, tokens: u64) {
        if tokens == 0 {
            return;
        }
        let day = current_utc_day();
        self.data.stats.tokens += tokens;
        let instance = self.instance_entry(name);
        instance.stats.tokens += tokens;
        instance.tokens += tokens;
        instance.days.entry(day).or_default().stats.tokens += tokens;
        self.mark_dirty();
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        if self.last_flush.elapsed() >= self.flush_interval {
            if let Err(error) = self.flush() {
                warn!(%error, "periodic stats flush failed");
            }
        }
    }

    pub fn snapshot(&self) -> &StatsSnapshot {
        &self.data
    }

    /// Writes the snapshot when dirty; cheap no-op otherwise.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        debug!(path = %self.path.display(), "flushing stats");
        let mut payload =
            serde_json::to_string_pretty(&self.data).context("failed to serialize stats")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write stats file {}", self.path.display()))?;
        self.last_flush = Instant::now();
        self.dirty = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses either the current nested shape or the legacy flat shape.
fn parse_snapshot(raw: &str) -> Option<StatsSnapshot> {
    let value: Value = serde_json::from_str(raw).ok()?;
    if !value.is_object() {
        return None;
    }
    if value.get("stats").is_some() {
        return serde_json::from_value(value).ok();
    }
    Some(migrate_legacy(&value))
}

/// Converts the historical flat counter layout (`total`/`tokens` at top
/// level, integer day buckets) into the nested `stats`-keyed shape.
fn migrate_legacy(value: &Value) -> StatsSnapshot {
    let mut snapshot = StatsSnapshot {
        stats: StatCounters {
            total: value.get("total").and_then(Value::as_u64).unwrap_or(0),
            tokens: value.get("tokens").and_then(Value::as_u64).unwrap_or(0),
            ..StatCounters::default()
        },
        instances: Vec::new(),
    };
    let instances = value
        .get("instances")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for legacy in instances {
        let Some(name) = legacy.get("name").and_then(Value::as_str) else {
            continue;
        };
        let total = legacy.get("total").and_then(Value::as_u64).unwrap_or(0);
        let tokens = legacy.get("tokens").and_then(Value::as_u64).unwrap_or(0);
        let mut days = BTreeMap::new();
        if let Some(legacy_days) = legacy.get("days").and_then(Value::as_object) {
            for (day, count) in legacy_days {
                days.insert(
                    day.clone(),
                    DayCounters {
                        stats: StatCounters {
                            total: count.as_u64().unwrap_or(0),
                            ..StatCounters::default()
                        },
                    },
                );
            }
        }
        snapshot.instances.push(InstanceCounters {
            name: name.to_string(),
            stats: StatCounters {
                total,
                tokens,
                ..StatCounters::default()
            },
            tokens,
            days,
        });
    }
    snapshot
}
