use std::sync::{Arc, Mutex};

use anyhow::Result;
use sift_store::{MessageOutcome, StatsSnapshot, StatsStore, TraceStore};
use tracing::error;

/// Shared handle to the stats store. Locks are held only for the duration of
/// one counter update, never across a suspension point.
#[derive(Clone)]
pub struct SharedStats {
    inner: Arc<Mutex<StatsStore>>,
}

impl SharedStats {
    pub fn new(store: StatsStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn record_message(&self, name: &str, outcome: MessageOutcome) {
        match self.inner.lock() {
            Ok(mut store) => store.record_message(name, outcome),
            Err(_) => error!("stats mutex is poisoned, dropping counter update"),
        }
    }

    pub fn add_tokens(&self, name: &str, tokens: u64) {
        match self.inner.lock() {
            Ok(mut store) => store.add_tokens(name, tokens),
            Err(_) => error!("stats mutex is poisoned, dropping token update"),
        }
    }

    pub fn flush(&self) -> Result<()> {
        match self.inner.lock() {
            Ok(mut store) => store.flush(),
            Err(_) => {
                error!("stats mutex is poisoned, skipping flush");
                Ok(())
            }
        }
    }

    /// Read access for tests and status reporting.
    pub fn with_snapshot<T>(&self, read: impl FnOnce(&StatsSnapshot) -> T) -> Option<T> {
        self.inner.lock().ok().map(|store| read(store.snapshot()))
    }
}

/// Shared handle to the trace-id store, same locking discipline as
/// [`SharedStats`].
#[derive(Clone)]
pub struct SharedTraces {
    inner: Arc<Mutex<TraceStore>>,
}

impl SharedTraces {
    pub fn new(store: TraceStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn set(&self, chat_id: i64, message_id: i64, trace_id: Option<&str>) {
        match self.inner.lock() {
            Ok(mut store) => store.set(chat_id, message_id, trace_id),
            Err(_) => error!("trace mutex is poisoned, dropping trace id"),
        }
    }

    pub fn get(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|store| store.get(chat_id, message_id))
    }

    pub fn flush(&self) -> Result<()> {
        match self.inner.lock() {
            Ok(mut store) => store.flush(),
            Err(_) => {
                error!("trace mutex is poisoned, skipping flush");
                Ok(())
            }
        }
    }
}
