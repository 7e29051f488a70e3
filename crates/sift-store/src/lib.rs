//! Durable state stores for the monitor.
//!
//! Both stores follow the same discipline: tolerant load (a missing or
//! corrupt file resets to an empty default instead of failing startup),
//! dirty-flag-gated periodic flush, and whole-file atomic writes.
mod stats;
mod traces;

pub use stats::{
    DayCounters, InstanceCounters, MessageOutcome, StatCounters, StatsSnapshot, StatsStore,
};
pub use traces::TraceStore;
