//! Foundational low-level utilities shared across Sift crates.
//!
//! Provides atomic file-write helpers, time utilities used by the durable
//! stores and day bucketing, and the filesystem-safe name normalizer used
//! wherever chat titles end up in paths or dataset names.

pub mod atomic_io;
pub mod safe_name;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use safe_name::safe_name;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, current_utc_day};
