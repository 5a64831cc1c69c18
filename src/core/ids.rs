//! Entity id generation.
//!
//! Ids pair a millisecond timestamp with a process-wide counter. The
//! timestamp alone collides whenever two entities are created within the same
//! millisecond (a user message and its placeholder reply always are), so the
//! counter is what actually guarantees uniqueness.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn next_id() -> String {
    let sequence = ID_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{}", Utc::now().timestamp_millis(), sequence)
}
