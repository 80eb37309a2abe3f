use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a row. Ids from saved projects are arbitrary strings,
/// generated ones are `<prefix>-<counter>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        RowId(s.to_string())
    }
}

// atomic counter so ids stay unique no matter which thread asks
fn next_counter() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn next_row_id(prefix: &str) -> RowId {
    RowId(format!("{prefix}-{:x}", next_counter()))
}

pub fn next_pattern_id() -> String {
    format!("pat-{:x}", next_counter())
}

pub fn next_clip_id() -> String {
    format!("clip-{:x}", next_counter())
}
