// 🎛️ Merge Policy - Knobs for the two last-seen behaviors
//
// Defaults are the plain merge rules:
//   - a singleton keeps whatever last_seen the caller gave it (often none)
//   - a merge overwrites last_seen with the batch value, even an older or
//     empty one
// `singleton_last_seen = "fill"` with the default overwrite gives every
// known identifier the time it was last seen in the batch.

use serde::{Deserialize, Serialize};

/// What the deduplicator does with an identifier seen exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonLastSeen {
    /// Leave last_seen as supplied by the caller
    #[default]
    Preserve,

    /// Set last_seen = first_seen when the caller left it empty
    Fill,
}

/// How a known ledger entry takes the batch's last_seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastSeenUpdate {
    /// Batch value wins, even if chronologically earlier or empty
    #[default]
    Overwrite,

    /// Batch value wins unless it is empty
    SkipEmpty,

    /// Keep the larger of ledger and batch values
    Latest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    #[serde(default)]
    pub singleton_last_seen: SingletonLastSeen,

    #[serde(default)]
    pub last_seen_update: LastSeenUpdate,
}

impl MergePolicy {
    /// True when every knob is at its default setting
    pub fn is_default(&self) -> bool {
        *self == MergePolicy::default()
    }
}
