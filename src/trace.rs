use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A consolidated memory: a summary of one or more percepts with an
/// embedding that participates in spreading activation.
///
/// Core traces are seeded identity memories: immutable (except
/// `last_access`) and never pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Retrieval energy in [0, 1]; decays every tick, boosted by cues.
    pub activation: f64,
    /// Consolidation count, >= 1, monotonically non-decreasing.
    pub strength: u32,
    /// Percept ids this trace was consolidated from.
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub is_core: bool,
    /// While set and in the future, the trace may be updated in place
    /// by a correction (reconsolidation).
    #[serde(default)]
    pub labile_until: Option<DateTime<Utc>>,
    /// Trace ids this trace supersedes. Missing targets are ignored.
    #[serde(default)]
    pub inhibits: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl Trace {
    pub fn is_labile(&self, now: &DateTime<Utc>) -> bool {
        matches!(self.labile_until, Some(until) if until > *now)
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}
