use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThreadStatus {
    Active,
    Paused,
    Frozen,
    Complete,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Frozen => "frozen",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThreadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "frozen" => Ok(Self::Frozen),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Unknown thread status: {}", s)),
        }
    }
}

impl Default for ThreadStatus {
    fn default() -> Self {
        Self::Paused
    }
}

/// A train of thought: a group of related percepts with feature weights
/// that steer future association, plus the scheduler's bookkeeping.
///
/// `processed_at` is None iff the thread has unprocessed new content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub goal: String,
    pub status: ThreadStatus,
    /// Recency-of-use signal in [0, 1]; decays every scheduler tick.
    pub activation: f64,
    /// Scheduler priority in [0, 1]; recomputed every tick.
    pub salience: f64,
    /// Ordered references into the percept store.
    #[serde(default)]
    pub percept_refs: Vec<String>,
    /// Feature weights, each in [0, 1].
    #[serde(default)]
    pub source_weights: HashMap<String, f64>,
    #[serde(default)]
    pub channel_weights: HashMap<String, f64>,
    #[serde(default)]
    pub author_weights: HashMap<String, f64>,
    /// EMA of attached percept embeddings.
    #[serde(default)]
    pub centroid: Vec<f32>,
    /// Embedding of the goal string.
    #[serde(default)]
    pub topic: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Thread {
    /// Complete threads are terminal and excluded from selection.
    pub fn is_terminal(&self) -> bool {
        self.status == ThreadStatus::Complete
    }

    pub fn has_unprocessed(&self) -> bool {
        self.processed_at.is_none()
    }

    pub fn minutes_since_active(&self, now: &DateTime<Utc>) -> f64 {
        (*now - self.last_active).num_seconds().max(0) as f64 / 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_roundtrip() {
        for s in ["active", "paused", "frozen", "complete"] {
            let parsed = ThreadStatus::from_str(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!(ThreadStatus::from_str("dormant").is_err());
    }

    #[test]
    fn test_terminal() {
        let mut t = crate::test_helpers::ThreadBuilder::new().build();
        assert!(!t.is_terminal());
        t.status = ThreadStatus::Complete;
        assert!(t.is_terminal());
    }
}
