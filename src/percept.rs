use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An atomic sensed event, normalized by the router from an inbox item.
///
/// Mutated only to attach its embedding and clustering features; destroyed
/// by pruning or by consolidation into a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percept {
    pub id: String,
    /// Where it came from: "inbox", "bud", "impulse:<subtype>", "system".
    pub source: String,
    /// Type tag: "message", "thought", "wake", "due", ...
    pub kind: String,
    /// How strongly this event demands attention, in [0, 1].
    pub intensity: f64,
    pub created_at: DateTime<Utc>,
    /// Unordered markers: "dm", "mention", "from:owner", ...
    #[serde(default)]
    pub tags: HashSet<String>,
    /// Attribute map; includes `content` when applicable, may include
    /// `channel_id`, `author_id`, `author`.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Dense embedding, empty until computed.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Clustering features, notably `conversation_id`.
    #[serde(default)]
    pub features: HashMap<String, String>,
}

impl Percept {
    pub fn content(&self) -> &str {
        self.attributes.get("content").map(String::as_str).unwrap_or("")
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.attributes.get("channel_id").map(String::as_str)
    }

    /// Author identity for feature weighting: stable id if present,
    /// display name otherwise.
    pub fn author_key(&self) -> Option<&str> {
        self.attributes
            .get("author_id")
            .or_else(|| self.attributes.get("author"))
            .map(String::as_str)
    }

    pub fn author_label(&self) -> &str {
        self.attributes
            .get("author")
            .or_else(|| self.attributes.get("author_id"))
            .map(String::as_str)
            .unwrap_or("user")
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.features
            .get(crate::constants::CLUSTER_FEATURE)
            .map(String::as_str)
    }

    pub fn age_secs(&self, now: &DateTime<Utc>) -> i64 {
        (*now - self.created_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::PerceptBuilder;

    #[test]
    fn test_accessors() {
        let p = PerceptBuilder::new()
            .content("hello there")
            .channel("c1")
            .author("u1", "Dana")
            .build();
        assert_eq!(p.content(), "hello there");
        assert_eq!(p.channel_id(), Some("c1"));
        assert_eq!(p.author_key(), Some("u1"));
        assert_eq!(p.author_label(), "Dana");
        assert!(!p.has_embedding());
    }

    #[test]
    fn test_author_falls_back_to_name() {
        let mut p = PerceptBuilder::new().content("x").build();
        p.attributes.insert("author".into(), "Dana".into());
        assert_eq!(p.author_key(), Some("Dana"));
    }
}
