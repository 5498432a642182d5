//! Shared test utilities — record builders with sane defaults.
//!
//! Available only under `#[cfg(test)]`.

use std::collections::HashMap;

use chrono::Duration;

use crate::percept::Percept;
use crate::thread::{Thread, ThreadStatus};
use crate::trace::Trace;
use crate::time_utils;

// ============================================================================
// PerceptBuilder
// ============================================================================

pub struct PerceptBuilder {
    percept: Percept,
}

impl PerceptBuilder {
    pub fn new() -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("content".to_string(), "test percept".to_string());
        Self {
            percept: Percept {
                id: crate::id_gen::percept_id(),
                source: "inbox".to_string(),
                kind: "message".to_string(),
                intensity: 0.5,
                created_at: time_utils::now(),
                tags: Default::default(),
                attributes,
                embedding: Vec::new(),
                features: HashMap::new(),
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.percept.id = id.to_string();
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.percept.source = source.to_string();
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.percept
            .attributes
            .insert("content".to_string(), content.to_string());
        self
    }

    pub fn channel(mut self, channel_id: &str) -> Self {
        self.percept
            .attributes
            .insert("channel_id".to_string(), channel_id.to_string());
        self
    }

    pub fn author(mut self, author_id: &str, author: &str) -> Self {
        self.percept
            .attributes
            .insert("author_id".to_string(), author_id.to_string());
        self.percept
            .attributes
            .insert("author".to_string(), author.to_string());
        self
    }

    pub fn intensity(mut self, intensity: f64) -> Self {
        self.percept.intensity = intensity;
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.percept.embedding = embedding;
        self
    }

    pub fn age_secs(mut self, secs: i64) -> Self {
        self.percept.created_at = time_utils::now() - Duration::seconds(secs);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.percept.tags.insert(tag.to_string());
        self
    }

    pub fn feature(mut self, key: &str, value: &str) -> Self {
        self.percept
            .features
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Percept {
        self.percept
    }
}

// ============================================================================
// ThreadBuilder
// ============================================================================

pub struct ThreadBuilder {
    thread: Thread,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        let now = time_utils::now();
        Self {
            thread: Thread {
                id: crate::id_gen::thread_id(),
                goal: "test thread".to_string(),
                status: ThreadStatus::Paused,
                activation: 0.5,
                salience: 0.0,
                percept_refs: Vec::new(),
                source_weights: HashMap::new(),
                channel_weights: HashMap::new(),
                author_weights: HashMap::new(),
                centroid: Vec::new(),
                topic: Vec::new(),
                created_at: now,
                last_active: now,
                processed_at: None,
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.thread.id = id.to_string();
        self
    }

    pub fn status(mut self, status: ThreadStatus) -> Self {
        self.thread.status = status;
        self
    }

    pub fn activation(mut self, activation: f64) -> Self {
        self.thread.activation = activation;
        self
    }

    pub fn salience(mut self, salience: f64) -> Self {
        self.thread.salience = salience;
        self
    }

    pub fn centroid(mut self, centroid: Vec<f32>) -> Self {
        self.thread.centroid = centroid;
        self
    }

    pub fn topic(mut self, topic: Vec<f32>) -> Self {
        self.thread.topic = topic;
        self
    }

    pub fn source_weight(mut self, key: &str, weight: f64) -> Self {
        self.thread.source_weights.insert(key.to_string(), weight);
        self
    }

    pub fn channel_weight(mut self, key: &str, weight: f64) -> Self {
        self.thread.channel_weights.insert(key.to_string(), weight);
        self
    }

    pub fn author_weight(mut self, key: &str, weight: f64) -> Self {
        self.thread.author_weights.insert(key.to_string(), weight);
        self
    }

    pub fn percept_refs(mut self, refs: &[&str]) -> Self {
        self.thread.percept_refs = refs.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn idle_secs(mut self, secs: i64) -> Self {
        self.thread.last_active = time_utils::now() - Duration::seconds(secs);
        self
    }

    pub fn idle_hours(self, hours: i64) -> Self {
        self.idle_secs(hours * 3600)
    }

    /// Mark the thread's content as already processed by the executive.
    pub fn processed(mut self) -> Self {
        self.thread.processed_at = Some(time_utils::now());
        self
    }

    pub fn build(self) -> Thread {
        self.thread
    }
}

// ============================================================================
// TraceBuilder
// ============================================================================

pub struct TraceBuilder {
    trace: Trace,
}

impl TraceBuilder {
    pub fn new() -> Self {
        let now = time_utils::now();
        Self {
            trace: Trace {
                id: crate::id_gen::trace_id(),
                summary: "test trace".to_string(),
                embedding: Vec::new(),
                activation: 0.5,
                strength: 1,
                sources: Vec::new(),
                is_core: false,
                labile_until: None,
                inhibits: Vec::new(),
                created_at: now,
                last_access: now,
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.trace.id = id.to_string();
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.trace.summary = summary.to_string();
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.trace.embedding = embedding;
        self
    }

    pub fn activation(mut self, activation: f64) -> Self {
        self.trace.activation = activation;
        self
    }

    pub fn strength(mut self, strength: u32) -> Self {
        self.trace.strength = strength;
        self
    }

    pub fn sources(mut self, sources: &[&str]) -> Self {
        self.trace.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn core(mut self) -> Self {
        self.trace.is_core = true;
        self
    }

    /// Negative seconds produce an already-expired labile window.
    pub fn labile_for_secs(mut self, secs: i64) -> Self {
        self.trace.labile_until = Some(time_utils::now() + Duration::seconds(secs));
        self
    }

    pub fn inhibits(mut self, targets: &[&str]) -> Self {
        self.trace.inhibits = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn accessed_hours_ago(mut self, hours: i64) -> Self {
        self.trace.last_access = time_utils::now() - Duration::hours(hours);
        self
    }

    pub fn build(self) -> Trace {
        self.trace
    }
}
