//! Thread arena: active trains of thought.
//!
//! The attach path is the one critical section that both reads and
//! mutates a record (centroid EMA, feature weights, activation), so it
//! holds the write lock for the whole update.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::journal::write_atomic;
use super::path_utils;
use crate::constants::*;
use crate::percept::Percept;
use crate::thread::{Thread, ThreadStatus};
use crate::{CortexError, CortexResult};

pub struct ThreadStore {
    snapshot_path: PathBuf,
    inner: RwLock<HashMap<String, Thread>>,
}

impl ThreadStore {
    pub fn new(state_path: &std::path::Path) -> Self {
        Self {
            snapshot_path: path_utils::threads_snapshot(state_path),
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a thread. At the cap, room is made first: completed
    /// threads go (oldest first), then the weakest non-active thread.
    pub fn insert(&self, thread: Thread) {
        let mut map = self.inner.write().expect("thread lock poisoned");
        if map.len() >= MAX_THREADS && !map.contains_key(&thread.id) {
            evict_weakest(&mut map);
        }
        map.insert(thread.id.clone(), thread);
    }

    pub fn get(&self, id: &str) -> Option<Thread> {
        self.inner.read().expect("thread lock poisoned").get(id).cloned()
    }

    pub fn list(&self) -> Vec<Thread> {
        self.inner.read().expect("thread lock poisoned").values().cloned().collect()
    }

    /// Threads eligible for routing and selection.
    pub fn list_non_terminal(&self) -> Vec<Thread> {
        self.inner
            .read()
            .expect("thread lock poisoned")
            .values()
            .filter(|t| !t.is_terminal())
            .cloned()
            .collect()
    }

    /// The at-most-one active thread, if any.
    pub fn active_id(&self) -> Option<String> {
        self.inner
            .read()
            .expect("thread lock poisoned")
            .values()
            .find(|t| t.status == ThreadStatus::Active)
            .map(|t| t.id.clone())
    }

    /// Multiply every thread's activation by `factor`.
    pub fn decay_tick(&self, factor: f64) {
        let mut map = self.inner.write().expect("thread lock poisoned");
        for thread in map.values_mut() {
            thread.activation = (thread.activation * factor).clamp(0.0, 1.0);
        }
    }

    /// Bulk salience write-back from the scheduler.
    pub fn apply_salience(&self, scores: &[(String, f64)]) {
        let mut map = self.inner.write().expect("thread lock poisoned");
        for (id, salience) in scores {
            if let Some(thread) = map.get_mut(id) {
                thread.salience = salience.clamp(0.0, 1.0);
            }
        }
    }

    /// Attach a percept to a thread: reference, centroid EMA, feature
    /// decay + accumulation, activation bump, recency bookkeeping. A
    /// frozen thread unfreezes. One write-locked critical section.
    pub fn attach_percept(&self, id: &str, percept: &Percept) -> CortexResult<()> {
        let now = crate::time_utils::now();
        let mut map = self.inner.write().expect("thread lock poisoned");
        let thread = map
            .get_mut(id)
            .ok_or_else(|| CortexError::ThreadNotFound(id.to_string()))?;

        thread.percept_refs.push(percept.id.clone());

        if percept.has_embedding() {
            if thread.centroid.len() == percept.embedding.len() {
                for (c, p) in thread.centroid.iter_mut().zip(percept.embedding.iter()) {
                    *c = (1.0 - CENTROID_EMA_ALPHA) * *c + CENTROID_EMA_ALPHA * *p;
                }
            } else {
                thread.centroid = percept.embedding.clone();
            }
        }

        for weights in [
            &mut thread.source_weights,
            &mut thread.channel_weights,
            &mut thread.author_weights,
        ] {
            for w in weights.values_mut() {
                *w *= FEATURE_DECAY;
            }
        }
        bump_weight(&mut thread.source_weights, Some(percept.source.as_str()));
        bump_weight(&mut thread.channel_weights, percept.channel_id());
        bump_weight(&mut thread.author_weights, percept.author_key());

        thread.activation = (thread.activation
            + ATTACH_ACTIVATION_BASE
            + ATTACH_ACTIVATION_INTENSITY * percept.intensity)
            .clamp(0.0, 1.0);
        thread.last_active = now;
        thread.processed_at = None;
        if thread.status == ThreadStatus::Frozen {
            thread.status = ThreadStatus::Paused;
        }

        tracing::debug!(
            thread_id = %id,
            percept_id = %percept.id,
            activation = thread.activation,
            "Percept attached"
        );
        Ok(())
    }

    /// Make `id` the single active thread; any other active thread is
    /// paused. Returns a snapshot of the activated thread.
    pub fn activate(&self, id: &str) -> CortexResult<Thread> {
        let now = crate::time_utils::now();
        let mut map = self.inner.write().expect("thread lock poisoned");
        if !map.contains_key(id) {
            return Err(CortexError::ThreadNotFound(id.to_string()));
        }
        for thread in map.values_mut() {
            if thread.status == ThreadStatus::Active && thread.id != id {
                thread.status = ThreadStatus::Paused;
            }
        }
        let thread = map.get_mut(id).expect("checked above");
        thread.status = ThreadStatus::Active;
        thread.last_active = now;
        Ok(thread.clone())
    }

    pub fn set_status(&self, id: &str, status: ThreadStatus) -> CortexResult<()> {
        let mut map = self.inner.write().expect("thread lock poisoned");
        let thread = map
            .get_mut(id)
            .ok_or_else(|| CortexError::ThreadNotFound(id.to_string()))?;
        thread.status = status;
        Ok(())
    }

    /// The executive finished processing this thread's new content.
    pub fn mark_processed(&self, id: &str) -> CortexResult<()> {
        let mut map = self.inner.write().expect("thread lock poisoned");
        let thread = map
            .get_mut(id)
            .ok_or_else(|| CortexError::ThreadNotFound(id.to_string()))?;
        thread.processed_at = Some(crate::time_utils::now());
        Ok(())
    }

    /// Paused threads inactive beyond the window go frozen. Returns the
    /// count frozen.
    pub fn freeze_stale(&self, max_idle_hours: i64, now: &DateTime<Utc>) -> usize {
        let mut map = self.inner.write().expect("thread lock poisoned");
        let mut count = 0;
        for thread in map.values_mut() {
            if thread.status == ThreadStatus::Paused
                && (*now - thread.last_active).num_hours() >= max_idle_hours
            {
                thread.status = ThreadStatus::Frozen;
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!(frozen = count, "Stale threads frozen");
        }
        count
    }

    pub fn count(&self) -> usize {
        self.inner.read().expect("thread lock poisoned").len()
    }

    pub fn count_by_status(&self, status: &ThreadStatus) -> usize {
        self.inner
            .read()
            .expect("thread lock poisoned")
            .values()
            .filter(|t| t.status == *status)
            .count()
    }

    pub fn save(&self) -> CortexResult<()> {
        let map = self.inner.read().expect("thread lock poisoned");
        let items: Vec<&Thread> = map.values().collect();
        let doc = serde_json::json!({ "threads": items });
        write_atomic(&self.snapshot_path, &serde_json::to_vec_pretty(&doc)?)?;
        tracing::debug!(count = items.len(), "Thread snapshot saved");
        Ok(())
    }

    /// Load the snapshot. An active status is normalized to paused: a
    /// fresh process has no executive session, selection will re-activate.
    pub fn load(&self) -> CortexResult<()> {
        if !self.snapshot_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read(&self.snapshot_path)?;
        let doc: serde_json::Value = serde_json::from_slice(&raw)?;
        let items = doc
            .get("threads")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CortexError::Storage("thread snapshot missing 'threads'".into()))?;
        let mut map = self.inner.write().expect("thread lock poisoned");
        map.clear();
        for value in items {
            match serde_json::from_value::<Thread>(value.clone()) {
                Ok(mut t) => {
                    if t.status == ThreadStatus::Active {
                        t.status = ThreadStatus::Paused;
                    }
                    map.insert(t.id.clone(), t);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable thread record"),
            }
        }
        tracing::info!(count = map.len(), "Threads loaded");
        Ok(())
    }
}

fn bump_weight(weights: &mut HashMap<String, f64>, key: Option<&str>) {
    if let Some(key) = key {
        let w = weights.entry(key.to_string()).or_insert(0.0);
        *w = (*w + FEATURE_ACCUMULATE).clamp(0.0, 1.0);
    }
}

/// Drop one thread to make room: a completed thread if any exists
/// (oldest first), otherwise the non-active thread with the lowest
/// activation (oldest on ties). The active thread is never evicted.
fn evict_weakest(map: &mut HashMap<String, Thread>) {
    let victim = map
        .values()
        .filter(|t| t.is_terminal())
        .min_by_key(|t| t.last_active)
        .map(|t| t.id.clone())
        .or_else(|| {
            map.values()
                .filter(|t| t.status != ThreadStatus::Active)
                .min_by(|a, b| {
                    a.activation
                        .partial_cmp(&b.activation)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.last_active.cmp(&b.last_active))
                })
                .map(|t| t.id.clone())
        });
    match victim {
        Some(id) => {
            tracing::warn!(evicted = %id, cap = MAX_THREADS, "Thread cap reached, evicting weakest");
            map.remove(&id);
        }
        None => {
            tracing::warn!(cap = MAX_THREADS, "Thread cap reached with nothing evictable");
        }
    }
}
