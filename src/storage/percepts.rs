//! Percept arena: recent sensed events pending consolidation.
//!
//! Keyed by id; threads and traces reference percepts by id only, so a
//! missing lookup is never fatal.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::journal::write_atomic;
use super::path_utils;
use crate::constants::MAX_PERCEPTS;
use crate::percept::Percept;
use crate::{CortexError, CortexResult};

pub struct PerceptStore {
    snapshot_path: PathBuf,
    inner: RwLock<HashMap<String, Percept>>,
}

impl PerceptStore {
    pub fn new(state_path: &std::path::Path) -> Self {
        Self {
            snapshot_path: path_utils::percepts_snapshot(state_path),
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a percept. Over the cap, the oldest percept is evicted
    /// first so sensing never stalls.
    pub fn insert(&self, percept: Percept) {
        let mut map = self.inner.write().expect("percept lock poisoned");
        if map.len() >= MAX_PERCEPTS {
            if let Some(oldest) = map
                .values()
                .min_by_key(|p| p.created_at)
                .map(|p| p.id.clone())
            {
                tracing::warn!(evicted = %oldest, cap = MAX_PERCEPTS, "Percept cap reached, evicting oldest");
                map.remove(&oldest);
            }
        }
        map.insert(percept.id.clone(), percept);
    }

    pub fn get(&self, id: &str) -> Option<Percept> {
        self.inner.read().expect("percept lock poisoned").get(id).cloned()
    }

    /// Resolve a list of refs, silently skipping ids that are gone.
    pub fn lookup_refs(&self, ids: &[String]) -> Vec<Percept> {
        let map = self.inner.read().expect("percept lock poisoned");
        ids.iter().filter_map(|id| map.get(id).cloned()).collect()
    }

    pub fn set_embedding(&self, id: &str, embedding: Vec<f32>) -> bool {
        let mut map = self.inner.write().expect("percept lock poisoned");
        match map.get_mut(id) {
            Some(p) => {
                p.embedding = embedding;
                true
            }
            None => false,
        }
    }

    pub fn set_feature(&self, id: &str, key: &str, value: &str) -> bool {
        let mut map = self.inner.write().expect("percept lock poisoned");
        match map.get_mut(id) {
            Some(p) => {
                p.features.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    /// Consolidation candidates: embedded percepts not yet sourced into
    /// any trace, optionally older than `min_age_secs`. Sorted oldest
    /// first so clustering is stable across runs.
    pub fn unsourced_candidates(
        &self,
        sourced: &HashSet<String>,
        min_age_secs: Option<i64>,
        now: &DateTime<Utc>,
    ) -> Vec<Percept> {
        let map = self.inner.read().expect("percept lock poisoned");
        let mut out: Vec<Percept> = map
            .values()
            .filter(|p| p.has_embedding())
            .filter(|p| !sourced.contains(&p.id))
            .filter(|p| match min_age_secs {
                Some(min) => p.age_secs(now) >= min,
                None => true,
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Remove percepts consumed by consolidation.
    pub fn remove_many(&self, ids: &[String]) -> usize {
        let mut map = self.inner.write().expect("percept lock poisoned");
        ids.iter().filter(|id| map.remove(*id).is_some()).count()
    }

    /// Drop percepts older than `max_age_hours`. Returns removed count.
    pub fn prune_older_than(&self, max_age_hours: i64, now: &DateTime<Utc>) -> usize {
        let mut map = self.inner.write().expect("percept lock poisoned");
        let before = map.len();
        map.retain(|_, p| (*now - p.created_at).num_hours() < max_age_hours);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("percept lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self) -> CortexResult<()> {
        let map = self.inner.read().expect("percept lock poisoned");
        let items: Vec<&Percept> = map.values().collect();
        let doc = serde_json::json!({ "percepts": items });
        write_atomic(&self.snapshot_path, &serde_json::to_vec_pretty(&doc)?)?;
        tracing::debug!(count = items.len(), "Percept snapshot saved");
        Ok(())
    }

    pub fn load(&self) -> CortexResult<()> {
        if !self.snapshot_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read(&self.snapshot_path)?;
        let doc: serde_json::Value = serde_json::from_slice(&raw)?;
        let items = doc
            .get("percepts")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CortexError::Storage("percept snapshot missing 'percepts'".into()))?;
        let mut map = self.inner.write().expect("percept lock poisoned");
        map.clear();
        for value in items {
            match serde_json::from_value::<Percept>(value.clone()) {
                Ok(p) => {
                    map.insert(p.id.clone(), p);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable percept record"),
            }
        }
        tracing::info!(count = map.len(), "Percepts loaded");
        Ok(())
    }
}
