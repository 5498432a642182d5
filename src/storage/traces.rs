//! Trace arena: the associative memory pool.
//!
//! Traces carry activation that decays every tick and is boosted by
//! spreading activation from cue embeddings. Retrieval marks returned
//! traces labile (open to reconsolidation) for a window, and applies
//! inhibition: a superseding trace with enough strength suppresses the
//! trace it inhibits.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;

use super::journal::write_atomic;
use super::path_utils;
use crate::constants::*;
use crate::processing::model::cosine_similarity;
use crate::processing::ModelClient;
use crate::trace::Trace;
use crate::{id_gen, time_utils, CortexError, CortexResult};

pub struct TraceStore {
    snapshot_path: PathBuf,
    inner: RwLock<HashMap<String, Trace>>,
}

impl TraceStore {
    pub fn new(state_path: &Path) -> Self {
        Self {
            snapshot_path: path_utils::traces_snapshot(state_path),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, trace: Trace) {
        let mut map = self.inner.write().expect("trace lock poisoned");
        map.insert(trace.id.clone(), trace);
    }

    pub fn get(&self, id: &str) -> Option<Trace> {
        self.inner.read().expect("trace lock poisoned").get(id).cloned()
    }

    pub fn list(&self) -> Vec<Trace> {
        self.inner.read().expect("trace lock poisoned").values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("trace lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_core(&self) -> usize {
        self.inner
            .read()
            .expect("trace lock poisoned")
            .values()
            .filter(|t| t.is_core)
            .count()
    }

    /// Multiply every trace's activation by `factor`.
    pub fn decay_tick(&self, factor: f64) {
        let mut map = self.inner.write().expect("trace lock poisoned");
        for trace in map.values_mut() {
            trace.activation = (trace.activation * factor).clamp(0.0, 1.0);
        }
    }

    /// Boost traces semantically close to the query embedding. Returns
    /// ids of affected traces. Traces without embeddings never
    /// participate.
    pub fn spread_activation(&self, query: &[f32], boost: f64, threshold: f64) -> Vec<String> {
        if query.is_empty() {
            return Vec::new();
        }
        let now = time_utils::now();
        let mut map = self.inner.write().expect("trace lock poisoned");

        let scored: Vec<(String, f64)> = map
            .values()
            .collect::<Vec<_>>()
            .par_iter()
            .filter(|t| t.has_embedding())
            .map(|t| (t.id.clone(), cosine_similarity(query, &t.embedding)))
            .filter(|(_, sim)| *sim > threshold)
            .collect();

        let mut affected = Vec::with_capacity(scored.len());
        for (id, sim) in scored {
            if let Some(trace) = map.get_mut(&id) {
                trace.activation = (trace.activation + boost * sim).clamp(0.0, 1.0);
                trace.last_access = now;
                affected.push(id);
            }
        }
        affected
    }

    /// Retrieve the most activated traces for an executive context.
    ///
    /// Spreads activation from `context` first, then selects traces with
    /// activation above the retrieval floor, drops any that share a
    /// source with `exclude_sources`, applies inhibition among the
    /// survivors (an inhibitor wins only with strength >= the
    /// candidate's), and marks returned non-core traces labile.
    pub fn activated(
        &self,
        limit: usize,
        exclude_sources: &HashSet<String>,
        context: Option<&[f32]>,
    ) -> Vec<Trace> {
        if let Some(ctx) = context {
            self.spread_activation(ctx, SPREAD_BOOST, SPREAD_THRESHOLD);
        }

        let now = time_utils::now();
        let mut map = self.inner.write().expect("trace lock poisoned");

        let mut survivors: Vec<Trace> = map
            .values()
            .filter(|t| t.activation >= RETRIEVAL_ACTIVATION_MIN)
            .filter(|t| t.sources.iter().all(|s| !exclude_sources.contains(s)))
            .cloned()
            .collect();
        survivors.sort_by(|a, b| {
            b.activation
                .partial_cmp(&a.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let strengths: HashMap<&str, u32> =
            survivors.iter().map(|t| (t.id.as_str(), t.strength)).collect();
        let mut inhibited: HashSet<String> = HashSet::new();
        for b in &survivors {
            for target in &b.inhibits {
                if *target == b.id {
                    continue;
                }
                if let Some(&target_strength) = strengths.get(target.as_str()) {
                    if b.strength >= target_strength {
                        inhibited.insert(target.clone());
                    }
                }
            }
        }

        let selected: Vec<Trace> = survivors
            .into_iter()
            .filter(|t| !inhibited.contains(&t.id))
            .take(limit)
            .collect();

        let labile_until = now + Duration::seconds(LABILE_WINDOW_SECS);
        for trace in &selected {
            if let Some(stored) = map.get_mut(&trace.id) {
                stored.last_access = now;
                if !stored.is_core {
                    stored.labile_until = Some(labile_until);
                }
            }
        }
        selected
    }

    /// Most similar trace to `query`, optionally restricted to currently
    /// labile traces. Core traces are excluded when `exclude_core`;
    /// they are immutable and cannot absorb updates.
    pub fn most_similar(
        &self,
        query: &[f32],
        labile_only: bool,
        exclude_core: bool,
    ) -> Option<(String, f64)> {
        if query.is_empty() {
            return None;
        }
        let now = time_utils::now();
        let map = self.inner.read().expect("trace lock poisoned");
        map.values()
            .filter(|t| t.has_embedding())
            .filter(|t| !labile_only || t.is_labile(&now))
            .filter(|t| !exclude_core || !t.is_core)
            .map(|t| (t.id.clone(), cosine_similarity(query, &t.embedding)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Plain reinforcement: the percept confirms what the trace says.
    pub fn reinforce(
        &self,
        id: &str,
        source_id: &str,
        embedding: &[f32],
        summary: Option<String>,
    ) -> CortexResult<()> {
        let mut map = self.inner.write().expect("trace lock poisoned");
        let trace = map
            .get_mut(id)
            .ok_or_else(|| CortexError::TraceNotFound(id.to_string()))?;
        if trace.is_core {
            return Err(CortexError::InvalidState(format!(
                "core trace {} cannot be reinforced",
                id
            )));
        }
        trace.strength += 1;
        trace.activation = (trace.activation + REINFORCE_ACTIVATION_BOOST).clamp(0.0, 1.0);
        ema_update(&mut trace.embedding, embedding, REINFORCE_EMA_ALPHA);
        if !trace.sources.iter().any(|s| s == source_id) {
            trace.sources.push(source_id.to_string());
        }
        if let Some(summary) = summary {
            trace.summary = summary;
        }
        trace.last_access = time_utils::now();
        tracing::debug!(trace_id = %id, strength = trace.strength, "Trace reinforced");
        Ok(())
    }

    /// Reconsolidation: a correction rewrites a labile trace in place.
    pub fn reconsolidate(
        &self,
        id: &str,
        source_id: &str,
        embedding: &[f32],
        summary: String,
    ) -> CortexResult<()> {
        let mut map = self.inner.write().expect("trace lock poisoned");
        let trace = map
            .get_mut(id)
            .ok_or_else(|| CortexError::TraceNotFound(id.to_string()))?;
        if trace.is_core {
            return Err(CortexError::InvalidState(format!(
                "core trace {} cannot be reconsolidated",
                id
            )));
        }
        ema_update(&mut trace.embedding, embedding, RECONSOLIDATE_EMA_ALPHA);
        if !trace.sources.iter().any(|s| s == source_id) {
            trace.sources.push(source_id.to_string());
        }
        trace.summary = summary;
        trace.last_access = time_utils::now();
        tracing::info!(trace_id = %id, "Trace reconsolidated");
        Ok(())
    }

    /// Every percept id referenced as a source by any trace.
    pub fn sourced_ids(&self) -> HashSet<String> {
        let map = self.inner.read().expect("trace lock poisoned");
        map.values()
            .flat_map(|t| t.sources.iter().cloned())
            .collect()
    }

    /// Remove weak, stale traces. Core traces are never pruned.
    pub fn prune_weak(
        &self,
        min_strength: u32,
        max_age: Duration,
        now: &DateTime<Utc>,
    ) -> usize {
        let mut map = self.inner.write().expect("trace lock poisoned");
        let before = map.len();
        map.retain(|_, t| {
            t.is_core || t.strength >= min_strength || (*now - t.last_access) < max_age
        });
        let removed = before - map.len();
        if removed > 0 {
            tracing::info!(removed = removed, "Weak traces pruned");
        }
        removed
    }

    /// Seed core identity traces from a markdown file: entries separated
    /// by `---` lines, `#` header lines stripped. Idempotent: entry ids
    /// derive from content. Returns the count of traces created.
    pub fn bootstrap_from_seed(
        &self,
        path: &Path,
        model: &dyn ModelClient,
    ) -> CortexResult<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path)?;
        let now = time_utils::now();
        let mut created = 0;
        for entry in parse_seed_entries(&raw) {
            let id = format!("core-{}", id_gen::content_id(&entry));
            {
                let map = self.inner.read().expect("trace lock poisoned");
                if map.contains_key(&id) {
                    continue;
                }
            }
            let embedding = match model.embed(&entry) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "Seed entry not embedded");
                    Vec::new()
                }
            };
            self.insert(Trace {
                id,
                summary: entry,
                embedding,
                activation: 1.0,
                strength: CORE_SEED_STRENGTH,
                sources: Vec::new(),
                is_core: true,
                labile_until: None,
                inhibits: Vec::new(),
                created_at: now,
                last_access: now,
            });
            created += 1;
        }
        if created > 0 {
            tracing::info!(created = created, "Core traces seeded");
        }
        Ok(created)
    }

    pub fn save(&self) -> CortexResult<()> {
        let map = self.inner.read().expect("trace lock poisoned");
        let items: Vec<&Trace> = map.values().collect();
        let doc = serde_json::json!({ "traces": items });
        write_atomic(&self.snapshot_path, &serde_json::to_vec_pretty(&doc)?)?;
        tracing::debug!(count = items.len(), "Trace snapshot saved");
        Ok(())
    }

    pub fn load(&self) -> CortexResult<()> {
        if !self.snapshot_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read(&self.snapshot_path)?;
        let doc: serde_json::Value = serde_json::from_slice(&raw)?;
        let items = doc
            .get("traces")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CortexError::Storage("trace snapshot missing 'traces'".into()))?;
        let mut map = self.inner.write().expect("trace lock poisoned");
        map.clear();
        for value in items {
            match serde_json::from_value::<Trace>(value.clone()) {
                Ok(t) => {
                    map.insert(t.id.clone(), t);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable trace record"),
            }
        }
        tracing::info!(count = map.len(), "Traces loaded");
        Ok(())
    }
}

fn ema_update(current: &mut Vec<f32>, new: &[f32], alpha: f32) {
    if new.is_empty() {
        return;
    }
    if current.len() != new.len() {
        *current = new.to_vec();
        return;
    }
    for (c, n) in current.iter_mut().zip(new.iter()) {
        *c = (1.0 - alpha) * *c + alpha * *n;
    }
}

/// Split seed text into entries on `---` separator lines, dropping `#`
/// headers and empty entries.
pub fn parse_seed_entries(raw: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = Vec::new();
    for line in raw.lines() {
        if line.trim() == "---" {
            push_entry(&mut entries, &mut current);
        } else if !line.trim_start().starts_with('#') {
            current.push(line);
        }
    }
    push_entry(&mut entries, &mut current);
    entries
}

fn push_entry(entries: &mut Vec<String>, current: &mut Vec<&str>) {
    let text = current.join("\n").trim().to_string();
    if !text.is_empty() {
        entries.push(text);
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::SyntheticModelClient;
    use crate::test_helpers::TraceBuilder;

    fn store() -> (tempfile::TempDir, TraceStore) {
        let dir = tempfile::tempdir().unwrap();
        let s = TraceStore::new(dir.path());
        (dir, s)
    }

    #[test]
    fn test_spread_activation_boosts_similar() {
        let (_dir, store) = store();
        store.insert(TraceBuilder::new().id("close").embedding(vec![1.0, 0.0]).activation(0.2).build());
        store.insert(TraceBuilder::new().id("far").embedding(vec![0.0, 1.0]).activation(0.2).build());
        store.insert(TraceBuilder::new().id("blank").activation(0.2).build());

        let affected = store.spread_activation(&[1.0, 0.0], 0.3, 0.3);
        assert_eq!(affected, vec!["close".to_string()]);
        assert!((store.get("close").unwrap().activation - 0.5).abs() < 1e-9);
        assert!((store.get("far").unwrap().activation - 0.2).abs() < 1e-9);
        assert!((store.get("blank").unwrap().activation - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_spread_activation_clamps() {
        let (_dir, store) = store();
        store.insert(TraceBuilder::new().id("t").embedding(vec![1.0]).activation(0.95).build());
        store.spread_activation(&[1.0], 0.3, 0.3);
        assert!((store.get("t").unwrap().activation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_activated_filters_and_marks_labile() {
        let (_dir, store) = store();
        store.insert(TraceBuilder::new().id("hot").activation(0.8).build());
        store.insert(TraceBuilder::new().id("cold").activation(0.05).build());
        store.insert(
            TraceBuilder::new()
                .id("core")
                .activation(0.9)
                .core()
                .build(),
        );

        let got = store.activated(10, &HashSet::new(), None);
        let ids: Vec<&str> = got.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["core", "hot"]);

        let now = time_utils::now();
        assert!(store.get("hot").unwrap().is_labile(&now));
        assert!(!store.get("core").unwrap().is_labile(&now));
    }

    #[test]
    fn test_activated_excludes_shared_sources() {
        let (_dir, store) = store();
        store.insert(TraceBuilder::new().id("t").activation(0.8).sources(&["p1"]).build());
        let mut exclude = HashSet::new();
        exclude.insert("p1".to_string());
        assert!(store.activated(10, &exclude, None).is_empty());
    }

    #[test]
    fn test_inhibition_requires_strength() {
        let (_dir, store) = store();
        // T2 inhibits T1 but is weaker: T1 survives.
        store.insert(TraceBuilder::new().id("t1").activation(0.8).strength(2).build());
        store.insert(
            TraceBuilder::new()
                .id("t2")
                .activation(0.7)
                .strength(1)
                .inhibits(&["t1"])
                .build(),
        );
        let ids: Vec<String> = store
            .activated(10, &HashSet::new(), None)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert!(ids.contains(&"t1".to_string()));

        // Reinforced to equal strength: T1 is suppressed.
        store.reinforce("t2", "px", &[], None).unwrap();
        let ids: Vec<String> = store
            .activated(10, &HashSet::new(), None)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert!(!ids.contains(&"t1".to_string()));
        assert!(ids.contains(&"t2".to_string()));
    }

    #[test]
    fn test_missing_inhibit_target_ignored() {
        let (_dir, store) = store();
        store.insert(
            TraceBuilder::new()
                .id("t")
                .activation(0.8)
                .inhibits(&["ghost"])
                .build(),
        );
        assert_eq!(store.activated(10, &HashSet::new(), None).len(), 1);
    }

    #[test]
    fn test_reinforce_and_core_protection() {
        let (_dir, store) = store();
        store.insert(TraceBuilder::new().id("t").strength(1).activation(0.5).build());
        store.reinforce("t", "p9", &[1.0, 0.0], Some("updated".into())).unwrap();
        let t = store.get("t").unwrap();
        assert_eq!(t.strength, 2);
        assert!((t.activation - 0.8).abs() < 1e-9);
        assert_eq!(t.sources, vec!["p9"]);
        assert_eq!(t.summary, "updated");

        store.insert(TraceBuilder::new().id("c").core().build());
        assert!(store.reinforce("c", "p1", &[], None).is_err());
        assert!(store.reconsolidate("c", "p1", &[], "x".into()).is_err());
    }

    #[test]
    fn test_most_similar_labile_only() {
        let (_dir, store) = store();
        store.insert(TraceBuilder::new().id("labile").embedding(vec![1.0, 0.0]).labile_for_secs(60).build());
        store.insert(TraceBuilder::new().id("fixed").embedding(vec![1.0, 0.1]).build());

        let (id, _) = store.most_similar(&[1.0, 0.0], true, true).unwrap();
        assert_eq!(id, "labile");
        // Empty query never matches.
        assert!(store.most_similar(&[], true, true).is_none());
    }

    #[test]
    fn test_prune_weak_spares_core_and_strong() {
        let (_dir, store) = store();
        store.insert(TraceBuilder::new().id("weak-old").strength(1).accessed_hours_ago(100).build());
        store.insert(TraceBuilder::new().id("strong-old").strength(5).accessed_hours_ago(100).build());
        store.insert(TraceBuilder::new().id("weak-new").strength(1).build());
        store.insert(TraceBuilder::new().id("core").strength(1).accessed_hours_ago(100).core().build());

        let now = time_utils::now();
        let removed = store.prune_weak(2, Duration::hours(48), &now);
        assert_eq!(removed, 1);
        assert!(store.get("weak-old").is_none());
        assert!(store.get("strong-old").is_some());
        assert!(store.get("weak-new").is_some());
        assert!(store.get("core").is_some());
    }

    #[test]
    fn test_seed_parsing_and_bootstrap_idempotent() {
        let raw = "# Identity\nI am a helpful daemon.\n---\n\n# Facts\nMy owner is Dana.\n---\n";
        let entries = parse_seed_entries(raw);
        assert_eq!(entries, vec!["I am a helpful daemon.", "My owner is Dana."]);

        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("core_seed.md");
        std::fs::write(&seed_path, raw).unwrap();
        let store = TraceStore::new(dir.path());
        let model = SyntheticModelClient::new();

        assert_eq!(store.bootstrap_from_seed(&seed_path, &model).unwrap(), 2);
        assert_eq!(store.bootstrap_from_seed(&seed_path, &model).unwrap(), 0);
        assert_eq!(store.count_core(), 2);
        let core = store.list().into_iter().find(|t| t.summary.contains("Dana")).unwrap();
        assert_eq!(core.strength, CORE_SEED_STRENGTH);
        assert!((core.activation - 1.0).abs() < 1e-9);
        assert!(core.has_embedding());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        store.insert(TraceBuilder::new().id("t").summary("fact").strength(3).inhibits(&["x"]).build());
        store.save().unwrap();

        let store2 = TraceStore::new(dir.path());
        store2.load().unwrap();
        let t = store2.get("t").unwrap();
        assert_eq!(t.summary, "fact");
        assert_eq!(t.strength, 3);
        assert_eq!(t.inhibits, vec!["x"]);
    }
}
