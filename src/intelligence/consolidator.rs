//! Consolidation: fold aged percepts into the trace pool.
//!
//! Pass A handles corrections (reconsolidating a labile trace in place)
//! and plain reinforcement of near-duplicate knowledge. A near-duplicate
//! that lands on a *labile* trace is an implicit update: it is deferred
//! to clustering and the new trace inhibits the old one instead of
//! merging into it. Pass B clusters whatever is left by conversation and
//! summarizes each cluster into a new trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;

use crate::constants::*;
use crate::percept::Percept;
use crate::processing::synthetic::truncate_on_word;
use crate::processing::ModelClient;
use crate::storage::{PerceptStore, TraceStore};
use crate::trace::Trace;
use crate::{id_gen, time_utils, CortexResult};

/// Literal phrases that mark a percept as correcting earlier information.
pub const CORRECTION_PHRASES: &[&str] = &[
    "actually",
    "correction",
    "scratch that",
    "i meant",
    "i misspoke",
    "let me rephrase",
    "that's wrong",
];

pub fn has_correction(text: &str) -> bool {
    let lower = text.to_lowercase();
    CORRECTION_PHRASES.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Default, Clone)]
pub struct ConsolidationReport {
    pub reconsolidated: usize,
    pub reinforced: usize,
    pub created: usize,
    pub consumed: usize,
}

pub struct Consolidator {
    percepts: Arc<PerceptStore>,
    traces: Arc<TraceStore>,
    model: Arc<dyn ModelClient>,
}

impl Consolidator {
    pub fn new(
        percepts: Arc<PerceptStore>,
        traces: Arc<TraceStore>,
        model: Arc<dyn ModelClient>,
    ) -> Self {
        Self { percepts, traces, model }
    }

    /// One consolidation cycle. `final_pass` (shutdown) ignores the
    /// freshness gate so nothing is left behind.
    pub fn run(&self, final_pass: bool) -> CortexResult<ConsolidationReport> {
        let now = time_utils::now();
        let sourced = self.traces.sourced_ids();
        let min_age = if final_pass { None } else { Some(CONSOLIDATION_MIN_AGE_SECS) };
        let candidates = self.percepts.unsourced_candidates(&sourced, min_age, &now);

        let mut report = ConsolidationReport::default();
        if candidates.is_empty() {
            return Ok(report);
        }

        let mut consumed: Vec<String> = Vec::new();
        // Percepts deferred to clustering, each with an optional trace
        // the resulting cluster must inhibit.
        let mut deferred: Vec<(Percept, Option<String>)> = Vec::new();

        // Pass A: reconsolidation / reinforcement.
        'candidates: for percept in candidates {
            if has_correction(percept.content()) {
                if let Some((trace_id, sim)) =
                    self.traces.most_similar(&percept.embedding, true, true)
                {
                    if sim >= RECONSOLIDATION_SIM {
                        if let Some(trace) = self.traces.get(&trace_id) {
                            let summary = self.resummarize(&trace, &percept);
                            if let Err(e) = self.traces.reconsolidate(
                                &trace_id,
                                &percept.id,
                                &percept.embedding,
                                summary,
                            ) {
                                tracing::warn!(trace_id = %trace_id, error = %e, "Reconsolidation failed");
                            } else {
                                consumed.push(percept.id.clone());
                                report.reconsolidated += 1;
                                continue 'candidates;
                            }
                        }
                    }
                }
            }

            if let Some((trace_id, sim)) =
                self.traces.most_similar(&percept.embedding, false, true)
            {
                if sim >= REINFORCEMENT_SIM {
                    if let Some(trace) = self.traces.get(&trace_id) {
                        if trace.is_labile(&now) {
                            // Implicit update: new info displacing a trace
                            // that was just retrieved. Cluster it and let
                            // the new trace inhibit the old.
                            deferred.push((percept, Some(trace_id)));
                        } else {
                            let summary = self.resummarize(&trace, &percept);
                            if let Err(e) = self.traces.reinforce(
                                &trace_id,
                                &percept.id,
                                &percept.embedding,
                                Some(summary),
                            ) {
                                tracing::warn!(trace_id = %trace_id, error = %e, "Reinforcement failed");
                            } else {
                                consumed.push(percept.id.clone());
                                report.reinforced += 1;
                            }
                        }
                        continue 'candidates;
                    }
                }
            }

            deferred.push((percept, None));
        }

        // Pass B: cluster by conversation. Percepts without the feature
        // form singleton clusters. BTreeMap keeps cluster order stable.
        let mut clusters: BTreeMap<String, Vec<(Percept, Option<String>)>> = BTreeMap::new();
        for (percept, inhibit) in deferred {
            let key = percept
                .conversation_id()
                .unwrap_or(percept.id.as_str())
                .to_string();
            clusters.entry(key).or_default().push((percept, inhibit));
        }

        for (key, members) in clusters {
            let trace = self.cluster_trace(&members);
            consumed.extend(members.iter().map(|(p, _)| p.id.clone()));
            tracing::debug!(
                cluster = %key,
                members = members.len(),
                trace_id = %trace.id,
                "Cluster consolidated"
            );
            self.traces.insert(trace);
            report.created += 1;
        }

        report.consumed = consumed.len();
        self.percepts.remove_many(&consumed);
        tracing::info!(
            reconsolidated = report.reconsolidated,
            reinforced = report.reinforced,
            created = report.created,
            consumed = report.consumed,
            final_pass = final_pass,
            "Consolidation cycle complete"
        );
        Ok(report)
    }

    /// Periodic housekeeping piggybacked on the consolidation cadence.
    pub fn maintenance(&self) {
        let now = time_utils::now();
        self.traces
            .prune_weak(PRUNE_MIN_STRENGTH, Duration::days(PRUNE_MAX_AGE_DAYS), &now);
        self.percepts.prune_older_than(PERCEPT_MAX_AGE_HOURS, &now);
    }

    /// New summary for a trace absorbing a percept: every still-resolvable
    /// source fragment plus the incoming one; the old summary stands in
    /// for sources already pruned.
    fn resummarize(&self, trace: &Trace, percept: &Percept) -> String {
        let mut fragments: Vec<String> = self
            .percepts
            .lookup_refs(&trace.sources)
            .iter()
            .map(fragment)
            .collect();
        if fragments.is_empty() {
            fragments.push(trace.summary.clone());
        }
        fragments.push(fragment(percept));
        self.summarize_or_truncate(&fragments)
    }

    fn cluster_trace(&self, members: &[(Percept, Option<String>)]) -> Trace {
        let now = time_utils::now();
        let sources: Vec<String> = members.iter().map(|(p, _)| p.id.clone()).collect();

        let mut inhibits: Vec<String> = Vec::new();
        for (_, target) in members {
            if let Some(target) = target {
                if !inhibits.contains(target) {
                    inhibits.push(target.clone());
                }
            }
        }

        let fragments: Vec<String> = members.iter().map(|(p, _)| fragment(p)).collect();
        let summary = self.summarize_or_truncate(&fragments);

        Trace {
            id: id_gen::trace_id(),
            summary,
            embedding: mean_embedding(members.iter().map(|(p, _)| p.embedding.as_slice())),
            activation: 0.5,
            strength: members.len() as u32,
            sources,
            is_core: false,
            labile_until: None,
            inhibits,
            created_at: now,
            last_access: now,
        }
    }

    fn summarize_or_truncate(&self, fragments: &[String]) -> String {
        match self.model.summarize(fragments) {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            Ok(_) | Err(_) => truncate_on_word(&fragments.join(" "), SUMMARY_FALLBACK_MAX_CHARS),
        }
    }
}

fn fragment(percept: &Percept) -> String {
    format!("{}: {}", percept.author_label(), percept.content())
}

/// Arithmetic mean of same-dimension embeddings; dimension mismatches
/// are skipped rather than poisoning the mean.
fn mean_embedding<'a>(embeddings: impl Iterator<Item = &'a [f32]>) -> Vec<f32> {
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for e in embeddings {
        if e.is_empty() {
            continue;
        }
        if sum.is_empty() {
            sum = e.to_vec();
            count = 1;
        } else if sum.len() == e.len() {
            for (s, v) in sum.iter_mut().zip(e.iter()) {
                *s += v;
            }
            count += 1;
        }
    }
    if count > 1 {
        for s in sum.iter_mut() {
            *s /= count as f32;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::SyntheticModelClient;
    use crate::test_helpers::{PerceptBuilder, TraceBuilder};

    struct Fixture {
        _dir: tempfile::TempDir,
        percepts: Arc<PerceptStore>,
        traces: Arc<TraceStore>,
        consolidator: Consolidator,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let percepts = Arc::new(PerceptStore::new(dir.path()));
        let traces = Arc::new(TraceStore::new(dir.path()));
        let consolidator = Consolidator::new(
            percepts.clone(),
            traces.clone(),
            Arc::new(SyntheticModelClient::new()),
        );
        Fixture { _dir: dir, percepts, traces, consolidator }
    }

    #[test]
    fn test_correction_phrases() {
        assert!(has_correction("Actually, the meeting is at 4pm"));
        assert!(has_correction("scratch that, it's tuesday"));
        assert!(!has_correction("the meeting is at 3pm"));
    }

    #[test]
    fn test_correction_reconsolidates_labile_trace() {
        let f = fixture();
        f.traces.insert(
            TraceBuilder::new()
                .id("t")
                .summary("meeting is at 3pm")
                .embedding(vec![1.0, 0.0])
                .sources(&["p0"])
                .labile_for_secs(120)
                .build(),
        );
        // cos([1,0],[0.8,0.6]) = 0.8 >= 0.6
        f.percepts.insert(
            PerceptBuilder::new()
                .id("p1")
                .content("actually, the meeting is at 4pm")
                .embedding(vec![0.8, 0.6])
                .age_secs(60)
                .build(),
        );

        let report = f.consolidator.run(false).unwrap();
        assert_eq!(report.reconsolidated, 1);
        assert_eq!(report.created, 0);
        assert_eq!(f.traces.len(), 1);

        let t = f.traces.get("t").unwrap();
        assert_eq!(t.sources, vec!["p0", "p1"]);
        assert!(t.summary.contains("4pm"));
        // Consumed percept leaves the store.
        assert!(f.percepts.get("p1").is_none());
    }

    #[test]
    fn test_correction_without_labile_match_falls_through() {
        let f = fixture();
        // Similar trace exists but is NOT labile: the correction branch
        // finds nothing, the >= 0.8 branch reinforces instead.
        f.traces.insert(
            TraceBuilder::new()
                .id("t")
                .summary("ship date is march")
                .embedding(vec![1.0, 0.0])
                .strength(1)
                .build(),
        );
        f.percepts.insert(
            PerceptBuilder::new()
                .id("p1")
                .content("actually the ship date is still march")
                .embedding(vec![1.0, 0.0])
                .age_secs(60)
                .build(),
        );

        let report = f.consolidator.run(false).unwrap();
        assert_eq!(report.reconsolidated, 0);
        assert_eq!(report.reinforced, 1);
        assert_eq!(f.traces.get("t").unwrap().strength, 2);
    }

    #[test]
    fn test_plain_reinforcement() {
        let f = fixture();
        f.traces.insert(
            TraceBuilder::new()
                .id("t")
                .summary("dana prefers tea")
                .embedding(vec![1.0, 0.0])
                .strength(1)
                .activation(0.4)
                .build(),
        );
        f.percepts.insert(
            PerceptBuilder::new()
                .id("p1")
                .content("dana asked for tea again")
                .embedding(vec![0.99, 0.14])
                .age_secs(60)
                .build(),
        );

        let report = f.consolidator.run(false).unwrap();
        assert_eq!(report.reinforced, 1);
        assert_eq!(report.created, 0);
        let t = f.traces.get("t").unwrap();
        assert_eq!(t.strength, 2);
        assert!((t.activation - 0.7).abs() < 1e-9);
        assert!(t.sources.contains(&"p1".to_string()));
    }

    #[test]
    fn test_implicit_update_inhibits_labile_trace() {
        let f = fixture();
        f.traces.insert(
            TraceBuilder::new()
                .id("t1")
                .summary("lives in paris")
                .embedding(vec![1.0, 0.0])
                .strength(2)
                .labile_for_secs(120)
                .build(),
        );
        // No correction phrase, cos = 0.82.
        f.percepts.insert(
            PerceptBuilder::new()
                .id("p1")
                .content("she lives in berlin now")
                .embedding(vec![0.82, 0.5724334])
                .age_secs(60)
                .feature("conversation_id", "conv-1")
                .build(),
        );

        let report = f.consolidator.run(false).unwrap();
        assert_eq!(report.reconsolidated, 0);
        assert_eq!(report.reinforced, 0);
        assert_eq!(report.created, 1);

        // Old trace untouched, new trace inhibits it.
        let t1 = f.traces.get("t1").unwrap();
        assert_eq!(t1.strength, 2);
        assert_eq!(t1.summary, "lives in paris");
        let t2 = f
            .traces
            .list()
            .into_iter()
            .find(|t| t.id != "t1")
            .unwrap();
        assert_eq!(t2.strength, 1);
        assert_eq!(t2.inhibits, vec!["t1"]);
    }

    #[test]
    fn test_clustering_by_conversation() {
        let f = fixture();
        for (id, content) in [("p1", "first point"), ("p2", "second point")] {
            f.percepts.insert(
                PerceptBuilder::new()
                    .id(id)
                    .content(content)
                    .author("u1", "Dana")
                    .embedding(vec![1.0, 0.0])
                    .age_secs(60)
                    .feature("conversation_id", "conv-1")
                    .build(),
            );
        }
        f.percepts.insert(
            PerceptBuilder::new()
                .id("p3")
                .content("lone observation")
                .embedding(vec![0.0, 1.0])
                .age_secs(60)
                .build(),
        );

        let report = f.consolidator.run(false).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.consumed, 3);
        assert_eq!(f.percepts.len(), 0);

        let cluster = f
            .traces
            .list()
            .into_iter()
            .find(|t| t.sources.len() == 2)
            .unwrap();
        assert_eq!(cluster.strength, 2);
        assert!((cluster.activation - 0.5).abs() < 1e-9);
        assert!(cluster.summary.contains("Dana"));
        assert_eq!(cluster.embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn test_freshness_gate_defers_young_percepts() {
        let f = fixture();
        f.percepts.insert(
            PerceptBuilder::new()
                .id("young")
                .content("just happened")
                .embedding(vec![1.0])
                .build(),
        );
        let report = f.consolidator.run(false).unwrap();
        assert_eq!(report.consumed, 0);
        assert_eq!(f.percepts.len(), 1);

        // The shutdown pass takes it regardless of age.
        let report = f.consolidator.run(true).unwrap();
        assert_eq!(report.consumed, 1);
        assert_eq!(f.percepts.len(), 0);
    }

    #[test]
    fn test_already_sourced_percepts_skipped() {
        let f = fixture();
        f.traces.insert(TraceBuilder::new().id("t").sources(&["p1"]).build());
        f.percepts.insert(
            PerceptBuilder::new()
                .id("p1")
                .content("committed by a reflex")
                .embedding(vec![1.0])
                .age_secs(60)
                .build(),
        );
        let report = f.consolidator.run(false).unwrap();
        assert_eq!(report.consumed, 0);
    }

    #[test]
    fn test_rerun_is_stable() {
        let f = fixture();
        f.percepts.insert(
            PerceptBuilder::new()
                .id("p1")
                .content("one thing")
                .embedding(vec![1.0, 0.0])
                .age_secs(60)
                .build(),
        );
        let first = f.consolidator.run(false).unwrap();
        assert_eq!(first.created, 1);
        // Nothing left: a second run creates nothing new.
        let second = f.consolidator.run(false).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.consumed, 0);
    }

    #[test]
    fn test_mean_embedding_skips_mismatched() {
        let vecs: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![9.9]];
        let mean = mean_embedding(vecs.iter().map(|v| v.as_slice()));
        assert_eq!(mean, vec![0.5, 0.5]);
    }
}
