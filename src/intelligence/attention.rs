//! Attention scheduler: the periodic decay -> salience -> selection ->
//! notify loop.
//!
//! At most one thread is active at a time. Switching away from the
//! current thread requires beating its salience by a hysteresis margin
//! derived from the selection threshold, which in turn drops as global
//! arousal rises.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::budget::BudgetTracker;
use crate::arousal::Arousal;
use crate::constants::*;
use crate::hooks::Hooks;
use crate::percept::Percept;
use crate::storage::{PerceptStore, ThreadStore, TraceStore};
use crate::thread::{Thread, ThreadStatus};
use crate::time_utils;

/// Salience of a thread given its attached percepts.
pub fn compute_salience(thread: &Thread, percepts: &[Percept], now: &DateTime<Utc>) -> f64 {
    let base = match thread.status {
        ThreadStatus::Active => SALIENCE_BASE_ACTIVE,
        ThreadStatus::Paused => (SALIENCE_BASE_PAUSED
            - SALIENCE_PAUSED_SLOPE_PER_MIN * thread.minutes_since_active(now))
        .max(SALIENCE_BASE_FLOOR),
        ThreadStatus::Frozen => SALIENCE_BASE_FLOOR,
        ThreadStatus::Complete => return 0.0,
    };

    let mut percept_boost = 0.0;
    for p in percepts {
        let age = p.age_secs(now);
        let recency = if age < 60 {
            1.5
        } else if age < 300 {
            1.0
        } else {
            0.5
        };
        percept_boost += SALIENCE_PERCEPT_FACTOR * p.intensity * recency;
    }
    // Soft knee: growth above the knee is halved so a burst of percepts
    // cannot trivially pin salience at the ceiling.
    if percept_boost > SALIENCE_SQUASH_KNEE {
        percept_boost = SALIENCE_SQUASH_KNEE + 0.5 * (percept_boost - SALIENCE_SQUASH_KNEE);
    }

    let mut tag_boost = 0.0f64;
    for p in percepts {
        if p.tags.contains("from:owner") {
            tag_boost = tag_boost.max(TAG_BOOST_OWNER);
        }
        if p.tags.contains("mention") {
            tag_boost = tag_boost.max(TAG_BOOST_MENTION);
        }
        if p.tags.contains("dm") {
            tag_boost = tag_boost.max(TAG_BOOST_DM);
        }
        if p.intensity >= INTENSE_THRESHOLD {
            tag_boost = tag_boost.max(TAG_BOOST_INTENSE);
        } else if p.intensity >= STRONG_THRESHOLD {
            tag_boost = tag_boost.max(TAG_BOOST_STRONG);
        }
    }

    (base + percept_boost + tag_boost).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectDecision {
    /// Activate a different thread (pausing the current one).
    Switch(String),
    /// Same selection, but it has unprocessed content: notify again.
    Renotify(String),
}

/// Pure selection over non-terminal candidates with salience already
/// computed. Threads with unprocessed content are preferred; the current
/// active thread is displaced only past the hysteresis margin.
pub fn select_next(candidates: &[Thread], arousal_level: f64) -> Option<SelectDecision> {
    let threshold =
        SELECT_THRESHOLD_MAX - SELECT_THRESHOLD_AROUSAL_SLOPE * arousal_level.clamp(0.0, 1.0);
    let current = candidates.iter().find(|t| t.status == ThreadStatus::Active);

    let unprocessed: Vec<&Thread> = candidates
        .iter()
        .filter(|t| !t.is_terminal() && t.has_unprocessed())
        .collect();
    let pool: Vec<&Thread> = if unprocessed.is_empty() {
        candidates.iter().filter(|t| !t.is_terminal()).collect()
    } else {
        unprocessed
    };
    let top = pool.into_iter().max_by(|a, b| {
        a.salience
            .partial_cmp(&b.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;

    match current {
        Some(cur) if top.id == cur.id => {
            if cur.has_unprocessed() {
                Some(SelectDecision::Renotify(cur.id.clone()))
            } else {
                None
            }
        }
        Some(cur) => {
            if top.salience > cur.salience + threshold * HYSTERESIS_FACTOR {
                Some(SelectDecision::Switch(top.id.clone()))
            } else if cur.has_unprocessed() {
                Some(SelectDecision::Renotify(cur.id.clone()))
            } else {
                None
            }
        }
        None => {
            if top.salience >= threshold {
                Some(SelectDecision::Switch(top.id.clone()))
            } else {
                None
            }
        }
    }
}

pub struct AttentionScheduler {
    percepts: Arc<PerceptStore>,
    threads: Arc<ThreadStore>,
    traces: Arc<TraceStore>,
    arousal: Arc<Arousal>,
    budget: Arc<BudgetTracker>,
    hooks: Arc<dyn Hooks>,
    ticks: AtomicU64,
}

/// Maintenance (freeze pass, arousal refresh) cadence in ticks; at the
/// 100 ms period this lands about once a minute.
const MAINTENANCE_EVERY_TICKS: u64 = 600;

impl AttentionScheduler {
    pub fn new(
        percepts: Arc<PerceptStore>,
        threads: Arc<ThreadStore>,
        traces: Arc<TraceStore>,
        arousal: Arc<Arousal>,
        budget: Arc<BudgetTracker>,
        hooks: Arc<dyn Hooks>,
    ) -> Self {
        Self {
            percepts,
            threads,
            traces,
            arousal,
            budget,
            hooks,
            ticks: AtomicU64::new(0),
        }
    }

    /// One scheduler pass: decay, salience, selection, notification.
    pub fn tick(&self) {
        self.threads.decay_tick(THREAD_ACTIVATION_DECAY);
        self.traces.decay_tick(TRACE_ACTIVATION_DECAY);

        let now = time_utils::now();
        let candidates = self.threads.list_non_terminal();
        let scores: Vec<(String, f64)> = candidates
            .iter()
            .map(|t| {
                let attached = self.percepts.lookup_refs(&t.percept_refs);
                (t.id.clone(), compute_salience(t, &attached, &now))
            })
            .collect();
        self.threads.apply_salience(&scores);

        let candidates = self.threads.list_non_terminal();
        match select_next(&candidates, self.arousal.level()) {
            Some(SelectDecision::Switch(id)) => match self.threads.activate(&id) {
                Ok(thread) => self.notify(thread),
                Err(e) => tracing::error!(thread_id = %id, error = %e, "Activation failed"),
            },
            Some(SelectDecision::Renotify(id)) => {
                if let Some(thread) = self.threads.get(&id) {
                    self.notify(thread);
                }
            }
            None => {}
        }

        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        if tick % MAINTENANCE_EVERY_TICKS == 0 {
            self.threads.freeze_stale(FREEZE_AFTER_HOURS, &now);
            self.arousal.set_budget_pressure(self.budget.pressured());
        }
    }

    /// Hand the selected thread to the executive with its activated
    /// memory context. Store locks are released before the hook runs.
    fn notify(&self, thread: Thread) {
        let exclude: std::collections::HashSet<String> =
            thread.percept_refs.iter().cloned().collect();
        let context = if thread.centroid.is_empty() {
            None
        } else {
            Some(thread.centroid.as_slice())
        };
        let traces = self.traces.activated(SELECT_CONTEXT_TRACES, &exclude, context);
        self.budget.begin_session();
        self.hooks.on_select(&thread, &traces);
    }
}
