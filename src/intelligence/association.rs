//! Association scoring: how strongly a percept belongs to a thread.
//!
//! A weighted blend of learned feature weights (source, channel, author),
//! semantic similarity to the thread's centroid and topic, and the
//! thread's current activation, all damped by how long the thread has
//! been quiet. Back-references ("about that", ...) and very high
//! similarity lift the damping floor so an old thread can still be
//! picked up.

use chrono::{DateTime, Utc};

use crate::constants::*;
use crate::percept::Percept;
use crate::processing::model::{cosine_similarity, normalized_similarity};
use crate::thread::Thread;

/// Literal phrases that signal the speaker is pointing back at an
/// earlier exchange.
pub const BACK_REFERENCE_PHRASES: &[&str] = &[
    "about that",
    "as we discussed",
    "remember when",
    "speaking of",
    "as i said",
    "as i mentioned",
    "going back to",
    "like we talked about",
    "re: that",
];

pub fn has_back_reference(text: &str) -> bool {
    let lower = text.to_lowercase();
    BACK_REFERENCE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Piecewise staleness factor over the thread's idle time.
pub fn age_decay(idle_secs: i64) -> f64 {
    if idle_secs < 60 {
        1.0
    } else if idle_secs < 300 {
        0.8
    } else if idle_secs < 1800 {
        0.4
    } else {
        0.15
    }
}

#[derive(Debug, Clone)]
pub struct AssociationScore {
    pub thread_id: String,
    pub score: f64,
    /// Max of the two raw similarities; used for tie-breaking.
    pub similarity: f64,
}

/// Score one percept against one thread.
pub fn associate(percept: &Percept, thread: &Thread, now: &DateTime<Utc>) -> AssociationScore {
    let source_w = thread
        .source_weights
        .get(&percept.source)
        .copied()
        .unwrap_or(0.0);
    let channel_w = percept
        .channel_id()
        .and_then(|c| thread.channel_weights.get(c))
        .copied()
        .unwrap_or(0.0);
    let author_w = percept
        .author_key()
        .and_then(|a| thread.author_weights.get(a))
        .copied()
        .unwrap_or(0.0);

    // Unembedded percepts contribute nothing semantically.
    let (centroid_sim, topic_sim) = if percept.has_embedding() {
        (
            cosine_similarity(&percept.embedding, &thread.centroid),
            cosine_similarity(&percept.embedding, &thread.topic),
        )
    } else {
        (0.0, 0.0)
    };
    let max_sim = centroid_sim.max(topic_sim);

    let centroid_term = if thread.centroid.is_empty() || !percept.has_embedding() {
        0.0
    } else {
        normalized_similarity(centroid_sim)
    };
    let topic_term = if thread.topic.is_empty() || !percept.has_embedding() {
        0.0
    } else {
        normalized_similarity(topic_sim)
    };

    let idle_secs = (*now - thread.last_active).num_seconds().max(0);
    let mut decay = age_decay(idle_secs);
    if has_back_reference(percept.content()) || max_sim > ASSOC_HIGH_SIM_OVERRIDE {
        decay = decay.max(ASSOC_DECAY_FLOOR_OVERRIDE);
    }

    let score = decay
        * (ASSOC_SOURCE_WEIGHT * source_w
            + ASSOC_CHANNEL_WEIGHT * channel_w
            + ASSOC_AUTHOR_WEIGHT * author_w
            + ASSOC_CENTROID_WEIGHT * centroid_term
            + ASSOC_TOPIC_WEIGHT * topic_term
            + ASSOC_ACTIVATION_WEIGHT * thread.activation);

    AssociationScore {
        thread_id: thread.id.clone(),
        score,
        similarity: max_sim,
    }
}

/// Best thread for a percept, if any clears the attach threshold. Ties
/// on score fall to the higher similarity.
pub fn best_match(
    percept: &Percept,
    threads: &[Thread],
    now: &DateTime<Utc>,
) -> Option<AssociationScore> {
    threads
        .iter()
        .filter(|t| !t.is_terminal())
        .map(|t| associate(percept, t, now))
        .filter(|s| s.score >= ASSOC_ATTACH_THRESHOLD)
        .max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.similarity
                        .partial_cmp(&b.similarity)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        })
}
