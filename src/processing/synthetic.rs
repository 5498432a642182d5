//! Synthetic model client — deterministic, offline.
//!
//! Embeddings come from feature hashing: every text feature claims one
//! slot of a fixed-size vector with a digest-derived signed magnitude,
//! so overlapping texts land near each other without any network
//! dependency. Three feature channels contribute: whole words, adjacent
//! word pairs, and word prefixes (so "planning" overlaps "plan").
//! Summaries and generation are truncations. Used in synthetic mode and
//! throughout the test suite.

use md5::{Digest, Md5};

use super::model::ModelClient;
use crate::constants::{truncate_safe, SUMMARY_FALLBACK_MAX_CHARS};
use crate::CortexResult;

/// Dimension of synthetic embedding vectors.
pub const EMBED_DIM: usize = 256;

/// Channel weights: whole words dominate, pairs add phrase structure,
/// prefixes add morphological overlap.
const WORD_WEIGHT: f32 = 1.0;
const PAIR_WEIGHT: f32 = 0.6;
const PREFIX_WEIGHT: f32 = 0.4;
const PREFIX_LEN: usize = 4;

pub struct SyntheticModelClient;

impl SyntheticModelClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyntheticModelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelClient for SyntheticModelClient {
    fn embed(&self, text: &str) -> CortexResult<Vec<f32>> {
        let mut vector = vec![0.0f32; EMBED_DIM];

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.len() >= 2)
            .collect();
        if words.is_empty() {
            return Ok(vector);
        }

        for word in &words {
            bump_slot(&mut vector, word, WORD_WEIGHT);
            // Prefix shares its slot with the matching short word, which
            // is exactly the overlap we want.
            if word.len() > PREFIX_LEN {
                bump_slot(&mut vector, truncate_safe(word, PREFIX_LEN), PREFIX_WEIGHT);
            }
        }
        for pair in words.windows(2) {
            bump_slot(&mut vector, &format!("{}+{}", pair[0], pair[1]), PAIR_WEIGHT);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(vector)
    }

    fn summarize(&self, fragments: &[String]) -> CortexResult<String> {
        let joined = fragments.join(" ");
        Ok(truncate_on_word(&joined, SUMMARY_FALLBACK_MAX_CHARS))
    }

    fn generate(&self, prompt: &str) -> CortexResult<String> {
        // Goal prompts end with the triggering content; echo its tail.
        let line = prompt.lines().last().unwrap_or(prompt);
        Ok(truncate_on_word(line.trim(), 80))
    }
}

/// Accumulate a feature into its hashed slot. The tail of the digest
/// picks the slot, the head picks a signed magnitude in [-1, 1], so
/// unrelated features tend to cancel instead of piling up.
fn bump_slot(vector: &mut [f32], feature: &str, weight: f32) {
    let digest = Md5::digest(feature.as_bytes());
    let mut slot_bytes = [0u8; 8];
    slot_bytes.copy_from_slice(&digest[8..16]);
    let slot = u64::from_be_bytes(slot_bytes) as usize % vector.len();
    let magnitude = digest[0] as f32 / 127.5 - 1.0;
    vector[slot] += magnitude * weight;
}

/// Truncate to `max_chars` bytes, snapping back to the last word boundary
/// when one exists in the kept portion.
pub fn truncate_on_word(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }
    let cut = truncate_safe(s, max_chars);
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => cut[..idx].to_string(),
        _ => cut.to_string(),
    }
}
