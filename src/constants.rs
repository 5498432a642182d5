// === Tick Periods ===
pub const ROUTER_TICK_MS: u64 = 100;
pub const SCHEDULER_TICK_MS: u64 = 100;
pub const EFFECTOR_TICK_MS: u64 = 100;
pub const CONSOLIDATOR_INTERVAL_SECS: u64 = 60;
pub const SNAPSHOT_INTERVAL_SECS: u64 = 300;
pub const HEALTH_CHECK_SECS: u64 = 30;
pub const TASK_CHECK_SECS: u64 = 60;
pub const TYPING_REFRESH_SECS: u64 = 8;

// === Activation Decay ===
pub const THREAD_ACTIVATION_DECAY: f64 = 0.99;
pub const TRACE_ACTIVATION_DECAY: f64 = 0.995;

// === Association (percept -> thread routing) ===
pub const ASSOC_ATTACH_THRESHOLD: f64 = 0.30;
pub const ASSOC_SOURCE_WEIGHT: f64 = 0.15;
pub const ASSOC_CHANNEL_WEIGHT: f64 = 0.30;
pub const ASSOC_AUTHOR_WEIGHT: f64 = 0.20;
pub const ASSOC_CENTROID_WEIGHT: f64 = 0.30;
pub const ASSOC_TOPIC_WEIGHT: f64 = 0.20;
pub const ASSOC_ACTIVATION_WEIGHT: f64 = 0.15;
/// Decay floor applied when a percept back-references earlier talk or is
/// semantically very close to the thread. A knob, not a tuned value.
pub const ASSOC_DECAY_FLOOR_OVERRIDE: f64 = 0.5;
pub const ASSOC_HIGH_SIM_OVERRIDE: f64 = 0.85;

// === Thread Attach ===
pub const CENTROID_EMA_ALPHA: f32 = 0.3;
pub const FEATURE_DECAY: f64 = 0.9;
pub const FEATURE_ACCUMULATE: f64 = 0.5;
pub const FEATURE_INITIAL: f64 = 0.5;
pub const ATTACH_ACTIVATION_BASE: f64 = 0.5;
pub const ATTACH_ACTIVATION_INTENSITY: f64 = 0.5;

// === Salience ===
pub const SALIENCE_BASE_ACTIVE: f64 = 0.5;
pub const SALIENCE_BASE_PAUSED: f64 = 0.5;
pub const SALIENCE_PAUSED_SLOPE_PER_MIN: f64 = 0.05;
pub const SALIENCE_BASE_FLOOR: f64 = 0.1;
pub const SALIENCE_PERCEPT_FACTOR: f64 = 0.3;
pub const SALIENCE_SQUASH_KNEE: f64 = 0.5;
pub const TAG_BOOST_OWNER: f64 = 0.2;
pub const TAG_BOOST_MENTION: f64 = 0.15;
pub const TAG_BOOST_DM: f64 = 0.1;
pub const TAG_BOOST_INTENSE: f64 = 0.3;
pub const TAG_BOOST_STRONG: f64 = 0.2;
pub const INTENSE_THRESHOLD: f64 = 0.9;
pub const STRONG_THRESHOLD: f64 = 0.8;

// === Selection ===
pub const SELECT_THRESHOLD_MAX: f64 = 0.6;
pub const SELECT_THRESHOLD_AROUSAL_SLOPE: f64 = 0.3;
pub const HYSTERESIS_FACTOR: f64 = 0.5;
pub const SELECT_CONTEXT_TRACES: usize = 10;

// === Trace Memory ===
pub const SPREAD_BOOST: f64 = 0.3;
pub const SPREAD_THRESHOLD: f64 = 0.3;
pub const RETRIEVAL_ACTIVATION_MIN: f64 = 0.1;
pub const LABILE_WINDOW_SECS: i64 = 300;
pub const RECONSOLIDATION_SIM: f64 = 0.6;
pub const REINFORCEMENT_SIM: f64 = 0.8;
pub const REINFORCE_ACTIVATION_BOOST: f64 = 0.3;
pub const REINFORCE_EMA_ALPHA: f32 = 0.2;
pub const RECONSOLIDATE_EMA_ALPHA: f32 = 0.5;
pub const CORE_SEED_STRENGTH: u32 = 100;
pub const SUMMARY_FALLBACK_MAX_CHARS: usize = 300;

// === Consolidation ===
pub const CONSOLIDATION_MIN_AGE_SECS: i64 = 30;
pub const CLUSTER_FEATURE: &str = "conversation_id";

// === Effector Retry ===
pub const RETRY_MAX_DELAY_SECS: u64 = 60;
pub const RETRY_MAX_DURATION_SECS: u64 = 300;

// === Budget ===
pub const DEFAULT_DAILY_BUDGET_MIN: u64 = 30;
pub const BUDGET_PRESSURE_RATIO: f64 = 0.8;

// === Resource Caps ===
pub const MAX_PENDING_INBOX: usize = 1_000;
pub const MAX_PERCEPTS: usize = 10_000;
pub const MAX_THREADS: usize = 10_000;
pub const MAX_RECENT_REPLIES: usize = 50;

// === Maintenance ===
pub const FREEZE_AFTER_HOURS: i64 = 24;
pub const PRUNE_MIN_STRENGTH: u32 = 2;
pub const PRUNE_MAX_AGE_DAYS: i64 = 30;
pub const PERCEPT_MAX_AGE_HOURS: i64 = 24;

// === Outbound Messages ===
pub const MAX_MESSAGE_LEN: usize = 2_000;

// === Deadlines ===
pub const MODEL_TIMEOUT_SECS: u64 = 30;

// === UTF-8 Safe Truncation ===
/// Longest prefix of `s` that fits in `max_bytes` without splitting a
/// UTF-8 sequence.
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_ascii() {
        assert_eq!(truncate_safe("hello world", 5), "hello");
        assert_eq!(truncate_safe("hi", 5), "hi");
    }

    #[test]
    fn test_truncate_safe_multibyte() {
        // 'é' is 2 bytes; cutting mid-char must floor to the boundary
        let s = "caféine";
        let t = truncate_safe(s, 4);
        assert!(s.starts_with(t));
        assert!(t.len() <= 4);
        assert!(std::str::from_utf8(t.as_bytes()).is_ok());
    }
}
