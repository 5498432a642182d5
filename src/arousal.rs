//! Global arousal — a scalar in [0, 1] that lowers the selection
//! threshold under pressure.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Window over which failures count toward the recent-error factor.
const ERROR_WINDOW_MINS: i64 = 10;
/// Errors beyond this count stop raising arousal further.
const ERROR_SATURATION: usize = 5;

const USER_WAITING_WEIGHT: f64 = 0.4;
const ERROR_WEIGHT: f64 = 0.08;
const BUDGET_PRESSURE_WEIGHT: f64 = 0.3;

#[derive(Debug, Default)]
struct Factors {
    user_waiting: bool,
    recent_errors: VecDeque<DateTime<Utc>>,
    budget_pressure: bool,
    /// Pins the level regardless of factors. Used by inspection tooling
    /// and the scenario suite.
    override_level: Option<f64>,
}

#[derive(Debug, Default)]
pub struct Arousal {
    inner: Mutex<Factors>,
}

impl Arousal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derived level in [0, 1].
    pub fn level(&self) -> f64 {
        let mut f = self.inner.lock().expect("arousal lock poisoned");
        if let Some(level) = f.override_level {
            return level.clamp(0.0, 1.0);
        }
        let cutoff = Utc::now() - Duration::minutes(ERROR_WINDOW_MINS);
        while f.recent_errors.front().is_some_and(|t| *t < cutoff) {
            f.recent_errors.pop_front();
        }
        let errors = f.recent_errors.len().min(ERROR_SATURATION) as f64;
        let mut level = errors * ERROR_WEIGHT;
        if f.user_waiting {
            level += USER_WAITING_WEIGHT;
        }
        if f.budget_pressure {
            level += BUDGET_PRESSURE_WEIGHT;
        }
        level.clamp(0.0, 1.0)
    }

    pub fn set_user_waiting(&self, waiting: bool) {
        self.inner.lock().expect("arousal lock poisoned").user_waiting = waiting;
    }

    pub fn record_error(&self) {
        let mut f = self.inner.lock().expect("arousal lock poisoned");
        f.recent_errors.push_back(Utc::now());
        // Bounded: the window trim in level() handles time, this handles volume.
        while f.recent_errors.len() > ERROR_SATURATION * 4 {
            f.recent_errors.pop_front();
        }
    }

    pub fn set_budget_pressure(&self, pressure: bool) {
        self.inner.lock().expect("arousal lock poisoned").budget_pressure = pressure;
    }

    /// Pin the level, bypassing factor computation. `None` restores it.
    pub fn set_override(&self, level: Option<f64>) {
        self.inner.lock().expect("arousal lock poisoned").override_level = level;
    }
}
