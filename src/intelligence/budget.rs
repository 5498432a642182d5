//! Executive thinking-time budget, tracked against a rolling UTC day.
//!
//! Sessions open when the scheduler hands a thread to the executive and
//! close on the `session_end` signal. Autonomous work (impulse/system
//! percepts) is gated once the day's budget is spent; human-originated
//! percepts are never gated.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::BUDGET_PRESSURE_RATIO;
use crate::storage::path_utils;
use crate::CortexResult;

#[derive(Debug, Serialize, Deserialize)]
struct BudgetState {
    day: NaiveDate,
    used_secs: i64,
    #[serde(skip)]
    session_start: Option<DateTime<Utc>>,
}

pub struct BudgetTracker {
    path: PathBuf,
    cap: Duration,
    inner: Mutex<BudgetState>,
}

impl BudgetTracker {
    pub fn new(state_path: &Path, daily_budget_min: u64) -> Self {
        Self {
            path: path_utils::budget_file(state_path),
            cap: Duration::minutes(daily_budget_min as i64),
            inner: Mutex::new(BudgetState {
                day: Utc::now().date_naive(),
                used_secs: 0,
                session_start: None,
            }),
        }
    }

    /// An executive session opened (idempotent while one is running).
    pub fn begin_session(&self) {
        let mut state = self.inner.lock().expect("budget lock poisoned");
        let now = Utc::now();
        roll_day(&mut state, &now);
        if state.session_start.is_none() {
            state.session_start = Some(now);
            tracing::debug!("Executive session started");
        }
    }

    /// The executive finished; its elapsed time is charged to the day.
    pub fn end_session(&self) {
        let mut state = self.inner.lock().expect("budget lock poisoned");
        let now = Utc::now();
        roll_day(&mut state, &now);
        if let Some(start) = state.session_start.take() {
            let elapsed = (now - start).num_seconds().max(0);
            state.used_secs += elapsed;
            tracing::info!(
                session_secs = elapsed,
                used_secs = state.used_secs,
                "Executive session ended"
            );
        }
    }

    /// Charge time directly (executives that self-report usage).
    pub fn consume(&self, duration: Duration) {
        let mut state = self.inner.lock().expect("budget lock poisoned");
        let now = Utc::now();
        roll_day(&mut state, &now);
        state.used_secs += duration.num_seconds().max(0);
    }

    /// Whether autonomous (non-urgent, non-human) work may still run
    /// today. An open session counts against the remaining budget.
    pub fn can_do_autonomous_work(&self) -> bool {
        let mut state = self.inner.lock().expect("budget lock poisoned");
        let now = Utc::now();
        roll_day(&mut state, &now);
        let in_flight = state
            .session_start
            .map(|s| (now - s).num_seconds().max(0))
            .unwrap_or(0);
        state.used_secs + in_flight < self.cap.num_seconds()
    }

    pub fn used_today(&self) -> Duration {
        let mut state = self.inner.lock().expect("budget lock poisoned");
        roll_day(&mut state, &Utc::now());
        Duration::seconds(state.used_secs)
    }

    /// Budget-pressure arousal factor: most of the day already spent.
    pub fn pressured(&self) -> bool {
        let used = self.used_today().num_seconds() as f64;
        used >= self.cap.num_seconds() as f64 * BUDGET_PRESSURE_RATIO
    }

    pub fn save(&self) -> CortexResult<()> {
        let state = self.inner.lock().expect("budget lock poisoned");
        let bytes = serde_json::to_vec_pretty(&*state)?;
        crate::storage::journal::write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    pub fn load(&self) -> CortexResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let raw = std::fs::read(&self.path)?;
        match serde_json::from_slice::<BudgetState>(&raw) {
            Ok(loaded) => {
                let mut state = self.inner.lock().expect("budget lock poisoned");
                state.day = loaded.day;
                state.used_secs = loaded.used_secs;
                roll_day(&mut state, &Utc::now());
            }
            Err(e) => tracing::warn!(error = %e, "Budget state unreadable, starting fresh"),
        }
        Ok(())
    }
}

fn roll_day(state: &mut BudgetState, now: &DateTime<Utc>) {
    let today = now.date_naive();
    if state.day != today {
        tracing::info!(spent_secs = state.used_secs, "Budget day rolled over");
        state.day = today;
        state.used_secs = 0;
    }
}
