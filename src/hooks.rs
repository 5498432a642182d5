//! Observability and executive-notification capability.
//!
//! The scheduler and effector fire these instead of holding function-
//! valued fields; implementors pick the events they care about, the
//! defaults are no-ops.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::item::Action;
use crate::thread::Thread;
use crate::trace::Trace;

pub trait Hooks: Send + Sync {
    /// A thread was selected for the executive (on identity change or
    /// new content on the current selection). `traces` is the activated
    /// memory context retrieved for it.
    fn on_select(&self, _thread: &Thread, _traces: &[Trace]) {}

    /// The effector picked up an action and is about to execute it.
    fn on_action(&self, _action: &Action) {}

    /// An action completed successfully.
    fn on_send(&self, _action: &Action) {}

    /// An action failed terminally (no further retries).
    fn on_error(&self, _action: &Action, _message: &str) {}

    /// An action failed transiently and was rescheduled.
    fn on_retry(&self, _action: &Action, _attempts: u32, _next_retry: DateTime<Utc>) {}

    /// A typing refresh was sent for a channel.
    fn on_typing(&self, _channel_id: &str) {}
}

pub struct NoopHooks;

impl Hooks for NoopHooks {}

/// Logs every event through tracing. The daemon default.
pub struct LogHooks;

impl Hooks for LogHooks {
    fn on_select(&self, thread: &Thread, traces: &[Trace]) {
        tracing::info!(
            thread_id = %thread.id,
            goal = %thread.goal,
            salience = thread.salience,
            context_traces = traces.len(),
            "Thread selected"
        );
    }

    fn on_action(&self, action: &Action) {
        tracing::debug!(action_id = %action.id, kind = %action.kind, "Executing action");
    }

    fn on_send(&self, action: &Action) {
        tracing::info!(action_id = %action.id, kind = %action.kind, "Action complete");
    }

    fn on_error(&self, action: &Action, message: &str) {
        tracing::error!(action_id = %action.id, kind = %action.kind, error = %message, "Action failed");
    }

    fn on_retry(&self, action: &Action, attempts: u32, next_retry: DateTime<Utc>) {
        tracing::warn!(
            action_id = %action.id,
            attempts = attempts,
            next_retry = %next_retry.to_rfc3339(),
            "Action retry scheduled"
        );
    }

    fn on_typing(&self, channel_id: &str) {
        tracing::trace!(channel = %channel_id, "Typing refreshed");
    }
}

/// Records every event for assertion. Used by the scenario suite and by
/// embedders that want to observe the daemon programmatically.
#[derive(Default)]
pub struct RecordingHooks {
    pub selections: Mutex<Vec<String>>,
    pub sends: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<(String, String)>>,
    pub retries: Mutex<Vec<(String, u32, DateTime<Utc>)>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.selections.lock().expect("hooks lock poisoned").clone()
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sends.lock().expect("hooks lock poisoned").clone()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().expect("hooks lock poisoned").len()
    }

    pub fn retry_schedule(&self) -> Vec<(String, u32, DateTime<Utc>)> {
        self.retries.lock().expect("hooks lock poisoned").clone()
    }
}

impl Hooks for RecordingHooks {
    fn on_select(&self, thread: &Thread, _traces: &[Trace]) {
        self.selections
            .lock()
            .expect("hooks lock poisoned")
            .push(thread.id.clone());
    }

    fn on_send(&self, action: &Action) {
        self.sends
            .lock()
            .expect("hooks lock poisoned")
            .push(action.id.clone());
    }

    fn on_error(&self, action: &Action, message: &str) {
        self.errors
            .lock()
            .expect("hooks lock poisoned")
            .push((action.id.clone(), message.to_string()));
    }

    fn on_retry(&self, action: &Action, attempts: u32, next_retry: DateTime<Utc>) {
        self.retries
            .lock()
            .expect("hooks lock poisoned")
            .push((action.id.clone(), attempts, next_retry));
    }
}
