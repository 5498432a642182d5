//! Effector: executes outbox actions against the chat port with a
//! bounded retry state machine.
//!
//! Failures split into terminal (4xx client errors: the request itself
//! is wrong) and retryable (everything else). Retryable failures back
//! off exponentially, capped per attempt and in total lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::arousal::Arousal;
use crate::constants::*;
use crate::hooks::Hooks;
use crate::item::Action;
use crate::ports::{ChatPort, PortError};
use crate::processing::splitter::split_message;
use crate::storage::Outbox;
use crate::time_utils;

#[derive(Debug, Clone)]
struct RetryState {
    attempts: u32,
    first_failure: DateTime<Utc>,
    next_retry: DateTime<Utc>,
}

pub struct Effector {
    outbox: Arc<Outbox>,
    chat: Arc<dyn ChatPort>,
    hooks: Arc<dyn Hooks>,
    arousal: Arc<Arousal>,
    effector_tag: String,
    max_retry_duration: Duration,
    max_message_len: usize,
    retries: Mutex<HashMap<String, RetryState>>,
    typing: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl Effector {
    pub fn new(
        outbox: Arc<Outbox>,
        chat: Arc<dyn ChatPort>,
        hooks: Arc<dyn Hooks>,
        arousal: Arc<Arousal>,
        effector_tag: &str,
    ) -> Self {
        Self {
            outbox,
            chat,
            hooks,
            arousal,
            effector_tag: effector_tag.to_string(),
            max_retry_duration: Duration::seconds(RETRY_MAX_DURATION_SECS as i64),
            max_message_len: MAX_MESSAGE_LEN,
            retries: Mutex::new(HashMap::new()),
            typing: Mutex::new(HashMap::new()),
        }
    }

    /// One effector pass: tail the outbox journal, then attempt every
    /// pending action of ours whose retry delay has elapsed.
    pub fn tick(&self) -> usize {
        if let Err(e) = self.outbox.poll() {
            tracing::error!(error = %e, "Outbox poll failed");
        }
        let now = time_utils::now();
        let mut executed = 0;
        for action in self.outbox.pending_for(&self.effector_tag) {
            if !self.retry_ready(&action.id, &now) {
                continue;
            }
            self.execute(&action, &now);
            executed += 1;
        }
        executed
    }

    fn retry_ready(&self, action_id: &str, now: &DateTime<Utc>) -> bool {
        let retries = self.retries.lock().expect("retry lock poisoned");
        match retries.get(action_id) {
            Some(state) => state.next_retry <= *now,
            None => true,
        }
    }

    fn execute(&self, action: &Action, now: &DateTime<Utc>) {
        self.hooks.on_action(action);
        match self.perform(action) {
            Ok(()) => {
                self.retries
                    .lock()
                    .expect("retry lock poisoned")
                    .remove(&action.id);
                self.outbox.mark_complete(&action.id);
                self.hooks.on_send(action);
                // The reply went out: nobody is left hanging.
                self.arousal.set_user_waiting(false);
            }
            Err(e) if e.is_terminal() => {
                self.fail_terminal(action, &e.to_string());
            }
            Err(e) => {
                self.schedule_retry(action, &e.to_string(), now);
            }
        }
    }

    fn perform(&self, action: &Action) -> Result<(), PortError> {
        match action.kind.as_str() {
            "send_message" => {
                let (channel, content) = match (
                    action.payload_str("channel_id"),
                    action.payload_str("content"),
                ) {
                    (Some(c), Some(t)) => (c, t),
                    _ => {
                        return Err(PortError::Client {
                            status: 400,
                            message: "send_message requires channel_id and content".to_string(),
                        })
                    }
                };
                for chunk in split_message(content, self.max_message_len) {
                    self.chat.send(channel, &chunk)?;
                }
                Ok(())
            }
            "add_reaction" => {
                let (channel, message, emoji) = match (
                    action.payload_str("channel_id"),
                    action.payload_str("message_id"),
                    action.payload_str("emoji"),
                ) {
                    (Some(c), Some(m), Some(e)) => (c, m, e),
                    _ => {
                        return Err(PortError::Client {
                            status: 400,
                            message: "add_reaction requires channel_id, message_id, emoji"
                                .to_string(),
                        })
                    }
                };
                self.chat.react(channel, message, emoji)
            }
            other => Err(PortError::Client {
                status: 400,
                message: format!("unknown action type: {}", other),
            }),
        }
    }

    fn fail_terminal(&self, action: &Action, message: &str) {
        self.retries
            .lock()
            .expect("retry lock poisoned")
            .remove(&action.id);
        self.outbox.mark_failed(&action.id);
        self.hooks.on_error(action, message);
        self.arousal.record_error();
    }

    fn schedule_retry(&self, action: &Action, message: &str, now: &DateTime<Utc>) {
        let (attempts, first_failure) = {
            let mut retries = self.retries.lock().expect("retry lock poisoned");
            let state = retries.entry(action.id.clone()).or_insert(RetryState {
                attempts: 0,
                first_failure: *now,
                next_retry: *now,
            });
            state.attempts += 1;
            (state.attempts, state.first_failure)
        };

        // Bounded total retry life: past the window the failure is final.
        if *now - first_failure >= self.max_retry_duration {
            tracing::warn!(
                action_id = %action.id,
                attempts = attempts,
                "Retry window exhausted"
            );
            self.fail_terminal(action, message);
            return;
        }

        let delay_secs = (1u64 << (attempts - 1).min(6)).min(RETRY_MAX_DELAY_SECS);
        let next_retry = *now + Duration::seconds(delay_secs as i64);
        self.retries
            .lock()
            .expect("retry lock poisoned")
            .get_mut(&action.id)
            .expect("state just inserted")
            .next_retry = next_retry;
        self.hooks.on_retry(action, attempts, next_retry);
        self.arousal.record_error();
    }

    /// Start a typing refresher for a channel: the platform's typing
    /// signal is renewed every few seconds until stopped. One refresher
    /// per channel.
    pub fn start_typing(&self, channel_id: &str) {
        let mut typing = self.typing.lock().expect("typing lock poisoned");
        if let Some(flag) = typing.get(channel_id) {
            if flag.load(Ordering::Relaxed) {
                return;
            }
        }
        let flag = Arc::new(AtomicBool::new(true));
        typing.insert(channel_id.to_string(), flag.clone());

        let chat = self.chat.clone();
        let hooks = self.hooks.clone();
        let channel = channel_id.to_string();
        std::thread::Builder::new()
            .name(format!("typing-{}", channel_id))
            .spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    if let Err(e) = chat.typing(&channel) {
                        tracing::debug!(channel = %channel, error = %e, "Typing refresh failed");
                    }
                    hooks.on_typing(&channel);
                    // Sleep in short slices so stop_typing takes effect fast.
                    for _ in 0..(TYPING_REFRESH_SECS * 10) {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        std::thread::sleep(StdDuration::from_millis(100));
                    }
                }
            })
            .ok();
    }

    pub fn stop_typing(&self, channel_id: &str) {
        let mut typing = self.typing.lock().expect("typing lock poisoned");
        if let Some(flag) = typing.remove(channel_id) {
            flag.store(false, Ordering::Relaxed);
        }
    }

    pub fn stop_all_typing(&self) {
        let mut typing = self.typing.lock().expect("typing lock poisoned");
        for (_, flag) in typing.drain() {
            flag.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::RecordingHooks;
    use crate::item::ActionStatus;
    use crate::ports::RecordingChatPort;

    struct Fixture {
        _dir: tempfile::TempDir,
        outbox: Arc<Outbox>,
        port: Arc<RecordingChatPort>,
        hooks: Arc<RecordingHooks>,
        effector: Effector,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let outbox = Arc::new(Outbox::new(dir.path()));
        let port = Arc::new(RecordingChatPort::new());
        let hooks = Arc::new(RecordingHooks::new());
        let effector = Effector::new(
            outbox.clone(),
            port.clone(),
            hooks.clone(),
            Arc::new(Arousal::new()),
            "chat",
        );
        Fixture { _dir: dir, outbox, port, hooks, effector }
    }

    #[test]
    fn test_send_message_completes() {
        let f = fixture();
        let action = Action::send_message("chat", "c1", "hello");
        let id = action.id.clone();
        f.outbox.add(action);

        f.effector.tick();
        assert_eq!(f.outbox.get(&id).unwrap().status, ActionStatus::Complete);
        assert_eq!(f.port.sent_messages(), vec![("c1".to_string(), "hello".to_string())]);
        // Exactly one on-send, zero on-error.
        assert_eq!(f.hooks.sent_ids(), vec![id]);
        assert_eq!(f.hooks.error_count(), 0);
    }

    #[test]
    fn test_long_message_is_split() {
        let f = fixture();
        let long = "word ".repeat(1000); // ~5000 bytes
        f.outbox.add(Action::send_message("chat", "c1", long.trim_end()));
        f.effector.tick();
        let sent = f.port.sent_messages();
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|(_, m)| m.len() <= MAX_MESSAGE_LEN));
    }

    #[test]
    fn test_client_error_is_terminal() {
        let f = fixture();
        f.port.script_send(Some(PortError::Client {
            status: 403,
            message: "forbidden".to_string(),
        }));
        let action = Action::send_message("chat", "c1", "hi");
        let id = action.id.clone();
        f.outbox.add(action);

        f.effector.tick();
        assert_eq!(f.outbox.get(&id).unwrap().status, ActionStatus::Failed);
        assert_eq!(f.hooks.error_count(), 1);
        assert!(f.hooks.sent_ids().is_empty());
        // No retry state left: the next tick does not touch it.
        f.effector.tick();
        assert_eq!(f.hooks.error_count(), 1);
    }

    #[test]
    fn test_backoff_ladder() {
        let f = fixture();
        for _ in 0..4 {
            f.port
                .script_send(Some(PortError::Transient("503".to_string())));
        }
        let action = Action::send_message("chat", "c1", "hi");
        let id = action.id.clone();
        f.outbox.add(action);

        // Four failing attempts. Drive execute() directly with a pinned
        // clock so the scheduled delays are observable exactly.
        let t0 = time_utils::now();
        let action = f.outbox.get(&id).unwrap();
        for _ in 0..4 {
            f.effector.execute(&action, &t0);
        }
        let schedule = f.hooks.retry_schedule();
        let delays: Vec<i64> = schedule
            .iter()
            .map(|(_, _, next)| (*next - t0).num_seconds())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);

        // Fifth attempt succeeds: state cleared, action complete.
        f.effector.execute(&action, &t0);
        assert_eq!(f.outbox.get(&id).unwrap().status, ActionStatus::Complete);
        assert_eq!(f.hooks.sent_ids().len(), 1);
        assert_eq!(f.hooks.error_count(), 0);
    }

    #[test]
    fn test_backoff_delay_caps_at_sixty_seconds() {
        let f = fixture();
        for _ in 0..10 {
            f.port
                .script_send(Some(PortError::Transient("503".to_string())));
        }
        let action = Action::send_message("chat", "c1", "hi");
        f.outbox.add(action.clone());
        let t0 = time_utils::now();
        for _ in 0..10 {
            // Keep the clock near t0 so the total-duration cap never trips.
            f.effector.execute(&action, &t0);
        }
        let schedule = f.hooks.retry_schedule();
        let max_delay = schedule
            .iter()
            .map(|(_, _, next)| (*next - t0).num_seconds())
            .max()
            .unwrap();
        assert_eq!(max_delay, 60);
    }

    #[test]
    fn test_retry_window_exhaustion_is_terminal() {
        let f = fixture();
        f.port
            .script_send(Some(PortError::Transient("503".to_string())));
        f.port
            .script_send(Some(PortError::Transient("503".to_string())));
        let action = Action::send_message("chat", "c1", "hi");
        let id = action.id.clone();
        f.outbox.add(action.clone());

        let t0 = time_utils::now();
        f.effector.execute(&action, &t0);
        // Six minutes later, still failing: past the 5 min window.
        let late = t0 + Duration::minutes(6);
        f.effector.execute(&action, &late);
        assert_eq!(f.outbox.get(&id).unwrap().status, ActionStatus::Failed);
        assert_eq!(f.hooks.error_count(), 1);
    }

    #[test]
    fn test_tick_respects_next_retry() {
        let f = fixture();
        f.port
            .script_send(Some(PortError::Transient("503".to_string())));
        f.outbox.add(Action::send_message("chat", "c1", "hi"));

        f.effector.tick(); // fails, schedules retry 1s out
        let executed = f.effector.tick(); // too soon
        assert_eq!(executed, 0);
    }

    #[test]
    fn test_malformed_action_fails_terminally() {
        let f = fixture();
        let mut action = Action::send_message("chat", "c1", "hi");
        action.payload.remove("content");
        let id = action.id.clone();
        f.outbox.add(action);
        f.effector.tick();
        assert_eq!(f.outbox.get(&id).unwrap().status, ActionStatus::Failed);
    }

    #[test]
    fn test_foreign_effector_actions_ignored() {
        let f = fixture();
        f.outbox.add(Action::send_message("webhook", "c1", "hi"));
        assert_eq!(f.effector.tick(), 0);
        assert_eq!(f.outbox.pending_count(), 1);
    }

    #[test]
    fn test_typing_refresher_single_per_channel() {
        let f = fixture();
        f.effector.start_typing("c1");
        f.effector.start_typing("c1");
        std::thread::sleep(StdDuration::from_millis(300));
        f.effector.stop_typing("c1");
        let pings = f.port.typing_pings.lock().unwrap().len();
        // One immediate ping from the single refresher (not two).
        assert_eq!(pings, 1);
    }
}
