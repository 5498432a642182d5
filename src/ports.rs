//! Capability traits for the external collaborators: the chat platform
//! and the calendar. The daemon only ever talks to these traits; SDK
//! bindings implement them out of tree.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PortError {
    /// The remote rejected the request (HTTP 4xx). Never retried.
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    /// Anything else: network failure, 5xx, timeout. Retried.
    #[error("transient: {0}")]
    Transient(String),
}

impl PortError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Client { status, .. } if (400..500).contains(status))
    }
}

/// An inbound platform event, already filtered to things worth sensing.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    /// Platform message id; doubles as the inbox idempotency key.
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author: String,
    pub content: String,
    pub dm: bool,
    pub mention: bool,
    pub from_owner: bool,
    pub timestamp: DateTime<Utc>,
}

pub trait ChatPort: Send + Sync {
    fn send(&self, channel_id: &str, content: &str) -> Result<(), PortError>;
    fn react(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), PortError>;
    fn typing(&self, channel_id: &str) -> Result<(), PortError>;
    /// Drain buffered inbound events. Non-blocking.
    fn poll_events(&self) -> Vec<ChatEvent>;
    fn healthy(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn minutes_until(&self, now: &DateTime<Utc>) -> i64 {
        (self.starts_at - *now).num_minutes()
    }
}

pub trait CalendarPort: Send + Sync {
    fn upcoming(&self, within: Duration) -> Result<Vec<CalendarEvent>, PortError>;
}

/// Chat port that accepts everything and receives nothing. Used when no
/// platform credentials are configured: the inbox/outbox journals remain
/// the only I/O surface.
pub struct NullChatPort;

impl ChatPort for NullChatPort {
    fn send(&self, channel_id: &str, content: &str) -> Result<(), PortError> {
        tracing::info!(channel = %channel_id, len = content.len(), "send (no chat port)");
        Ok(())
    }

    fn react(&self, _channel_id: &str, _message_id: &str, _emoji: &str) -> Result<(), PortError> {
        Ok(())
    }

    fn typing(&self, _channel_id: &str) -> Result<(), PortError> {
        Ok(())
    }

    fn poll_events(&self) -> Vec<ChatEvent> {
        Vec::new()
    }

    fn healthy(&self) -> bool {
        true
    }
}

pub struct NullCalendarPort;

impl CalendarPort for NullCalendarPort {
    fn upcoming(&self, _within: Duration) -> Result<Vec<CalendarEvent>, PortError> {
        Ok(Vec::new())
    }
}

/// In-memory chat port for synthetic mode and tests: sends are recorded,
/// inbound events and send outcomes are scripted.
#[derive(Default)]
pub struct RecordingChatPort {
    pub sent: Mutex<Vec<(String, String)>>,
    pub reactions: Mutex<Vec<(String, String, String)>>,
    pub typing_pings: Mutex<Vec<String>>,
    events: Mutex<VecDeque<ChatEvent>>,
    /// Errors to return from the next sends, in order. Empty = success.
    send_script: Mutex<VecDeque<Option<PortError>>>,
}

impl RecordingChatPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, event: ChatEvent) {
        self.events.lock().expect("port lock poisoned").push_back(event);
    }

    /// Queue the outcome of a future `send` call. `None` means success.
    pub fn script_send(&self, outcome: Option<PortError>) {
        self.send_script
            .lock()
            .expect("port lock poisoned")
            .push_back(outcome);
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("port lock poisoned").clone()
    }
}

impl ChatPort for RecordingChatPort {
    fn send(&self, channel_id: &str, content: &str) -> Result<(), PortError> {
        let scripted = self.send_script.lock().expect("port lock poisoned").pop_front();
        if let Some(Some(err)) = scripted {
            return Err(err);
        }
        self.sent
            .lock()
            .expect("port lock poisoned")
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }

    fn react(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<(), PortError> {
        self.reactions.lock().expect("port lock poisoned").push((
            channel_id.to_string(),
            message_id.to_string(),
            emoji.to_string(),
        ));
        Ok(())
    }

    fn typing(&self, channel_id: &str) -> Result<(), PortError> {
        self.typing_pings
            .lock()
            .expect("port lock poisoned")
            .push(channel_id.to_string());
        Ok(())
    }

    fn poll_events(&self) -> Vec<ChatEvent> {
        self.events.lock().expect("port lock poisoned").drain(..).collect()
    }

    fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        let e = PortError::Client { status: 404, message: "unknown channel".into() };
        assert!(e.is_terminal());
        let e = PortError::Transient("503 service unavailable".into());
        assert!(!e.is_terminal());
    }

    #[test]
    fn test_recording_port_scripting() {
        let port = RecordingChatPort::new();
        port.script_send(Some(PortError::Transient("down".into())));
        assert!(port.send("c", "x").is_err());
        assert!(port.send("c", "x").is_ok());
        assert_eq!(port.sent_messages().len(), 1);
    }
}
