//! Queue record types: inbound items and outbound actions.
//!
//! These are the wire formats of the inbox/outbox journals (newline-
//! delimited JSON). Out-of-process writers (tool servers) append records
//! in exactly this shape; only `id`, `status` and `content`/`payload` are
//! required, everything else defaults.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Message,
    Signal,
    Impulse,
}

impl Default for ItemType {
    fn default() -> Self {
        Self::Message
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processed,
}

/// An inbound queue record. Signals never become percepts; messages and
/// impulses do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default = "crate::time_utils::now")]
    pub timestamp: DateTime<Utc>,
    pub status: ItemStatus,
    /// 1 = highest; impulses at priority 1 bypass the budget gate.
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_priority() -> i64 {
    2
}

impl InboxItem {
    pub fn new_message(id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: ItemType::Message,
            subtype: None,
            content: content.to_string(),
            channel_id: None,
            author_id: None,
            author: None,
            timestamp: crate::time_utils::now(),
            status: ItemStatus::Pending,
            priority: default_priority(),
            extra: HashMap::new(),
        }
    }

    pub fn new_signal(id: &str, subtype: &str) -> Self {
        Self {
            kind: ItemType::Signal,
            subtype: Some(subtype.to_string()),
            ..Self::new_message(id, "")
        }
    }

    pub fn new_impulse(id: &str, subtype: &str, content: &str, priority: i64) -> Self {
        Self {
            kind: ItemType::Impulse,
            subtype: Some(subtype.to_string()),
            priority,
            ..Self::new_message(id, content)
        }
    }

    /// Truthy check on an `extra` entry (accepts bool true or "true").
    pub fn extra_flag(&self, key: &str) -> bool {
        match self.extra.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "true",
            _ => false,
        }
    }

    pub fn subtype_is(&self, s: &str) -> bool {
        self.subtype.as_deref() == Some(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Complete,
    Failed,
}

/// An outbound queue record, executed by the effector.
///
/// Supported types: `send_message` (payload: channel_id, content) and
/// `add_reaction` (payload: channel_id, message_id, emoji).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub effector: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    pub status: ActionStatus,
    #[serde(default = "crate::time_utils::now")]
    pub timestamp: DateTime<Utc>,
}

impl Action {
    pub fn send_message(effector: &str, channel_id: &str, content: &str) -> Self {
        let mut payload = HashMap::new();
        payload.insert("channel_id".to_string(), channel_id.into());
        payload.insert("content".to_string(), content.into());
        Self {
            id: crate::id_gen::action_id(),
            effector: effector.to_string(),
            kind: "send_message".to_string(),
            payload,
            status: ActionStatus::Pending,
            timestamp: crate::time_utils::now(),
        }
    }

    pub fn add_reaction(effector: &str, channel_id: &str, message_id: &str, emoji: &str) -> Self {
        let mut payload = HashMap::new();
        payload.insert("channel_id".to_string(), channel_id.into());
        payload.insert("message_id".to_string(), message_id.into());
        payload.insert("emoji".to_string(), emoji.into());
        Self {
            id: crate::id_gen::action_id(),
            effector: effector.to_string(),
            kind: "add_reaction".to_string(),
            payload,
            status: ActionStatus::Pending,
            timestamp: crate::time_utils::now(),
        }
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}
