//! Chat sensor: drains platform events into inbox messages.

use std::sync::Arc;

use crate::item::{InboxItem, ItemStatus, ItemType};
use crate::ports::ChatPort;
use crate::storage::Inbox;

pub struct ChatSensor {
    port: Arc<dyn ChatPort>,
    inbox: Arc<Inbox>,
}

impl ChatSensor {
    pub fn new(port: Arc<dyn ChatPort>, inbox: Arc<Inbox>) -> Self {
        Self { port, inbox }
    }

    /// Drain buffered events. The platform message id keys idempotency,
    /// so a redelivered event is a no-op.
    pub fn tick(&self) -> usize {
        let mut written = 0;
        for event in self.port.poll_events() {
            let mut item = InboxItem {
                id: format!("chat-{}", event.id),
                kind: ItemType::Message,
                subtype: None,
                content: event.content,
                channel_id: Some(event.channel_id),
                author_id: Some(event.author_id),
                author: Some(event.author),
                timestamp: event.timestamp,
                status: ItemStatus::Pending,
                priority: 2,
                extra: Default::default(),
            };
            item.extra.insert("dm".to_string(), event.dm.into());
            item.extra
                .insert("mention".to_string(), event.mention.into());
            item.extra
                .insert("from_owner".to_string(), event.from_owner.into());

            match self.inbox.append(item) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "Chat event not journaled"),
            }
        }
        written
    }
}
