//! Inbound queue. Sensors and out-of-process producers (tool servers)
//! write records here; the router consumes them.

use std::path::Path;

use super::journal::Journal;
use super::path_utils;
use crate::constants::MAX_PENDING_INBOX;
use crate::item::{InboxItem, ItemStatus};
use crate::CortexResult;

pub struct Inbox {
    journal: Journal<InboxItem>,
}

impl Inbox {
    pub fn new(state_path: &Path) -> Self {
        Self {
            journal: Journal::new(
                path_utils::inbox_journal(state_path),
                path_utils::inbox_snapshot(state_path),
                "items",
            )
            .with_pending_cap(MAX_PENDING_INBOX),
        }
    }

    /// Index without touching the journal. Idempotent on id.
    pub fn add(&self, item: InboxItem) -> bool {
        self.journal.add(item)
    }

    /// Index plus durable journal append.
    pub fn append(&self, item: InboxItem) -> CortexResult<bool> {
        self.journal.append(item)
    }

    /// Tail records appended by external writers since the last poll.
    pub fn poll(&self) -> CortexResult<Vec<InboxItem>> {
        self.journal.poll()
    }

    pub fn pending(&self) -> Vec<InboxItem> {
        self.journal.pending()
    }

    pub fn get(&self, id: &str) -> Option<InboxItem> {
        self.journal.get(id)
    }

    pub fn mark_processed(&self, id: &str) -> bool {
        self.journal.update(id, |item| item.status = ItemStatus::Processed)
    }

    pub fn pending_count(&self) -> usize {
        self.journal.pending_count()
    }

    pub fn len(&self) -> usize {
        self.journal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    pub fn save(&self) -> CortexResult<()> {
        self.journal.save()
    }

    pub fn load(&self) -> CortexResult<()> {
        self.journal.load()
    }
}
