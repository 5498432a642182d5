//! Outbound queue. The router, reflexes and the (external) executive
//! write actions here; the effector executes them. Same indexed +
//! tailable substrate as the inbox, so a tool server can append actions
//! out of process.

use std::path::Path;

use super::journal::Journal;
use super::path_utils;
use crate::item::{Action, ActionStatus};
use crate::CortexResult;

pub struct Outbox {
    journal: Journal<Action>,
}

impl Outbox {
    pub fn new(state_path: &Path) -> Self {
        Self {
            journal: Journal::new(
                path_utils::outbox_journal(state_path),
                path_utils::outbox_snapshot(state_path),
                "items",
            ),
        }
    }

    pub fn add(&self, action: Action) -> bool {
        self.journal.add(action)
    }

    pub fn append(&self, action: Action) -> CortexResult<bool> {
        self.journal.append(action)
    }

    pub fn poll(&self) -> CortexResult<Vec<Action>> {
        self.journal.poll()
    }

    pub fn pending(&self) -> Vec<Action> {
        self.journal.pending()
    }

    /// Pending actions addressed to one effector.
    pub fn pending_for(&self, effector: &str) -> Vec<Action> {
        self.journal
            .pending()
            .into_iter()
            .filter(|a| a.effector == effector)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Action> {
        self.journal.get(id)
    }

    pub fn mark_complete(&self, id: &str) -> bool {
        self.journal.update(id, |a| a.status = ActionStatus::Complete)
    }

    pub fn mark_failed(&self, id: &str) -> bool {
        self.journal.update(id, |a| a.status = ActionStatus::Failed)
    }

    pub fn pending_count(&self) -> usize {
        self.journal.pending_count()
    }

    pub fn save(&self) -> CortexResult<()> {
        self.journal.save()
    }

    pub fn load(&self) -> CortexResult<()> {
        self.journal.load()
    }
}
