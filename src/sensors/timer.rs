//! Autonomous wake timer: lets the daemon act without external input.
//! Wake impulses are routine (priority 2) and therefore budget-gated by
//! the router.

use std::sync::Arc;

use crate::item::InboxItem;
use crate::storage::Inbox;
use crate::time_utils;

pub struct WakeTimer {
    inbox: Arc<Inbox>,
    enabled: bool,
}

impl WakeTimer {
    pub fn new(inbox: Arc<Inbox>, enabled: bool) -> Self {
        Self { inbox, enabled }
    }

    /// Emit one wake impulse. The id is minute-bucketed so a restart
    /// inside the same minute cannot double-fire.
    pub fn tick(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let now = time_utils::now();
        let item = InboxItem::new_impulse(
            &format!("wake-{}", now.timestamp() / 60),
            "wake",
            "Autonomous wake: look around, follow up on open threads.",
            2,
        );
        match self.inbox.append(item) {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::error!(error = %e, "Wake impulse not journaled");
                false
            }
        }
    }
}
