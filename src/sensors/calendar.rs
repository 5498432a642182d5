//! Calendar sensor: the one-minute task check. Imminent events become
//! urgent impulses that bypass the thinking budget.

use std::sync::Arc;

use chrono::Duration;

use crate::item::InboxItem;
use crate::ports::CalendarPort;
use crate::storage::Inbox;
use crate::time_utils;

/// Events starting within this many minutes count as "due".
const DUE_WINDOW_MIN: i64 = 5;
/// Events starting within this many minutes count as "upcoming".
const UPCOMING_WINDOW_MIN: i64 = 30;

pub struct CalendarSensor {
    port: Arc<dyn CalendarPort>,
    inbox: Arc<Inbox>,
}

impl CalendarSensor {
    pub fn new(port: Arc<dyn CalendarPort>, inbox: Arc<Inbox>) -> Self {
        Self { port, inbox }
    }

    /// Scan the upcoming window and emit due/upcoming impulses. The
    /// event id + phase keys idempotency: each event fires once per
    /// phase.
    pub fn tick(&self) -> usize {
        let now = time_utils::now();
        let events = match self.port.upcoming(Duration::minutes(UPCOMING_WINDOW_MIN)) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "Calendar poll failed");
                return 0;
            }
        };

        let mut written = 0;
        for event in events {
            let minutes = event.minutes_until(&now);
            if minutes < 0 || minutes > UPCOMING_WINDOW_MIN {
                continue;
            }
            let phase = if minutes <= DUE_WINDOW_MIN { "due" } else { "upcoming" };
            let item = InboxItem::new_impulse(
                &format!("cal-{}-{}", event.id, phase),
                phase,
                &format!("Calendar: {} in {} min", event.title, minutes),
                1,
            );
            match self.inbox.append(item) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "Calendar impulse not journaled"),
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;
    use crate::ports::{CalendarEvent, PortError};
    use std::sync::Mutex;

    struct FixedCalendar {
        events: Mutex<Vec<CalendarEvent>>,
    }

    impl CalendarPort for FixedCalendar {
        fn upcoming(&self, _within: Duration) -> Result<Vec<CalendarEvent>, PortError> {
            Ok(self.events.lock().unwrap().clone())
        }
    }

    #[test]
    fn test_due_and_upcoming_phases() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = Arc::new(Inbox::new(dir.path()));
        let now = time_utils::now();
        let port = Arc::new(FixedCalendar {
            events: Mutex::new(vec![
                CalendarEvent {
                    id: "standup".to_string(),
                    title: "Standup".to_string(),
                    starts_at: now + Duration::minutes(3),
                },
                CalendarEvent {
                    id: "review".to_string(),
                    title: "Review".to_string(),
                    starts_at: now + Duration::minutes(20),
                },
                CalendarEvent {
                    id: "later".to_string(),
                    title: "Later".to_string(),
                    starts_at: now + Duration::minutes(90),
                },
            ]),
        });
        let sensor = CalendarSensor::new(port, inbox.clone());

        assert_eq!(sensor.tick(), 2);
        let due = inbox.get("cal-standup-due").unwrap();
        assert_eq!(due.kind, ItemType::Impulse);
        assert_eq!(due.priority, 1);
        assert!(due.subtype_is("due"));
        assert!(inbox.get("cal-review-upcoming").unwrap().subtype_is("upcoming"));
        assert!(inbox.get("cal-later-upcoming").is_none());

        // Same scan again: all ids already journaled.
        assert_eq!(sensor.tick(), 0);
    }
}
