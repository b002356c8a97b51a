//! Bounded, time-ordered ring of recently dispatched notifications.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::model::Notification;

/// Keeps the most recent notifications, ordered by `lastModified`
/// descending. Readers always observe a complete snapshot.
pub struct History {
    size: usize,
    notifications: RwLock<Vec<Notification>>,
}

impl History {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            notifications: RwLock::new(Vec::with_capacity(size)),
        }
    }

    /// Appends a notification, re-orders descending by `lastModified` and
    /// drops the oldest entry when over capacity. The sort is stable, so
    /// entries with equal timestamps keep insertion order.
    pub fn push(&self, notification: Notification) {
        let mut guard = self
            .notifications
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push(notification);
        guard.sort_by(|a, b| parse_timestamp(&b.last_modified).cmp(&parse_timestamp(&a.last_modified)));
        if guard.len() > self.size {
            guard.truncate(self.size);
        }
    }

    /// Returns the current entries, newest first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.notifications
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

// Unparseable timestamps sort as oldest.
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CONTENT_UPDATE_TYPE;

    fn notification(id: &str, last_modified: &str) -> Notification {
        Notification {
            id: id.to_string(),
            event_type: CONTENT_UPDATE_TYPE.to_string(),
            last_modified: last_modified.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn snapshot_is_ordered_newest_first() {
        let history = History::new(10);
        history.push(notification("first", "2024-03-01T10:00:00.000Z"));
        history.push(notification("third", "2024-03-01T12:00:00.000Z"));
        history.push(notification("second", "2024-03-01T11:00:00.000Z"));

        let ids: Vec<_> = history.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["third", "second", "first"]);
    }

    #[test]
    fn capacity_is_never_exceeded_and_the_oldest_entry_is_dropped() {
        let history = History::new(2);
        history.push(notification("oldest", "2024-03-01T09:00:00.000Z"));
        history.push(notification("mid", "2024-03-01T10:00:00.000Z"));
        history.push(notification("newest", "2024-03-01T11:00:00.000Z"));

        let ids: Vec<_> = history.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["newest", "mid"]);
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let history = History::new(10);
        history.push(notification("a", "2024-03-01T10:00:00.000Z"));
        history.push(notification("b", "2024-03-01T10:00:00.000Z"));

        let ids: Vec<_> = history.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn unparseable_timestamps_sink_to_the_end() {
        let history = History::new(10);
        history.push(notification("bad", "not-a-timestamp"));
        history.push(notification("good", "2024-03-01T10:00:00.000Z"));

        let ids: Vec<_> = history.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["good", "bad"]);
    }
}
