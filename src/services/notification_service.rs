use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);
}

struct Entry {
    notification: Notification,
    expires_at: Instant,
}

/// Short-lived messages for the admin console.
#[derive(Clone)]
pub struct NotificationCenter {
    ttl: Duration,
    capacity: usize,
    entries: Arc<Mutex<VecDeque<Entry>>>,
}

impl NotificationCenter {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Unexpired notifications, oldest first. Expired ones are dropped.
    pub fn active(&self) -> Vec<Notification> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|e| e.expires_at > now);
        entries.iter().map(|e| e.notification.clone()).collect()
    }
}

impl NotificationSink for NotificationCenter {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Error => tracing::error!(text = message, "notification"),
            NotificationLevel::Warning => tracing::warn!(text = message, "notification"),
            NotificationLevel::Success | NotificationLevel::Info => {
                tracing::info!(text = message, "notification")
            }
        }

        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Entry {
            notification: Notification {
                id: Uuid::new_v4(),
                level,
                message: message.to_string(),
                created_at: Utc::now(),
            },
            expires_at: Instant::now() + self.ttl,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn notifications_expire_after_ttl() {
        let center = NotificationCenter::new(Duration::from_secs(5), 10);
        center.notify(NotificationLevel::Success, "Candidate approved");
        assert_eq!(center.active().len(), 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        center.notify(NotificationLevel::Error, "Upload failed");
        assert_eq!(center.active().len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        let active = center.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "Upload failed");
    }

    #[test]
    fn oldest_notifications_are_evicted_at_capacity() {
        let center = NotificationCenter::new(Duration::from_secs(60), 2);
        center.notify(NotificationLevel::Info, "one");
        center.notify(NotificationLevel::Info, "two");
        center.notify(NotificationLevel::Info, "three");
        let messages: Vec<_> = center.active().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }
}
