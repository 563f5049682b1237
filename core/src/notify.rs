use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

/// Default lifetime of a toast before it prunes itself.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    pub duration: Duration,
}

/// Process-wide toast queue shared by every controller. Entries carry a
/// monotonically increasing id, so the queue order is also freshness order.
/// Each entry schedules its own removal; the single rendering subscriber
/// observes snapshots through a watch channel.
#[derive(Clone)]
pub struct NotificationCenter {
    queue: Arc<RwLock<Vec<Notification>>>,
    next_id: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Vec<Notification>>>,
    runtime: Option<tokio::runtime::Handle>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::build(tokio::runtime::Handle::try_current().ok())
    }

    /// Center bound to an explicit runtime handle, so toasts popped from
    /// sync call paths (outside any `block_on`) still expire on schedule.
    pub fn with_runtime(handle: tokio::runtime::Handle) -> Self {
        Self::build(Some(handle))
    }

    fn build(runtime: Option<tokio::runtime::Handle>) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            queue: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            tx: Arc::new(tx),
            runtime,
        }
    }

    /// Receiver for the rendering surface. Each emission is a full snapshot
    /// of the currently visible queue.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.tx.subscribe()
    }

    pub fn pop(&self, severity: Severity, message: impl Into<String>) {
        self.pop_with_duration(severity, message, DEFAULT_TOAST_DURATION);
    }

    pub fn pop_with_duration(
        &self,
        severity: Severity,
        message: impl Into<String>,
        duration: Duration,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            id,
            severity,
            message: message.into(),
            duration,
        };
        self.queue.write().push(notification);
        self.publish();

        // Expiry runs on the handle bound at construction, falling back to
        // the ambient runtime; with neither (plain sync tests) entries stay
        // until removed explicitly.
        let handle = self
            .runtime
            .clone()
            .or_else(|| tokio::runtime::Handle::try_current().ok());
        if let Some(handle) = handle {
            let center = self.clone();
            handle.spawn(async move {
                sleep(duration).await;
                center.remove(id);
            });
        }
    }

    /// Idempotent.
    pub fn remove(&self, id: u64) {
        let mut queue = self.queue.write();
        let before = queue.len();
        queue.retain(|n| n.id != id);
        let changed = queue.len() != before;
        drop(queue);
        if changed {
            self.publish();
        }
    }

    pub fn clear(&self) {
        self.queue.write().clear();
        self.publish();
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.queue.read().clone()
    }

    fn publish(&self) {
        let _ = self.tx.send(self.snapshot());
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
