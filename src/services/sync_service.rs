use crate::error::Result;
use crate::models::admin::{SyncHeartbeat, SyncHeartbeatBody};
use crate::services::audit_service::to_body;
use crate::store::{DocumentStore, WriteBatch, WriteOp, ADMIN, SYNC_STATUS_ID};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub is_online: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            is_online: false,
            last_sync: None,
            error: None,
        }
    }
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    user_agent: String,
    revert_after: Duration,
    state: watch::Sender<SyncSnapshot>,
    generation: AtomicU64,
    in_flight: AtomicBool,
}

/// Tracks connectivity to the document store and writes a heartbeat each
/// time the process comes back online.
#[derive(Clone)]
pub struct SyncMonitor {
    inner: Arc<Inner>,
}

impl SyncMonitor {
    pub fn new(store: Arc<dyn DocumentStore>, user_agent: String, revert_after: Duration) -> Self {
        let (state, _) = watch::channel(SyncSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                store,
                user_agent,
                revert_after,
                state,
                generation: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.state.subscribe()
    }

    pub async fn set_online(&self, online: bool) {
        let was_online = self.inner.state.borrow().is_online;
        if online == was_online {
            return;
        }
        self.inner.state.send_modify(|s| s.is_online = online);
        if online {
            tracing::info!("document store reachable, syncing");
            self.sync().await;
        } else {
            tracing::warn!("document store unreachable");
        }
    }

    /// No-op while offline or while another sync is running.
    pub async fn force_sync(&self) {
        if !self.inner.state.borrow().is_online {
            return;
        }
        self.sync().await;
    }

    /// Drives the monitor from a network-status channel until it closes.
    pub fn spawn(&self, mut network: watch::Receiver<bool>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                let online = *network.borrow_and_update();
                monitor.set_online(online).await;
                if network.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Last heartbeat written by any instance.
    pub async fn last_heartbeat(&self) -> Result<Option<SyncHeartbeat>> {
        let Some(doc) = self.inner.store.get(ADMIN, SYNC_STATUS_ID).await? else {
            return Ok(None);
        };
        let body: SyncHeartbeatBody = serde_json::from_value(serde_json::Value::Object(doc.data))?;
        Ok(Some(SyncHeartbeat {
            last_sync: doc.updated_at,
            user_agent: body.user_agent,
        }))
    }

    async fn sync(&self) {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_modify(|s| {
            s.status = SyncStatus::Syncing;
            s.error = None;
        });

        let result = self.write_heartbeat().await;
        self.inner.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.inner.state.send_modify(|s| {
                    s.status = SyncStatus::Success;
                    s.last_sync = Some(Utc::now());
                });
                self.schedule_revert(generation);
            }
            Err(e) => {
                tracing::error!(error = %e, "sync heartbeat failed");
                self.inner.state.send_modify(|s| {
                    s.status = SyncStatus::Error;
                    s.error = Some(e.user_message());
                });
            }
        }
    }

    async fn write_heartbeat(&self) -> Result<()> {
        let body = SyncHeartbeatBody {
            user_agent: self.inner.user_agent.clone(),
        };
        let batch = WriteBatch::new().push(WriteOp::Set {
            collection: ADMIN.to_string(),
            id: SYNC_STATUS_ID.to_string(),
            data: to_body(&body)?,
        });
        self.inner.store.commit(batch).await?;
        Ok(())
    }

    fn schedule_revert(&self, generation: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.revert_after).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            inner.state.send_if_modified(|s| {
                if s.status == SyncStatus::Success {
                    s.status = SyncStatus::Idle;
                    true
                } else {
                    false
                }
            });
        });
    }
}

/// Pings the store every `interval` and publishes reachability changes.
pub fn spawn_connectivity_probe(
    store: Arc<dyn DocumentStore>,
    interval: Duration,
) -> (watch::Receiver<bool>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        loop {
            let reachable = store.ping().await.is_ok();
            tx.send_if_modified(|online| {
                if *online != reachable {
                    *online = reachable;
                    true
                } else {
                    false
                }
            });
            if tx.is_closed() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    });
    (rx, handle)
}
