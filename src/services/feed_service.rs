//! Live, ordered view of the candidates collection.
//!
//! One background task per feed listens for store change events and re-reads
//! the whole collection newest first. Readers either take a snapshot, watch the
//! state directly or register callbacks through [`CandidateFeed::subscribe`].

use crate::models::candidate::Candidate;
use crate::store::{DocumentStore, Order, StoreError, CANDIDATES};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedState {
    pub candidates: Vec<Candidate>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct CandidateFeed {
    state: watch::Receiver<FeedState>,
    _task: Arc<AbortOnDrop>,
}

/// Handle returned by [`CandidateFeed::subscribe`]; delivery stops when it is dropped.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn load(store: &dyn DocumentStore) -> Result<Vec<Candidate>, StoreError> {
    store
        .list(CANDIDATES, Order::CreatedDesc)
        .await?
        .into_iter()
        .map(Candidate::from_document)
        .collect()
}

/// Re-reads the collection; returns false when the read failed.
async fn refresh(store: &dyn DocumentStore, tx: &watch::Sender<FeedState>) -> bool {
    match load(store).await {
        Ok(candidates) => {
            tx.send_replace(FeedState {
                candidates,
                loading: false,
                error: None,
            });
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "candidate feed refresh failed");
            tx.send_modify(|state| {
                state.loading = false;
                state.error = Some(e.to_string());
            });
            false
        }
    }
}

fn next_retry(refreshed: bool, retry: Duration) -> Option<Instant> {
    (!refreshed).then(|| Instant::now() + retry)
}

async fn run(store: Arc<dyn DocumentStore>, tx: watch::Sender<FeedState>, retry: Duration) {
    loop {
        let mut changes = store.subscribe();
        // set while the last read failed; unrelated events never push it back
        let mut retry_at = next_retry(refresh(store.as_ref(), &tx).await, retry);

        loop {
            let event = match retry_at {
                Some(deadline) => tokio::select! {
                    event = changes.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        retry_at = next_retry(refresh(store.as_ref(), &tx).await, retry);
                        continue;
                    }
                },
                None => changes.recv().await,
            };

            match event {
                Ok(change) if change.collection == CANDIDATES => {
                    retry_at = next_retry(refresh(store.as_ref(), &tx).await, retry);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "candidate feed lagged behind change events");
                    retry_at = next_retry(refresh(store.as_ref(), &tx).await, retry);
                }
                Err(RecvError::Closed) => {
                    tracing::error!("candidate change subscription closed");
                    tx.send_modify(|state| {
                        state.error = Some("Change subscription closed".to_string());
                    });
                    break;
                }
            }
        }

        tokio::time::sleep(retry).await;
        tracing::info!("re-opening candidate change subscription");
    }
}

impl CandidateFeed {
    /// Opens the standing subscription. Call once per process.
    pub fn start(store: Arc<dyn DocumentStore>, retry: Duration) -> Self {
        let (tx, rx) = watch::channel(FeedState::default());
        let task = tokio::spawn(run(store, tx, retry));
        Self {
            state: rx,
            _task: Arc::new(AbortOnDrop(task)),
        }
    }

    pub fn snapshot(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Calls `on_data` with the full ordered list after every successful read
    /// and `on_error` whenever a read fails.
    pub fn subscribe<D, E>(&self, on_data: D, on_error: E) -> Subscription
    where
        D: Fn(Vec<Candidate>) + Send + 'static,
        E: Fn(String) + Send + 'static,
    {
        let mut rx = self.state.clone();
        let task = tokio::spawn(async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match state.error {
                    Some(message) => on_error(message),
                    None if !state.loading => on_data(state.candidates),
                    None => {}
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        Subscription { task }
    }
}
