pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use crate::config::Config;
use crate::services::{
    candidate_service::CandidateService, feed_service::CandidateFeed,
    notification_service::NotificationCenter, session_service::SessionService,
    sync_service::SyncMonitor, upload_service::UploadService,
};
use crate::store::{BlobStore, DocumentStore};
use std::sync::Arc;

const NOTIFICATION_CAPACITY: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub candidate_service: CandidateService,
    pub session_service: SessionService,
    pub feed: CandidateFeed,
    pub sync_monitor: SyncMonitor,
    pub notifications: NotificationCenter,
    pub public_rps: u32,
    pub body_limit: usize,
}

impl AppState {
    /// Wires every service around the injected backends. Starts the candidate
    /// feed, so it must be called from inside a Tokio runtime.
    pub fn new(config: &Config, store: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let uploader = UploadService::new(blobs.clone());
        let candidate_service =
            CandidateService::new(store.clone(), uploader, config.file_limits());
        let session_service = SessionService::new(
            store.clone(),
            config.jwt_secret.clone(),
            config.admin_password_hash.clone(),
            config.session_ttl(),
        );
        let feed = CandidateFeed::start(store.clone(), config.feed_retry());
        let sync_monitor = SyncMonitor::new(
            store.clone(),
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            config.sync_revert(),
        );
        let notifications = NotificationCenter::new(config.notification_ttl(), NOTIFICATION_CAPACITY);

        tracing::info!(
            store = store.backend_tag(),
            blobs = blobs.backend_tag(),
            "application state ready"
        );

        Self {
            store,
            blobs,
            candidate_service,
            session_service,
            feed,
            sync_monitor,
            notifications,
            public_rps: config.public_rps,
            body_limit: config.request_body_limit(),
        }
    }
}
