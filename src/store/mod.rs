//! Storage seams used by the candidate lifecycle.
//!
//! The document store holds JSON documents grouped into named collections and
//! commits writes in atomic batches. The blob store holds the uploaded identity
//! documents. Both are injected as trait objects so the services never know
//! which backend is in use.

pub mod http;
pub mod local_fs;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::broadcast;

pub const CANDIDATES: &str = "candidates";
pub const CANDIDATE_BACKUPS: &str = "backup/candidates";
pub const CANDIDATE_LOGS: &str = "logs/candidate_logs";
pub const AUTH_LOGS: &str = "logs/auth_logs";
pub const ADMIN_SESSIONS: &str = "admin/sessions";
pub const ADMIN: &str = "admin";
pub const SYNC_STATUS_ID: &str = "sync_status";

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("document {collection}/{id} changed concurrently (expected version {expected}, found {actual})")]
    Conflict {
        collection: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "db/not-found",
            StoreError::AlreadyExists { .. } => "db/already-exists",
            StoreError::Conflict { .. } => "db/conflict",
            StoreError::Unavailable(_) => "db/unavailable",
            StoreError::PermissionDenied(_) => "db/permission-denied",
            StoreError::Malformed(_) => "db/data-loss",
            StoreError::Database(sqlx::Error::PoolTimedOut)
            | StoreError::Database(sqlx::Error::Io(_))
            | StoreError::Database(sqlx::Error::PoolClosed) => "db/unavailable",
            StoreError::Database(_) => "db/internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.code(), "db/unavailable")
    }
}

/// A stored document plus the metadata the store assigns on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub collection: String,
    pub id: String,
    pub data: Map<String, JsonValue>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert; fails with `AlreadyExists` when the id is taken.
    Create {
        collection: String,
        id: String,
        data: Map<String, JsonValue>,
    },
    /// Insert or replace the whole body.
    Set {
        collection: String,
        id: String,
        data: Map<String, JsonValue>,
    },
    /// Shallow-merge fields into the body, creating the document if missing.
    Merge {
        collection: String,
        id: String,
        data: Map<String, JsonValue>,
    },
    /// Shallow-merge fields into an existing document. When `expected_version`
    /// is set the write only applies if the stored version still matches.
    Update {
        collection: String,
        id: String,
        data: Map<String, JsonValue>,
        expected_version: Option<i64>,
    },
    /// Insert under a store-generated id.
    Append {
        collection: String,
        data: Map<String, JsonValue>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Create { collection, .. }
            | WriteOp::Set { collection, .. }
            | WriteOp::Merge { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Append { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }
}

/// Writes that are applied all together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct collections touched by the batch, in first-seen order.
    pub fn collections(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for op in &self.ops {
            if !seen.iter().any(|c| c == op.collection()) {
                seen.push(op.collection().to_string());
            }
        }
        seen
    }
}

/// Emitted once per committed batch for every collection it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    CreatedAsc,
    CreatedDesc,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>>;

    async fn list(&self, collection: &str, order: Order) -> StoreResult<Vec<StoredDocument>>;

    /// Documents whose top-level `field` equals `value`.
    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &JsonValue,
        order: Order,
    ) -> StoreResult<Vec<StoredDocument>>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Change notifications for every committed batch, from any writer.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn ping(&self) -> StoreResult<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("not authorized to access {0}")]
    Unauthorized(String),

    #[error("upload of {0} was cancelled")]
    Canceled(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BlobError {
    pub fn code(&self) -> &'static str {
        match self {
            BlobError::NotFound(_) => "storage/object-not-found",
            BlobError::QuotaExceeded => "storage/quota-exceeded",
            BlobError::Unauthorized(_) => "storage/unauthorized",
            BlobError::Canceled(_) => "storage/canceled",
            BlobError::Unavailable(_) | BlobError::Http(_) => "storage/retry-limit-exceeded",
            BlobError::InvalidPath(_) => "storage/invalid-argument",
            BlobError::Io(_) => "storage/unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BlobError::Unavailable(_) | BlobError::Http(_))
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str;

    /// Stores the object and returns its retrieval URL.
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String, BlobError>;

    async fn url(&self, path: &str) -> Result<String, BlobError>;

    async fn delete(&self, path: &str) -> Result<(), BlobError>;

    /// Inverse of the URLs produced by `put`; `None` for foreign URLs.
    fn path_for_url(&self, url: &str) -> Option<String>;
}

/// Rejects empty segments, `..` and absolute paths before they reach a backend.
pub(crate) fn check_object_path(path: &str) -> Result<(), BlobError> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(BlobError::InvalidPath(path.to_string()));
    }
    Ok(())
}
