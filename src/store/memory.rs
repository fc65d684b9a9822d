use super::{
    check_object_path, BlobError, BlobStore, ChangeEvent, DocumentStore, Order, StoreError,
    StoreResult, StoredDocument, WriteBatch, WriteOp,
};
use crate::utils::time::now;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Entry {
    doc: StoredDocument,
    seq: u64,
}

#[derive(Debug, Default)]
struct Collections {
    docs: HashMap<String, BTreeMap<String, Entry>>,
    next_seq: u64,
}

/// Document store kept entirely in process memory.
///
/// Batches are applied to a scratch copy of the touched collections and swapped
/// in only when every op succeeded, so a failing op leaves nothing behind.
pub struct MemoryDocumentStore {
    inner: Mutex<Collections>,
    available: AtomicBool,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Collections::default()),
            available: AtomicBool::new(true),
            changes,
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing and regaining the connection to the store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn count(&self, collection: &str) -> usize {
        self.lock()
            .docs
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }
}

fn sorted(entries: Vec<Entry>, order: Order) -> Vec<StoredDocument> {
    let mut entries = entries;
    // seq follows insertion order, which is creation order
    entries.sort_by_key(|e| e.seq);
    if order == Order::CreatedDesc {
        entries.reverse();
    }
    entries.into_iter().map(|e| e.doc).collect()
}

fn apply(state: &mut Collections, op: WriteOp) -> StoreResult<()> {
    let ts = now();
    match op {
        WriteOp::Create {
            collection,
            id,
            data,
        } => {
            let docs = state.docs.entry(collection.clone()).or_default();
            if docs.contains_key(&id) {
                return Err(StoreError::AlreadyExists { collection, id });
            }
            state.next_seq += 1;
            let seq = state.next_seq;
            let docs = state.docs.entry(collection.clone()).or_default();
            docs.insert(
                id.clone(),
                Entry {
                    doc: StoredDocument {
                        collection,
                        id,
                        data,
                        version: 1,
                        created_at: ts,
                        updated_at: ts,
                    },
                    seq,
                },
            );
        }
        WriteOp::Set {
            collection,
            id,
            data,
        } => {
            state.next_seq += 1;
            let seq = state.next_seq;
            let docs = state.docs.entry(collection.clone()).or_default();
            match docs.get_mut(&id) {
                Some(existing) => {
                    existing.doc.data = data;
                    existing.doc.version += 1;
                    existing.doc.updated_at = ts;
                }
                None => {
                    docs.insert(
                        id.clone(),
                        Entry {
                            doc: StoredDocument {
                                collection,
                                id,
                                data,
                                version: 1,
                                created_at: ts,
                                updated_at: ts,
                            },
                            seq,
                        },
                    );
                }
            }
        }
        WriteOp::Merge {
            collection,
            id,
            data,
        } => {
            state.next_seq += 1;
            let seq = state.next_seq;
            let docs = state.docs.entry(collection.clone()).or_default();
            match docs.get_mut(&id) {
                Some(existing) => {
                    existing.doc.data.extend(data);
                    existing.doc.version += 1;
                    existing.doc.updated_at = ts;
                }
                None => {
                    docs.insert(
                        id.clone(),
                        Entry {
                            doc: StoredDocument {
                                collection,
                                id,
                                data,
                                version: 1,
                                created_at: ts,
                                updated_at: ts,
                            },
                            seq,
                        },
                    );
                }
            }
        }
        WriteOp::Update {
            collection,
            id,
            data,
            expected_version,
        } => {
            let existing = state
                .docs
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(&id));
            let Some(existing) = existing else {
                return Err(StoreError::NotFound { collection, id });
            };
            if let Some(expected) = expected_version {
                if existing.doc.version != expected {
                    return Err(StoreError::Conflict {
                        collection,
                        id,
                        expected,
                        actual: existing.doc.version,
                    });
                }
            }
            existing.doc.data.extend(data);
            existing.doc.version += 1;
            existing.doc.updated_at = ts;
        }
        WriteOp::Append { collection, data } => {
            state.next_seq += 1;
            let seq = state.next_seq;
            let id = Uuid::new_v4().to_string();
            let docs = state.docs.entry(collection.clone()).or_default();
            docs.insert(
                id.clone(),
                Entry {
                    doc: StoredDocument {
                        collection,
                        id,
                        data,
                        version: 1,
                        created_at: ts,
                        updated_at: ts,
                    },
                    seq,
                },
            );
        }
        WriteOp::Delete { collection, id } => {
            if let Some(docs) = state.docs.get_mut(&collection) {
                docs.remove(&id);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        self.check_available()?;
        Ok(self
            .lock()
            .docs
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|e| e.doc.clone()))
    }

    async fn list(&self, collection: &str, order: Order) -> StoreResult<Vec<StoredDocument>> {
        self.check_available()?;
        let entries: Vec<Entry> = self
            .lock()
            .docs
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        Ok(sorted(entries, order))
    }

    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &JsonValue,
        order: Order,
    ) -> StoreResult<Vec<StoredDocument>> {
        self.check_available()?;
        let entries: Vec<Entry> = self
            .lock()
            .docs
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|e| e.doc.data.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(sorted(entries, order))
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.check_available()?;
        let collections = batch.collections();
        {
            let mut guard = self.lock();
            let mut scratch = Collections {
                docs: collections
                    .iter()
                    .map(|c| (c.clone(), guard.docs.get(c).cloned().unwrap_or_default()))
                    .collect(),
                next_seq: guard.next_seq,
            };
            for op in batch.into_ops() {
                apply(&mut scratch, op)?;
            }
            guard.next_seq = scratch.next_seq;
            for (name, docs) in scratch.docs {
                guard.docs.insert(name, docs);
            }
        }
        for collection in collections {
            let _ = self.changes.send(ChangeEvent { collection });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBlob {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Blob store kept in process memory. Paths can be marked as failing to
/// exercise partial-upload and cleanup paths.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, MemoryBlob>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

const URL_PREFIX: &str = "memory://";

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every put to a path ending in `suffix` fails as unavailable.
    pub fn fail_put_on(&self, suffix: &str) {
        self.failing_puts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(suffix.to_string());
    }

    /// Every delete of a path ending in `suffix` fails as unauthorized.
    pub fn fail_delete_on(&self, suffix: &str) {
        self.failing_deletes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(suffix.to_string());
    }

    pub fn paths_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    pub fn object(&self, path: &str) -> Option<MemoryBlob> {
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String, BlobError> {
        check_object_path(path)?;
        if self
            .failing_puts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|suffix| path.ends_with(suffix.as_str()))
        {
            return Err(BlobError::Unavailable(format!("injected failure for {path}")));
        }
        self.objects.lock().unwrap_or_else(|p| p.into_inner()).insert(
            path.to_string(),
            MemoryBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{URL_PREFIX}{path}"))
    }

    async fn url(&self, path: &str) -> Result<String, BlobError> {
        if self
            .objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(path)
        {
            Ok(format!("{URL_PREFIX}{path}"))
        } else {
            Err(BlobError::NotFound(path.to_string()))
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        if self
            .failing_deletes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|suffix| path.ends_with(suffix.as_str()))
        {
            return Err(BlobError::Unauthorized(path.to_string()));
        }
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(URL_PREFIX).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = MemoryDocumentStore::new();
        let op = WriteOp::Create {
            collection: "c".into(),
            id: "1".into(),
            data: body(json!({"a": 1})),
        };
        store.commit(WriteBatch::new().push(op.clone())).await.unwrap();
        let err = store.commit(WriteBatch::new().push(op)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.count("c"), 1);
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let store = MemoryDocumentStore::new();
        let batch = WriteBatch::new()
            .push(WriteOp::Append {
                collection: "logs".into(),
                data: body(json!({"x": 1})),
            })
            .push(WriteOp::Update {
                collection: "c".into(),
                id: "missing".into(),
                data: Map::new(),
                expected_version: None,
            });
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.count("logs"), 0);
    }

    #[tokio::test]
    async fn update_checks_version_and_merges() {
        let store = MemoryDocumentStore::new();
        store
            .commit(WriteBatch::new().push(WriteOp::Create {
                collection: "c".into(),
                id: "1".into(),
                data: body(json!({"status": "Backlog", "name": "A"})),
            }))
            .await
            .unwrap();

        let stale = WriteOp::Update {
            collection: "c".into(),
            id: "1".into(),
            data: body(json!({"status": "Approved"})),
            expected_version: Some(7),
        };
        let err = store.commit(WriteBatch::new().push(stale)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { actual: 1, .. }));

        store
            .commit(WriteBatch::new().push(WriteOp::Update {
                collection: "c".into(),
                id: "1".into(),
                data: body(json!({"status": "Approved"})),
                expected_version: Some(1),
            }))
            .await
            .unwrap();
        let doc = store.get("c", "1").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.data["status"], "Approved");
        assert_eq!(doc.data["name"], "A");
        assert!(doc.updated_at >= doc.created_at);
    }

    #[tokio::test]
    async fn list_orders_by_creation() {
        let store = MemoryDocumentStore::new();
        for id in ["a", "b", "c"] {
            store
                .commit(WriteBatch::new().push(WriteOp::Create {
                    collection: "c".into(),
                    id: id.into(),
                    data: Map::new(),
                }))
                .await
                .unwrap();
        }
        let newest_first: Vec<String> = store
            .list("c", Order::CreatedDesc)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(newest_first, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn commit_notifies_subscribers() {
        let store = MemoryDocumentStore::new();
        let mut rx = store.subscribe();
        store
            .commit(WriteBatch::new().push(WriteOp::Merge {
                collection: "c".into(),
                id: "1".into(),
                data: Map::new(),
            }))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().collection, "c");
    }

    #[tokio::test]
    async fn offline_store_rejects_everything() {
        let store = MemoryDocumentStore::new();
        store.set_available(false);
        assert!(matches!(
            store.ping().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.list("c", Order::CreatedAsc).await.is_err());
        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn blob_round_trip_and_injected_failures() {
        let blobs = MemoryBlobStore::new();
        let url = blobs
            .put("candidates/1/idCard.jpeg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(
            blobs.path_for_url(&url).as_deref(),
            Some("candidates/1/idCard.jpeg")
        );

        blobs.fail_put_on("candidates/1/taxId.jpeg");
        assert!(blobs
            .put("candidates/1/taxId.jpeg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .is_err());

        blobs.delete("candidates/1/idCard.jpeg").await.unwrap();
        assert!(blobs.paths_with_prefix("candidates/1/").is_empty());
    }
}
