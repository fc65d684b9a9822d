use crate::dto::candidate_dto::NamedFile;
use crate::error::{Error, Result};
use crate::models::candidate::{DocumentKey, DocumentUrls};
use crate::store::{BlobError, BlobStore};
use crate::utils::validation::extension_for;
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

/// Pushes a candidate's documents into blob storage.
#[derive(Clone)]
pub struct UploadService {
    blobs: Arc<dyn BlobStore>,
}

pub fn storage_path(candidate_id: Uuid, key: DocumentKey, content_type: &str) -> String {
    format!(
        "candidates/{}/{}.{}",
        candidate_id,
        key.as_str(),
        extension_for(content_type)
    )
}

impl UploadService {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Uploads every file concurrently. Either all five URLs come back or the
    /// first error does, in which case whatever did land is deleted again.
    pub async fn upload_all(&self, candidate_id: Uuid, files: &[NamedFile]) -> Result<DocumentUrls> {
        let uploads = files.iter().map(|file| {
            let path = storage_path(candidate_id, file.key, &file.content_type);
            async move {
                let result = self
                    .blobs
                    .put(&path, file.bytes.clone(), &file.content_type)
                    .await;
                (file.key, path, result)
            }
        });
        let results = join_all(uploads).await;

        let mut stored: Vec<(DocumentKey, String, String)> = Vec::with_capacity(results.len());
        let mut first_error: Option<(DocumentKey, BlobError)> = None;
        for (key, path, result) in results {
            match result {
                Ok(url) => stored.push((key, path, url)),
                Err(e) => {
                    tracing::error!(%candidate_id, document = %key, error = %e, "document upload failed");
                    if first_error.is_none() {
                        first_error = Some((key, e));
                    }
                }
            }
        }

        if let Some((_, err)) = first_error {
            let paths: Vec<String> = stored.into_iter().map(|(_, path, _)| path).collect();
            self.remove_paths(&paths).await;
            return Err(Error::Upload(err));
        }

        DocumentUrls::from_pairs(stored.into_iter().map(|(key, _, url)| (key, url))).ok_or_else(
            || Error::Internal(format!("candidate {} is missing documents", candidate_id)),
        )
    }

    /// Deletes every stored document; returns how many deletions failed.
    pub async fn remove_all(&self, urls: &DocumentUrls) -> usize {
        let mut paths = Vec::new();
        for (key, url) in urls.iter() {
            match self.blobs.path_for_url(url) {
                Some(path) => paths.push(path),
                None => tracing::warn!(document = %key, url, "document URL is not owned by this store"),
            }
        }
        let unresolved = DocumentKey::ALL.len() - paths.len();
        unresolved + self.remove_paths(&paths).await
    }

    async fn remove_paths(&self, paths: &[String]) -> usize {
        let results = join_all(paths.iter().map(|path| async move {
            (path, self.blobs.delete(path).await)
        }))
        .await;
        let mut failed = 0;
        for (path, result) in results {
            match result {
                Ok(()) | Err(BlobError::NotFound(_)) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!(path = %path, error = %e, "failed to delete stored document");
                }
            }
        }
        failed
    }
}
