use super::{check_object_path, BlobError, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Stores documents under a directory that the router serves at `/uploads`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_prefix(&self) -> String {
        format!("{}/uploads/", self.public_base_url)
    }

    fn file_path(&self, path: &str) -> Result<PathBuf, BlobError> {
        check_object_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn backend_tag(&self) -> &'static str {
        "local"
    }

    async fn put(&self, path: &str, bytes: Bytes, _content_type: &str) -> Result<String, BlobError> {
        let file_path = self.file_path(path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&file_path, &bytes).await.map_err(|e| {
            tracing::error!("Failed to write document {}: {}", path, e);
            BlobError::Io(e)
        })?;
        Ok(format!("{}{}", self.url_prefix(), path))
    }

    async fn url(&self, path: &str) -> Result<String, BlobError> {
        let file_path = self.file_path(path)?;
        match fs::metadata(&file_path).await {
            Ok(_) => Ok(format!("{}{}", self.url_prefix(), path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(path.to_string())),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let file_path = self.file_path(path)?;
        match fs::remove_file(&file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(path.to_string())),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(BlobError::Unauthorized(path.to_string()))
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.url_prefix()).map(str::to_string)
    }
}
