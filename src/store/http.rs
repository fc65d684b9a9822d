use super::{check_object_path, BlobError, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 200,
        }
    }
}

/// Object storage reached over plain HTTP: `PUT`/`HEAD`/`DELETE` on
/// `{base_url}/{path}` with an optional bearer token.
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl HttpBlobStore {
    pub fn new(client: Client, base_url: &str, token: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            retry,
        }
    }

    fn object_url(&self, path: &str) -> Result<String, BlobError> {
        check_object_path(path)?;
        Ok(format!("{}/{}", self.base_url, path))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send_with_retry<F>(&self, path: &str, build: F) -> Result<StatusCode, BlobError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.authorize(build()).send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= self.retry.max_attempts {
                        return Err(BlobError::Unavailable(format!(
                            "{} returned {}",
                            path,
                            resp.status()
                        )));
                    }
                }
                Ok(resp) => return Ok(resp.status()),
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(BlobError::Http(e));
                    }
                }
            }
            tracing::warn!(path, attempt, "blob request failed, retrying");
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        }
    }
}

fn status_to_error(status: StatusCode, path: &str) -> BlobError {
    match status {
        StatusCode::NOT_FOUND => BlobError::NotFound(path.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BlobError::Unauthorized(path.to_string())
        }
        StatusCode::INSUFFICIENT_STORAGE | StatusCode::PAYLOAD_TOO_LARGE => {
            BlobError::QuotaExceeded
        }
        other => BlobError::Unavailable(format!("{path} returned {other}")),
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn backend_tag(&self) -> &'static str {
        "http"
    }

    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String, BlobError> {
        let url = self.object_url(path)?;
        let status = self
            .send_with_retry(path, || {
                self.client
                    .put(&url)
                    .header(header::CONTENT_TYPE, content_type)
                    .body(bytes.clone())
            })
            .await?;
        if status.is_success() {
            Ok(url)
        } else {
            Err(status_to_error(status, path))
        }
    }

    async fn url(&self, path: &str) -> Result<String, BlobError> {
        let url = self.object_url(path)?;
        let status = self
            .send_with_retry(path, || self.client.head(&url))
            .await?;
        if status.is_success() {
            Ok(url)
        } else {
            Err(status_to_error(status, path))
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let url = self.object_url(path)?;
        let status = self
            .send_with_retry(path, || self.client.delete(&url))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(status_to_error(status, path))
        }
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}
