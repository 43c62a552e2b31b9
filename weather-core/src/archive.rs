//! Object storage for successful response envelopes.
//!
//! The pipeline only needs `put`; backends are chosen once at startup and shared
//! across requests behind an `Arc<dyn ArchiveWriter>`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};

use crate::{config::ArchiveBackend, provider::truncate_body};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("no bucket configured for archive writes")]
    MissingBucket,

    #[error("refusing to write outside the bucket: {0}")]
    InvalidKey(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("archive endpoint responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[async_trait]
pub trait ArchiveWriter: Send + Sync + std::fmt::Debug {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ArchiveError>;
}

/// Construct the configured archive backend.
pub fn archive_from_config(backend: &ArchiveBackend) -> Box<dyn ArchiveWriter> {
    match backend {
        ArchiveBackend::Fs { root } => Box::new(FsArchive::new(root.clone())),
        ArchiveBackend::Http { endpoint, token } => {
            Box::new(HttpArchive::new(endpoint.clone(), token.clone()))
        }
    }
}

/// Stores objects as files at `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct FsArchive {
    root: PathBuf,
}

impl FsArchive {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ArchiveError> {
        if bucket.is_empty() {
            return Err(ArchiveError::MissingBucket);
        }
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part);
            if part.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
                return Err(ArchiveError::InvalidKey(format!("{bucket}/{key}")));
            }
            path.push(rel);
        }
        Ok(path)
    }
}

#[async_trait]
impl ArchiveWriter for FsArchive {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ArchiveError> {
        let path = self.object_path(bucket, key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ArchiveError::Io { path: parent.to_path_buf(), source })?;
        }

        tokio::fs::write(&path, body)
            .await
            .map_err(|source| ArchiveError::Io { path: path.clone(), source })?;

        tracing::debug!(path = %path.display(), "archived response");
        Ok(())
    }
}

/// Sends objects to an S3-style gateway as `PUT <endpoint>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct HttpArchive {
    endpoint: String,
    token: Option<String>,
    http: Client,
}

impl HttpArchive {
    pub fn new(endpoint: String, token: Option<String>) -> Self {
        Self {
            endpoint,
            token,
            http: Client::new(),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl ArchiveWriter for HttpArchive {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ArchiveError> {
        if bucket.is_empty() {
            return Err(ArchiveError::MissingBucket);
        }

        let url = self.object_url(bucket, key);
        let mut request = self.http.put(&url).header(CONTENT_TYPE, content_type).body(body);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ArchiveError::Status { status, body: truncate_body(&body) });
        }

        tracing::debug!(%url, "archived response");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Bytes,
        extract::{Path as UrlPath, State},
        http::{HeaderMap, StatusCode as HttpStatus},
        routing::put,
    };
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn fs_archive_writes_under_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchive::new(dir.path());

        archive
            .put("test-bucket", "responses/melbourne-1.json", b"{\"data\":{}}".to_vec(), "application/json")
            .await
            .unwrap();

        let stored =
            std::fs::read_to_string(dir.path().join("test-bucket/responses/melbourne-1.json")).unwrap();
        assert_eq!(stored, "{\"data\":{}}");
    }

    #[tokio::test]
    async fn fs_archive_requires_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchive::new(dir.path());

        let err = archive.put("", "responses/x.json", Vec::new(), "application/json").await.unwrap_err();
        assert!(matches!(err, ArchiveError::MissingBucket));
    }

    #[tokio::test]
    async fn fs_archive_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchive::new(dir.path().join("root"));

        for key in ["responses/../../escape.json", "/etc/passwd", ""] {
            let err = archive.put("bucket", key, Vec::new(), "application/json").await.unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidKey(_)), "{key} should be rejected");
        }
        let err = archive.put("..", "x.json", Vec::new(), "application/json").await.unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidKey(_)));
    }

    type Received = Arc<Mutex<Vec<(String, String, Option<String>, Vec<u8>)>>>;

    async fn store(
        State(received): State<Received>,
        UrlPath((bucket, key)): UrlPath<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> HttpStatus {
        if bucket == "locked" {
            return HttpStatus::FORBIDDEN;
        }
        let content_type = headers.get("content-type").unwrap().to_str().unwrap().to_string();
        let auth = headers.get("authorization").map(|v| v.to_str().unwrap().to_string());
        received.lock().unwrap().push((format!("{bucket}/{key}"), content_type, auth, body.to_vec()));
        HttpStatus::OK
    }

    async fn spawn_store() -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route("/:bucket/*key", put(store))
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/"), received)
    }

    #[tokio::test]
    async fn http_archive_puts_object_with_content_type() {
        let (endpoint, received) = spawn_store().await;
        let archive = HttpArchive::new(endpoint, Some("secret".into()));

        archive
            .put("weather", "responses/history-oslo-5.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let (path, content_type, auth, body) = &received[0];
        assert_eq!(path, "weather/responses/history-oslo-5.json");
        assert_eq!(content_type, "application/json");
        assert_eq!(auth.as_deref(), Some("Bearer secret"));
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn http_archive_surfaces_rejections() {
        let (endpoint, _received) = spawn_store().await;
        let archive = HttpArchive::new(endpoint, None);

        let err = archive.put("locked", "k.json", Vec::new(), "application/json").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Status { status, .. } if status == StatusCode::FORBIDDEN));

        let err = archive.put("", "k.json", Vec::new(), "application/json").await.unwrap_err();
        assert!(matches!(err, ArchiveError::MissingBucket));
    }
}
