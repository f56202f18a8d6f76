use crate::error::ApiError;
use bytes::Bytes;
use ppi_core::metrics::{MetricsCollector, MetricsSnapshot, RequestOutcome};
use query::{BaitListing, BaitsRequest, QueryEngine, SearchResults};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use storage::{artifact, ArtifactKey, ContactStore};

pub const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A served contact artifact: the stored bytes verbatim plus caching headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactResponse {
    pub key: ArtifactKey,
    pub body: Bytes,
    pub etag: String,
}

impl ContactResponse {
    fn new(key: ArtifactKey, body: Bytes) -> Self {
        let etag = format!("\"{:x}\"", Sha256::digest(&body));
        Self { key, body, etag }
    }

    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            ("content-type", CONTENT_TYPE_JSON.to_string()),
            ("cache-control", CACHE_CONTROL_IMMUTABLE.to_string()),
            ("etag", self.etag.clone()),
        ]
    }
}

/// Request-facing operations. Shared across handlers behind an `Arc`.
pub struct RetrievalService {
    engine: QueryEngine,
    contacts: Arc<dyn ContactStore>,
    metrics: MetricsCollector,
}

impl RetrievalService {
    pub fn new(engine: QueryEngine, contacts: Arc<dyn ContactStore>) -> Self {
        Self {
            engine,
            contacts,
            metrics: MetricsCollector::default(),
        }
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn baits(&self, mode: Option<String>) -> Result<BaitListing, ApiError> {
        let started = Instant::now();
        let result = self
            .engine
            .list_baits(&BaitsRequest { mode })
            .await
            .map_err(ApiError::from);
        self.finish(started, result)
    }

    pub async fn search(
        &self,
        term: &str,
        mode: Option<&str>,
        confidence: Option<&str>,
    ) -> Result<SearchResults, ApiError> {
        let started = Instant::now();
        let result = self
            .engine
            .search(term, mode, confidence)
            .await
            .map_err(ApiError::from);
        self.finish(started, result)
    }

    /// The id is validated before the store is touched.
    pub async fn contact_artifact(&self, raw_id: &str) -> Result<ContactResponse, ApiError> {
        let started = Instant::now();
        let result = self.load_contact(raw_id).await;
        self.finish(started, result)
    }

    async fn load_contact(&self, raw_id: &str) -> Result<ContactResponse, ApiError> {
        let key = ArtifactKey::parse(raw_id).map_err(|_| ApiError::InvalidId(raw_id.to_string()))?;

        let body = self
            .contacts
            .fetch(&key)
            .await
            .map_err(ApiError::ContactLoad)?
            .ok_or_else(|| ApiError::ContactNotFound(raw_id.to_string()))?;

        // Stored content is served as-is, but never if it is not JSON.
        artifact::ensure_json(&key, &body).map_err(ApiError::ContactLoad)?;

        Ok(ContactResponse::new(key, body))
    }

    fn finish<T>(&self, started: Instant, result: Result<T, ApiError>) -> Result<T, ApiError> {
        let latency_us = started.elapsed().as_micros() as u64;
        match &result {
            Ok(_) => self.metrics.record_request(latency_us, RequestOutcome::Ok),
            Err(err) => {
                err.log();
                self.metrics.record_request(latency_us, err.outcome());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storage::{InMemoryContactStore, Repository, StorePool};
    use tempfile::tempdir;

    async fn service(contacts: Arc<InMemoryContactStore>) -> (tempfile::TempDir, RetrievalService) {
        let dir = tempdir().unwrap();
        let repo = Arc::new(Repository::open(dir.path().join("svc.wal")).await.unwrap());
        let pool = StorePool::new(repo, 2, Duration::from_millis(50));
        (dir, RetrievalService::new(QueryEngine::new(pool), contacts))
    }

    #[tokio::test]
    async fn test_etag_is_sha256_of_body() {
        let contacts = Arc::new(InMemoryContactStore::default());
        contacts
            .publish(&ArtifactKey::new(1), Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let (_dir, svc) = service(contacts).await;

        let response = svc.contact_artifact("1").await.unwrap();
        assert_eq!(
            response.etag,
            "\"44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a\""
        );
        assert_eq!(response.body, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_metrics_classify_outcomes() {
        let (_dir, svc) = service(Arc::new(InMemoryContactStore::default())).await;

        assert!(matches!(
            svc.contact_artifact("../1").await,
            Err(ApiError::InvalidId(_))
        ));
        assert!(matches!(
            svc.contact_artifact("077").await,
            Err(ApiError::ContactNotFound(id)) if id == "077"
        ));
        svc.baits(None).await.unwrap();

        let snapshot = svc.metrics();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.not_found, 1);
        assert_eq!(snapshot.client_errors, 1);
        assert_eq!(snapshot.server_errors, 0);
    }
}
