use crate::repo::Repository;
use ppi_core::error::{ErrorCode, PpiError};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("timed out after {0:?} waiting for a store connection")]
    Timeout(Duration),
    #[error("store pool is closed")]
    Closed,
}

impl PpiError for PoolError {
    fn error_code(&self) -> ErrorCode {
        match self {
            PoolError::Timeout(_) => ErrorCode::ResourceExhausted,
            PoolError::Closed => ErrorCode::Internal,
        }
    }
}

/// Bounded set of connections to the schema store.
///
/// Created once at process start and passed to every operation.
#[derive(Clone)]
pub struct StorePool {
    repo: Arc<Repository>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    acquire_timeout: Duration,
}

impl StorePool {
    pub fn new(repo: Arc<Repository>, max_connections: usize, acquire_timeout: Duration) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            repo,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            acquire_timeout,
        }
    }

    /// Wait up to the configured timeout for a connection.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| PoolError::Timeout(self.acquire_timeout))?
        .map_err(|_| PoolError::Closed)?;

        Ok(PooledConnection {
            repo: self.repo.clone(),
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Refuse further acquisitions. Connections already out stay valid until dropped.
    pub fn close(&self) {
        self.permits.close();
    }
}

/// A checked-out connection. The slot returns to the pool when this is dropped.
pub struct PooledConnection {
    repo: Arc<Repository>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Repository;

    fn deref(&self) -> &Repository {
        &self.repo
    }
}
