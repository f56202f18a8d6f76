use crate::baits::{aggregate_baits, BaitListing};
use crate::consistency::{reciprocal_report, ReciprocalReport};
use crate::dsl::{BaitsRequest, QueryValidationError, SearchRequest};
use crate::search::{search_interactions, SearchResults};
use ppi_core::error::{ErrorCode, PpiError};
use std::time::Instant;
use storage::{PoolError, RepoError, StorePool};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryValidationError),
    #[error("store unavailable: {0}")]
    Pool(#[from] PoolError),
    #[error("repository error: {0}")]
    Repository(#[from] RepoError),
}

impl PpiError for QueryError {
    fn error_code(&self) -> ErrorCode {
        match self {
            QueryError::InvalidQuery(_) => ErrorCode::InvalidArgument,
            QueryError::Pool(err) => err.error_code(),
            QueryError::Repository(err) => err.error_code(),
        }
    }
}

/// Read-side operations. Each call holds exactly one pooled connection for its duration.
#[derive(Clone)]
pub struct QueryEngine {
    pool: StorePool,
}

impl QueryEngine {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    pub async fn list_baits(&self, request: &BaitsRequest) -> Result<BaitListing, QueryError> {
        let mode = request.effective_mode();
        let started = Instant::now();

        let conn = self.pool.acquire().await?;
        let listing = {
            let tables = conn.tables().await;
            aggregate_baits(&tables, mode)
        };
        drop(conn);

        tracing::debug!(
            mode = mode.as_str(),
            baits = listing.count,
            elapsed_us = started.elapsed().as_micros() as u64,
            "bait listing"
        );
        Ok(listing)
    }

    pub async fn search(
        &self,
        term: &str,
        mode: Option<&str>,
        confidence: Option<&str>,
    ) -> Result<SearchResults, QueryError> {
        let request = SearchRequest::parse(term, mode, confidence)?;

        let conn = self.pool.acquire().await?;
        let results = {
            let tables = conn.tables().await;
            search_interactions(&tables, &request)
        };

        tracing::debug!(
            term = %request.term,
            organism = request.organism_code.as_deref().unwrap_or("-"),
            mode = request.mode.as_str(),
            hits = results.interactions.len(),
            "interaction search"
        );
        Ok(results)
    }

    pub async fn reciprocal_report(&self) -> Result<ReciprocalReport, QueryError> {
        let conn = self.pool.acquire().await?;
        let report = reciprocal_report(&*conn.tables().await);
        if !report.is_consistent() {
            tracing::warn!(
                mismatches = report.mismatches.len(),
                "reciprocal consistency violations found"
            );
        }
        Ok(report)
    }
}
