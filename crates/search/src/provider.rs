use async_trait::async_trait;
use thiserror::Error;

use routewatch_core::EvidenceItem;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search gateway returned status {status}: {body}")]
    Gateway { status: u16, body: String },
}

/// A source of regulatory evidence for a single query string. Implementations
/// must be safe to call concurrently; the gatherer fans out over one instance.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<EvidenceItem>, SearchError>;
}
