//! Fetcher trait for retrieving a filtered batch from the remote source.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FetchError;

/// Retrieves every record matching a filter from the mirrored collection.
///
/// This trait abstracts over the actual remote store, allowing the cache to
/// mirror any backend that supports filtered retrieval.
///
/// # Implementation Requirements
///
/// - Records must come back in a stable, deterministic order for a given
///   filter and underlying data; grouping leaves inherit that order
/// - Failures should be reported as [`FetchError`], never by panicking; the
///   cache keeps serving its previous snapshot and retries on the next tick
/// - Cancellation of a slow call is the implementation's responsibility
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Record type produced by this source.
    type Record: Send + Sync + 'static;

    /// Filter understood by this source. `Default` must select everything.
    type Filter: Default + Clone + Send + Sync + 'static;

    /// Fetch all records matching `filter`.
    async fn fetch(&self, filter: &Self::Filter) -> Result<Vec<Self::Record>, FetchError>;
}

#[async_trait]
impl<F: Fetcher> Fetcher for Arc<F> {
    type Record = F::Record;
    type Filter = F::Filter;

    async fn fetch(&self, filter: &Self::Filter) -> Result<Vec<Self::Record>, FetchError> {
        (**self).fetch(filter).await
    }
}
