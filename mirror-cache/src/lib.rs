//! Mirror Cache - Periodically Refreshed Collection Mirror
//!
//! Keeps a filtered copy of a remote collection in memory, replaced wholesale
//! on a fixed interval, and indexes it two ways:
//!
//! - by primary identifier, for point lookups
//! - by a configurable path of grouping fields, for "every record in
//!   region X, city Y" style queries
//!
//! Readers always see one complete snapshot; refreshes never block them.

pub mod cache;
pub mod config;
pub mod constants;
pub mod group;
pub mod metrics;
mod scheduler;
pub mod snapshot;

pub use cache::{Cache, RefreshOutcome};
pub use config::RefreshConfig;
pub use group::{GroupIndex, GroupLookup, GroupNode};
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};
pub use snapshot::{SharedExtractor, Snapshot, SnapshotBuilder};

// Re-export the record contracts so most users need a single dependency
pub use mirror_core::{
    ConfigError, DocumentFilter, FetchError, Fetcher, Field, FieldExtractor, FieldValue,
    InMemoryCollection, JsonField, MirrorError, MirrorResult,
};
