//! Mirror Test Utilities
//!
//! Shared test infrastructure for the mirror workspace:
//! - Record fixtures with ready-made fields
//! - A scripted fetcher whose responses and timing tests control
//! - Proptest generators for record batches
//! - Assertions for snapshot and index consistency

// Re-export core types for convenience
pub use mirror_cache::{
    Cache, GroupIndex, GroupLookup, RefreshConfig, RefreshOutcome, Snapshot, SnapshotBuilder,
};
pub use mirror_core::{
    ConfigError, DocumentFilter, FetchError, Fetcher, Field, FieldExtractor, FieldValue,
    InMemoryCollection, JsonField, MirrorError, MirrorResult,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Semaphore;

// ============================================================================
// RECORD TYPES
// ============================================================================

/// Record with a two-level location path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    pub id: String,
    pub region: String,
    pub city: String,
}

impl Place {
    pub fn new(id: impl Into<String>, region: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            city: city.into(),
        }
    }
}

/// Record with a list-valued field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tagged {
    pub id: String,
    pub tags: Vec<String>,
}

impl Tagged {
    pub fn new<I, S>(id: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// SCRIPTED FETCHER
// ============================================================================

/// Fetcher whose responses are set by the test.
///
/// Queued responses are served first, one per fetch, in order. Once the
/// queue is empty every fetch returns the steady response. A gated fetcher
/// additionally parks each fetch until the test calls [`release`].
///
/// [`release`]: ScriptedFetcher::release
pub struct ScriptedFetcher<T> {
    queued: Mutex<VecDeque<Result<Vec<T>, FetchError>>>,
    steady: Mutex<Result<Vec<T>, FetchError>>,
    gate: Option<Semaphore>,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl<T: Clone> ScriptedFetcher<T> {
    /// Always return `records`.
    pub fn new(records: Vec<T>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            steady: Mutex::new(Ok(records)),
            gate: None,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Return `records`, but hold every fetch until released.
    pub fn gated(records: Vec<T>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(records)
        }
    }

    /// Serve `records` on the next unscripted fetch.
    pub fn push_ok(&self, records: Vec<T>) -> &Self {
        self.queue().push_back(Ok(records));
        self
    }

    /// Fail the next unscripted fetch with `error`.
    pub fn push_err(&self, error: FetchError) -> &Self {
        self.queue().push_back(Err(error));
        self
    }

    /// Replace the steady response.
    pub fn set(&self, records: Vec<T>) {
        *self.steady.lock().unwrap_or_else(PoisonError::into_inner) = Ok(records);
    }

    /// Make every unscripted fetch fail.
    pub fn fail_with(&self, error: FetchError) {
        *self.steady.lock().unwrap_or_else(PoisonError::into_inner) = Err(error);
    }

    /// Let `n` parked (or future) fetches through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Fetches that have begun, including ones parked at the gate.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Fetches that have returned.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Yield until at least `n` fetches have begun.
    pub async fn wait_started(&self, n: usize) {
        while self.started() < n {
            tokio::task::yield_now().await;
        }
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<T>, FetchError>>> {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(&self) -> Result<Vec<T>, FetchError> {
        if let Some(response) = self.queue().pop_front() {
            return response;
        }
        self.steady
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<T> Fetcher for ScriptedFetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Record = T;
    type Filter = ();

    async fn fetch(&self, _filter: &()) -> Result<Vec<T>, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(FetchError::unavailable("scripted", "gate closed")),
            }
        }

        let response = self.next_response();
        self.completed.fetch_add(1, Ordering::SeqCst);
        response
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for record batches.
    //!
    //! Key spaces are kept small so batches regularly contain repeated
    //! identifiers and shared group keys.

    use super::*;
    use proptest::prelude::*;

    pub const REGIONS: &[&str] = &["EU", "US", "APAC"];
    pub const CITIES: &[&str] = &["Berlin", "Paris", "Boston", "Tokyo", "Lima"];
    pub const TAGS: &[&str] = &["a", "b", "c", "d"];

    /// Identifier drawn from a small space.
    pub fn arb_id() -> impl Strategy<Value = String> {
        (0u32..40).prop_map(|n| n.to_string())
    }

    pub fn arb_place() -> impl Strategy<Value = Place> {
        (
            arb_id(),
            prop::sample::select(REGIONS),
            prop::sample::select(CITIES),
        )
            .prop_map(|(id, region, city)| Place::new(id, region, city))
    }

    /// Tag lists may be empty and may repeat a tag.
    pub fn arb_tagged() -> impl Strategy<Value = Tagged> {
        (
            arb_id(),
            prop::collection::vec(prop::sample::select(TAGS), 0..5),
        )
            .prop_map(|(id, tags)| Tagged::new(id, tags))
    }

    pub fn arb_places(max: usize) -> impl Strategy<Value = Vec<Place>> {
        prop::collection::vec(arb_place(), 0..=max)
    }

    pub fn arb_tagged_batch(max: usize) -> impl Strategy<Value = Vec<Tagged>> {
        prop::collection::vec(arb_tagged(), 0..=max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and fields for common scenarios.

    use super::*;
    use serde_json::{json, Value};

    pub fn place_id() -> Field<Place> {
        Field::new("id", |p: &Place| p.id.clone())
    }

    /// `[region, city]`.
    pub fn region_city() -> Vec<Field<Place>> {
        vec![
            Field::new("region", |p: &Place| p.region.clone()),
            Field::new("city", |p: &Place| p.city.clone()),
        ]
    }

    /// A field no `Place` carries.
    pub fn missing_field() -> Field<Place> {
        Field::optional("population", |_: &Place| None)
    }

    pub fn tagged_id() -> Field<Tagged> {
        Field::new("id", |t: &Tagged| t.id.clone())
    }

    pub fn tags() -> Field<Tagged> {
        Field::new("tags", |t: &Tagged| t.tags.clone())
    }

    /// Three places across two regions.
    pub fn sample_places() -> Vec<Place> {
        vec![
            Place::new("1", "EU", "Berlin"),
            Place::new("2", "EU", "Paris"),
            Place::new("3", "US", "Boston"),
        ]
    }

    /// The same places as JSON documents, with an `active` flag on all but
    /// Boston.
    pub fn sample_documents() -> Vec<Value> {
        vec![
            json!({"id": "1", "active": true, "address": {"region": "EU", "city": "Berlin"}}),
            json!({"id": "2", "active": true, "address": {"region": "EU", "city": "Paris"}}),
            json!({"id": 3, "active": false, "address": {"region": "US", "city": "Boston"}}),
        ]
    }

    /// Collection pre-loaded with [`sample_documents`].
    pub fn sample_collection() -> InMemoryCollection {
        let collection = InMemoryCollection::new("places");
        collection.replace_all(sample_documents());
        collection
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for mirror results and snapshot consistency.

    use super::*;
    use std::fmt::Debug;

    /// Assert that a result is a configuration error.
    #[track_caller]
    pub fn assert_fatal<T: Debug>(result: &MirrorResult<T>) {
        match result {
            Err(e) if e.is_fatal() => {}
            other => panic!("Expected configuration error, got: {:?}", other),
        }
    }

    /// Assert that a result is a fetch error.
    #[track_caller]
    pub fn assert_fetch_error<T: Debug>(result: &MirrorResult<T>) {
        match result {
            Err(MirrorError::Fetch(_)) => {}
            other => panic!("Expected fetch error, got: {:?}", other),
        }
    }

    /// Every identifier filed anywhere in the index, in traversal order.
    pub fn leaf_ids(index: &GroupIndex) -> Vec<String> {
        fn walk(lookup: &GroupLookup, out: &mut Vec<String>) {
            if lookup.is_ids() {
                out.extend_from_slice(lookup.ids());
                return;
            }
            for key in lookup.keys() {
                walk(&lookup.child(key), out);
            }
        }

        let mut out = Vec::new();
        if index.depth() > 0 {
            walk(&index.lookup::<&str>(&[]), &mut out);
        }
        out
    }

    /// Assert that every identifier in the index resolves in the table.
    #[track_caller]
    pub fn assert_index_consistent<T>(snapshot: &Snapshot<T>) {
        for id in leaf_ids(snapshot.groups()) {
            assert!(
                snapshot.contains(&id),
                "Index references {} which is missing from the identifier table",
                id
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
