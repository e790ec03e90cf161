//! The mirror cache.
//!
//! A [`Cache`] holds the latest [`Snapshot`] of a remote collection and
//! replaces it wholesale on every successful refresh. Refreshing happens in
//! three phases:
//!
//! 1. fetch the filtered batch (no lock held, readers are never blocked)
//! 2. build the identifier table and grouping index off to the side
//! 3. swap the new snapshot in under the write lock
//!
//! Only one refresh runs at a time; a refresh requested while another is in
//! flight is skipped rather than queued.
//!
//! # Example
//!
//! ```ignore
//! let cache = Cache::new(collection, JsonField::new("id"))
//!     .query(DocumentFilter::new().eq("active", true))
//!     .group([JsonField::new("region"), JsonField::new("city")])
//!     .interval(Duration::from_secs(30))?
//!     .start()
//!     .await?;
//!
//! let berlin = cache.get_by_group(&["EU", "Berlin"]);
//! for id in berlin.ids() {
//!     println!("{:?}", cache.get(id));
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use mirror_core::{ConfigError, Fetcher, FieldExtractor, MirrorResult};
use tokio::sync::watch;

use crate::config::RefreshConfig;
use crate::group::GroupLookup;
use crate::metrics::{RefreshMetrics, RefreshMetricsSnapshot};
use crate::scheduler;
use crate::snapshot::{SharedExtractor, Snapshot, SnapshotBuilder};

/// What a call to [`Cache::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was swapped in.
    Refreshed { records: usize, generation: u64 },
    /// Another refresh was in flight; nothing was fetched.
    Skipped,
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed { .. })
    }
}

/// Holds the in-flight flag for the duration of one refresh. Released on
/// drop, including when the build panics.
struct RefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RefreshGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Holds the running flag while `run` performs its first refresh. Unless
/// disarmed, dropping it (error, panic or cancellation) clears the flag,
/// provided no `stop`/`run` cycle happened in between.
struct StartGuard<'a> {
    running: &'a AtomicBool,
    run_epoch: &'a watch::Sender<u64>,
    epoch: u64,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed && *self.run_epoch.borrow() == self.epoch {
            self.running.store(false, Ordering::Release);
        }
    }
}

/// In-process mirror of a filtered remote collection.
///
/// Configure with the builder methods, then share it behind an [`Arc`] and
/// call [`run`](Cache::run) (or use [`start`](Cache::start) to do both).
/// Once shared, the configuration can no longer change.
pub struct Cache<F: Fetcher> {
    fetcher: F,
    filter: F::Filter,
    builder: SnapshotBuilder<F::Record>,
    config: RefreshConfig,
    current: RwLock<Arc<Snapshot<F::Record>>>,
    refreshing: AtomicBool,
    running: AtomicBool,
    generation: AtomicU64,
    /// Bumped by `stop`; a scheduler exits once the value moves past the
    /// epoch it was started with.
    run_epoch: watch::Sender<u64>,
    metrics: RefreshMetrics,
}

impl<F: Fetcher> Cache<F> {
    /// Create a cache over `fetcher`, keyed by `id_field`, with the default
    /// interval, the default (match-all) filter and no grouping.
    pub fn new(fetcher: F, id_field: impl FieldExtractor<F::Record> + 'static) -> Self {
        Self::from_parts(fetcher, Arc::new(id_field), RefreshConfig::default())
    }

    /// Create a cache using an explicit refresh configuration.
    pub fn with_config(
        fetcher: F,
        id_field: impl FieldExtractor<F::Record> + 'static,
        config: RefreshConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(fetcher, Arc::new(id_field), config))
    }

    fn from_parts(
        fetcher: F,
        id_field: SharedExtractor<F::Record>,
        config: RefreshConfig,
    ) -> Self {
        let (run_epoch, _) = watch::channel(0);
        Self {
            fetcher,
            filter: F::Filter::default(),
            builder: SnapshotBuilder::new(id_field),
            config,
            current: RwLock::new(Arc::new(Snapshot::empty(0))),
            refreshing: AtomicBool::new(false),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            run_epoch,
            metrics: RefreshMetrics::new(),
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Set the filter used for every fetch.
    pub fn query(mut self, filter: F::Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the grouping path, outermost field first. An empty path disables
    /// the grouping index.
    ///
    /// Any data already loaded is discarded and the generation counter
    /// restarts from 0.
    pub fn group<I, E>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: FieldExtractor<F::Record> + 'static,
    {
        let path: Vec<SharedExtractor<F::Record>> = fields
            .into_iter()
            .map(|field| Arc::new(field) as SharedExtractor<F::Record>)
            .collect();
        self.builder = self.builder.with_path(path);
        let placeholder = Arc::new(Snapshot::empty(self.builder.depth()));
        *self
            .current
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = placeholder;
        *self.generation.get_mut() = 0;
        self
    }

    /// Set the refresh period. Zero is rejected.
    pub fn interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval);
        }
        self.config.interval = interval;
        Ok(self)
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn filter(&self) -> &F::Filter {
        &self.filter
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn id_field(&self) -> &str {
        self.builder.id_field()
    }

    /// Grouping field names, outermost first.
    pub fn group_path(&self) -> Vec<&str> {
        self.builder.path().collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Share the cache and [`run`](Cache::run) it.
    pub async fn start(self) -> MirrorResult<Arc<Self>> {
        Arc::new(self).run().await
    }

    /// Start refreshing. Idempotent: calling it on a running cache does
    /// nothing.
    ///
    /// Performs one refresh before returning, then ticks in the background
    /// at the configured interval until [`stop`](Cache::stop) is called or
    /// the last handle to the cache is dropped. A configuration error on
    /// that first refresh is returned and the cache is left stopped, as it is
    /// when that refresh panics or `run` is cancelled; a fetch error is
    /// logged and the cache starts with an empty snapshot.
    pub async fn run(self: &Arc<Self>) -> MirrorResult<Arc<Self>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(Arc::clone(self));
        }

        let epoch = *self.run_epoch.borrow();
        let guard = StartGuard {
            running: &self.running,
            run_epoch: &self.run_epoch,
            epoch,
            armed: true,
        };

        if let Err(e) = self.update().await {
            if e.is_fatal() {
                return Err(e);
            }
        }

        // stop() may have raced the first refresh
        if !self.is_running() || *self.run_epoch.borrow() != epoch {
            return Ok(Arc::clone(self));
        }
        guard.disarm();

        tokio::spawn(scheduler::refresh_loop(
            Arc::downgrade(self),
            self.config.interval,
            epoch,
            self.run_epoch.subscribe(),
        ));

        Ok(Arc::clone(self))
    }

    /// Stop the background loop. Takes effect at the next tick; a refresh
    /// already in flight completes normally.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.run_epoch.send_modify(|epoch| *epoch += 1);
            tracing::info!(id_field = self.id_field(), "Mirror cache stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether a refresh is in flight right now.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Run one refresh cycle.
    ///
    /// Returns [`RefreshOutcome::Skipped`] without fetching if another cycle
    /// is in flight. On error the current snapshot is left untouched.
    pub async fn update(&self) -> MirrorResult<RefreshOutcome> {
        let Some(_guard) = RefreshGuard::try_acquire(&self.refreshing) else {
            self.metrics.record_skip();
            tracing::trace!("Refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped);
        };

        let started = Instant::now();

        let records = match self.fetcher.fetch(&self.filter).await {
            Ok(records) => records,
            Err(e) => {
                self.metrics.record_fetch_error();
                tracing::warn!(error = %e, "Fetch failed, keeping previous snapshot");
                return Err(e.into());
            }
        };

        let fetched = records.len();
        let generation = self.generation.load(Ordering::Acquire) + 1;

        let snapshot = match self.builder.build(records, generation) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.record_config_error();
                tracing::error!(
                    error = %e,
                    id_field = self.builder.id_field(),
                    "Snapshot build failed, keeping previous snapshot"
                );
                return Err(e.into());
            }
        };

        if snapshot.len() < fetched {
            tracing::warn!(
                fetched,
                distinct = snapshot.len(),
                "Source returned duplicate identifiers"
            );
        }

        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        self.generation.store(generation, Ordering::Release);
        self.metrics.record_refresh(fetched);

        tracing::debug!(
            records = fetched,
            generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Snapshot swapped"
        );

        Ok(RefreshOutcome::Refreshed {
            records: fetched,
            generation,
        })
    }

    /// One tick of the background loop.
    pub(crate) async fn scheduled_update(&self) {
        if let Err(e) = self.update().await {
            if e.is_fatal() && self.config.stop_on_config_error {
                tracing::error!(error = %e, "Stopping refresh loop after configuration error");
                self.stop();
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The current snapshot. Holding it pins that version; later refreshes
    /// do not affect it.
    pub fn snapshot(&self) -> Arc<Snapshot<F::Record>> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// Record with identifier `id`, or `None`. Any displayable key works, so
    /// `get(3)` finds a record whose numeric identifier stringified to `"3"`.
    pub fn get(&self, id: impl ToString) -> Option<Arc<F::Record>> {
        self.snapshot().get(&id.to_string()).cloned()
    }

    /// Record with identifier `id`, or the record type's default value.
    pub fn get_or_default(&self, id: impl ToString) -> F::Record
    where
        F::Record: Default + Clone,
    {
        self.get(id)
            .map(|record| (*record).clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Navigate the grouping index. See [`GroupIndex::lookup`](crate::GroupIndex::lookup).
    pub fn get_by_group<K: ToString>(&self, keys: &[K]) -> GroupLookup {
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        self.snapshot().get_by_group(&keys)
    }

    /// Generation of the current snapshot; 0 until the first refresh.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<F: Fetcher> fmt::Debug for Cache<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("id_field", &self.builder.id_field())
            .field("group_path", &self.group_path())
            .field("interval", &self.config.interval)
            .field("running", &self.is_running())
            .field("generation", &self.generation())
            .finish()
    }
}
