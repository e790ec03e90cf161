//! Immutable snapshots and the builder that turns a fetched batch into one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mirror_core::{ConfigError, FieldExtractor, FieldValue};

use crate::group::{GroupIndex, GroupLookup};

/// Extractor handle shared between the cache and its builder.
pub type SharedExtractor<T> = Arc<dyn FieldExtractor<T>>;

/// Identifier table and grouping index produced by one refresh.
///
/// Both halves are built together and never mutated afterwards, so any
/// snapshot a reader holds is internally consistent.
pub struct Snapshot<T> {
    by_id: HashMap<String, Arc<T>>,
    groups: GroupIndex,
    generation: u64,
    fetched: usize,
    built_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    /// Placeholder served before the first successful refresh.
    pub fn empty(depth: usize) -> Self {
        Self {
            by_id: HashMap::new(),
            groups: GroupIndex::empty(depth),
            generation: 0,
            fetched: 0,
            built_at: Utc::now(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<T>> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Number of distinct identifiers.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Records returned by the fetch this snapshot was built from. Differs
    /// from [`len`](Self::len) only when the source repeats an identifier.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Identifiers in unspecified order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.by_id.keys().map(String::as_str)
    }

    /// Records in unspecified order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<T>> + '_ {
        self.by_id.values()
    }

    pub fn groups(&self) -> &GroupIndex {
        &self.groups
    }

    pub fn get_by_group<K: AsRef<str>>(&self, keys: &[K]) -> GroupLookup {
        self.groups.lookup(keys)
    }

    /// Successful swaps before and including this one; 0 for the placeholder.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// How long ago this snapshot was built.
    pub fn staleness(&self) -> Duration {
        let now = Utc::now();
        if now > self.built_at {
            (now - self.built_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }
}

impl<T> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("records", &self.by_id.len())
            .field("depth", &self.groups.depth())
            .field("generation", &self.generation)
            .field("built_at", &self.built_at)
            .finish()
    }
}

/// Builds snapshots from fetched batches using the configured identifier
/// field and grouping path.
pub struct SnapshotBuilder<T> {
    id_field: SharedExtractor<T>,
    path: Vec<SharedExtractor<T>>,
}

impl<T> SnapshotBuilder<T> {
    pub fn new(id_field: SharedExtractor<T>) -> Self {
        Self {
            id_field,
            path: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: Vec<SharedExtractor<T>>) -> Self {
        self.path = path;
        self
    }

    pub fn id_field(&self) -> &str {
        self.id_field.name()
    }

    /// Grouping field names, outermost first.
    pub fn path(&self) -> impl Iterator<Item = &str> + '_ {
        self.path.iter().map(|field| field.name())
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Reject empty field names before any record is looked at.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = std::iter::once(self.id_field.name()).chain(self.path());
        for name in names {
            if name.is_empty() {
                return Err(ConfigError::EmptyFieldName);
            }
        }
        Ok(())
    }

    /// Build a snapshot from `records`, in fetch order.
    ///
    /// Any unresolvable field aborts the whole build: a partial snapshot
    /// would leave the identifier table and the index disagreeing.
    pub fn build(&self, records: Vec<T>, generation: u64) -> Result<Snapshot<T>, ConfigError> {
        self.validate()?;

        let fetched = records.len();
        let mut by_id = HashMap::with_capacity(fetched);
        let mut groups = GroupIndex::empty(self.depth());
        let mut path_values: Vec<FieldValue> = Vec::with_capacity(self.depth());

        for record in records {
            let id = self.id_field.extract_id(&record)?;

            if !self.path.is_empty() {
                path_values.clear();
                for field in &self.path {
                    path_values.push(field.extract(&record)?);
                }
                groups.insert(&id, &path_values);
            }

            by_id.insert(id, Arc::new(record));
        }

        Ok(Snapshot {
            by_id,
            groups,
            generation,
            fetched,
            built_at: Utc::now(),
        })
    }
}

impl<T> Clone for SnapshotBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            id_field: Arc::clone(&self.id_field),
            path: self.path.clone(),
        }
    }
}

impl<T> fmt::Debug for SnapshotBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotBuilder")
            .field("id_field", &self.id_field.name())
            .field("path", &self.path().collect::<Vec<_>>())
            .finish()
    }
}
