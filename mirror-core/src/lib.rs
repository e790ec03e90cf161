//! Mirror Core - Record Contracts
//!
//! The interface the cache needs from the outside world: a [`Fetcher`] that
//! returns filtered batches, [`FieldExtractor`]s that turn record fields into
//! string keys, and the error taxonomy shared by every mirror crate.
//!
//! JSON documents are supported out of the box through [`JsonField`],
//! [`DocumentFilter`] and [`InMemoryCollection`].

pub mod document;
pub mod error;
pub mod fetcher;
pub mod field;

pub use document::{DocumentFilter, InMemoryCollection, JsonField};
pub use error::{ConfigError, FetchError, MirrorError, MirrorResult};
pub use fetcher::Fetcher;
pub use field::{Field, FieldExtractor, FieldValue};
