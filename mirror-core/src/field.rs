//! Field values and the extraction capability used to read identifiers and
//! grouping keys off records.
//!
//! Every key the cache stores is a string. Extractors decide how a record's
//! field becomes one or more of those strings; the cache never inspects a
//! record itself.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The stringified value(s) of one field on one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar field.
    One(String),
    /// List-valued field, e.g. a tag list. Order is preserved.
    Many(Vec<String>),
}

impl FieldValue {
    pub fn one(value: impl ToString) -> Self {
        Self::One(value.to_string())
    }

    pub fn many<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Self::Many(values.into_iter().map(|v| v.to_string()).collect())
    }

    /// All values as a slice; a scalar is a one-element slice.
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True only for a list field with no elements.
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.as_slice().iter()
    }

    /// The single value, or `None` when the field holds zero or several.
    pub fn into_single(self) -> Option<String> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(mut values) if values.len() == 1 => values.pop(),
            Self::Many(_) => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::One(value.clone())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl From<&[String]> for FieldValue {
    fn from(values: &[String]) -> Self {
        Self::Many(values.to_vec())
    }
}

impl From<&Vec<String>> for FieldValue {
    fn from(values: &Vec<String>) -> Self {
        Self::Many(values.clone())
    }
}

macro_rules! field_value_from_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::One(value.to_string())
                }
            }
        )*
    };
}

field_value_from_display!(i32, i64, u32, u64, usize, bool, char);

/// Resolves a named field on a record of type `T`.
///
/// # Implementation Requirements
///
/// - `name()` must be stable for the lifetime of the extractor
/// - `extract()` must fail with [`ConfigError::UnresolvableField`] when the
///   field does not exist on the record shape, not when its value is empty
/// - Implementations must be `Send + Sync` so the refresh task can use them
pub trait FieldExtractor<T>: Send + Sync {
    /// Field name, used in errors and logs.
    fn name(&self) -> &str;

    /// Read the field's value(s) off `record`.
    fn extract(&self, record: &T) -> Result<FieldValue, ConfigError>;

    /// Read the field as a primary key. Identifiers must be single-valued.
    fn extract_id(&self, record: &T) -> Result<String, ConfigError> {
        let value = self.extract(record)?;
        let count = value.len();
        value.into_single().ok_or_else(|| ConfigError::MultiValuedId {
            field: self.name().to_string(),
            count,
        })
    }
}

impl<T, E> FieldExtractor<T> for Arc<E>
where
    E: FieldExtractor<T> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn extract(&self, record: &T) -> Result<FieldValue, ConfigError> {
        (**self).extract(record)
    }
}

type ExtractFn<T> = dyn Fn(&T) -> Option<FieldValue> + Send + Sync;

/// A named field backed by a caller-supplied accessor.
///
/// ```
/// use mirror_core::{Field, FieldExtractor, FieldValue};
///
/// struct City { id: u32, tags: Vec<String> }
///
/// let id = Field::new("id", |c: &City| c.id);
/// let tags = Field::new("tags", |c: &City| c.tags.clone());
///
/// let city = City { id: 7, tags: vec!["port".into()] };
/// assert_eq!(id.extract_id(&city).unwrap(), "7");
/// assert_eq!(tags.extract(&city).unwrap(), FieldValue::many(["port"]));
/// ```
pub struct Field<T> {
    name: Arc<str>,
    extract: Arc<ExtractFn<T>>,
}

impl<T> Field<T> {
    /// A field that always resolves.
    pub fn new<F, V>(name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<FieldValue>,
    {
        Self::optional(name, move |record| Some(accessor(record).into()))
    }

    /// A field that may be missing on some record variants. Returning `None`
    /// is reported as [`ConfigError::UnresolvableField`].
    pub fn optional<F>(name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> Option<FieldValue> + Send + Sync + 'static,
    {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            extract: Arc::new(accessor),
        }
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

impl<T> FieldExtractor<T> for Field<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, record: &T) -> Result<FieldValue, ConfigError> {
        (self.extract)(record).ok_or_else(|| ConfigError::UnresolvableField {
            field: self.name.to_string(),
        })
    }
}
