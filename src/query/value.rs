use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::cmp::Ordering;

/// A field value as seen by the query engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(Cow<'a, str>),
    Number(f64),
    Date(DateTime<Utc>),
    Bool(bool),
    /// Multi-valued field, e.g. tags. Each element is its own facet value.
    List(Vec<Cow<'a, str>>),
    Missing,
}

impl<'a> FieldValue<'a> {
    pub fn text(value: &'a str) -> Self {
        FieldValue::Text(Cow::Borrowed(value))
    }

    pub fn owned(value: impl Into<String>) -> Self {
        FieldValue::Text(Cow::Owned(value.into()))
    }

    pub fn list<I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        FieldValue::List(values.into_iter().map(|v| Cow::Borrowed(v.as_str())).collect())
    }

    /// Optional fields map `None` to [`FieldValue::Missing`].
    pub fn optional<T>(value: Option<T>, f: impl FnOnce(T) -> FieldValue<'a>) -> Self {
        value.map_or(FieldValue::Missing, f)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Values this field contributes to facet matching and counting.
    pub(crate) fn facet_keys(&self) -> Vec<String> {
        match self {
            FieldValue::Text(s) => vec![s.to_string()],
            FieldValue::Number(n) => vec![n.to_string()],
            FieldValue::Date(d) => vec![d.to_rfc3339()],
            FieldValue::Bool(b) => vec![b.to_string()],
            FieldValue::List(items) => items.iter().map(|s| s.to_string()).collect(),
            FieldValue::Missing => Vec::new(),
        }
    }

    /// Whether any textual part contains `needle`, which must be lowercase.
    pub(crate) fn contains_lowercase(&self, needle: &str) -> bool {
        match self {
            FieldValue::Text(s) => s.to_lowercase().contains(needle),
            FieldValue::List(items) => items.iter().any(|s| s.to_lowercase().contains(needle)),
            FieldValue::Number(n) => n.to_string().contains(needle),
            FieldValue::Date(_) | FieldValue::Bool(_) | FieldValue::Missing => false,
        }
    }

    /// Ascending order between two present values. Text compares
    /// case-insensitively, so strings differing only in case are ties.
    /// Mismatched variants also compare equal; the stable sort keeps the
    /// relative order of ties.
    pub(crate) fn compare(&self, other: &FieldValue<'_>) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => {
                a.to_lowercase().cmp(&b.to_lowercase())
            }
            (FieldValue::Number(a), FieldValue::Number(b)) => a.total_cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::List(a), FieldValue::List(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Exposes named fields of a record to the query engine.
///
/// Unknown names return [`FieldValue::Missing`].
pub trait Queryable {
    fn field(&self, name: &str) -> FieldValue<'_>;
}
