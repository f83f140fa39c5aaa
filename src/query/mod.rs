//! Faceted query engine: search, facet filter, range, flags, sort, paginate.
//!
//! The engine is a pure, synchronous transform from an in-memory collection
//! and a [`QuerySpec`] to a [`QueryResult`]. It owns no state between
//! evaluations; callers pass an immutable snapshot of their collection.
//!
//! # Pipeline
//!
//! ```text
//! term → facets → numeric range → boolean flags → sort → paginate
//! ```
//!
//! - Term: case-insensitive substring over the configured search fields; any
//!   field matching is enough. A blank term matches everything.
//! - Facets: AND across facets, OR within one facet. Empty selections are ignored.
//! - Range: inclusive on both bounds; a missing bound is unbounded.
//! - Flags: every active flag must hold; inactive flags are no-ops.
//! - Sort: stable; ties keep their post-filter order.
//! - Paginate: 1-based pages, at least one page even when nothing matched.
//!
//! # Example
//!
//! ```
//! use resource_kit::query::{FieldValue, QueryEngine, QuerySpec, Queryable, SortDirection};
//!
//! #[derive(Clone)]
//! struct Product { name: String, category: String, price: f64 }
//!
//! impl Queryable for Product {
//!     fn field(&self, name: &str) -> FieldValue<'_> {
//!         match name {
//!             "name" => FieldValue::text(&self.name),
//!             "category" => FieldValue::text(&self.category),
//!             "price" => FieldValue::Number(self.price),
//!             _ => FieldValue::Missing,
//!         }
//!     }
//! }
//!
//! let products = vec![
//!     Product { name: "Milk".into(), category: "dairy".into(), price: 1.2 },
//!     Product { name: "Brie".into(), category: "dairy".into(), price: 6.5 },
//!     Product { name: "Kale".into(), category: "produce".into(), price: 2.0 },
//! ];
//!
//! let engine = QueryEngine::new().search_in(["name"]);
//! let spec = QuerySpec::new()
//!     .select("category", "dairy")
//!     .sort_by("price", SortDirection::Desc);
//!
//! let result = engine.evaluate(&products, &spec);
//! assert_eq!(result.total_matched, 2);
//! assert_eq!(result.items[0].name, "Brie");
//! ```
//!
//! # Scaling
//!
//! Facet counts re-run the filter stages once per counted facet, so their cost
//! is O(facets × collection size). That is fine for UI-sized lists (hundreds
//! of rows) and is not optimized further.

mod engine;
mod result;
mod value;

pub use engine::QueryEngine;
pub use result::QueryResult;
pub use value::{FieldValue, Queryable};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Default page size for query specifications.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort key and direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        SortSpec {
            key: key.into(),
            direction,
        }
    }
}

/// Inclusive numeric window over one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub field: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        NumericRange {
            field: field.into(),
            min,
            max,
        }
    }

    /// A range with no bounds filters nothing.
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// The user's active query state for one collection view.
///
/// Owned and mutated by the view controller; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    pub term: String,
    pub facets: BTreeMap<String, BTreeSet<String>>,
    pub range: Option<NumericRange>,
    pub flags: BTreeMap<String, bool>,
    pub sort: Option<SortSpec>,
    /// 1-based; 0 is read as 1.
    pub page: usize,
    /// 0 is read as 1.
    pub page_size: usize,
}

impl Default for QuerySpec {
    fn default() -> Self {
        QuerySpec {
            term: String::new(),
            facets: BTreeMap::new(),
            range: None,
            flags: BTreeMap::new(),
            sort: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    /// Add one value to a facet's selection.
    pub fn select(mut self, facet: impl Into<String>, value: impl Into<String>) -> Self {
        self.facets
            .entry(facet.into())
            .or_default()
            .insert(value.into());
        self
    }

    pub fn select_all<I, V>(mut self, facet: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.facets
            .entry(facet.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Toggle one facet value in place, as a checkbox would.
    pub fn toggle(&mut self, facet: &str, value: &str) {
        let selection = self.facets.entry(facet.to_string()).or_default();
        if !selection.remove(value) {
            selection.insert(value.to_string());
        }
    }

    pub fn range(mut self, field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        self.range = Some(NumericRange::new(field, min, max));
        self
    }

    pub fn flag(mut self, name: impl Into<String>, active: bool) -> Self {
        self.flags.insert(name.into(), active);
        self
    }

    pub fn sort_by(mut self, key: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec::new(key, direction));
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Number of active filters: selected facet values, active flags, a
    /// bounded range and a non-blank term each count.
    pub fn active_filter_count(&self) -> usize {
        let facets: usize = self.facets.values().map(BTreeSet::len).sum();
        let flags = self.flags.values().filter(|active| **active).count();
        let range = self
            .range
            .as_ref()
            .map_or(0, |r| usize::from(!r.is_unbounded()));
        let term = usize::from(!self.term.trim().is_empty());
        facets + flags + range + term
    }

    /// Drop term, facet selections, range and flags. Sort and page size stay;
    /// the page goes back to 1.
    pub fn clear_filters(&mut self) {
        self.term.clear();
        self.facets.clear();
        self.range = None;
        self.flags.clear();
        self.page = 1;
    }
}
