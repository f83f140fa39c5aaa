use super::result::QueryResult;
use super::value::{FieldValue, Queryable};
use super::{NumericRange, QuerySpec, SortDirection, SortSpec};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

type FlagPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Evaluates [`QuerySpec`]s over collections of `T`.
///
/// Configured once per collection type: which fields the term searches, named
/// flag predicates, and which facets to count. Evaluation takes `&self` and
/// never mutates the engine or its input.
pub struct QueryEngine<T> {
    search_fields: Vec<String>,
    flags: BTreeMap<String, FlagPredicate<T>>,
    counted_facets: Vec<String>,
}

impl<T> Clone for QueryEngine<T> {
    fn clone(&self) -> Self {
        QueryEngine {
            search_fields: self.search_fields.clone(),
            flags: self.flags.clone(),
            counted_facets: self.counted_facets.clone(),
        }
    }
}

impl<T> fmt::Debug for QueryEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("search_fields", &self.search_fields)
            .field("flags", &self.flags.keys().collect::<Vec<_>>())
            .field("counted_facets", &self.counted_facets)
            .finish()
    }
}

impl<T> Default for QueryEngine<T> {
    fn default() -> Self {
        QueryEngine {
            search_fields: Vec::new(),
            flags: BTreeMap::new(),
            counted_facets: Vec::new(),
        }
    }
}

impl<T: Queryable + Clone> QueryEngine<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields the free-text term is matched against.
    pub fn search_in<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Register a named flag predicate, e.g. `"inStock"`.
    ///
    /// Active flags without a registered predicate fall back to the boolean
    /// field of the same name; items where that field is missing are excluded.
    pub fn flag<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.flags.insert(name.into(), Arc::new(predicate));
        self
    }

    /// Facets to include in [`QueryResult::facet_counts`]. Facets with an
    /// active selection are counted too.
    pub fn count_facets<I, S>(mut self, facets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counted_facets = facets.into_iter().map(Into::into).collect();
        self
    }

    /// Run the full pipeline over `items`.
    pub fn evaluate(&self, items: &[T], spec: &QuerySpec) -> QueryResult<T> {
        let filter = Filter::new(spec);

        let mut matched: Vec<&T> = items
            .iter()
            .filter(|item| self.passes(*item, &filter, None))
            .collect();

        if let Some(sort) = &spec.sort {
            sort_stable(&mut matched, sort);
        }

        let total_matched = matched.len();
        let page = spec.page.max(1);
        let page_size = spec.page_size.max(1);
        let total_pages = total_matched.div_ceil(page_size).max(1);

        let page_items: Vec<T> = (page - 1)
            .checked_mul(page_size)
            .filter(|start| *start < total_matched)
            .map(|start| {
                matched[start..]
                    .iter()
                    .take(page_size)
                    .map(|item| (*item).clone())
                    .collect()
            })
            .unwrap_or_default();

        let facet_counts = self.facet_counts(items, spec, &filter);

        trace!(
            "Query evaluated: {} of {} matched, page {}/{}",
            total_matched,
            items.len(),
            page,
            total_pages
        );

        QueryResult {
            items: page_items,
            total_matched,
            total_pages,
            page,
            page_size,
            facet_counts,
        }
    }

    /// Count only, skipping sort and pagination.
    pub fn count(&self, items: &[T], spec: &QuerySpec) -> usize {
        let filter = Filter::new(spec);
        items
            .iter()
            .filter(|item| self.passes(*item, &filter, None))
            .count()
    }

    /// Term, facet, range and flag stages. `skip_facet` drops one facet's own
    /// selection, as facet counting requires.
    fn passes(&self, item: &T, filter: &Filter<'_>, skip_facet: Option<&str>) -> bool {
        self.matches_term(item, filter)
            && filter
                .facets
                .iter()
                .filter(|(facet, _)| skip_facet != Some(facet.as_str()))
                .all(|(facet, selected)| matches_facet(item, facet, selected))
            && filter.range.map_or(true, |range| {
                item.field(&range.field)
                    .as_number()
                    .is_some_and(|value| range.contains(value))
            })
            && filter.active_flags.iter().all(|name| self.flag_holds(item, name))
    }

    fn matches_term(&self, item: &T, filter: &Filter<'_>) -> bool {
        match &filter.term {
            None => true,
            Some(needle) => self
                .search_fields
                .iter()
                .any(|field| item.field(field).contains_lowercase(needle)),
        }
    }

    fn flag_holds(&self, item: &T, name: &str) -> bool {
        match self.flags.get(name) {
            Some(predicate) => predicate(item),
            None => item.field(name).as_bool().unwrap_or(false),
        }
    }

    fn facet_counts(
        &self,
        items: &[T],
        spec: &QuerySpec,
        filter: &Filter<'_>,
    ) -> Option<BTreeMap<String, BTreeMap<String, usize>>> {
        if self.counted_facets.is_empty() {
            return None;
        }

        let facets: BTreeSet<&str> = self
            .counted_facets
            .iter()
            .map(String::as_str)
            .chain(filter.facets.iter().map(|(facet, _)| facet.as_str()))
            .collect();

        let counts = facets
            .into_iter()
            .map(|facet| {
                let mut values: BTreeMap<String, usize> = BTreeMap::new();
                for item in items
                    .iter()
                    .filter(|item| self.passes(*item, filter, Some(facet)))
                {
                    let keys: BTreeSet<String> =
                        item.field(facet).facet_keys().into_iter().collect();
                    for key in keys {
                        *values.entry(key).or_insert(0) += 1;
                    }
                }
                // Selected values stay visible with a zero badge.
                if let Some(selected) = spec.facets.get(facet) {
                    for value in selected {
                        values.entry(value.clone()).or_insert(0);
                    }
                }
                (facet.to_string(), values)
            })
            .collect();

        Some(counts)
    }
}

/// A [`QuerySpec`] with inactive parts stripped.
struct Filter<'a> {
    term: Option<String>,
    facets: Vec<(&'a String, &'a BTreeSet<String>)>,
    range: Option<&'a NumericRange>,
    active_flags: Vec<&'a str>,
}

impl<'a> Filter<'a> {
    fn new(spec: &'a QuerySpec) -> Self {
        let term = spec.term.trim();
        Filter {
            term: (!term.is_empty()).then(|| term.to_lowercase()),
            facets: spec
                .facets
                .iter()
                .filter(|(_, selected)| !selected.is_empty())
                .collect(),
            range: spec.range.as_ref().filter(|range| !range.is_unbounded()),
            active_flags: spec
                .flags
                .iter()
                .filter(|(_, active)| **active)
                .map(|(name, _)| name.as_str())
                .collect(),
        }
    }
}

fn matches_facet<T: Queryable>(item: &T, facet: &str, selected: &BTreeSet<String>) -> bool {
    item.field(facet)
        .facet_keys()
        .iter()
        .any(|key| selected.contains(key))
}

/// Stable sort; missing values go last in either direction.
fn sort_stable<T: Queryable>(items: &mut [&T], sort: &SortSpec) {
    items.sort_by(|a, b| {
        let left = a.field(&sort.key);
        let right = b.field(&sort.key);
        compare_for_sort(&left, &right, sort.direction)
    });
}

fn compare_for_sort(left: &FieldValue<'_>, right: &FieldValue<'_>, direction: SortDirection) -> Ordering {
    match (left.is_missing(), right.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = left.compare(right);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}
