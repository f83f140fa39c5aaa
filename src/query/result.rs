use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// One page of an evaluated query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult<T> {
    /// Items on the requested page, in sorted order.
    pub items: Vec<T>,
    /// Items that passed every filter, across all pages.
    pub total_matched: usize,
    /// `max(1, ceil(total_matched / page_size))`.
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
    /// Per facet, per value: how many items would match if that value were
    /// selected, given every other active filter. Only set when the engine
    /// was configured to count facets.
    pub facet_counts: Option<BTreeMap<String, BTreeMap<String, usize>>>,
}

impl<T> QueryResult<T> {
    pub fn is_empty(&self) -> bool {
        self.total_matched == 0
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Page numbers to render in a pager, at most `max_visible` of them,
    /// centered on the current page where possible.
    pub fn page_window(&self, max_visible: usize) -> RangeInclusive<usize> {
        let total = self.total_pages.max(1);
        let visible = max_visible.max(1).min(total);
        let half = visible / 2;
        let start = self
            .page
            .saturating_sub(half)
            .max(1)
            .min(total + 1 - visible);
        start..=start + visible - 1
    }

    pub fn facet_count(&self, facet: &str, value: &str) -> usize {
        self.facet_counts
            .as_ref()
            .and_then(|counts| counts.get(facet))
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(page: usize, total_pages: usize) -> QueryResult<()> {
        QueryResult {
            items: Vec::new(),
            total_matched: total_pages * 10,
            total_pages,
            page,
            page_size: 10,
            facet_counts: None,
        }
    }

    #[test]
    fn test_navigation() {
        assert!(!result(1, 1).has_next());
        assert!(!result(1, 1).has_prev());
        assert!(result(2, 3).has_next());
        assert!(result(2, 3).has_prev());
        assert!(!result(5, 3).has_next());
    }

    #[test]
    fn test_page_window() {
        assert_eq!(result(1, 10).page_window(5), 1..=5);
        assert_eq!(result(6, 10).page_window(5), 4..=8);
        assert_eq!(result(10, 10).page_window(5), 6..=10);
        assert_eq!(result(2, 3).page_window(5), 1..=3);
        assert_eq!(result(1, 1).page_window(0), 1..=1);
    }

    #[test]
    fn test_page_window_past_last_page() {
        assert_eq!(result(12, 10).page_window(3), 8..=10);
    }
}
