//! Request signatures, list parameters and operation keys.
//!
//! A [`RequestSignature`] is the cache key for one read. It is derived from
//! the operation name and the normalized parameters: keys sorted, values
//! stringified, multi-valued parameters sorted and flattened. Two logically
//! identical requests produce the same signature regardless of the order the
//! parameters were added in.

use crate::query::{SortDirection, SortSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// Default page for list requests.
pub const DEFAULT_PAGE: u32 = 1;
/// Default page size for list requests.
pub const DEFAULT_LIMIT: u32 = 10;

/// Value of one list filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// Values in canonical (sorted) order.
    pub fn canonical(&self) -> Vec<String> {
        match self {
            ParamValue::One(v) => vec![v.clone()],
            ParamValue::Many(vs) => {
                let mut sorted = vs.clone();
                sorted.sort();
                sorted
            }
        }
    }
}

/// Parameters of a `list` request: pagination, sort and free-form filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    pub sort: Option<SortSpec>,
    pub filters: BTreeMap<String, ParamValue>,
}

impl Default for ListParams {
    fn default() -> Self {
        ListParams {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort: None,
            filters: BTreeMap::new(),
        }
    }
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn sort_by(mut self, key: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec::new(key, direction));
        self
    }

    /// Add a single-valued filter. The value is stringified.
    pub fn filter(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.filters
            .insert(key.into(), ParamValue::One(value.to_string()));
        self
    }

    /// Add a multi-valued filter. Value order does not affect the signature.
    pub fn filter_many<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.filters.insert(key.into(), ParamValue::Many(values));
        self
    }

    /// Build from arbitrary key/value pairs, in any order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        pairs
            .into_iter()
            .fold(Self::default(), |params, (k, v)| params.filter(k, v))
    }

    /// Normalized parameters: sorted keys, stringified and sorted values.
    ///
    /// Multi-valued filters with no values are omitted. Reserved names
    /// (`page`, `limit`, `sortBy`, `sortOrder`) take precedence over filters
    /// with the same name.
    pub fn canonical_pairs(&self) -> BTreeMap<String, Vec<String>> {
        let mut pairs: BTreeMap<String, Vec<String>> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.canonical()))
            .filter(|(_, vs)| !vs.is_empty())
            .collect();

        pairs.insert("page".to_string(), vec![self.page.to_string()]);
        pairs.insert("limit".to_string(), vec![self.limit.to_string()]);
        if let Some(sort) = &self.sort {
            pairs.insert("sortBy".to_string(), vec![sort.key.clone()]);
            pairs.insert(
                "sortOrder".to_string(),
                vec![sort.direction.as_str().to_string()],
            );
        }
        pairs
    }

    /// Flattened `(key, value)` pairs, repeating keys of multi-valued filters.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.canonical_pairs()
            .into_iter()
            .flat_map(|(k, vs)| vs.into_iter().map(move |v| (k.clone(), v)))
            .collect()
    }
}

/// Canonical cache key for one read request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestSignature(String);

impl RequestSignature {
    /// Signature of a `list` call.
    pub fn list(params: &ListParams) -> Self {
        let encoded = params
            .canonical_pairs()
            .iter()
            .map(|(k, vs)| {
                let values: Vec<String> = vs.iter().map(|v| escape(v)).collect();
                format!("{}={}", escape(k), values.join(","))
            })
            .collect::<Vec<_>>()
            .join("&");
        RequestSignature(format!("list?{}", encoded))
    }

    /// Signature of a `getById` call: `getById_<id>`.
    pub fn get_by_id(id: &dyn Display) -> Self {
        RequestSignature(format!("getById_{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape the separators used by the signature encoding.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            ',' => out.push_str("%2C"),
            _ => out.push(c),
        }
    }
    out
}

/// Identifies one tracked logical operation, e.g. `list`, `getById_7`, `update_7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey(String);

impl OperationKey {
    pub fn new(key: impl Into<String>) -> Self {
        OperationKey(key.into())
    }

    pub fn list() -> Self {
        Self::new("list")
    }

    pub fn get_by_id(id: &dyn Display) -> Self {
        Self::new(format!("getById_{}", id))
    }

    pub fn create() -> Self {
        Self::new("create")
    }

    pub fn update(id: &dyn Display) -> Self {
        Self::new(format!("update_{}", id))
    }

    pub fn delete(id: &dyn Display) -> Self {
        Self::new(format!("delete_{}", id))
    }

    pub fn create_many() -> Self {
        Self::new("createMany")
    }

    pub fn update_many() -> Self {
        Self::new("updateMany")
    }

    pub fn delete_many() -> Self {
        Self::new("deleteMany")
    }

    pub fn export() -> Self {
        Self::new("export")
    }

    pub fn import() -> Self {
        Self::new("import")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationKey {
    fn from(key: &str) -> Self {
        OperationKey::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_ignores_insertion_order() {
        let a = ListParams::new()
            .filter("status", "active")
            .filter("supplier", "acme")
            .filter_many("category", ["dairy", "produce"]);
        let b = ListParams::new()
            .filter_many("category", ["produce", "dairy"])
            .filter("supplier", "acme")
            .filter("status", "active");

        assert_eq!(RequestSignature::list(&a), RequestSignature::list(&b));
    }

    #[test]
    fn test_signature_stringifies_values() {
        let numeric = ListParams::new().filter("minPrice", 10);
        let textual = ListParams::new().filter("minPrice", "10");
        assert_eq!(
            RequestSignature::list(&numeric),
            RequestSignature::list(&textual)
        );
    }

    #[test]
    fn test_signature_distinguishes_pages() {
        let first = ListParams::new().page(1);
        let second = ListParams::new().page(2);
        assert_ne!(
            RequestSignature::list(&first),
            RequestSignature::list(&second)
        );
    }

    #[test]
    fn test_signature_format() {
        let params = ListParams::new()
            .limit(20)
            .sort_by("name", SortDirection::Asc)
            .filter("q", "a&b");
        assert_eq!(
            RequestSignature::list(&params).as_str(),
            "list?limit=20&page=1&q=a%26b&sortBy=name&sortOrder=asc"
        );
    }

    #[test]
    fn test_separators_cannot_collide() {
        let joined = ListParams::new().filter("tag", "a,b");
        let split = ListParams::new().filter_many("tag", ["a", "b"]);
        assert_ne!(RequestSignature::list(&joined), RequestSignature::list(&split));
    }

    #[test]
    fn test_get_by_id_signature() {
        assert_eq!(RequestSignature::get_by_id(&7).as_str(), "getById_7");
    }

    #[test]
    fn test_query_pairs_repeat_multi_valued_keys() {
        let params = ListParams::new().filter_many("category", ["b", "a"]);
        let pairs = params.query_pairs();
        assert!(pairs.contains(&("category".to_string(), "a".to_string())));
        assert!(pairs.contains(&("category".to_string(), "b".to_string())));
        assert!(pairs.contains(&("page".to_string(), "1".to_string())));
    }

    #[test]
    fn test_operation_keys() {
        assert_eq!(OperationKey::list().as_str(), "list");
        assert_eq!(OperationKey::get_by_id(&"p-1").as_str(), "getById_p-1");
        assert_eq!(OperationKey::update(&7).to_string(), "update_7");
        assert_eq!(OperationKey::delete_many().as_str(), "deleteMany");
    }
}
