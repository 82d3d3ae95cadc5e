//! Query features driven by request parameters
//!
//! [`RequestParams`] is the untrusted query-string mapping; [`QueryFeatures`]
//! turns it into a refined [`Query`]. Apply the steps in the order
//! filter, sort, limit_fields, paginate for deterministic pages.
//!
//! # Example
//!
//! ```rust
//! use tourbook::features::RequestParams;
//!
//! let params = RequestParams::from_pairs(
//!     [("price[gte]", "100"), ("sort", "price"), ("sort", "-price")],
//!     &["price"],
//! );
//! assert_eq!(params.get("sort"), Some("-price"));
//! ```

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::Result;
use crate::model::Query;
use crate::store::{Document, Filter, Op, Projection, SortKey, VERSION_FIELD};

/// Keys that control the query rather than filter it
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "field"];

/// Keys that may repeat; repeated values become a membership filter
pub const DEFAULT_WHITELIST: [&str; 6] = [
    "duration",
    "ratingsQuantity",
    "ratingsAverage",
    "maxGroupSize",
    "difficulty",
    "price",
];

/// Page used when `page` is missing or not a positive integer
pub const DEFAULT_PAGE: usize = 1;

/// Page size used when `limit` is missing or not a positive integer
pub const DEFAULT_LIMIT: usize = 100;

/// Default sort: newest first
pub const DEFAULT_SORT: &str = "-createdAt";

static BRACKET_OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\[(gte|gt|lte|lt)\]$").expect("valid operator regex"));

/// One request parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Single value
    One(String),
    /// Repeated whitelisted key
    Many(Vec<String>),
}

impl ParamValue {
    /// The last supplied value
    pub fn last(&self) -> &str {
        match self {
            Self::One(v) => v,
            Self::Many(values) => values.last().map(String::as_str).unwrap_or_default(),
        }
    }
}

/// Flat mapping of query-string keys to values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    entries: BTreeMap<String, ParamValue>,
}

impl RequestParams {
    /// Build from raw pairs, collapsing repeated keys
    ///
    /// A repeated key keeps its last value unless it is in `whitelist`, in
    /// which case every value is kept. Keys carrying `$` are dropped.
    pub fn from_pairs<I, K, V>(pairs: I, whitelist: &[&str]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: BTreeMap<String, ParamValue> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            if key.contains('$') {
                tracing::debug!(key = %key, "Dropping operator-like query key");
                continue;
            }
            let repeatable = whitelist.contains(&key.as_str());
            match entries.get_mut(&key) {
                Some(ParamValue::Many(values)) => values.push(value),
                Some(existing) => {
                    *existing = if repeatable {
                        ParamValue::Many(vec![existing.last().to_string(), value])
                    } else {
                        ParamValue::One(value)
                    };
                }
                None => {
                    entries.insert(key, ParamValue::One(value));
                }
            }
        }
        Self { entries }
    }

    /// Last value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(ParamValue::last)
    }

    /// Set a single value, replacing what was there
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), ParamValue::One(value.into()));
    }

    /// Remove `key`
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.entries.remove(key)
    }

    /// All entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether no parameters were supplied
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `price[gte]` or `priceGte` into field and operator name
fn split_operator(key: &str) -> (&str, Option<&'static str>) {
    if let Some(caps) = BRACKET_OPERATOR.captures(key) {
        if let (Some(field), Some(op)) = (caps.get(1), caps.get(2)) {
            let op = match op.as_str() {
                "gte" => "gte",
                "gt" => "gt",
                "lte" => "lte",
                _ => "lt",
            };
            return (&key[field.range()], Some(op));
        }
    }
    for (suffix, op) in [("Gte", "gte"), ("Lte", "lte"), ("Gt", "gt"), ("Lt", "lt")] {
        if let Some(field) = key.strip_suffix(suffix) {
            if !field.is_empty() {
                return (field, Some(op));
            }
        }
    }
    (key, None)
}

fn positive(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}

/// Refines a [`Query`] from request parameters
#[derive(Debug, Clone)]
pub struct QueryFeatures<'db> {
    query: Query<'db>,
    params: RequestParams,
}

impl<'db> QueryFeatures<'db> {
    /// Wrap a pending query and the request's parameters
    pub fn new(query: Query<'db>, params: RequestParams) -> Self {
        Self { query, params }
    }

    /// Apply every non-reserved parameter as an equality or range condition
    ///
    /// Values stay strings here; the entity schema casts them at execution.
    pub fn filter(mut self) -> Self {
        let mut filter = Filter::new();
        for (key, value) in self.params.iter() {
            if RESERVED_KEYS.contains(&key) {
                continue;
            }
            let (field, operator) = split_operator(key);
            let text = || Value::String(value.last().to_string());
            let op = match (operator, value) {
                (Some("gte"), _) => Op::Gte(text()),
                (Some("gt"), _) => Op::Gt(text()),
                (Some("lte"), _) => Op::Lte(text()),
                (Some(_), _) => Op::Lt(text()),
                (None, ParamValue::Many(values)) => {
                    Op::In(values.iter().cloned().map(Value::String).collect())
                }
                (None, ParamValue::One(v)) => Op::Eq(Value::String(v.clone())),
            };
            filter = filter.and(field, op);
        }
        self.query = self.query.filter(filter);
        self
    }

    /// Sort by the comma-separated `sort` list, newest first by default
    pub fn sort(mut self) -> Self {
        let raw = self.params.get("sort").unwrap_or(DEFAULT_SORT);
        let mut keys: Vec<SortKey> = raw.split(',').filter_map(SortKey::parse).collect();
        if keys.is_empty() {
            keys.extend(SortKey::parse(DEFAULT_SORT));
        }
        self.query = self.query.sort(keys);
        self
    }

    /// Project the comma-separated `field` list
    ///
    /// A list of only `-field` entries excludes them; otherwise the plain
    /// entries form an include list. Without `field` the version is excluded.
    pub fn limit_fields(mut self) -> Self {
        let projection = match self.params.get("field") {
            Some(raw) => {
                let tokens: Vec<&str> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty() && *t != "-")
                    .collect();
                let include: Vec<String> = tokens
                    .iter()
                    .filter(|t| !t.starts_with('-'))
                    .map(|t| t.to_string())
                    .collect();
                if !include.is_empty() {
                    Projection::Include(include)
                } else if tokens.is_empty() {
                    Projection::Exclude(vec![VERSION_FIELD.to_string()])
                } else {
                    let mut exclude: Vec<String> =
                        tokens.iter().map(|t| t[1..].to_string()).collect();
                    exclude.push(VERSION_FIELD.to_string());
                    Projection::Exclude(exclude)
                }
            }
            None => Projection::Exclude(vec![VERSION_FIELD.to_string()]),
        };
        self.query = self.query.select(projection);
        self
    }

    /// Skip `(page - 1) * limit` records and return at most `limit`
    pub fn paginate(mut self) -> Self {
        let page = self.page();
        let limit = self.limit();
        self.query = self.query.skip((page - 1).saturating_mul(limit)).limit(limit);
        self
    }

    /// Requested page, defaulting to 1
    pub fn page(&self) -> usize {
        positive(self.params.get("page"), DEFAULT_PAGE)
    }

    /// Requested page size, defaulting to 100
    pub fn limit(&self) -> usize {
        positive(self.params.get("limit"), DEFAULT_LIMIT)
    }

    /// The refined query
    pub fn into_query(self) -> Query<'db> {
        self.query
    }

    /// Execute the refined query
    pub async fn exec(self) -> Result<Vec<Document>> {
        self.query.exec().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Database, EntityDescriptor, FieldSchema, Schema};
    use crate::store::{MemoryStore, SortDirection};
    use serde_json::json;
    use std::sync::Arc;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::from_pairs(pairs.iter().copied(), &DEFAULT_WHITELIST)
    }

    async fn catalog() -> Database {
        let items = EntityDescriptor::new(
            "Item",
            "items",
            Schema::new()
                .field("name", FieldSchema::string())
                .field("price", FieldSchema::number())
                .field("difficulty", FieldSchema::string())
                .field("secret", FieldSchema::boolean().default_value(false))
                .field("createdAt", FieldSchema::date().default_now()),
        )
        .visible_when(Filter::new().and("secret", Op::Ne(json!(true))));
        let db = Database::builder(Arc::new(MemoryStore::new()))
            .register(items)
            .build()
            .await
            .unwrap();

        let model = db.model("Item").unwrap();
        for (i, price) in [50, 100, 150, 200, 250, 300, 350].iter().enumerate() {
            let difficulty = if i % 2 == 0 { "easy" } else { "difficult" };
            model
                .create(
                    json!({"name": format!("item-{}", i), "price": price, "difficulty": difficulty})
                        .as_object()
                        .cloned()
                        .unwrap(),
                )
                .await
                .unwrap();
        }
        model
            .create(json!({"name": "hidden", "price": 120, "secret": true}).as_object().cloned().unwrap())
            .await
            .unwrap();
        db
    }

    async fn run(db: &Database, pairs: &[(&str, &str)]) -> Vec<Document> {
        QueryFeatures::new(db.model("Item").unwrap().find(), params(pairs))
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .exec()
            .await
            .unwrap()
    }

    fn prices(docs: &[Document]) -> Vec<i64> {
        docs.iter().filter_map(|d| d["price"].as_i64()).collect()
    }

    #[test]
    fn test_repeated_keys_collapse_unless_whitelisted() {
        let p = params(&[("sort", "name"), ("sort", "-price"), ("difficulty", "easy"), ("difficulty", "medium")]);
        assert_eq!(p.get("sort"), Some("-price"));
        assert_eq!(
            p.iter().find(|(k, _)| *k == "difficulty").map(|(_, v)| v.clone()),
            Some(ParamValue::Many(vec!["easy".into(), "medium".into()]))
        );
    }

    #[test]
    fn test_operator_keys_are_dropped() {
        let p = params(&[("$where", "1"), ("price", "10")]);
        assert!(p.get("$where").is_none());
        assert_eq!(p.get("price"), Some("10"));
    }

    #[test]
    fn test_split_operator_forms() {
        assert_eq!(split_operator("price[gte]"), ("price", Some("gte")));
        assert_eq!(split_operator("price[lt]"), ("price", Some("lt")));
        assert_eq!(split_operator("priceGte"), ("price", Some("gte")));
        assert_eq!(split_operator("durationLt"), ("duration", Some("lt")));
        assert_eq!(split_operator("difficulty"), ("difficulty", None));
        assert_eq!(split_operator("Gt"), ("Gt", None));
    }

    #[test]
    fn test_pagination_defaults_are_permissive() {
        let query_params = params(&[("page", "abc"), ("limit", "0")]);
        assert_eq!(positive(query_params.get("page"), DEFAULT_PAGE), 1);
        assert_eq!(positive(query_params.get("limit"), DEFAULT_LIMIT), 100);
        assert_eq!(positive(Some("-3"), DEFAULT_PAGE), 1);
        assert_eq!(positive(Some("4"), DEFAULT_PAGE), 4);
    }

    #[tokio::test]
    async fn test_range_filters_intersect() {
        let db = catalog().await;
        let docs = run(&db, &[("priceGte", "100"), ("sort", "price")]).await;
        assert_eq!(prices(&docs), vec![100, 150, 200, 250, 300, 350]);

        let docs = run(&db, &[("price[gte]", "100"), ("priceLte", "200"), ("sort", "price")]).await;
        assert_eq!(prices(&docs), vec![100, 150, 200]);
    }

    #[tokio::test]
    async fn test_whitelisted_repeat_becomes_membership() {
        let db = catalog().await;
        let docs = run(&db, &[("price", "50"), ("price", "350"), ("sort", "price")]).await;
        assert_eq!(prices(&docs), vec![50, 350]);
    }

    #[tokio::test]
    async fn test_default_visibility_without_filters() {
        let db = catalog().await;
        let docs = run(&db, &[]).await;
        assert_eq!(docs.len(), 7);
        assert!(docs.iter().all(|d| d["name"] != json!("hidden")));
        assert!(docs.iter().all(|d| d.get("__v").is_none()));
    }

    #[tokio::test]
    async fn test_reversed_sort_reverses_order() {
        let db = catalog().await;
        let ascending = prices(&run(&db, &[("sort", "price")]).await);
        let mut descending = prices(&run(&db, &[("sort", "-price")]).await);
        descending.reverse();
        assert_eq!(ascending, descending);
    }

    #[tokio::test]
    async fn test_multi_key_sort_priority() {
        let db = catalog().await;
        let docs = run(&db, &[("sort", "difficulty,-price")]).await;
        assert_eq!(prices(&docs), vec![300, 200, 100, 350, 250, 150, 50]);
    }

    #[tokio::test]
    async fn test_pages_are_bounded_and_offset() {
        let db = catalog().await;
        let all = prices(&run(&db, &[("sort", "price")]).await);
        for page in 1..=4 {
            let page_param = page.to_string();
            let docs = run(&db, &[("sort", "price"), ("limit", "3"), ("page", &page_param)]).await;
            assert!(docs.len() <= 3);
            let skip = (page - 1) * 3;
            let expected: Vec<i64> = all.iter().skip(skip).take(3).copied().collect();
            assert_eq!(prices(&docs), expected);
        }
    }

    #[tokio::test]
    async fn test_huge_page_is_empty() {
        let db = catalog().await;
        let docs = run(&db, &[("page", "1000000000000000000"), ("limit", "100")]).await;
        assert!(docs.is_empty());

        let max = usize::MAX.to_string();
        let docs = run(&db, &[("page", &max), ("limit", &max)]).await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_field_projection() {
        let db = catalog().await;
        let docs = run(&db, &[("field", "name,price")]).await;
        assert!(docs.iter().all(|d| d.contains_key("name") && d.contains_key("price")));
        assert!(docs.iter().all(|d| !d.contains_key("difficulty")));

        let docs = run(&db, &[("field", "-difficulty")]).await;
        assert!(docs.iter().all(|d| d.contains_key("name") && !d.contains_key("difficulty")));
        assert!(docs.iter().all(|d| !d.contains_key("__v")));
    }

    #[tokio::test]
    async fn test_default_sort_is_newest_first() {
        let db = catalog().await;
        let features = QueryFeatures::new(db.model("Item").unwrap().find(), params(&[])).sort();
        let query = features.into_query();
        let keys = &query.pending().sort;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].field, "createdAt");
        assert_eq!(keys[0].direction, SortDirection::Descending);
    }
}
