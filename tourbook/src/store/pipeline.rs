//! Aggregation pipelines
//!
//! Stages run in order over the documents of one collection. The set of
//! stages covers what the API needs: geo-near ranking, matching, unwinding
//! arrays, grouping with accumulators, sorting, limiting and reshaping.

use std::cmp::Ordering;

use chrono::Datelike;
use serde_json::Value;

use super::document::{get_path, number, parse_timestamp, set_path, Document, ID_FIELD};
use super::error::StoreError;
use super::filter::{total_cmp, Filter, GeoPoint, EARTH_RADIUS_METERS};
use super::options::{Projection, SortDirection, SortKey};

/// Rank documents by distance from a point; must be the first stage
#[derive(Debug, Clone, PartialEq)]
pub struct GeoNear {
    /// Reference point
    pub near: GeoPoint,
    /// Field holding a GeoJSON point
    pub key: String,
    /// Output field receiving the distance
    pub distance_field: String,
    /// Multiplier applied to distances in meters
    pub distance_multiplier: f64,
}

/// Grouping key
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    /// Single group over all input (`_id: null`)
    All,
    /// Value of a field
    Field(String),
    /// Upper-cased string value of a field
    Upper(String),
    /// Month number (1-12) of a timestamp field
    Month(String),
}

/// Accumulator computing one output field of a group
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Number of documents in the group
    Count,
    /// Sum of a numeric field
    Sum(String),
    /// Average of a numeric field, `null` when no values
    Avg(String),
    /// Smallest value of a field
    Min(String),
    /// Largest value of a field
    Max(String),
    /// Every value of a field, in input order
    Push(String),
}

/// Group stage
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Grouping key, written to `_id`
    pub key: GroupKey,
    /// Output fields
    pub fields: Vec<(String, Accumulator)>,
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Distance ranking
    GeoNear(GeoNear),
    /// Keep matching documents
    Match(Filter),
    /// One output document per element of an array field
    Unwind(String),
    /// Group and accumulate
    Group(Group),
    /// Sort
    Sort(Vec<SortKey>),
    /// Keep the first n documents
    Limit(usize),
    /// Copy the value at `from` into `field`
    Set {
        /// Target field
        field: String,
        /// Source path
        from: String,
    },
    /// Reshape
    Project(Projection),
}

/// Run `stages` over `docs`
pub fn run(mut docs: Vec<Document>, stages: &[Stage]) -> Result<Vec<Document>, StoreError> {
    for (index, stage) in stages.iter().enumerate() {
        docs = match stage {
            Stage::GeoNear(geo) => {
                if index != 0 {
                    return Err(StoreError::invalid_pipeline(
                        "geo-near is only valid as the first stage in a pipeline",
                    ));
                }
                geo_near(docs, geo)
            }
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Unwind(field) => unwind(docs, field),
            Stage::Group(group) => group_by(docs, group),
            Stage::Sort(keys) => {
                sort_documents(&mut docs, keys);
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Set { field, from } => docs
                .into_iter()
                .map(|mut d| {
                    let value = get_path(&d, from).cloned().unwrap_or(Value::Null);
                    set_path(&mut d, field, value);
                    d
                })
                .collect(),
            Stage::Project(projection) => docs.into_iter().map(|d| projection.apply(d)).collect(),
        };
    }
    Ok(docs)
}

/// Stable multi-key sort, tie-broken by `_id`
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let order = total_cmp(get_path(a, &key.field), get_path(b, &key.field));
                match key.direction {
                    SortDirection::Ascending => order,
                    SortDirection::Descending => order.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| total_cmp(a.get(ID_FIELD), b.get(ID_FIELD)))
    });
}

fn geo_near(docs: Vec<Document>, geo: &GeoNear) -> Vec<Document> {
    let mut ranked: Vec<(f64, Document)> = docs
        .into_iter()
        .filter_map(|mut d| {
            let point = get_path(&d, &geo.key).and_then(GeoPoint::from_value)?;
            let meters = geo.near.angular_distance(&point) * EARTH_RADIUS_METERS;
            set_path(&mut d, &geo.distance_field, number(meters * geo.distance_multiplier));
            Some((meters, d))
        })
        .collect();
    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    ranked.into_iter().map(|(_, d)| d).collect()
}

fn unwind(docs: Vec<Document>, field: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match get_path(&doc, field) {
            Some(Value::Array(items)) => {
                for item in items.clone() {
                    let mut copy = doc.clone();
                    set_path(&mut copy, field, item);
                    out.push(copy);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

fn group_key(doc: &Document, key: &GroupKey) -> Value {
    match key {
        GroupKey::All => Value::Null,
        GroupKey::Field(path) => get_path(doc, path).cloned().unwrap_or(Value::Null),
        GroupKey::Upper(path) => match get_path(doc, path) {
            Some(Value::String(s)) => Value::String(s.to_uppercase()),
            _ => Value::Null,
        },
        GroupKey::Month(path) => get_path(doc, path)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .map(|at| Value::from(at.month()))
            .unwrap_or(Value::Null),
    }
}

fn group_by(docs: Vec<Document>, group: &Group) -> Vec<Document> {
    // Groups keep first-seen order
    let mut buckets: Vec<(Value, Vec<Document>)> = Vec::new();
    for doc in docs {
        let key = group_key(&doc, &group.key);
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(doc),
            None => buckets.push((key, vec![doc])),
        }
    }

    buckets
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert(ID_FIELD.to_string(), key);
            for (name, acc) in &group.fields {
                out.insert(name.clone(), accumulate(&members, acc));
            }
            out
        })
        .collect()
}

fn accumulate(members: &[Document], acc: &Accumulator) -> Value {
    let values = |path: &str| -> Vec<Value> {
        members
            .iter()
            .filter_map(|d| get_path(d, path))
            .filter(|v| !v.is_null())
            .cloned()
            .collect()
    };
    let numbers = |path: &str| -> Vec<f64> {
        values(path).iter().filter_map(Value::as_f64).collect()
    };

    match acc {
        Accumulator::Count => Value::from(members.len()),
        Accumulator::Sum(path) => number(numbers(path).iter().sum()),
        Accumulator::Avg(path) => {
            let nums = numbers(path);
            if nums.is_empty() {
                Value::Null
            } else {
                number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Accumulator::Min(path) => values(path)
            .into_iter()
            .min_by(|a, b| total_cmp(Some(a), Some(b)))
            .unwrap_or(Value::Null),
        Accumulator::Max(path) => values(path)
            .into_iter()
            .max_by(|a, b| total_cmp(Some(a), Some(b)))
            .unwrap_or(Value::Null),
        Accumulator::Push(path) => Value::Array(
            members
                .iter()
                .map(|d| get_path(d, path).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::filter::Op;
    use serde_json::json;

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_group_with_accumulators() {
        let input = docs(vec![
            json!({"_id": "1", "difficulty": "easy", "price": 397, "ratingsAverage": 4.8}),
            json!({"_id": "2", "difficulty": "easy", "price": 497, "ratingsAverage": 4.6}),
            json!({"_id": "3", "difficulty": "difficult", "price": 997, "ratingsAverage": 5}),
        ]);
        let pipeline = vec![
            Stage::Group(Group {
                key: GroupKey::Upper("difficulty".into()),
                fields: vec![
                    ("numTours".into(), Accumulator::Count),
                    ("avgPrice".into(), Accumulator::Avg("price".into())),
                    ("minPrice".into(), Accumulator::Min("price".into())),
                    ("maxPrice".into(), Accumulator::Max("price".into())),
                ],
            }),
            Stage::Sort(vec![SortKey::asc("avgPrice")]),
        ];
        let out = run(input, &pipeline).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], json!("EASY"));
        assert_eq!(out[0]["numTours"], json!(2));
        assert_eq!(out[0]["avgPrice"], json!(447));
        assert_eq!(out[0]["minPrice"], json!(397));
        assert_eq!(out[1]["maxPrice"], json!(997));
    }

    #[test]
    fn test_unwind_and_group_by_month() {
        let input = docs(vec![
            json!({"_id": "1", "name": "A", "startDates": ["2021-04-25T09:00:00.000Z", "2021-07-20T09:00:00.000Z"]}),
            json!({"_id": "2", "name": "B", "startDates": ["2021-07-05T09:00:00.000Z"]}),
            json!({"_id": "3", "name": "C"}),
        ]);
        let pipeline = vec![
            Stage::Unwind("startDates".into()),
            Stage::Match(Filter::new().and("startDates", Op::Gte(json!("2021-01-01T00:00:00.000Z")))),
            Stage::Group(Group {
                key: GroupKey::Month("startDates".into()),
                fields: vec![
                    ("numTourStarts".into(), Accumulator::Count),
                    ("tours".into(), Accumulator::Push("name".into())),
                ],
            }),
            Stage::Set { field: "month".into(), from: "_id".into() },
            Stage::Project(Projection::Exclude(vec!["_id".into()])),
            Stage::Sort(vec![SortKey::desc("numTourStarts")]),
            Stage::Limit(12),
        ];
        let out = run(input, &pipeline).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["month"], json!(7));
        assert_eq!(out[0]["tours"], json!(["A", "B"]));
        assert!(!out[0].contains_key("_id"));
    }

    #[test]
    fn test_geo_near_orders_by_distance() {
        let input = docs(vec![
            json!({"_id": "far", "startLocation": {"type": "Point", "coordinates": [-118.11, 34.11]}}),
            json!({"_id": "near", "startLocation": {"type": "Point", "coordinates": [-80.2, 25.8]}}),
            json!({"_id": "nowhere"}),
        ]);
        let pipeline = vec![Stage::GeoNear(GeoNear {
            near: GeoPoint::new(-80.185942, 25.774772),
            key: "startLocation".into(),
            distance_field: "distance".into(),
            distance_multiplier: 0.001,
        })];
        let out = run(input, &pipeline).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], json!("near"));
        assert!(out[0]["distance"].as_f64().unwrap() < 5.0);
        assert!(out[1]["distance"].as_f64().unwrap() > 3000.0);
    }

    #[test]
    fn test_geo_near_must_lead() {
        let stage = Stage::GeoNear(GeoNear {
            near: GeoPoint::new(0.0, 0.0),
            key: "loc".into(),
            distance_field: "d".into(),
            distance_multiplier: 1.0,
        });
        let err = run(vec![], &[Stage::Limit(1), stage]).unwrap_err();
        assert!(err.to_string().contains("first stage"));
    }

    #[test]
    fn test_sort_is_stable_by_id() {
        let mut input = docs(vec![
            json!({"_id": "b", "price": 1}),
            json!({"_id": "a", "price": 1}),
            json!({"_id": "c", "price": 0}),
        ]);
        sort_documents(&mut input, &[SortKey::asc("price")]);
        let ids: Vec<_> = input.iter().map(|d| d["_id"].clone()).collect();
        assert_eq!(ids, vec![json!("c"), json!("a"), json!("b")]);
    }
}
