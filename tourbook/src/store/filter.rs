//! Filter predicates over documents
//!
//! A [`Filter`] is a conjunction of [`Condition`]s. Comparison semantics follow
//! document-database conventions: a condition on an array field matches when
//! any element matches, and range operators only compare values of the same
//! type class (numbers with numbers, strings with strings).

use std::cmp::Ordering;

use serde_json::Value;

use super::document::{get_path, Document, ID_FIELD};

/// Mean Earth radius in meters used for spherical distances
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// A longitude/latitude pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Longitude in degrees
    pub lng: f64,
    /// Latitude in degrees
    pub lat: f64,
}

impl GeoPoint {
    /// Create a point from longitude and latitude
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Read a GeoJSON point (`{"type": "Point", "coordinates": [lng, lat]}`)
    pub fn from_value(value: &Value) -> Option<Self> {
        let coordinates = value.get("coordinates")?.as_array()?;
        match coordinates.as_slice() {
            [lng, lat] => Some(Self::new(lng.as_f64()?, lat.as_f64()?)),
            _ => None,
        }
    }

    /// Great-circle distance to `other` in radians (haversine)
    pub fn angular_distance(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }
}

/// A comparison applied to one field
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Equal (any element, for arrays)
    Eq(Value),
    /// Not equal; also matches a missing field
    Ne(Value),
    /// Greater than
    Gt(Value),
    /// Greater than or equal
    Gte(Value),
    /// Less than
    Lt(Value),
    /// Less than or equal
    Lte(Value),
    /// Equal to any of the values
    In(Vec<Value>),
    /// GeoJSON point within `radius` radians of `center`
    GeoWithin {
        /// Sphere center
        center: GeoPoint,
        /// Radius in radians
        radius: f64,
    },
}

impl Op {
    /// Map the operand(s) through `f`, used when casting filter values
    pub fn try_map_operands<E>(self, mut f: impl FnMut(Value) -> Result<Value, E>) -> Result<Op, E> {
        Ok(match self {
            Op::Eq(v) => Op::Eq(f(v)?),
            Op::Ne(v) => Op::Ne(f(v)?),
            Op::Gt(v) => Op::Gt(f(v)?),
            Op::Gte(v) => Op::Gte(f(v)?),
            Op::Lt(v) => Op::Lt(f(v)?),
            Op::Lte(v) => Op::Lte(f(v)?),
            Op::In(vs) => Op::In(vs.into_iter().map(f).collect::<Result<_, _>>()?),
            geo @ Op::GeoWithin { .. } => geo,
        })
    }

    /// Whether this operator applies to `field` of `doc`
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Op::Eq(expected) => equals(field, expected),
            Op::Ne(expected) => !equals(field, expected),
            Op::In(candidates) => candidates.iter().any(|c| equals(field, c)),
            Op::Gt(bound) => any_ordered(field, bound, |o| o == Ordering::Greater),
            Op::Gte(bound) => any_ordered(field, bound, |o| o != Ordering::Less),
            Op::Lt(bound) => any_ordered(field, bound, |o| o == Ordering::Less),
            Op::Lte(bound) => any_ordered(field, bound, |o| o != Ordering::Greater),
            Op::GeoWithin { center, radius } => field
                .and_then(GeoPoint::from_value)
                .map(|point| center.angular_distance(&point) <= *radius)
                .unwrap_or(false),
        }
    }
}

/// A single field condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Dotted field path
    pub field: String,
    /// Comparison
    pub op: Op,
}

impl Condition {
    /// Create a condition
    pub fn new(field: impl Into<String>, op: Op) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    /// Evaluate against a document
    pub fn matches(&self, doc: &Document) -> bool {
        self.op.matches(get_path(doc, &self.field))
    }
}

/// Conjunction of conditions; the empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Filter that matches every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on `_id`
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().and(ID_FIELD, Op::Eq(Value::String(id.into())))
    }

    /// Add a condition (builder style)
    pub fn and(mut self, field: impl Into<String>, op: Op) -> Self {
        self.conditions.push(Condition::new(field, op));
        self
    }

    /// Add a condition in place
    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    /// Add every condition of `other`
    pub fn extend(&mut self, other: Filter) {
        self.conditions.extend(other.conditions);
    }

    /// The conditions, in insertion order
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Consume into conditions
    pub fn into_conditions(self) -> Vec<Condition> {
        self.conditions
    }

    /// Whether the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a document
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

impl FromIterator<Condition> for Filter {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}

fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None | Some(Value::Null) => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| scalar_equals(item, expected))
        }
        Some(value) => scalar_equals(value, expected),
    }
}

fn scalar_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn any_ordered(field: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match field {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| same_class_cmp(item, bound).map(&accept).unwrap_or(false)),
        Some(value) => same_class_cmp(value, bound).map(accept).unwrap_or(false),
        None => false,
    }
}

/// Compare values of the same type class; `None` across classes
pub fn same_class_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order over JSON values for sorting
///
/// Values of different type classes order by class rank:
/// missing/null < numbers < strings < objects < arrays < booleans.
pub fn total_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) if rank(a) == rank(b) => match (x, y) {
            (Value::Array(xs), Value::Array(ys)) => xs
                .iter()
                .zip(ys.iter())
                .map(|(x, y)| total_cmp(Some(x), Some(y)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| xs.len().cmp(&ys.len())),
            (Value::Object(_), Value::Object(_)) => x.to_string().cmp(&y.to_string()),
            _ => same_class_cmp(x, y).unwrap_or(Ordering::Equal),
        },
        _ => rank(a).cmp(&rank(b)),
    }
}
