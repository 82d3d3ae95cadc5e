//! Field schemas: casting, defaults and validation
//!
//! A [`Schema`] lists the fields an entity persists. Writes are strict: input
//! fields the schema does not name are dropped. Values are cast to the field
//! type before validation, and query filter values are cast the same way so
//! that `price[gte]=100` compares numbers.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::validation::{FieldError, ValidationErrors};
use crate::error::{Error, Result};
use crate::store::{
    format_timestamp, is_id, now_timestamp, number, Document, Filter, IndexSpec, ID_FIELD,
    VERSION_FIELD,
};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text
    String,
    /// Floating point or integer number
    Number,
    /// true / false
    Boolean,
    /// Timestamp, stored as RFC 3339 UTC with milliseconds
    Date,
    /// Reference to another record's `_id`
    ObjectId,
    /// Free-form JSON object (GeoJSON points, for instance)
    Object,
}

impl FieldKind {
    fn label(&self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date => "Date",
            FieldKind::ObjectId => "ObjectId",
            FieldKind::Object => "Object",
        }
    }
}

/// Default applied to a missing field on insert
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A fixed value
    Value(Value),
    /// The insertion time
    Now,
}

/// Custom check; receives the field value and the whole document
pub type CheckFn = fn(&Value, &Document) -> bool;

/// A custom validator and the message reported when it fails
///
/// `{VALUE}` in the message is replaced by the offending value.
#[derive(Clone)]
pub struct Validator {
    check: CheckFn,
    message: String,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("message", &self.message)
            .finish()
    }
}

/// Schema of one field
#[derive(Debug, Clone)]
pub struct FieldSchema {
    kind: FieldKind,
    array: bool,
    required: Option<String>,
    unique: bool,
    default: Option<DefaultValue>,
    min: Option<(f64, String)>,
    max: Option<(f64, String)>,
    min_length: Option<(usize, String)>,
    max_length: Option<(usize, String)>,
    allowed: Option<(Vec<String>, String)>,
    trim: bool,
    lowercase: bool,
    hidden: bool,
    read_only: bool,
    round_to: Option<i32>,
    validators: Vec<Validator>,
}

impl FieldSchema {
    fn of(kind: FieldKind, array: bool) -> Self {
        Self {
            kind,
            array,
            required: None,
            unique: false,
            default: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            allowed: None,
            trim: false,
            lowercase: false,
            hidden: false,
            read_only: false,
            round_to: None,
            validators: Vec::new(),
        }
    }

    /// Text field
    pub fn string() -> Self {
        Self::of(FieldKind::String, false)
    }

    /// Numeric field
    pub fn number() -> Self {
        Self::of(FieldKind::Number, false)
    }

    /// Boolean field
    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean, false)
    }

    /// Timestamp field
    pub fn date() -> Self {
        Self::of(FieldKind::Date, false)
    }

    /// Reference field
    pub fn object_id() -> Self {
        Self::of(FieldKind::ObjectId, false)
    }

    /// Free-form object field
    pub fn object() -> Self {
        Self::of(FieldKind::Object, false)
    }

    /// Array of `kind`
    pub fn array_of(kind: FieldKind) -> Self {
        Self::of(kind, true)
    }

    /// Reject missing, null and empty values with `message`
    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required = Some(message.into());
        self
    }

    /// Backed by a unique index
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Fixed default
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Default to the insertion time
    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    /// Minimum numeric value
    pub fn min(mut self, bound: f64, message: impl Into<String>) -> Self {
        self.min = Some((bound, message.into()));
        self
    }

    /// Maximum numeric value
    pub fn max(mut self, bound: f64, message: impl Into<String>) -> Self {
        self.max = Some((bound, message.into()));
        self
    }

    /// Minimum string length in characters
    pub fn min_length(mut self, bound: usize, message: impl Into<String>) -> Self {
        self.min_length = Some((bound, message.into()));
        self
    }

    /// Maximum string length in characters
    pub fn max_length(mut self, bound: usize, message: impl Into<String>) -> Self {
        self.max_length = Some((bound, message.into()));
        self
    }

    /// Restrict to a fixed set of strings
    pub fn one_of(mut self, values: &[&str], message: impl Into<String>) -> Self {
        self.allowed = Some((values.iter().map(|v| v.to_string()).collect(), message.into()));
        self
    }

    /// Trim surrounding whitespace
    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    /// Lowercase on write
    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    /// Excluded from reads unless explicitly revealed
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Maintained by the server; ignored in client writes
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Round numbers to `decimals` places on write
    pub fn round(mut self, decimals: i32) -> Self {
        self.round_to = Some(decimals);
        self
    }

    /// Check that the value looks like an email address
    pub fn email(self, message: impl Into<String>) -> Self {
        self.validate(
            |value, _| value.as_str().map(|s| EMAIL.is_match(s)).unwrap_or(false),
            message,
        )
    }

    /// Add a custom validator
    pub fn validate(mut self, check: CheckFn, message: impl Into<String>) -> Self {
        self.validators.push(Validator {
            check,
            message: message.into(),
        });
        self
    }

    /// Storage type
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the field is hidden from default reads
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Cast a raw value to this field's type
    ///
    /// Null passes through; arrays cast element-wise and a lone value is
    /// wrapped for array fields.
    pub fn cast(&self, value: Value) -> std::result::Result<Value, Value> {
        if value.is_null() {
            return Ok(value);
        }
        if self.array {
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            return items
                .into_iter()
                .map(|item| self.cast_scalar(item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array);
        }
        self.cast_scalar(value)
    }

    fn cast_scalar(&self, value: Value) -> std::result::Result<Value, Value> {
        match self.kind {
            FieldKind::String => {
                let mut text = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => return Err(other),
                };
                if self.trim {
                    text = text.trim().to_string();
                }
                if self.lowercase {
                    text = text.to_lowercase();
                }
                Ok(Value::String(text))
            }
            FieldKind::Number => {
                let parsed = match &value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
                    _ => None,
                };
                let Some(mut n) = parsed else {
                    return Err(value);
                };
                if let Some(decimals) = self.round_to {
                    let factor = 10f64.powi(decimals);
                    n = (n * factor).round() / factor;
                }
                Ok(number(n))
            }
            FieldKind::Boolean => {
                let parsed = match &value {
                    Value::Bool(b) => Some(*b),
                    Value::String(s) if s == "true" || s == "1" => Some(true),
                    Value::String(s) if s == "false" || s == "0" => Some(false),
                    Value::Number(n) if n.as_f64() == Some(1.0) => Some(true),
                    Value::Number(n) if n.as_f64() == Some(0.0) => Some(false),
                    _ => None,
                };
                parsed.map(Value::Bool).ok_or(value)
            }
            FieldKind::Date => {
                let parsed = match &value {
                    Value::String(s) => parse_date(s),
                    Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
                    _ => None,
                };
                parsed
                    .map(|at| Value::String(format_timestamp(at)))
                    .ok_or(value)
            }
            FieldKind::ObjectId => {
                let parsed = match &value {
                    Value::String(s) if is_id(s) => Some(s.to_lowercase()),
                    Value::Object(obj) => obj
                        .get(ID_FIELD)
                        .and_then(Value::as_str)
                        .filter(|s| is_id(s))
                        .map(str::to_lowercase),
                    _ => None,
                };
                parsed.map(Value::String).ok_or(value)
            }
            FieldKind::Object => match value {
                Value::Object(_) => Ok(value),
                other => Err(other),
            },
        }
    }

    fn check(&self, path: &str, value: Option<&Value>, doc: &Document, errors: &mut ValidationErrors) {
        let present = match value {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !present {
            if let Some(ref message) = self.required {
                errors.push(FieldError::new(path, message.clone()));
            }
            return;
        }
        let Some(value) = value else {
            return;
        };

        let values: Vec<&Value> = match value {
            Value::Array(items) if self.array => items.iter().collect(),
            single => vec![single],
        };
        for item in values {
            if let Some(message) = self.first_failure(item, doc) {
                errors.push(FieldError::new(path, message.replace("{VALUE}", &render(item))));
                return;
            }
        }
    }

    fn first_failure(&self, value: &Value, doc: &Document) -> Option<String> {
        if let (Some((allowed, message)), Some(text)) = (&self.allowed, value.as_str()) {
            if !allowed.iter().any(|a| a == text) {
                return Some(message.clone());
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some((bound, ref message)) = self.min {
                if n < bound {
                    return Some(message.clone());
                }
            }
            if let Some((bound, ref message)) = self.max {
                if n > bound {
                    return Some(message.clone());
                }
            }
        }
        if let Some(text) = value.as_str() {
            let length = text.chars().count();
            if let Some((bound, ref message)) = self.min_length {
                if length < bound {
                    return Some(message.clone());
                }
            }
            if let Some((bound, ref message)) = self.max_length {
                if length > bound {
                    return Some(message.clone());
                }
            }
        }
        self.validators
            .iter()
            .find(|v| !(v.check)(value, doc))
            .map(|v| v.message.clone())
    }
}

/// Render a value for messages: strings bare, everything else as JSON
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d,%H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(text, format) {
            return Some(at.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

/// Ordered set of field schemas
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldSchema)>,
}

impl Schema {
    /// Empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.push((name.into(), schema));
        self
    }

    /// Schema of a top-level field
    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Names of fields hidden from default reads
    pub fn hidden_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, s)| s.hidden)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Drop server-maintained fields from client input
    pub fn strip_read_only(&self, input: &mut Document) {
        for (name, _) in self.fields.iter().filter(|(_, s)| s.read_only) {
            input.remove(name);
        }
    }

    /// Unique single-field indexes declared on fields
    pub fn unique_indexes(&self) -> Vec<IndexSpec> {
        self.fields
            .iter()
            .filter(|(_, s)| s.unique)
            .map(|(n, _)| IndexSpec::unique([n.clone()]))
            .collect()
    }

    /// Cast the named fields of `doc` in place, dropping fields the schema does not know
    ///
    /// `_id` and `__v` are left untouched.
    pub fn cast_fields<'a>(
        &self,
        doc: &mut Document,
        names: impl IntoIterator<Item = &'a String>,
    ) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for name in names {
            if name == ID_FIELD || name == VERSION_FIELD {
                continue;
            }
            let Some(schema) = self.get(name) else {
                doc.remove(name);
                continue;
            };
            let Some(raw) = doc.remove(name) else {
                continue;
            };
            match schema.cast(raw) {
                Ok(value) => {
                    doc.insert(name.clone(), value);
                }
                Err(bad) => errors.push(FieldError::new(
                    name.clone(),
                    format!("Cast to {} failed for value \"{}\"", schema.kind.label(), render(&bad)),
                )),
            }
        }
        errors.into_result()
    }

    /// Fill missing fields that declare a default
    pub fn apply_defaults(&self, doc: &mut Document) {
        for (name, schema) in &self.fields {
            if doc.get(name).map(Value::is_null).unwrap_or(true) {
                match &schema.default {
                    Some(DefaultValue::Value(v)) => {
                        doc.insert(name.clone(), v.clone());
                    }
                    Some(DefaultValue::Now) => {
                        doc.insert(name.clone(), Value::String(now_timestamp()));
                    }
                    None => {}
                }
            }
        }
    }

    /// Validate every field, or only `paths` when given
    pub fn validate(
        &self,
        doc: &Document,
        paths: Option<&BTreeSet<String>>,
    ) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (name, schema) in &self.fields {
            if paths.map(|p| p.contains(name)).unwrap_or(true) {
                schema.check(name, doc.get(name), doc, &mut errors);
            }
        }
        errors.into_result()
    }

    /// Cast filter operands against field types
    ///
    /// Fields outside the schema pass through untouched.
    pub fn cast_filter(&self, filter: Filter) -> Result<Filter> {
        let id_schema = FieldSchema::object_id();
        filter
            .into_conditions()
            .into_iter()
            .map(|mut condition| {
                let top = condition.field.split('.').next().unwrap_or_default();
                let schema = if top == ID_FIELD {
                    Some(&id_schema)
                } else if condition.field.contains('.') {
                    None
                } else {
                    self.get(top)
                };
                if let Some(schema) = schema {
                    let path = condition.field.clone();
                    condition.op = condition.op.try_map_operands(|value| {
                        let scalar = FieldSchema { array: false, ..schema.clone() };
                        scalar.cast(value).map_err(|bad| Error::Cast {
                            path: path.clone(),
                            value: render(&bad),
                        })
                    })?;
                }
                Ok(condition)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Op;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn tour_schema() -> Schema {
        Schema::new()
            .field(
                "name",
                FieldSchema::string()
                    .required("A tour must have a name")
                    .trim()
                    .max_length(40, "A tour name must have less or equal then 40 characters"),
            )
            .field("price", FieldSchema::number().required("A tour must have a price"))
            .field(
                "difficulty",
                FieldSchema::string().one_of(&["easy", "medium", "difficult"], "Difficulty is either: easy, medium, difficult"),
            )
            .field(
                "ratingsAverage",
                FieldSchema::number()
                    .default_value(4.5)
                    .min(1.0, "Rating must be above 1.0")
                    .round(1),
            )
            .field(
                "priceDiscount",
                FieldSchema::number().validate(
                    |value, doc| match (value.as_f64(), doc.get("price").and_then(Value::as_f64)) {
                        (Some(discount), Some(price)) => discount < price,
                        _ => true,
                    },
                    "Discount price ({VALUE}) should be below regular price",
                ),
            )
            .field("startDates", FieldSchema::array_of(FieldKind::Date))
            .field("secret", FieldSchema::boolean().hidden())
    }

    #[test]
    fn test_cast_and_defaults() {
        let schema = tour_schema();
        let mut d = doc(json!({
            "name": "  The Park Camper ",
            "price": "997",
            "ratingsAverage": 4.66666,
            "startDates": "2021-06-19,10:00",
            "unknown": true
        }));
        let names: Vec<String> = d.keys().cloned().collect();
        schema.cast_fields(&mut d, &names).unwrap();
        schema.apply_defaults(&mut d);
        assert_eq!(d["name"], json!("The Park Camper"));
        assert_eq!(d["price"], json!(997));
        assert_eq!(d["ratingsAverage"], json!(4.7));
        assert_eq!(d["startDates"], json!(["2021-06-19T10:00:00.000Z"]));
        assert!(!d.contains_key("unknown"));
        assert!(schema.validate(&d, None).is_ok());
    }

    #[test]
    fn test_defaults_fill_missing() {
        let schema = tour_schema();
        let mut d = doc(json!({"name": "x", "price": 1}));
        schema.apply_defaults(&mut d);
        assert_eq!(d["ratingsAverage"], json!(4.5));
    }

    #[test]
    fn test_cast_failure_is_reported_per_field() {
        let schema = tour_schema();
        let mut d = doc(json!({"price": "cheap"}));
        let names: Vec<String> = d.keys().cloned().collect();
        let errors = schema.cast_fields(&mut d, &names).unwrap_err();
        assert!(errors.has("price"));
        assert!(errors.to_string().contains("Cast to Number failed for value \"cheap\""));
    }

    #[test]
    fn test_validation_collects_every_failure() {
        let schema = tour_schema();
        let d = doc(json!({"difficulty": "extreme", "price": 100, "priceDiscount": 150}));
        let errors = schema.validate(&d, None).unwrap_err();
        assert!(errors.has("name"));
        assert!(errors.has("difficulty"));
        assert!(errors
            .to_string()
            .contains("Discount price (150) should be below regular price"));
        assert!(!errors.has("price"));
    }

    #[test]
    fn test_validation_limited_to_paths() {
        let schema = tour_schema();
        let d = doc(json!({"ratingsAverage": 0.5}));
        let paths: BTreeSet<String> = ["ratingsAverage".to_string()].into();
        let errors = schema.validate(&d, Some(&paths)).unwrap_err();
        assert_eq!(errors.errors().len(), 1);
        assert!(errors.has("ratingsAverage"));
    }

    #[test]
    fn test_cast_filter() {
        let schema = tour_schema();
        let filter = Filter::new()
            .and("price", Op::Gte(json!("100")))
            .and("secret", Op::Eq(json!("false")))
            .and("duration", Op::Eq(json!("5")));
        let cast = schema.cast_filter(filter).unwrap();
        assert_eq!(cast.conditions()[0].op, Op::Gte(json!(100)));
        assert_eq!(cast.conditions()[1].op, Op::Eq(json!(false)));
        assert_eq!(cast.conditions()[2].op, Op::Eq(json!("5")));

        let err = schema
            .cast_filter(Filter::by_id("not-an-id"))
            .unwrap_err();
        assert_eq!(err.normalize().message, "Invalid _id: not-an-id.");
    }

    #[test]
    fn test_email_validator() {
        let schema = Schema::new().field("email", FieldSchema::string().email("Please provide a valid email"));
        assert!(schema.validate(&doc(json!({"email": "ann@example.com"})), None).is_ok());
        assert!(schema.validate(&doc(json!({"email": "ann@"})), None).is_err());
    }

    #[test]
    fn test_read_only_fields_are_stripped() {
        let schema = Schema::new()
            .field("name", FieldSchema::string())
            .field("score", FieldSchema::number().default_value(0).read_only());
        let mut input = doc(json!({"name": "x", "score": 99}));
        schema.strip_read_only(&mut input);
        assert_eq!(input, doc(json!({"name": "x"})));
    }

    #[test]
    fn test_hidden_and_unique() {
        let schema = tour_schema().field("slug", FieldSchema::string().unique());
        assert_eq!(schema.hidden_fields(), vec!["secret".to_string()]);
        assert_eq!(schema.unique_indexes(), vec![IndexSpec::unique(["slug"])]);
    }
}
