//! Tours

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::{EntityDescriptor, FieldKind, FieldSchema, Populate, Record, SaveHook, Schema};
use crate::store::{number, Filter, IndexSpec, Op, Projection};

use super::{TOUR, USER};

/// Rating given to tours without reviews
pub const DEFAULT_RATING: f64 = 4.5;

/// Allowed difficulty levels
pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];

fn discount_below_price(discount: &Value, doc: &crate::store::Document) -> bool {
    match (discount.as_f64(), doc.get("price").and_then(Value::as_f64)) {
        (Some(discount), Some(price)) => discount < price,
        _ => true,
    }
}

fn duration_weeks(doc: &crate::store::Document) -> Option<Value> {
    doc.get("duration")
        .and_then(Value::as_f64)
        .map(|days| number(days / 7.0))
}

/// Lower-case, dash-separated form of `name`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Derives `slug` from `name` whenever the name changes
#[derive(Debug, Default)]
pub struct SlugFromName;

#[async_trait]
impl SaveHook for SlugFromName {
    async fn before_save(&self, record: &mut Record) -> Result<()> {
        if record.is_modified("name") {
            if let Some(name) = record.get_str("name") {
                let slug = slugify(name);
                record.set("slug", slug);
            }
        }
        Ok(())
    }
}

/// Population directive for a tour's reviews
pub fn reviews() -> Populate {
    Populate::children("reviews", super::REVIEW, "tour")
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(
            "name",
            FieldSchema::string()
                .required("A tour must have a name")
                .unique()
                .trim()
                .max_length(40, "A tour name must have less or equal then 40 characters")
                .min_length(10, "A tour name must have more or equal then 10 characters"),
        )
        .field("slug", FieldSchema::string())
        .field("duration", FieldSchema::number().required("A tour must have a duration"))
        .field(
            "maxGroupSize",
            FieldSchema::number().required("A tour must have a group size"),
        )
        .field(
            "difficulty",
            FieldSchema::string()
                .required("A tour must have a difficulty")
                .one_of(&DIFFICULTIES, "Difficulty is either: easy, medium, difficult"),
        )
        .field(
            "ratingsAverage",
            FieldSchema::number()
                .default_value(DEFAULT_RATING)
                .min(1.0, "Rating must be above 1.0")
                .max(5.0, "Rating must be below 5.0")
                .round(1)
                .read_only(),
        )
        .field(
            "ratingsQuantity",
            FieldSchema::number().default_value(0).read_only(),
        )
        .field("price", FieldSchema::number().required("A tour must have a price"))
        .field(
            "priceDiscount",
            FieldSchema::number().validate(
                discount_below_price,
                "Discount price ({VALUE}) should be below regular price",
            ),
        )
        .field(
            "summary",
            FieldSchema::string().trim().required("A tour must have a summary"),
        )
        .field("description", FieldSchema::string().trim())
        .field(
            "imageCover",
            FieldSchema::string().required("A tour must have a cover image"),
        )
        .field("images", FieldSchema::array_of(FieldKind::String))
        .field("createdAt", FieldSchema::date().default_now().hidden())
        .field("startDates", FieldSchema::array_of(FieldKind::Date))
        .field("secretTour", FieldSchema::boolean().default_value(false))
        .field("startLocation", FieldSchema::object())
        .field("locations", FieldSchema::array_of(FieldKind::Object))
        .field("guides", FieldSchema::array_of(FieldKind::ObjectId))
}

/// Tour descriptor: secret tours hidden, guides populated, slug derived
pub fn descriptor() -> EntityDescriptor {
    EntityDescriptor::new(TOUR, "tours", schema())
        .index(IndexSpec::plain(["price", "ratingsAverage"]))
        .index(IndexSpec::plain(["slug"]))
        .virtual_field("durationWeeks", duration_weeks)
        .visible_when(Filter::new().and("secretTour", Op::Ne(Value::Bool(true))))
        .populate_on_query(Populate::reference("guides", USER).select(Projection::Exclude(vec![
            "__v".to_string(),
            "passwordChangedAt".to_string(),
        ])))
        .on_pre_save(SlugFromName)
}
