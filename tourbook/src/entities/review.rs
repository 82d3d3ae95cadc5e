//! Reviews and the tour rating rollup

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{
    Database, EntityDescriptor, FieldSchema, LifecycleEvent, Populate, Schema, UpdateOptions,
    WriteChange, WriteHook,
};
use crate::store::{Accumulator, Document, Filter, Group, GroupKey, IndexSpec, Op, Projection, Stage};

use super::tour::DEFAULT_RATING;
use super::{REVIEW, TOUR, USER};

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field("review", FieldSchema::string().required("Review can not be empty"))
        .field(
            "rating",
            FieldSchema::number()
                .min(1.0, "Rating must be above 1.0")
                .max(5.0, "Rating must be below 5.0"),
        )
        .field("createdAt", FieldSchema::date().default_now())
        .field(
            "tour",
            FieldSchema::object_id().required("Review must belong to a tour"),
        )
        .field(
            "user",
            FieldSchema::object_id().required("Review must belong to a user"),
        )
}

/// Recompute a tour's `ratingsQuantity` and `ratingsAverage` from its reviews
///
/// Without reviews the tour goes back to 0 and the default rating.
pub async fn recompute_ratings(db: &Database, tour_id: &str) -> Result<()> {
    let stats = db
        .model(REVIEW)?
        .aggregate(vec![
            Stage::Match(Filter::new().and("tour", Op::Eq(json!(tour_id)))),
            Stage::Group(Group {
                key: GroupKey::Field("tour".to_string()),
                fields: vec![
                    ("nRating".to_string(), Accumulator::Count),
                    ("avgRating".to_string(), Accumulator::Avg("rating".to_string())),
                ],
            }),
        ])
        .await?;

    let (quantity, average) = match stats.first() {
        Some(group) => (
            group.get("nRating").cloned().unwrap_or(json!(0)),
            group
                .get("avgRating")
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or(json!(DEFAULT_RATING)),
        ),
        None => (json!(0), json!(DEFAULT_RATING)),
    };

    let mut changes = Document::new();
    changes.insert("ratingsQuantity".to_string(), quantity);
    changes.insert("ratingsAverage".to_string(), average);
    let options = UpdateOptions {
        run_validators: false,
        bypass_visibility: true,
        write_read_only: true,
    };
    db.model(TOUR)?.update_by_id(tour_id, changes, options).await?;
    tracing::debug!(tour = tour_id, "Tour ratings recomputed");
    Ok(())
}

/// Keeps the parent tour's rating statistics current
#[derive(Debug, Default)]
pub struct RatingsRollup;

#[async_trait]
impl WriteHook for RatingsRollup {
    async fn after_write(&self, change: WriteChange<'_>, db: &Database) -> Result<()> {
        let tour_of = |doc: &Document| doc.get("tour").and_then(Value::as_str).map(str::to_string);
        let current = tour_of(change.doc);
        if let Some(tour_id) = &current {
            recompute_ratings(db, tour_id).await?;
        }
        // A review moved to another tour leaves its old tour behind
        if let Some(previous) = change.previous.and_then(tour_of) {
            if current.as_ref() != Some(&previous) {
                recompute_ratings(db, &previous).await?;
            }
        }
        Ok(())
    }
}

/// Review descriptor: one review per user and tour, author populated
pub fn descriptor() -> EntityDescriptor {
    EntityDescriptor::new(REVIEW, "reviews", schema())
        .index(IndexSpec::unique(["tour", "user"]))
        .populate_on_query(Populate::reference("user", USER).select(Projection::Include(vec![
            "name".to_string(),
            "photo".to_string(),
        ])))
        .on_post(
            &[
                LifecycleEvent::PostSave,
                LifecycleEvent::PostUpdate,
                LifecycleEvent::PostDelete,
            ],
            RatingsRollup,
        )
}
