//! Entity lifecycle hooks
//!
//! Hooks are registered per [`LifecycleEvent`] in typed lists on a
//! [`HookSet`]. Writes pass through `pending -> validated -> persisted`:
//! pre-save hooks run after validation and before persistence, post-write
//! hooks run after persistence and receive a [`WriteChange`] carrying the
//! affected document, plus its prior state for updates.
//! Reads pass through `constructed -> filtered-by-visibility -> populated ->
//! executed`: pre-query hooks adjust the [`PendingQuery`] before execution.
//!
//! A hook error aborts the operation that triggered it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::database::Database;
use super::query::{PendingQuery, Populate};
use super::record::Record;
use crate::error::Result;
use crate::store::{Document, Filter, Stage};

/// Points in an entity's lifecycle where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Before a record is persisted by `save`
    PreSave,
    /// Before a read executes
    PreQuery,
    /// Before an aggregation pipeline executes
    PreAggregate,
    /// After `save` persisted a record
    PostSave,
    /// After a partial update persisted a record
    PostUpdate,
    /// After a record was deleted
    PostDelete,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreSave => write!(f, "pre_save"),
            Self::PreQuery => write!(f, "pre_query"),
            Self::PreAggregate => write!(f, "pre_aggregate"),
            Self::PostSave => write!(f, "post_save"),
            Self::PostUpdate => write!(f, "post_update"),
            Self::PostDelete => write!(f, "post_delete"),
        }
    }
}

/// Read-side context handed to query and aggregate hooks
#[derive(Debug, Clone, Copy)]
pub struct QueryContext {
    /// Entity being queried
    pub entity: &'static str,
    /// Skip default visibility predicates
    pub bypass_visibility: bool,
}

/// Runs before a record is persisted; may change the record
#[async_trait]
pub trait SaveHook: Send + Sync {
    /// Adjust `record` before it is written
    async fn before_save(&self, record: &mut Record) -> Result<()>;
}

/// Runs before a read executes
pub trait QueryHook: Send + Sync {
    /// Adjust the pending read
    fn before_query(&self, query: &mut PendingQuery, ctx: &QueryContext);
}

/// Runs before an aggregation pipeline executes
pub trait AggregateHook: Send + Sync {
    /// Adjust the pipeline
    fn before_aggregate(&self, stages: &mut Vec<Stage>, ctx: &QueryContext);
}

/// A persisted write, as seen by post-write hooks
#[derive(Debug, Clone, Copy)]
pub struct WriteChange<'a> {
    /// `PostSave`, `PostUpdate` or `PostDelete`
    pub event: LifecycleEvent,
    /// The stored document (the removed one for deletes)
    pub doc: &'a Document,
    /// The stored document before a partial update
    pub previous: Option<&'a Document>,
}

/// Runs after a record was saved, updated or deleted
#[async_trait]
pub trait WriteHook: Send + Sync {
    /// React to a persisted change
    async fn after_write(&self, change: WriteChange<'_>, db: &Database) -> Result<()>;
}

/// Typed hook lists, one per lifecycle event
#[derive(Default, Clone)]
pub struct HookSet {
    pub(crate) pre_save: Vec<Arc<dyn SaveHook>>,
    pub(crate) pre_query: Vec<Arc<dyn QueryHook>>,
    pub(crate) pre_aggregate: Vec<Arc<dyn AggregateHook>>,
    pub(crate) post_save: Vec<Arc<dyn WriteHook>>,
    pub(crate) post_update: Vec<Arc<dyn WriteHook>>,
    pub(crate) post_delete: Vec<Arc<dyn WriteHook>>,
}

impl HookSet {
    /// Number of hooks registered for `event`
    pub fn count(&self, event: LifecycleEvent) -> usize {
        match event {
            LifecycleEvent::PreSave => self.pre_save.len(),
            LifecycleEvent::PreQuery => self.pre_query.len(),
            LifecycleEvent::PreAggregate => self.pre_aggregate.len(),
            LifecycleEvent::PostSave => self.post_save.len(),
            LifecycleEvent::PostUpdate => self.post_update.len(),
            LifecycleEvent::PostDelete => self.post_delete.len(),
        }
    }

    pub(crate) fn post(&self, event: LifecycleEvent) -> &[Arc<dyn WriteHook>] {
        match event {
            LifecycleEvent::PostSave => &self.post_save,
            LifecycleEvent::PostUpdate => &self.post_update,
            LifecycleEvent::PostDelete => &self.post_delete,
            _ => &[],
        }
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("pre_save", &self.pre_save.len())
            .field("pre_query", &self.pre_query.len())
            .field("pre_aggregate", &self.pre_aggregate.len())
            .field("post_save", &self.post_save.len())
            .field("post_update", &self.post_update.len())
            .field("post_delete", &self.post_delete.len())
            .finish()
    }
}

/// Default visibility predicate for reads and aggregations
///
/// Skipped when the query asks to bypass visibility. In pipelines the match
/// goes right after a leading geo-near stage, which must stay first.
#[derive(Debug, Clone)]
pub struct Visibility {
    predicate: Filter,
}

impl Visibility {
    /// Only records matching `predicate` are visible
    pub fn new(predicate: Filter) -> Self {
        Self { predicate }
    }
}

impl QueryHook for Visibility {
    fn before_query(&self, query: &mut PendingQuery, ctx: &QueryContext) {
        if !ctx.bypass_visibility {
            query.filter.extend(self.predicate.clone());
        }
    }
}

impl AggregateHook for Visibility {
    fn before_aggregate(&self, stages: &mut Vec<Stage>, ctx: &QueryContext) {
        if ctx.bypass_visibility {
            return;
        }
        let at = match stages.first() {
            Some(Stage::GeoNear(_)) => 1,
            _ => 0,
        };
        stages.insert(at, Stage::Match(self.predicate.clone()));
    }
}

/// Attach a population directive to every read
#[derive(Debug, Clone)]
pub struct AutoPopulate {
    directive: Populate,
}

impl AutoPopulate {
    /// Populate `directive` on every read
    pub fn new(directive: Populate) -> Self {
        Self { directive }
    }
}

impl QueryHook for AutoPopulate {
    fn before_query(&self, query: &mut PendingQuery, _ctx: &QueryContext) {
        query.add_populate(self.directive.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GeoNear, GeoPoint, Op};
    use serde_json::json;

    fn secret_filter() -> Filter {
        Filter::new().and("secretTour", Op::Ne(json!(true)))
    }

    #[test]
    fn test_visibility_respects_bypass() {
        let hook = Visibility::new(secret_filter());
        let mut query = PendingQuery::default();
        hook.before_query(
            &mut query,
            &QueryContext { entity: "Tour", bypass_visibility: true },
        );
        assert!(query.filter.is_empty());

        hook.before_query(
            &mut query,
            &QueryContext { entity: "Tour", bypass_visibility: false },
        );
        assert_eq!(query.filter, secret_filter());
    }

    #[test]
    fn test_visibility_goes_after_geo_near() {
        let hook = Visibility::new(secret_filter());
        let ctx = QueryContext { entity: "Tour", bypass_visibility: false };

        let mut plain = vec![Stage::Limit(3)];
        hook.before_aggregate(&mut plain, &ctx);
        assert!(matches!(plain[0], Stage::Match(_)));

        let mut geo = vec![Stage::GeoNear(GeoNear {
            near: GeoPoint::new(0.0, 0.0),
            key: "startLocation".into(),
            distance_field: "distance".into(),
            distance_multiplier: 1.0,
        })];
        hook.before_aggregate(&mut geo, &ctx);
        assert!(matches!(geo[0], Stage::GeoNear(_)));
        assert!(matches!(geo[1], Stage::Match(_)));
    }

    #[test]
    fn test_auto_populate_does_not_duplicate() {
        let hook = AutoPopulate::new(Populate::reference("guides", "User"));
        let mut query = PendingQuery::default();
        let ctx = QueryContext { entity: "Tour", bypass_visibility: false };
        hook.before_query(&mut query, &ctx);
        hook.before_query(&mut query, &ctx);
        assert_eq!(query.populate.len(), 1);
    }
}
