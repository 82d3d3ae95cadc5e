//! Query-builder operations
//!
//! A [`Query`] wraps a [`PendingQuery`] for one model. Nothing touches the
//! store until [`Query::exec`]; pre-query hooks run at that point.

use serde_json::Value;

use super::database::Model;
use super::record::Record;
use crate::error::Result;
use crate::store::{Document, Filter, Op, Projection, SortKey};

/// Eager loading of related records
#[derive(Debug, Clone, PartialEq)]
pub enum Populate {
    /// Replace ids stored at `path` with the referenced records
    Ref {
        /// Field holding one id or an array of ids
        path: String,
        /// Referenced entity
        model: &'static str,
        /// Fields to load from the referenced records
        projection: Projection,
    },
    /// Attach records of `model` whose `foreign_field` equals this record's `_id`
    Virtual {
        /// Output field
        name: String,
        /// Child entity
        model: &'static str,
        /// Child field referencing the parent
        foreign_field: String,
        /// Fields to load from the children
        projection: Projection,
    },
}

impl Populate {
    /// Populate the reference at `path`
    pub fn reference(path: impl Into<String>, model: &'static str) -> Self {
        Populate::Ref {
            path: path.into(),
            model,
            projection: Projection::All,
        }
    }

    /// Populate children of `model` referencing this record through `foreign_field`
    pub fn children(name: impl Into<String>, model: &'static str, foreign_field: impl Into<String>) -> Self {
        Populate::Virtual {
            name: name.into(),
            model,
            foreign_field: foreign_field.into(),
            projection: Projection::All,
        }
    }

    /// Restrict the loaded fields
    pub fn select(self, projection: Projection) -> Self {
        match self {
            Populate::Ref { path, model, .. } => Populate::Ref {
                path,
                model,
                projection,
            },
            Populate::Virtual {
                name,
                model,
                foreign_field,
                ..
            } => Populate::Virtual {
                name,
                model,
                foreign_field,
                projection,
            },
        }
    }

    /// Output field of this directive
    pub fn target(&self) -> &str {
        match self {
            Populate::Ref { path, .. } => path,
            Populate::Virtual { name, .. } => name,
        }
    }
}

/// A not-yet-executed read
///
/// Built in the order filter, sort, projection, pagination. The store always
/// appends `_id` as the last sort key, so pages are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQuery {
    /// Conjunction of conditions
    pub filter: Filter,
    /// Sort keys, highest priority first
    pub sort: Vec<SortKey>,
    /// Requested fields
    pub projection: Projection,
    /// Hidden fields to include anyway
    pub reveal: Vec<String>,
    /// Documents to skip
    pub skip: usize,
    /// Maximum documents
    pub limit: Option<usize>,
    /// Eager loading directives
    pub populate: Vec<Populate>,
    /// Skip default visibility predicates
    pub bypass_visibility: bool,
    /// Return stored documents as-is: every hidden field, no population, no virtuals
    pub(crate) raw: bool,
}

impl PendingQuery {
    /// Add a population directive unless one already targets the same field
    pub fn add_populate(&mut self, directive: Populate) {
        if !self.populate.iter().any(|p| p.target() == directive.target()) {
            self.populate.push(directive);
        }
    }
}

/// Chainable read over one model
#[derive(Clone)]
pub struct Query<'db> {
    model: Model<'db>,
    pending: PendingQuery,
}

impl<'db> Query<'db> {
    pub(crate) fn new(model: Model<'db>) -> Self {
        Self {
            model,
            pending: PendingQuery::default(),
        }
    }

    /// Add every condition of `filter`
    pub fn filter(mut self, filter: Filter) -> Self {
        self.pending.filter.extend(filter);
        self
    }

    /// Add one condition
    pub fn and(mut self, field: impl Into<String>, op: Op) -> Self {
        self.pending.filter = self.pending.filter.and(field, op);
        self
    }

    /// Equality shorthand
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(field, Op::Eq(value.into()))
    }

    /// Replace the sort keys
    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.pending.sort = keys;
        self
    }

    /// Replace the projection
    pub fn select(mut self, projection: Projection) -> Self {
        self.pending.projection = projection;
        self
    }

    /// Include a hidden field
    pub fn reveal(mut self, field: impl Into<String>) -> Self {
        self.pending.reveal.push(field.into());
        self
    }

    /// Skip `n` documents
    pub fn skip(mut self, n: usize) -> Self {
        self.pending.skip = n;
        self
    }

    /// Return at most `n` documents
    pub fn limit(mut self, n: usize) -> Self {
        self.pending.limit = Some(n);
        self
    }

    /// Eager-load related records
    pub fn populate(mut self, directive: Populate) -> Self {
        self.pending.add_populate(directive);
        self
    }

    /// Include records hidden by the default visibility predicate
    pub fn bypass_visibility(mut self) -> Self {
        self.pending.bypass_visibility = true;
        self
    }

    /// The pending read
    pub fn pending(&self) -> &PendingQuery {
        &self.pending
    }

    /// Mutable access to the pending read
    pub fn pending_mut(&mut self) -> &mut PendingQuery {
        &mut self.pending
    }

    /// The queried model
    pub fn model(&self) -> Model<'db> {
        self.model
    }

    /// Run the read
    pub async fn exec(self) -> Result<Vec<Document>> {
        self.model.run_query(self.pending).await
    }

    /// Run the read and return the first document
    pub async fn exec_one(mut self) -> Result<Option<Document>> {
        self.pending.limit = Some(1);
        Ok(self.model.run_query(self.pending).await?.into_iter().next())
    }

    /// Run the read for the stored form of the first match, ready to modify and save
    pub async fn exec_record(mut self) -> Result<Option<Record>> {
        self.pending.raw = true;
        self.pending.limit = Some(1);
        Ok(self
            .model
            .run_query(self.pending)
            .await?
            .into_iter()
            .next()
            .map(Record::loaded))
    }

    /// Count matching documents (visibility applies, paging does not)
    pub async fn count(self) -> Result<usize> {
        self.model.run_count(self.pending).await
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model.name())
            .field("pending", &self.pending)
            .finish()
    }
}
