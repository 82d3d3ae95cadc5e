//! Entity registry and model operations
//!
//! [`EntityDescriptor`]s are registered once at startup into an immutable
//! [`Database`]. A [`Model`] is a cheap handle pairing the database with one
//! descriptor; it runs the write pipelines and executes queries.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::hooks::{
    AggregateHook, AutoPopulate, HookSet, LifecycleEvent, QueryContext, QueryHook, SaveHook,
    Visibility, WriteChange, WriteHook,
};
use super::query::{PendingQuery, Populate, Query};
use super::record::Record;
use super::schema::Schema;
use crate::error::{Error, Result};
use crate::store::{
    id_of, is_id, new_id, Document, DocumentStore, Filter, FindOptions, IndexSpec, Op, Projection,
    Stage, ID_FIELD, VERSION_FIELD,
};

/// Message for reads and writes that target a missing record
pub const NOT_FOUND_MESSAGE: &str = "No document found with that ID";

/// Computes a virtual field from the stored document
pub type VirtualFn = fn(&Document) -> Option<Value>;

/// Everything the model layer knows about one entity type
pub struct EntityDescriptor {
    name: &'static str,
    collection: &'static str,
    schema: Schema,
    indexes: Vec<IndexSpec>,
    virtuals: Vec<(&'static str, VirtualFn)>,
    hooks: HookSet,
}

impl EntityDescriptor {
    /// Describe an entity stored in `collection`
    pub fn new(name: &'static str, collection: &'static str, schema: Schema) -> Self {
        Self {
            name,
            collection,
            schema,
            indexes: Vec::new(),
            virtuals: Vec::new(),
            hooks: HookSet::default(),
        }
    }

    /// Declare an index beyond the per-field unique ones
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a computed field to every returned document
    pub fn virtual_field(mut self, name: &'static str, compute: VirtualFn) -> Self {
        self.virtuals.push((name, compute));
        self
    }

    /// Hide records not matching `predicate` from reads and aggregations
    pub fn visible_when(mut self, predicate: Filter) -> Self {
        let visibility = Arc::new(Visibility::new(predicate));
        self.hooks.pre_query.push(visibility.clone());
        self.hooks.pre_aggregate.push(visibility);
        self
    }

    /// Eager-load `directive` on every read
    pub fn populate_on_query(self, directive: Populate) -> Self {
        self.on_pre_query(AutoPopulate::new(directive))
    }

    /// Register a pre-save hook
    pub fn on_pre_save(mut self, hook: impl SaveHook + 'static) -> Self {
        self.hooks.pre_save.push(Arc::new(hook));
        self
    }

    /// Register a pre-query hook
    pub fn on_pre_query(mut self, hook: impl QueryHook + 'static) -> Self {
        self.hooks.pre_query.push(Arc::new(hook));
        self
    }

    /// Register a pre-aggregate hook
    pub fn on_pre_aggregate(mut self, hook: impl AggregateHook + 'static) -> Self {
        self.hooks.pre_aggregate.push(Arc::new(hook));
        self
    }

    /// Register a hook for each of the given post-write events
    pub fn on_post(mut self, events: &[LifecycleEvent], hook: impl WriteHook + 'static) -> Self {
        let hook: Arc<dyn WriteHook> = Arc::new(hook);
        for event in events {
            match event {
                LifecycleEvent::PostSave => self.hooks.post_save.push(hook.clone()),
                LifecycleEvent::PostUpdate => self.hooks.post_update.push(hook.clone()),
                LifecycleEvent::PostDelete => self.hooks.post_delete.push(hook.clone()),
                other => tracing::warn!(entity = self.name, event = %other, "Not a post-write event"),
            }
        }
        self
    }

    /// Entity name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Backing collection
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// Field schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Registered hooks
    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    fn all_indexes(&self) -> Vec<IndexSpec> {
        let mut indexes = self.schema.unique_indexes();
        indexes.extend(self.indexes.iter().cloned());
        indexes
    }
}

impl std::fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Options for [`Model::save`]
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Run schema validation before persisting
    pub validate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Options for [`Model::update_by_id`]
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Validate the updated fields
    pub run_validators: bool,
    /// Update records hidden by the visibility predicate too
    pub bypass_visibility: bool,
    /// Apply changes to read-only fields instead of dropping them
    pub write_read_only: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            run_validators: true,
            bypass_visibility: false,
            write_read_only: false,
        }
    }
}

/// Immutable registry of entity descriptors over a document store
pub struct Database {
    store: Arc<dyn DocumentStore>,
    entities: HashMap<&'static str, EntityDescriptor>,
}

impl Database {
    /// Start registering entities
    pub fn builder(store: Arc<dyn DocumentStore>) -> DatabaseBuilder {
        DatabaseBuilder {
            store,
            entities: Vec::new(),
        }
    }

    /// Handle for a registered entity
    pub fn model(&self, name: &str) -> Result<Model<'_>> {
        self.entities
            .get(name)
            .map(|descriptor| Model {
                db: self,
                descriptor,
            })
            .ok_or_else(|| Error::Internal(format!("Unknown entity: {}", name)))
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects descriptors, then creates collections and indexes
pub struct DatabaseBuilder {
    store: Arc<dyn DocumentStore>,
    entities: Vec<EntityDescriptor>,
}

impl DatabaseBuilder {
    /// Register an entity
    pub fn register(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    /// Create collections and freeze the registry
    pub async fn build(self) -> Result<Database> {
        let mut entities = HashMap::new();
        for descriptor in self.entities {
            self.store
                .create_collection(descriptor.collection, &descriptor.all_indexes())
                .await?;
            tracing::debug!(entity = descriptor.name, hooks = ?descriptor.hooks, "Entity registered");
            entities.insert(descriptor.name, descriptor);
        }
        Ok(Database {
            store: self.store,
            entities,
        })
    }
}

/// Handle pairing the database with one entity
#[derive(Clone, Copy)]
pub struct Model<'db> {
    db: &'db Database,
    descriptor: &'db EntityDescriptor,
}

impl<'db> Model<'db> {
    /// Entity name
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// The entity's descriptor
    pub fn descriptor(&self) -> &'db EntityDescriptor {
        self.descriptor
    }

    /// The owning database
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Start a read over all (visible) records
    pub fn find(&self) -> Query<'db> {
        Query::new(*self)
    }

    /// Start a read for one record
    pub fn find_by_id(&self, id: &str) -> Query<'db> {
        self.find().filter(Filter::by_id(id))
    }

    /// Validate and persist a new record built from `input`
    pub async fn create(&self, mut input: Document) -> Result<Document> {
        input.remove(ID_FIELD);
        input.remove(VERSION_FIELD);
        self.descriptor.schema.strip_read_only(&mut input);
        let mut record = Record::new(input);
        self.save(&mut record, SaveOptions::default()).await
    }

    /// Persist a new or loaded record through the save pipeline
    ///
    /// Cast, defaults (new records only), validation, pre-save hooks,
    /// persistence, post-save hooks. Returns the document as clients see it.
    pub async fn save(&self, record: &mut Record, options: SaveOptions) -> Result<Document> {
        let schema = &self.descriptor.schema;
        let is_new = record.is_new();

        let modified: Vec<String> = record.modified().iter().cloned().collect();
        schema.cast_fields(record.document_mut(), &modified)?;

        if is_new {
            let doc = record.document_mut();
            if !doc.get(ID_FIELD).and_then(Value::as_str).map(is_id).unwrap_or(false) {
                doc.insert(ID_FIELD.to_string(), Value::String(new_id()));
            }
            schema.apply_defaults(doc);
            doc.insert(VERSION_FIELD.to_string(), Value::from(0));
        }

        if options.validate {
            let paths = if is_new { None } else { Some(record.modified()) };
            schema.validate(record.document(), paths)?;
        }

        for hook in &self.descriptor.hooks.pre_save {
            hook.before_save(record).await?;
        }

        let collection = self.descriptor.collection;
        let doc = record.document().clone();
        let stored = if is_new {
            self.db.store.insert_one(collection, doc).await?
        } else {
            self.db
                .store
                .replace_one(collection, doc)
                .await?
                .ok_or_else(|| Error::NotFound(NOT_FOUND_MESSAGE.to_string()))?
        };
        record.mark_persisted();
        tracing::debug!(entity = self.name(), id = ?id_of(&stored), is_new, "Record saved");

        self.run_post(LifecycleEvent::PostSave, &stored, None).await?;
        Ok(self.present(self.strip_hidden(stored)))
    }

    /// Apply a partial update to a visible record
    ///
    /// Only fields the schema knows are applied. Validators run for the
    /// updated fields; pre-save hooks do not run. Returns `None` when no
    /// visible record has that id.
    pub async fn update_by_id(
        &self,
        id: &str,
        mut changes: Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>> {
        let schema = &self.descriptor.schema;
        let mut lookup = self.find_by_id(id);
        if options.bypass_visibility {
            lookup = lookup.bypass_visibility();
        }
        let Some(record) = lookup.clone().exec_record().await? else {
            return Ok(None);
        };

        changes.remove(ID_FIELD);
        changes.remove(VERSION_FIELD);
        if !options.write_read_only {
            schema.strip_read_only(&mut changes);
        }
        let names: Vec<String> = changes.keys().cloned().collect();
        schema.cast_fields(&mut changes, &names)?;

        let paths: BTreeSet<String> = changes.keys().cloned().collect();
        let previous = record.into_document();
        let mut doc = previous.clone();
        doc.extend(changes);
        if options.run_validators {
            schema.validate(&doc, Some(&paths))?;
        }

        let Some(stored) = self
            .db
            .store
            .replace_one(self.descriptor.collection, doc)
            .await?
        else {
            return Ok(None);
        };
        tracing::debug!(entity = self.name(), id, fields = ?paths, "Record updated");

        self.run_post(LifecycleEvent::PostUpdate, &stored, Some(&previous)).await?;
        match lookup.exec_one().await? {
            Some(view) => Ok(Some(view)),
            None => Ok(Some(self.present(self.strip_hidden(stored)))),
        }
    }

    /// Delete a visible record, returning it
    pub async fn delete_by_id(&self, id: &str) -> Result<Option<Document>> {
        let Some(record) = self.find_by_id(id).exec_record().await? else {
            return Ok(None);
        };
        let Some(record_id) = record.id() else {
            return Ok(None);
        };
        let Some(removed) = self
            .db
            .store
            .delete_one(self.descriptor.collection, record_id)
            .await?
        else {
            return Ok(None);
        };
        tracing::debug!(entity = self.name(), id, "Record deleted");

        self.run_post(LifecycleEvent::PostDelete, &removed, None).await?;
        Ok(Some(self.present(self.strip_hidden(removed))))
    }

    /// Run an aggregation pipeline after pre-aggregate hooks
    pub async fn aggregate(&self, mut stages: Vec<Stage>) -> Result<Vec<Document>> {
        let ctx = self.context(false);
        for hook in &self.descriptor.hooks.pre_aggregate {
            hook.before_aggregate(&mut stages, &ctx);
        }
        Ok(self
            .db
            .store
            .aggregate(self.descriptor.collection, &stages)
            .await?)
    }

    /// Add `id` and the descriptor's virtual fields
    pub fn present(&self, mut doc: Document) -> Document {
        if let Some(id) = doc.get(ID_FIELD).cloned() {
            doc.insert("id".to_string(), id);
        }
        for (name, compute) in &self.descriptor.virtuals {
            if let Some(value) = compute(&doc) {
                doc.insert(name.to_string(), value);
            }
        }
        doc
    }

    /// Remove the fields the schema hides
    pub fn strip_hidden(&self, mut doc: Document) -> Document {
        for field in self.descriptor.schema.hidden_fields() {
            doc.remove(&field);
        }
        doc
    }

    fn context(&self, bypass_visibility: bool) -> QueryContext {
        QueryContext {
            entity: self.descriptor.name,
            bypass_visibility,
        }
    }

    async fn run_post(
        &self,
        event: LifecycleEvent,
        doc: &Document,
        previous: Option<&Document>,
    ) -> Result<()> {
        let change = WriteChange { event, doc, previous };
        for hook in self.descriptor.hooks.post(event) {
            hook.after_write(change, self.db).await?;
        }
        Ok(())
    }

    fn prepare(&self, pending: &mut PendingQuery) -> Result<Filter> {
        let ctx = self.context(pending.bypass_visibility);
        for hook in &self.descriptor.hooks.pre_query {
            hook.before_query(pending, &ctx);
        }
        self.descriptor
            .schema
            .cast_filter(std::mem::take(&mut pending.filter))
    }

    fn effective_projection(&self, pending: &PendingQuery) -> Projection {
        if pending.raw {
            return Projection::All;
        }
        let hidden: Vec<String> = self
            .descriptor
            .schema
            .hidden_fields()
            .into_iter()
            .filter(|f| !pending.reveal.contains(f))
            .collect();
        match &pending.projection {
            Projection::All if hidden.is_empty() => Projection::All,
            Projection::All => Projection::Exclude(hidden),
            Projection::Include(fields) => Projection::Include(
                fields
                    .iter()
                    .filter(|f| !hidden.contains(f))
                    .chain(pending.reveal.iter())
                    .cloned()
                    .collect(),
            ),
            Projection::Exclude(fields) => {
                Projection::Exclude(fields.iter().cloned().chain(hidden).collect())
            }
        }
    }

    pub(crate) fn run_query(self, mut pending: PendingQuery) -> BoxFuture<'db, Result<Vec<Document>>> {
        Box::pin(async move {
            let filter = self.prepare(&mut pending)?;
            let options = FindOptions {
                sort: pending.sort.clone(),
                projection: self.effective_projection(&pending),
                skip: pending.skip,
                limit: pending.limit,
            };
            let mut docs = self
                .db
                .store
                .find(self.descriptor.collection, &filter, &options)
                .await?;
            if pending.raw {
                return Ok(docs);
            }
            for directive in &pending.populate {
                self.populate(&mut docs, directive).await?;
            }
            Ok(docs.into_iter().map(|d| self.present(d)).collect())
        })
    }

    pub(crate) async fn run_count(self, mut pending: PendingQuery) -> Result<usize> {
        let filter = self.prepare(&mut pending)?;
        Ok(self.db.store.count(self.descriptor.collection, &filter).await?)
    }

    async fn populate(&self, docs: &mut [Document], directive: &Populate) -> Result<()> {
        match directive {
            Populate::Ref {
                path,
                model,
                projection,
            } => {
                let mut seen = HashSet::new();
                let ids: Vec<Value> = docs
                    .iter()
                    .filter_map(|d| d.get(path))
                    .flat_map(|v| match v {
                        Value::Array(items) => items.clone(),
                        single => vec![single.clone()],
                    })
                    .filter(|v| v.as_str().map(|s| seen.insert(s.to_string())).unwrap_or(false))
                    .collect();
                if ids.is_empty() {
                    return Ok(());
                }

                let target = self.db.model(model)?;
                let pending = PendingQuery {
                    filter: Filter::new().and(ID_FIELD, Op::In(ids)),
                    projection: projection.clone(),
                    ..PendingQuery::default()
                };
                let related: HashMap<String, Document> = target
                    .run_query(pending)
                    .await?
                    .into_iter()
                    .filter_map(|d| Some((id_of(&d)?.to_string(), d)))
                    .collect();

                for doc in docs.iter_mut() {
                    let replacement = match doc.get(path) {
                        Some(Value::String(id)) => Some(
                            related
                                .get(id)
                                .cloned()
                                .map(Value::Object)
                                .unwrap_or(Value::Null),
                        ),
                        Some(Value::Array(items)) => Some(Value::Array(
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .filter_map(|id| related.get(id).cloned().map(Value::Object))
                                .collect(),
                        )),
                        _ => None,
                    };
                    if let Some(value) = replacement {
                        doc.insert(path.clone(), value);
                    }
                }
            }
            Populate::Virtual {
                name,
                model,
                foreign_field,
                projection,
            } => {
                let ids: Vec<Value> = docs
                    .iter()
                    .filter_map(|d| d.get(ID_FIELD).cloned())
                    .collect();
                if ids.is_empty() {
                    return Ok(());
                }

                let target = self.db.model(model)?;
                let pending = PendingQuery {
                    filter: Filter::new().and(foreign_field.clone(), Op::In(ids)),
                    projection: projection.clone(),
                    ..PendingQuery::default()
                };
                let children = target.run_query(pending).await?;

                for doc in docs.iter_mut() {
                    let Some(id) = doc.get(ID_FIELD).cloned() else {
                        continue;
                    };
                    let mine: Vec<Value> = children
                        .iter()
                        .filter(|c| c.get(foreign_field.as_str()) == Some(&id))
                        .cloned()
                        .map(Value::Object)
                        .collect();
                    doc.insert(name.clone(), Value::Array(mine));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Model<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").field("name", &self.name()).finish()
    }
}
