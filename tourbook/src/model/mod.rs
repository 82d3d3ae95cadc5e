//! Entity model layer
//!
//! Entities are declared as [`EntityDescriptor`]s (schema, indexes, virtual
//! fields, lifecycle hooks) and registered into a [`Database`] at startup.
//! All reads go through [`Query`], all writes through [`Model`], so hooks
//! fire for every access path.

mod database;
mod hooks;
mod query;
mod record;
mod schema;
mod validation;

pub use database::{
    Database, DatabaseBuilder, EntityDescriptor, Model, SaveOptions, UpdateOptions, VirtualFn,
    NOT_FOUND_MESSAGE,
};
pub use hooks::{
    AggregateHook, AutoPopulate, HookSet, LifecycleEvent, QueryContext, QueryHook, SaveHook,
    Visibility, WriteChange, WriteHook,
};
pub use query::{PendingQuery, Populate, Query};
pub use record::Record;
pub use schema::{render, CheckFn, DefaultValue, FieldKind, FieldSchema, Schema};
pub use validation::{FieldError, ValidationErrors};
