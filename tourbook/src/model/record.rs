//! Entity-instance operations
//!
//! A [`Record`] is one document plus the bookkeeping `save` needs: whether
//! it has been persisted yet and which fields changed since it was loaded.
//! Query-side operations live on [`Query`](super::Query) instead.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::store::{id_of, Document};

/// A document being created or modified
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    doc: Document,
    is_new: bool,
    modified: BTreeSet<String>,
}

impl Record {
    /// A record that has not been persisted; every field counts as modified
    pub fn new(doc: Document) -> Self {
        let modified = doc.keys().cloned().collect();
        Self {
            doc,
            is_new: true,
            modified,
        }
    }

    /// A record loaded from the store
    pub(crate) fn loaded(doc: Document) -> Self {
        Self {
            doc,
            is_new: false,
            modified: BTreeSet::new(),
        }
    }

    /// The record's `_id`
    pub fn id(&self) -> Option<&str> {
        id_of(&self.doc)
    }

    /// Field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.doc.get(field)
    }

    /// String field value
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.doc.get(field).and_then(Value::as_str)
    }

    /// Set a field and mark it modified
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.doc.insert(field.to_string(), value.into());
        self.modified.insert(field.to_string());
    }

    /// Remove a field and mark it modified
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.modified.insert(field.to_string());
        self.doc.remove(field)
    }

    /// Whether the record has never been persisted
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Whether `field` changed since load
    pub fn is_modified(&self, field: &str) -> bool {
        self.modified.contains(field)
    }

    /// Changed fields
    pub fn modified(&self) -> &BTreeSet<String> {
        &self.modified
    }

    /// The underlying document
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.is_new = false;
        self.modified.clear();
    }

    /// Consume into the document
    pub fn into_document(self) -> Document {
        self.doc
    }
}
