//! Store error types
//!
//! Structured errors for document store operations. The model layer maps
//! duplicate-key failures to user-facing messages; everything else is an
//! internal failure.
//!
//! # Example
//!
//! ```rust
//! use tourbook::store::{StoreError, StoreErrorKind};
//!
//! let error = StoreError::duplicate_key("tours", &["name".to_string()], "\"The Forest Hiker\"");
//! assert!(matches!(error.kind, StoreErrorKind::DuplicateKey));
//! assert_eq!(error.key_value.as_deref(), Some("\"The Forest Hiker\""));
//! ```

use std::fmt;

/// Operation being performed when the store error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Creating a collection and its indexes
    CreateCollection,
    /// Inserting a document
    Insert,
    /// Finding documents
    Find,
    /// Counting documents
    Count,
    /// Replacing a document
    Replace,
    /// Deleting a document
    Delete,
    /// Running an aggregation pipeline
    Aggregate,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateCollection => write!(f, "create_collection"),
            Self::Insert => write!(f, "insert"),
            Self::Find => write!(f, "find"),
            Self::Count => write!(f, "count"),
            Self::Replace => write!(f, "replace"),
            Self::Delete => write!(f, "delete"),
            Self::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// Category of store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// A unique index rejected the write
    DuplicateKey,
    /// The document is malformed (for example, missing `_id`)
    InvalidDocument,
    /// The aggregation pipeline cannot be executed
    InvalidPipeline,
    /// The store cannot be reached
    Unavailable,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey => write!(f, "duplicate_key"),
            Self::InvalidDocument => write!(f, "invalid_document"),
            Self::InvalidPipeline => write!(f, "invalid_pipeline"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Structured store error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// The operation being performed when the error occurred
    pub operation: StoreOperation,
    /// The category of error
    pub kind: StoreErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The collection involved
    pub collection: Option<String>,
    /// Offending key value for duplicate-key errors, rendered as JSON
    pub key_value: Option<String>,
}

impl StoreError {
    /// Create a new store error
    pub fn new(
        operation: StoreOperation,
        kind: StoreErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            collection: None,
            key_value: None,
        }
    }

    /// Attach the collection name
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Unique index violation on `fields` with the given rendered value
    pub fn duplicate_key(collection: &str, fields: &[String], value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            operation: StoreOperation::Insert,
            kind: StoreErrorKind::DuplicateKey,
            message: format!(
                "E11000 duplicate key error collection: {} index: {} dup key: {}",
                collection,
                fields.join("_"),
                value
            ),
            collection: Some(collection.to_string()),
            key_value: Some(value),
        }
    }

    /// Malformed document for the given operation
    pub fn invalid_document(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::InvalidDocument, message)
    }

    /// Pipeline that cannot run
    pub fn invalid_pipeline(message: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::Aggregate,
            StoreErrorKind::InvalidPipeline,
            message,
        )
    }

    /// Whether a unique index rejected the write
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self.kind, StoreErrorKind::DuplicateKey)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref collection) = self.collection {
            write!(f, " [{}]", collection)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}
