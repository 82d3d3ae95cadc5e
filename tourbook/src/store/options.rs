//! Sort, projection and paging options for reads

use std::fmt;

use super::document::{get_path, remove_path, set_path, Document, ID_FIELD};

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// One sort key; keys apply in left-to-right priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Dotted field path
    pub field: String,
    /// Direction
    pub direction: SortDirection,
}

impl SortKey {
    /// Ascending key
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending key
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Parse `price` / `-price`; `None` for an empty token
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.strip_prefix('-') {
            Some("") => None,
            Some(field) => Some(Self::desc(field)),
            None if token.is_empty() => None,
            None => Some(Self::asc(token.trim_start_matches('+'))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{}", self.field),
            SortDirection::Descending => write!(f, "-{}", self.field),
        }
    }
}

/// Which fields a read returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Every stored field
    #[default]
    All,
    /// Only these fields (plus `_id`)
    Include(Vec<String>),
    /// Every field except these
    Exclude(Vec<String>),
}

impl Projection {
    /// Apply to a document
    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Projection::All => doc,
            Projection::Include(fields) => {
                let mut projected = Document::new();
                if let Some(id) = doc.get(ID_FIELD) {
                    projected.insert(ID_FIELD.to_string(), id.clone());
                }
                for field in fields {
                    if let Some(value) = get_path(&doc, field) {
                        set_path(&mut projected, field, value.clone());
                    }
                }
                projected
            }
            Projection::Exclude(fields) => {
                let mut doc = doc;
                for field in fields {
                    remove_path(&mut doc, field);
                }
                doc
            }
        }
    }

    /// Whether `field` survives this projection
    pub fn keeps(&self, field: &str) -> bool {
        match self {
            Projection::All => true,
            Projection::Include(fields) => field == ID_FIELD || fields.iter().any(|f| f == field),
            Projection::Exclude(fields) => !fields.iter().any(|f| f == field),
        }
    }
}

/// Options for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort keys; `_id` is always the final tie-breaker
    pub sort: Vec<SortKey>,
    /// Projection
    pub projection: Projection,
    /// Documents to skip
    pub skip: usize,
    /// Maximum documents to return
    pub limit: Option<usize>,
}

/// Index declaration for a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed fields
    pub fields: Vec<String>,
    /// Whether the index rejects duplicate keys
    pub unique: bool,
}

impl IndexSpec {
    /// Unique index over `fields`
    pub fn unique<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            unique: true,
        }
    }

    /// Non-unique index over `fields`
    pub fn plain<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }
}
