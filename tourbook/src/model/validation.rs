//! Schema validation failures

use std::fmt;

/// One failing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field path
    pub path: String,
    /// User-facing message
    pub message: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every failing field of one validation pass, in schema order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Empty error set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure
    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Whether nothing failed
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The failures
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether `path` failed
    pub fn has(&self, path: &str) -> bool {
        self.errors.iter().any(|e| e.path == path)
    }

    /// `Ok` when empty
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(". ");
        write!(f, "{}", joined)
    }
}

impl std::error::Error for ValidationErrors {}
