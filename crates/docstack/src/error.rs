use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationError / ValidationErrors
// ---------------------------------------------------------------------------

/// A single field-level schema failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub expected: String,
    pub received: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"Validation failed at "{}": expected {}, received {}"#,
            self.path, self.expected, self.received
        )
    }
}

impl std::error::Error for ValidationError {}

/// A collection of one or more `ValidationError`s.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed:")?;
        for e in &self.0 {
            write!(f, "\n  - {}: expected {}, received {}", e.path, e.expected, e.received)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ---------------------------------------------------------------------------
// PathError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Collection path component \"{0}\" must not be empty")]
    EmptyComponent(&'static str),

    #[error("Collection path component \"{component}\" must not contain '/': \"{value}\"")]
    Separator {
        component: &'static str,
        value: String,
    },

    #[error("Malformed collection path \"{0}\": expected \"bucket\" or \"bucket/bucketId/collection\"")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage corruption in {parent}/{id}: failed to parse \"{field}\" field")]
    Corruption {
        parent: String,
        id: String,
        field: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to serialize document \"{id}\": {source}")]
    Serialization {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid store identifier \"{0}\": only ASCII letters, digits and '_' are allowed")]
    InvalidIdentifier(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// DocStoreError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DocStoreError {
    /// The local cache could not be opened. Every call on the affected layer
    /// fails with this error.
    #[error("Failed to open local cache \"{cache}\": {message}")]
    CacheOpen { cache: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A write was refused before reaching the inner database.
    #[error("Rejected write of \"{id}\" to {path}: {validator} check failed: {reason}")]
    PutRejected {
        path: String,
        id: String,
        validator: String,
        reason: String,
    },

    /// The inner database accepted a write but returned a document that does
    /// not validate.
    #[error(
        "Backend returned an invalid document \"{id}\" for {path} after write: \
         {validator} check failed: {reason}"
    )]
    InvalidResponse {
        path: String,
        id: String,
        validator: String,
        reason: String,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error raised by a backend, passed through unchanged.
    #[error("{0}")]
    Remote(Box<dyn std::error::Error + Send + Sync>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocStoreError {
    /// Wrap an arbitrary backend error so it passes through the stack untouched.
    pub fn remote(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        DocStoreError::Remote(err.into())
    }
}

/// Convenience alias: the default error type is `DocStoreError`.
pub type Result<T, E = DocStoreError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
