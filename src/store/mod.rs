//! Document store port.
//!
//! The core only needs three primitives from its database: create a
//! document, query documents by top-level field equality, and patch named
//! fields of one document under an optimistic-concurrency precondition.

mod memory;
mod postgres;

pub use memory::*;
pub use postgres::*;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`DocumentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document already exists")]
    Conflict,
    #[error("document not found")]
    NotFound,
    #[error("document changed since it was read")]
    PreconditionFailed,
    #[error("stored document is malformed: {0}")]
    Corrupt(String),
    #[error("store unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Opaque version marker of a stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub id: String,
    /// Partition key, unique across the collection.
    pub partition_key: String,
    pub body: Value,
}

/// A stored document with its current version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub partition_key: String,
    pub etag: ETag,
    pub body: Value,
}

/// Equality filter on top-level body fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Check whether `body` satisfies every condition.
    pub fn matches(&self, body: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, value)| body.get(field) == Some(value))
    }

    /// Filter as a JSON object, suitable for containment queries.
    pub fn as_json(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// A single field-level mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Replace (or create) a top-level field.
    Set { field: String, value: Value },
    /// Push onto a top-level array field, creating it when absent.
    Append { field: String, value: Value },
}

impl Patch {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self::Set {
            field: field.into(),
            value,
        }
    }

    pub fn append(field: impl Into<String>, value: Value) -> Self {
        Self::Append {
            field: field.into(),
            value,
        }
    }

    /// Apply every patch on `body`, in order.
    ///
    /// Fails without partial effects if any patch does not fit the document.
    pub fn apply_all(patches: &[Patch], body: &Value) -> Result<Value> {
        let mut patched = body.clone();
        let object = patched.as_object_mut().ok_or_else(|| {
            StoreError::Corrupt("document body is not an object".into())
        })?;

        for patch in patches {
            match patch {
                Patch::Set { field, value } => {
                    object.insert(field.clone(), value.clone());
                },
                Patch::Append { field, value } => {
                    match object
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()))
                    {
                        Value::Array(items) => items.push(value.clone()),
                        _ => return Err(StoreError::Conflict),
                    }
                },
            }
        }

        Ok(patched)
    }
}

/// Port for document persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document.
    ///
    /// Fails with [`StoreError::Conflict`] if the id or partition key is
    /// already taken.
    async fn create(&self, document: NewDocument) -> Result<Document>;

    /// Find documents matching `filter`, in creation order.
    async fn query(&self, filter: &Filter) -> Result<Vec<Document>>;

    /// Patch named fields of a document.
    ///
    /// When `if_match` is set, the write only happens if the stored version
    /// still equals it, otherwise [`StoreError::PreconditionFailed`].
    async fn patch(
        &self,
        id: &str,
        partition_key: &str,
        patches: &[Patch],
        if_match: Option<&ETag>,
    ) -> Result<Document>;
}
