//! Structured repository errors
//!
//! # Example
//!
//! ```rust
//! use acton_repository::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::not_found("posts", "42").with_operation(RepositoryOperation::Update);
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.entity_id.as_deref(), Some("42"));
//! ```

use std::fmt;

/// Repository call that raised the error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Primary-key lookup
    Find,
    /// `all`, `get`, `first`, `find_where*`
    Get,
    /// `paginate`, `simple_paginate`
    Paginate,
    /// `chunk`
    Chunk,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `update_or_create`
    UpdateOrCreate,
    /// `delete`, soft or hard
    Delete,
}

impl RepositoryOperation {
    /// Snake-case name, as used in messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Get => "get",
            Self::Paginate => "paginate",
            Self::Chunk => "chunk",
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateOrCreate => "update_or_create",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// No row has the requested primary key
    NotFound,
    /// A stored row does not deserialize into the model
    SerializationError,
}

impl RepositoryErrorKind {
    /// Snake-case name, as used in messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::SerializationError => "serialization_error",
        }
    }
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository failure with the call and row it concerns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// Call that failed
    pub operation: RepositoryOperation,
    /// Failure category
    pub kind: RepositoryErrorKind,
    /// Detail
    pub message: String,
    /// Table of the row involved
    pub entity_type: Option<String>,
    /// Primary key of the row involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Error without row context
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// No row of `table` has primary key `id`
    ///
    /// The operation defaults to [`Find`](RepositoryOperation::Find); writes
    /// override it with [`with_operation`](Self::with_operation).
    ///
    /// ```rust
    /// use acton_repository::repository::RepositoryError;
    ///
    /// let error = RepositoryError::not_found("posts", "7");
    /// assert_eq!(error.entity_type, Some("posts".to_string()));
    /// ```
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Find,
            RepositoryErrorKind::NotFound,
            "No query results for model",
        )
        .with_entity(table, id)
    }

    /// A row fetched by `operation` could not be hydrated
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Attach the row involved
    #[must_use]
    pub fn with_entity(mut self, table: impl Into<String>, id: impl Into<String>) -> Self {
        self.entity_type = Some(table.into());
        self.entity_id = Some(id.into());
        self
    }

    /// Replace the failing call
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Whether no row matched
    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.entity_type, &self.entity_id) {
            (Some(table), Some(id)) => write!(f, " [{}: {}]", table, id),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for RepositoryError {}
