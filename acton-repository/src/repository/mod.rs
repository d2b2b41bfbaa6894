//! Repositories over models
//!
//! This module provides the [`Repository`] trait and its store-backed
//! implementation, [`EntityRepository`].
//!
//! # Features
//!
//! - **Criteria**: a persistent [`CriteriaStack`](crate::criteria::CriteriaStack)
//!   folded over every terminal read
//! - **Builder state**: one-shot ordering, eager loading, relation
//!   existence filters and soft-delete scopes
//! - **Pagination**: [`LengthAwarePaginator`] and [`Paginator`]
//! - **Writes**: create, update, update-or-create, and (soft) delete with
//!   timestamp maintenance
//! - **Transactions**: begin, commit and rollback passed through to the store

mod entity;
mod error;
mod pagination;
mod traits;

// Re-export all public types
pub use entity::EntityRepository;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use pagination::{LengthAwarePaginator, Paginator, DEFAULT_PAGE_NAME};
pub use traits::Repository;
