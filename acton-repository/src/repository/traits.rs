//! Repository trait definitions
//!
//! [`Repository`] is the interface shared by [`EntityRepository`] and the
//! caching [`CachedRepository`]. Async operations use RPITIT (Return Position
//! Impl Trait In Traits), so implementations are written with `async fn`.
//!
//! Every repository owns a current query handle. Builder methods
//! (`order_by`, `with`, `where_has`, ...) replace it with an extended handle;
//! terminal operations apply the criteria stack to it, execute it, and leave
//! a fresh handle behind. Criteria persist across calls, ad hoc builder state
//! does not.
//!
//! [`EntityRepository`]: super::EntityRepository
//! [`CachedRepository`]: crate::cache::CachedRepository
//!
//! # Example
//!
//! ```rust
//! use acton_repository::criteria::FindWhereCriteria;
//! use acton_repository::model::{attributes, Model};
//! use acton_repository::query::OrderDirection;
//! use acton_repository::repository::{EntityRepository, Repository};
//! use acton_repository::store::MemoryStore;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Post {
//!     id: i64,
//!     title: String,
//!     status: String,
//! }
//!
//! impl Model for Post {
//!     const TABLE: &'static str = "posts";
//!     const TIMESTAMPS: bool = false;
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> acton_repository::Result<()> {
//! let mut posts = EntityRepository::<Post, _>::new(MemoryStore::new());
//! posts.create(attributes([("title", "Hello"), ("status", "active")])).await?;
//! posts.create(attributes([("title", "Draft"), ("status", "draft")])).await?;
//!
//! let active = posts
//!     .push_criteria(FindWhereCriteria::new(attributes([("status", "active")])))
//!     .order_by("title", OrderDirection::Ascending)
//!     .get(&["*"])
//!     .await?;
//! assert_eq!(active.len(), 1);
//! assert_eq!(active[0].title, "Hello");
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use super::pagination::{LengthAwarePaginator, Paginator};
use crate::criteria::{CriteriaStack, Criterion};
use crate::error::Result;
use crate::model::{Attributes, Model};
use crate::query::{Conditions, Filterable, FilterOperator, FilterValue, OrderDirection, Query};

/// Repository over one model
///
/// `columns` arguments name the columns to fetch; `&["*"]` fetches every
/// column.
pub trait Repository<M: Model>: Send {
    /// Resolve a fresh, unfiltered query handle for the model
    ///
    /// # Errors
    ///
    /// [`Error::EntityType`](crate::Error::EntityType) when the container
    /// binding does not produce a query handle for the model.
    fn make_entity(&self) -> Result<Query>;

    /// Current query handle
    fn entity(&self) -> &Query;

    /// Replace the current query handle
    fn set_entity(&mut self, query: Query) -> &mut Self;

    /// Transform the current query handle
    fn map_entity(&mut self, f: impl FnOnce(Query) -> Query) -> &mut Self;

    /// Replace the current query handle with a fresh one
    fn reset_entity(&mut self) -> Result<&mut Self> {
        let fresh = self.make_entity()?;
        Ok(self.set_entity(fresh))
    }

    // --- criteria ---

    /// Append a criterion to the stack
    fn push_criteria<C: Criterion>(&mut self, criterion: C) -> &mut Self;

    /// Remove every criterion of type `C`, then reset the query handle
    fn pop_criteria<C: Criterion>(&mut self) -> Result<&mut Self>;

    /// Empty the stack, then reset the query handle
    fn clear_criteria(&mut self) -> Result<&mut Self>;

    /// Turn criteria application off (or back on); the stack is kept
    fn skip_criteria(&mut self, skip: bool) -> &mut Self;

    /// The criteria stack
    fn criteria(&self) -> &CriteriaStack;

    /// Fold the stack over the current query handle now
    ///
    /// Terminal operations apply the stack themselves; this is for
    /// inspecting the handle they would run.
    fn apply_criteria(&mut self) -> &mut Self;

    // --- terminal reads ---

    /// Every row, ignoring criteria and builder state
    fn all(&mut self, columns: &[&str]) -> impl Future<Output = Result<Vec<M>>> + Send;

    /// Rows matching the criteria and builder state
    fn get(&mut self, columns: &[&str]) -> impl Future<Output = Result<Vec<M>>> + Send;

    /// First row matching the criteria and builder state
    fn first(&mut self, columns: &[&str]) -> impl Future<Output = Result<Option<M>>> + Send;

    /// First row matching `attributes`, or an unsaved model built from them
    ///
    /// Ignores criteria and builder state.
    fn first_or_new(&mut self, attributes: Attributes)
        -> impl Future<Output = Result<M>> + Send;

    /// Rows matching every pair of `conditions` as well as the criteria
    fn find_where(
        &mut self,
        conditions: Attributes,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<M>>> + Send;

    /// Rows whose `column` is one of `values`
    fn find_where_in<V: Into<FilterValue> + Send>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V> + Send,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<M>>> + Send;

    /// Rows whose `column` is none of `values`
    fn find_where_not_in<V: Into<FilterValue> + Send>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V> + Send,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<M>>> + Send;

    /// Number of matching rows, ignoring limit and offset
    fn count(&mut self) -> impl Future<Output = Result<u64>> + Send;

    /// Sum of `column` over the matching rows
    fn sum(&mut self, column: &str) -> impl Future<Output = Result<f64>> + Send;

    /// One page plus the total count
    ///
    /// `per_page` defaults to the model's page size and `page` to 1.
    fn paginate(
        &mut self,
        per_page: Option<u64>,
        columns: &[&str],
        page_name: &str,
        page: Option<u64>,
    ) -> impl Future<Output = Result<LengthAwarePaginator<M>>> + Send;

    /// One page, knowing only whether another follows
    fn simple_paginate(
        &mut self,
        per_page: Option<u64>,
        columns: &[&str],
        page_name: &str,
        page: Option<u64>,
    ) -> impl Future<Output = Result<Paginator<M>>> + Send;

    /// Feed matching rows to `callback` `size` rows at a time
    ///
    /// Stops early, returning `false`, when the callback returns `false`.
    /// Rows are ordered by primary key unless an order is set.
    fn chunk<F>(
        &mut self,
        size: u64,
        columns: &[&str],
        callback: F,
    ) -> impl Future<Output = Result<bool>> + Send
    where
        F: FnMut(Vec<M>) -> bool + Send;

    // --- writes ---

    /// Insert a row
    fn create(&mut self, attributes: Attributes) -> impl Future<Output = Result<M>> + Send;

    /// Update the row with primary key `id`
    ///
    /// # Errors
    ///
    /// A not-found [`RepositoryError`](super::RepositoryError) when no such
    /// row exists.
    fn update(
        &mut self,
        id: impl Into<FilterValue> + Send,
        attributes: Attributes,
    ) -> impl Future<Output = Result<M>> + Send;

    /// Update the first row matching `conditions` with `values`, or insert
    /// both merged
    fn update_or_create(
        &mut self,
        conditions: Attributes,
        values: Attributes,
    ) -> impl Future<Output = Result<M>> + Send;

    /// Delete the row with primary key `id`; soft-deleting models only mark it
    ///
    /// # Errors
    ///
    /// A not-found [`RepositoryError`](super::RepositoryError) when no such
    /// row exists.
    fn delete(&mut self, id: impl Into<FilterValue> + Send) -> impl Future<Output = Result<()>> + Send;

    // --- transactions ---

    /// Start a transaction on the store
    fn transaction_begin(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Commit the store's transaction
    fn transaction_commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Roll the store's transaction back
    fn transaction_rollback(&mut self) -> impl Future<Output = Result<()>> + Send;

    // --- builder state ---

    /// Order the next terminal read
    fn order_by(&mut self, column: &str, direction: OrderDirection) -> &mut Self {
        self.map_entity(|q| q.order_by(column, direction))
    }

    /// Eager load relations on the next terminal read
    fn with(&mut self, relations: &[&str]) -> &mut Self {
        self.map_entity(|q| q.with(relations))
    }

    /// Attach `{relation}_count` on the next terminal read
    fn with_count(&mut self, relations: &[&str]) -> &mut Self {
        self.map_entity(|q| q.with_count(relations))
    }

    /// Include soft-deleted rows in the next terminal read
    fn with_trashed(&mut self) -> &mut Self {
        self.map_entity(Query::with_trashed)
    }

    /// Only soft-deleted rows in the next terminal read
    fn only_trashed(&mut self) -> &mut Self {
        self.map_entity(Query::only_trashed)
    }

    /// Rows whose related row count satisfies `operator count`
    fn has(&mut self, relation: &str, operator: FilterOperator, count: u64) -> &mut Self {
        self.map_entity(|q| q.has(relation, operator, count))
    }

    /// OR variant of [`has`](Self::has)
    fn or_has(&mut self, relation: &str, operator: FilterOperator, count: u64) -> &mut Self {
        self.map_entity(|q| q.or_has(relation, operator, count))
    }

    /// Rows without related rows
    fn doesnt_have(&mut self, relation: &str) -> &mut Self {
        self.map_entity(|q| q.doesnt_have(relation))
    }

    /// OR variant of [`doesnt_have`](Self::doesnt_have)
    fn or_doesnt_have(&mut self, relation: &str) -> &mut Self {
        self.map_entity(|q| q.or_doesnt_have(relation))
    }

    /// Rows whose related rows matching `constraint` satisfy `operator count`
    fn where_has(
        &mut self,
        relation: &str,
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> &mut Self {
        self.map_entity(|q| q.where_has(relation, constraint, operator, count))
    }

    /// OR variant of [`where_has`](Self::where_has)
    fn or_where_has(
        &mut self,
        relation: &str,
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> &mut Self {
        self.map_entity(|q| q.or_where_has(relation, constraint, operator, count))
    }

    /// Rows without related rows matching `constraint`
    fn where_doesnt_have(
        &mut self,
        relation: &str,
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> &mut Self {
        self.map_entity(|q| q.where_doesnt_have(relation, constraint))
    }

    /// OR variant of [`where_doesnt_have`](Self::where_doesnt_have)
    fn or_where_doesnt_have(
        &mut self,
        relation: &str,
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> &mut Self {
        self.map_entity(|q| q.or_where_doesnt_have(relation, constraint))
    }

    /// [`has`](Self::has) over the given polymorphic owner tables
    fn has_morph(
        &mut self,
        relation: &str,
        types: &[&str],
        operator: FilterOperator,
        count: u64,
    ) -> &mut Self {
        self.map_entity(|q| q.has_morph(relation, types, operator, count))
    }

    /// OR variant of [`has_morph`](Self::has_morph)
    fn or_has_morph(
        &mut self,
        relation: &str,
        types: &[&str],
        operator: FilterOperator,
        count: u64,
    ) -> &mut Self {
        self.map_entity(|q| q.or_has_morph(relation, types, operator, count))
    }

    /// [`doesnt_have`](Self::doesnt_have) over the given owner tables
    fn doesnt_have_morph(&mut self, relation: &str, types: &[&str]) -> &mut Self {
        self.map_entity(|q| q.doesnt_have_morph(relation, types))
    }

    /// OR variant of [`doesnt_have_morph`](Self::doesnt_have_morph)
    fn or_doesnt_have_morph(&mut self, relation: &str, types: &[&str]) -> &mut Self {
        self.map_entity(|q| q.or_doesnt_have_morph(relation, types))
    }

    /// [`where_has`](Self::where_has) over the given owner tables
    fn where_has_morph(
        &mut self,
        relation: &str,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> &mut Self {
        self.map_entity(|q| q.where_has_morph(relation, types, constraint, operator, count))
    }

    /// OR variant of [`where_has_morph`](Self::where_has_morph)
    fn or_where_has_morph(
        &mut self,
        relation: &str,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> &mut Self {
        self.map_entity(|q| q.or_where_has_morph(relation, types, constraint, operator, count))
    }

    /// [`where_doesnt_have`](Self::where_doesnt_have) over the given owner
    /// tables
    fn where_doesnt_have_morph(
        &mut self,
        relation: &str,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> &mut Self {
        self.map_entity(|q| q.where_doesnt_have_morph(relation, types, constraint))
    }

    /// OR variant of [`where_doesnt_have_morph`](Self::where_doesnt_have_morph)
    fn or_where_doesnt_have_morph(
        &mut self,
        relation: &str,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> &mut Self {
        self.map_entity(|q| q.or_where_doesnt_have_morph(relation, types, constraint))
    }
}
