//! Query execution backends
//!
//! A [`Store`] runs [`Query`] values against tables and hands rows back as
//! [`Record`]s. Repositories are generic over the store, so the same
//! repository code runs against the in-process [`MemoryStore`] and, with the
//! `database` feature, against PostgreSQL through [`PgStore`].
//!
//! The trait uses RPITIT (Return Position Impl Trait In Traits) so
//! implementations can be written with plain `async fn`.

mod memory;
pub mod sql;

#[cfg(feature = "database")]
mod postgres;

pub use memory::MemoryStore;

#[cfg(feature = "database")]
pub use postgres::PgStore;

use std::future::Future;

use crate::error::Result;
use crate::model::{Attributes, Record, TableMeta};
use crate::query::Query;

/// Executes queries for repositories
///
/// Reads honour the query's where-clauses, soft-delete scope, projection,
/// ordering, limit and offset. `update` and `delete` touch every row the
/// query's where-clauses and soft-delete scope select, ignoring the rest.
///
/// # Example
///
/// ```rust
/// use acton_repository::model::{attributes, Model, TableMeta};
/// use acton_repository::query::{Filterable, Query};
/// use acton_repository::store::{MemoryStore, Store};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Serialize, Deserialize)]
/// # struct Post { id: Option<i64> }
/// # impl Model for Post { const TABLE: &'static str = "posts"; }
///
/// # #[tokio::main]
/// # async fn main() -> acton_repository::Result<()> {
/// let store = MemoryStore::new();
/// let posts = TableMeta::of::<Post>();
/// store.insert(&posts, &attributes([("title", "hello")])).await?;
///
/// let query = Query::for_model::<Post>().where_eq("title", "hello");
/// assert_eq!(store.count(&query).await?, 1);
/// # Ok(())
/// # }
/// ```
pub trait Store: Send + Sync {
    /// Rows matching the query
    fn select(&self, query: &Query) -> impl Future<Output = Result<Vec<Record>>> + Send;

    /// Number of rows matching the query, ignoring limit, offset and order
    fn count(&self, query: &Query) -> impl Future<Output = Result<u64>> + Send;

    /// Sum of a numeric column over the rows matching the query
    ///
    /// An empty match sums to zero.
    fn sum(&self, query: &Query, column: &str) -> impl Future<Output = Result<f64>> + Send;

    /// Insert a row, returning it as stored (generated primary key included)
    fn insert(
        &self,
        table: &TableMeta,
        values: &Attributes,
    ) -> impl Future<Output = Result<Record>> + Send;

    /// Update the rows the query selects, returning them as stored
    fn update(
        &self,
        query: &Query,
        values: &Attributes,
    ) -> impl Future<Output = Result<Vec<Record>>> + Send;

    /// Delete the rows the query selects, returning how many went away
    fn delete(&self, query: &Query) -> impl Future<Output = Result<u64>> + Send;

    /// Start a transaction
    fn begin(&self) -> impl Future<Output = Result<()>> + Send;

    /// Commit the active transaction
    fn commit(&self) -> impl Future<Output = Result<()>> + Send;

    /// Roll the active transaction back
    fn rollback(&self) -> impl Future<Output = Result<()>> + Send;
}
