//! # acton-repository
//!
//! Generic repositories over models with composable query criteria and a
//! tag-invalidated caching decorator.
//!
//! ## Features
//!
//! - **Criteria**: reusable, self-describing query filters stacked on a
//!   repository and applied to every read
//! - **Repositories**: reads, pagination, chunking, writes with timestamp
//!   maintenance, soft deletes, eager loading and relation existence filters
//! - **Caching**: read-through caching keyed by method, arguments and the
//!   criteria fingerprint; writes flush the repository's (per-user) tag
//! - **Stores**: an in-memory store, plus PostgreSQL (sqlx) behind `database`
//! - **Cache stores**: an in-memory store, plus Redis (deadpool-redis) behind
//!   `cache`
//!
//! ## Example
//!
//! ```rust
//! use acton_repository::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Post {
//!     id: i64,
//!     title: String,
//!     status: String,
//!     created_at: String,
//! }
//!
//! impl Model for Post {
//!     const TABLE: &'static str = "posts";
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let mut posts = EntityRepository::<Post, _>::new(MemoryStore::new());
//! posts.create(attributes([("title", "Hello"), ("status", "active")])).await?;
//! posts.create(attributes([("title", "Draft"), ("status", "draft")])).await?;
//!
//! let page = posts
//!     .push_criteria(FindWhereCriteria::new(attributes([("status", "active")])))
//!     .paginate(None, &["*"], DEFAULT_PAGE_NAME, None)
//!     .await?;
//! assert_eq!(page.total, 1);
//! # Ok(())
//! # }
//! ```

pub mod auth;
#[cfg(any(feature = "database", feature = "cache"))]
mod backoff;
pub mod cache;
pub mod config;
pub mod container;
pub mod criteria;
pub mod error;
pub mod model;
pub mod query;
pub mod repository;
pub mod store;

pub use error::{Error, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::auth::{AuthContext, Guard, SessionGuard};
    pub use crate::cache::{CacheStore, CachedRepository, MemoryCacheStore};

    #[cfg(feature = "cache")]
    pub use crate::cache::RedisCacheStore;

    pub use crate::config::{CacheConfig, Config};
    pub use crate::container::Container;
    pub use crate::criteria::{
        CriteriaStack, Criterion, DateCriteria, FindWhereCriteria, FindWhereInCriteria,
        FindWhereNotInCriteria, FindWhereOrWhereCriteria, LimitCriteria, OffsetCriteria,
        OrWhereCriteria, SearchCriteria,
    };
    pub use crate::error::{Error, Result};
    pub use crate::model::{attributes, Attributes, Model, Record, Relation, TableMeta};
    pub use crate::query::{
        Conditions, FilterCondition, FilterOperator, FilterValue, Filterable, OrderDirection,
        Query, TrashedScope,
    };
    pub use crate::repository::{
        EntityRepository, LengthAwarePaginator, Paginator, Repository, RepositoryError,
        DEFAULT_PAGE_NAME,
    };
    pub use crate::store::{MemoryStore, Store};

    #[cfg(feature = "database")]
    pub use crate::store::PgStore;
}
