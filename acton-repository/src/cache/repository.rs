//! Caching repository decorator

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::{cache_key, cache_tag, CacheStore};
use crate::auth::AuthContext;
use crate::config::CacheConfig;
use crate::criteria::{CriteriaStack, Criterion};
use crate::error::Result;
use crate::model::{Attributes, Model};
use crate::query::{FilterValue, Query};
use crate::repository::{EntityRepository, LengthAwarePaginator, Paginator, Repository};
use crate::store::Store;

enum Lookup<T> {
    Bypass,
    Hit(T),
    Miss { tag: String, key: String },
}

/// Read-through: serve `$call` from the cache, or run it and remember the
/// result
macro_rules! remember {
    ($self:ident, $method:literal, $args:expr, $call:expr) => {{
        match $self.lookup($method, $args).await? {
            Lookup::Hit(value) => Ok(value),
            Lookup::Bypass => $call.await,
            Lookup::Miss { tag, key } => {
                let value = $call.await?;
                $self.store_entry(&tag, &key, &value).await?;
                Ok(value)
            }
        }
    }};
}

/// [`EntityRepository`] whose reads go through a [`CacheStore`]
///
/// Cached reads: `all`, `get`, `first`, `first_or_new`, `find_where`,
/// `find_where_in`, `find_where_not_in`, `paginate`, `simple_paginate`.
/// Writes flush the repository's tag before running. `count`, `sum`,
/// `chunk` and transactions are never cached.
///
/// Keys cover the method, its arguments and the criteria stack only. Ad hoc
/// builder state (`order_by`, `with`, `with_trashed`, relation filters) is
/// not part of the key, so a cached `get` answers a later `with_trashed().get()`
/// with the same rows. Push a criterion, or call `skip_cache(true)`, when such
/// reads must differ.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use acton_repository::auth::AuthContext;
/// use acton_repository::cache::{CachedRepository, MemoryCacheStore};
/// use acton_repository::config::CacheConfig;
/// use acton_repository::model::{attributes, Model};
/// use acton_repository::repository::{EntityRepository, Repository};
/// use acton_repository::store::MemoryStore;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Post {
///     id: i64,
///     title: String,
/// }
///
/// impl Model for Post {
///     const TABLE: &'static str = "posts";
///     const TIMESTAMPS: bool = false;
/// }
///
/// # #[tokio::main]
/// # async fn main() -> acton_repository::Result<()> {
/// let store = MemoryStore::new();
/// let config = CacheConfig { active: true, ..CacheConfig::default() };
/// let mut posts = CachedRepository::new(
///     EntityRepository::<Post, _>::new(store.clone()),
///     Arc::new(MemoryCacheStore::new()),
///     Arc::new(AuthContext::new()),
///     config,
/// );
///
/// posts.create(attributes([("title", "Hello")])).await?;
/// posts.get(&["*"]).await?;
/// posts.get(&["*"]).await?;
/// assert_eq!(store.query_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct CachedRepository<M: Model, S: Store> {
    inner: EntityRepository<M, S>,
    cache: Arc<dyn CacheStore>,
    auth: Arc<AuthContext>,
    config: CacheConfig,
    skip_cache: bool,
    skip_user_tag: bool,
}

impl<M: Model, S: Store> std::fmt::Debug for CachedRepository<M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .field("skip_cache", &self.skip_cache)
            .field("skip_user_tag", &self.skip_user_tag)
            .finish_non_exhaustive()
    }
}

impl<M: Model, S: Store> CachedRepository<M, S> {
    /// Wrap `inner`, caching in `cache` under tags derived from `auth`
    pub fn new(
        inner: EntityRepository<M, S>,
        cache: Arc<dyn CacheStore>,
        auth: Arc<AuthContext>,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner,
            cache,
            auth,
            config,
            skip_cache: false,
            skip_user_tag: false,
        }
    }

    /// Wrapped repository
    pub fn inner(&self) -> &EntityRepository<M, S> {
        &self.inner
    }

    /// Unwrap the decorator
    pub fn into_inner(self) -> EntityRepository<M, S> {
        self.inner
    }

    /// Bypass the cache for reads until turned back off
    pub fn skip_cache(&mut self, skip: bool) -> &mut Self {
        self.skip_cache = skip;
        self
    }

    /// Tag entries with user `0` regardless of authentication, until turned
    /// back off
    pub fn skip_user_tag(&mut self, skip: bool) -> &mut Self {
        self.skip_user_tag = skip;
        self
    }

    /// Tag the current entries belong to
    pub fn tag(&self) -> String {
        let user = if self.skip_user_tag {
            None
        } else {
            self.auth.user_id(&self.config.guards)
        };
        cache_tag(self.inner.name(), user.as_deref())
    }

    /// Key a read with these arguments would be cached under
    pub fn key(&self, method: &str, args: &Value) -> String {
        let fingerprint = self.inner.criteria().fingerprint();
        cache_key(method, self.inner.name(), &self.tag(), args, &fingerprint)
    }

    fn bypassed(&self) -> bool {
        self.skip_cache || !self.config.active
    }

    async fn lookup<T: DeserializeOwned>(&mut self, method: &str, args: Value) -> Result<Lookup<T>> {
        if self.bypassed() {
            return Ok(Lookup::Bypass);
        }
        let tag = self.tag();
        let key = self.key(method, &args);

        if let Some(raw) = self.cache.get(&tag, &key).await? {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    self.inner.reset_entity()?;
                    return Ok(Lookup::Hit(value));
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                }
            }
        }
        tracing::debug!(key = %key, "Cache miss");
        Ok(Lookup::Miss { tag, key })
    }

    async fn store_entry<T: Serialize>(&self, tag: &str, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.cache.put(tag, key, raw, self.config.ttl()).await
    }

    async fn flush(&self) -> Result<()> {
        let tag = self.tag();
        self.cache.flush(&tag).await?;
        tracing::debug!(tag = %tag, "Flushed cache tag");
        Ok(())
    }
}

impl<M: Model, S: Store> Repository<M> for CachedRepository<M, S> {
    fn make_entity(&self) -> Result<Query> {
        self.inner.make_entity()
    }

    fn entity(&self) -> &Query {
        self.inner.entity()
    }

    fn set_entity(&mut self, query: Query) -> &mut Self {
        self.inner.set_entity(query);
        self
    }

    fn map_entity(&mut self, f: impl FnOnce(Query) -> Query) -> &mut Self {
        self.inner.map_entity(f);
        self
    }

    fn push_criteria<C: Criterion>(&mut self, criterion: C) -> &mut Self {
        self.inner.push_criteria(criterion);
        self
    }

    fn pop_criteria<C: Criterion>(&mut self) -> Result<&mut Self> {
        self.inner.pop_criteria::<C>()?;
        Ok(self)
    }

    fn clear_criteria(&mut self) -> Result<&mut Self> {
        self.inner.clear_criteria()?;
        Ok(self)
    }

    fn skip_criteria(&mut self, skip: bool) -> &mut Self {
        self.inner.skip_criteria(skip);
        self
    }

    fn criteria(&self) -> &CriteriaStack {
        self.inner.criteria()
    }

    fn apply_criteria(&mut self) -> &mut Self {
        self.inner.apply_criteria();
        self
    }

    async fn all(&mut self, columns: &[&str]) -> Result<Vec<M>> {
        remember!(self, "all", json!([columns]), self.inner.all(columns))
    }

    async fn get(&mut self, columns: &[&str]) -> Result<Vec<M>> {
        remember!(self, "get", json!([columns]), self.inner.get(columns))
    }

    async fn first(&mut self, columns: &[&str]) -> Result<Option<M>> {
        remember!(self, "first", json!([columns]), self.inner.first(columns))
    }

    async fn first_or_new(&mut self, attributes: Attributes) -> Result<M> {
        remember!(
            self,
            "first_or_new",
            json!([attributes]),
            self.inner.first_or_new(attributes)
        )
    }

    async fn find_where(&mut self, conditions: Attributes, columns: &[&str]) -> Result<Vec<M>> {
        remember!(
            self,
            "find_where",
            json!([conditions, columns]),
            self.inner.find_where(conditions, columns)
        )
    }

    async fn find_where_in<V: Into<FilterValue> + Send>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V> + Send,
        columns: &[&str],
    ) -> Result<Vec<M>> {
        let values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();
        remember!(
            self,
            "find_where_in",
            json!([column, values, columns]),
            self.inner.find_where_in(column, values, columns)
        )
    }

    async fn find_where_not_in<V: Into<FilterValue> + Send>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V> + Send,
        columns: &[&str],
    ) -> Result<Vec<M>> {
        let values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();
        remember!(
            self,
            "find_where_not_in",
            json!([column, values, columns]),
            self.inner.find_where_not_in(column, values, columns)
        )
    }

    async fn count(&mut self) -> Result<u64> {
        self.inner.count().await
    }

    async fn sum(&mut self, column: &str) -> Result<f64> {
        self.inner.sum(column).await
    }

    async fn paginate(
        &mut self,
        per_page: Option<u64>,
        columns: &[&str],
        page_name: &str,
        page: Option<u64>,
    ) -> Result<LengthAwarePaginator<M>> {
        remember!(
            self,
            "paginate",
            json!([per_page, columns, page_name, page]),
            self.inner.paginate(per_page, columns, page_name, page)
        )
    }

    async fn simple_paginate(
        &mut self,
        per_page: Option<u64>,
        columns: &[&str],
        page_name: &str,
        page: Option<u64>,
    ) -> Result<Paginator<M>> {
        remember!(
            self,
            "simple_paginate",
            json!([per_page, columns, page_name, page]),
            self.inner.simple_paginate(per_page, columns, page_name, page)
        )
    }

    async fn chunk<F>(&mut self, size: u64, columns: &[&str], callback: F) -> Result<bool>
    where
        F: FnMut(Vec<M>) -> bool + Send,
    {
        self.inner.chunk(size, columns, callback).await
    }

    async fn create(&mut self, attributes: Attributes) -> Result<M> {
        self.flush().await?;
        self.inner.create(attributes).await
    }

    async fn update(
        &mut self,
        id: impl Into<FilterValue> + Send,
        attributes: Attributes,
    ) -> Result<M> {
        self.flush().await?;
        self.inner.update(id, attributes).await
    }

    async fn update_or_create(&mut self, conditions: Attributes, values: Attributes) -> Result<M> {
        self.flush().await?;
        self.inner.update_or_create(conditions, values).await
    }

    async fn delete(&mut self, id: impl Into<FilterValue> + Send) -> Result<()> {
        self.flush().await?;
        self.inner.delete(id).await
    }

    async fn transaction_begin(&mut self) -> Result<()> {
        self.inner.transaction_begin().await
    }

    async fn transaction_commit(&mut self) -> Result<()> {
        self.inner.transaction_commit().await
    }

    async fn transaction_rollback(&mut self) -> Result<()> {
        self.inner.transaction_rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionGuard;
    use crate::cache::MemoryCacheStore;
    use crate::criteria::{FindWhereCriteria, LimitCriteria};
    use crate::model::attributes;
    use crate::query::TrashedScope;
    use crate::store::MemoryStore;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: Option<i64>,
        title: Option<String>,
        status: Option<String>,
    }

    impl Model for Post {
        const TABLE: &'static str = "posts";
        const TIMESTAMPS: bool = false;
    }

    fn active() -> CacheConfig {
        CacheConfig {
            active: true,
            time: 60,
            guards: vec!["web".to_string(), "api".to_string()],
        }
    }

    fn cached(
        store: &MemoryStore,
        cache: &MemoryCacheStore,
        auth: AuthContext,
        config: CacheConfig,
    ) -> CachedRepository<Post, MemoryStore> {
        CachedRepository::new(
            EntityRepository::new(store.clone()),
            Arc::new(cache.clone()),
            Arc::new(auth),
            config,
        )
    }

    async fn seeded() -> (MemoryStore, MemoryCacheStore) {
        let store = MemoryStore::new();
        let mut posts = EntityRepository::<Post, _>::new(store.clone());
        for (title, status) in [("alpha", "active"), ("beta", "draft"), ("gamma", "active")] {
            posts
                .create(attributes([("title", title), ("status", status)]))
                .await
                .unwrap();
        }
        (store, MemoryCacheStore::new())
    }

    #[tokio::test]
    async fn test_repeated_read_hits_store_once() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());

        let first = posts.first(&["*"]).await.unwrap();
        let again = posts.first(&["*"]).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(store.query_count(), 1);
        assert_eq!(cache.len("PostRepository_0"), 1);
    }

    #[tokio::test]
    async fn test_hit_still_resets_builder_state() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());
        posts.get(&["*"]).await.unwrap();

        posts.with_trashed().get(&["*"]).await.unwrap();
        assert_eq!(posts.entity().trashed(), TrashedScope::Exclude);
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_same_criteria_share_keys() {
        let (store, cache) = seeded().await;
        let mut left = cached(&store, &cache, AuthContext::new(), active());
        let mut right = cached(&store, &cache, AuthContext::new(), active());
        let args = json!([["*"]]);

        left.push_criteria(FindWhereCriteria::new(attributes([("status", "active")])));
        right.push_criteria(FindWhereCriteria::new(attributes([("status", "active")])));
        assert_eq!(left.key("get", &args), right.key("get", &args));

        right.push_criteria(LimitCriteria::new(1));
        assert_ne!(left.key("get", &args), right.key("get", &args));

        let mut other = cached(&store, &cache, AuthContext::new(), active());
        other.push_criteria(FindWhereCriteria::new(attributes([("status", "draft")])));
        assert_ne!(left.key("get", &args), other.key("get", &args));
    }

    #[tokio::test]
    async fn test_cleared_or_skipped_stack_keys_like_empty() {
        let (store, cache) = seeded().await;
        let empty = cached(&store, &cache, AuthContext::new(), active());
        let mut posts = cached(&store, &cache, AuthContext::new(), active());
        let args = json!([["*"]]);

        posts.push_criteria(LimitCriteria::new(1)).skip_criteria(true);
        assert_eq!(posts.key("get", &args), empty.key("get", &args));

        posts.skip_criteria(false);
        assert_ne!(posts.key("get", &args), empty.key("get", &args));

        posts.clear_criteria().unwrap();
        assert_eq!(posts.key("get", &args), empty.key("get", &args));
    }

    #[tokio::test]
    async fn test_criteria_select_different_entries() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());

        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 3);
        posts.push_criteria(FindWhereCriteria::new(attributes([("status", "draft")])));
        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 1);
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn test_write_flushes_tag() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());

        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 3);
        posts.create(attributes([("title", "delta")])).await.unwrap();
        assert!(cache.is_empty("PostRepository_0"));
        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 4);

        posts.update(1_i64, attributes([("title", "renamed")])).await.unwrap();
        let first = posts.first(&["*"]).await.unwrap().unwrap();
        assert_eq!(first.title.as_deref(), Some("renamed"));

        posts.delete(2_i64).await.unwrap();
        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_bypass_when_skipped_or_inactive() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());
        posts.skip_cache(true);
        posts.get(&["*"]).await.unwrap();
        posts.get(&["*"]).await.unwrap();
        assert_eq!(store.query_count(), 2);
        assert!(cache.is_empty("PostRepository_0"));

        let mut inactive = cached(&store, &cache, AuthContext::new(), CacheConfig::default());
        inactive.get(&["*"]).await.unwrap();
        inactive.get(&["*"]).await.unwrap();
        assert_eq!(store.query_count(), 4);
    }

    #[tokio::test]
    async fn test_tag_follows_first_authenticated_guard() {
        let (store, cache) = seeded().await;
        let auth = AuthContext::new()
            .with_guard("web", Arc::new(SessionGuard::new()))
            .with_guard("api", Arc::new(SessionGuard::authenticated("42")));
        let mut posts = cached(&store, &cache, auth, active());
        assert_eq!(posts.tag(), "PostRepository_42");

        posts.get(&["*"]).await.unwrap();
        assert_eq!(cache.len("PostRepository_42"), 1);

        posts.skip_user_tag(true);
        assert_eq!(posts.tag(), "PostRepository_0");
        posts.get(&["*"]).await.unwrap();
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());
        let key = posts.key("get", &json!([["*"]]));
        cache
            .put("PostRepository_0", &key, "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 3);
        assert_eq!(store.query_count(), 1);
        // the entry was replaced
        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 3);
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_paginators_are_cached() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());

        let page = posts.paginate(Some(2), &["*"], "page", None).await.unwrap();
        let again = posts.paginate(Some(2), &["*"], "page", None).await.unwrap();
        assert_eq!(page, again);
        assert_eq!(page.total, 3);

        let other = posts.paginate(Some(2), &["*"], "page", Some(2)).await.unwrap();
        assert_eq!(other.items.len(), 1);
        // count + select per uncached page
        assert_eq!(store.query_count(), 4);

        let simple = posts.simple_paginate(None, &["*"], "page", None).await.unwrap();
        assert!(!simple.has_more);
    }

    #[tokio::test]
    async fn test_uncached_reads_delegate() {
        let (store, cache) = seeded().await;
        let mut posts = cached(&store, &cache, AuthContext::new(), active());
        assert_eq!(posts.count().await.unwrap(), 3);
        assert_eq!(posts.count().await.unwrap(), 3);
        assert_eq!(store.query_count(), 2);
    }
}
