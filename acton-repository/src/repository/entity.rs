//! Store-backed repository

use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::{LengthAwarePaginator, Paginator};
use super::traits::Repository;
use crate::container::Container;
use crate::criteria::{CriteriaStack, Criterion};
use crate::error::Result;
use crate::model::{Attributes, Model, Record, RelationJoin, TableMeta, CREATED_AT, DELETED_AT, UPDATED_AT};
use crate::query::{Filterable, FilterValue, OrderDirection, Query};
use crate::store::Store;

/// Repository executing its queries on a [`Store`]
///
/// Named after the model by default (`PostRepository` for `Post`); the name
/// prefixes cache keys and tags when the repository is wrapped in a
/// [`CachedRepository`](crate::cache::CachedRepository).
pub struct EntityRepository<M: Model, S: Store> {
    name: String,
    store: S,
    container: Arc<Container>,
    entity: Query,
    criteria: CriteriaStack,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model, S: Store> std::fmt::Debug for EntityRepository<M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRepository")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("criteria", &self.criteria)
            .finish_non_exhaustive()
    }
}

impl<M: Model, S: Store> EntityRepository<M, S> {
    /// Repository resolving plain `Query::for_model::<M>()` handles
    pub fn new(store: S) -> Self {
        Self {
            name: default_name::<M>(),
            store,
            container: Arc::new(Container::new()),
            entity: Query::for_model::<M>(),
            criteria: CriteriaStack::new(),
            _model: PhantomData,
        }
    }

    /// Repository resolving handles through `container`
    ///
    /// # Errors
    ///
    /// Fails the same way [`make_entity`](Repository::make_entity) does.
    pub fn resolve(container: Arc<Container>, store: S) -> Result<Self> {
        let entity = container.resolve_query::<M>()?;
        Ok(Self {
            name: default_name::<M>(),
            store,
            container,
            entity,
            criteria: CriteriaStack::new(),
            _model: PhantomData,
        })
    }

    /// Override the repository name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Repository name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Take the current handle with criteria applied, leaving a fresh one
    fn take_entity(&mut self) -> Result<Query> {
        let fresh = self.make_entity()?;
        let current = mem::replace(&mut self.entity, fresh);
        Ok(self.criteria.apply(current))
    }

    /// Discard the current handle, returning a fresh one
    fn fresh_entity(&mut self) -> Result<Query> {
        let fresh = self.make_entity()?;
        self.entity = fresh.clone();
        Ok(fresh)
    }

    fn table(&self) -> TableMeta {
        TableMeta::of::<M>()
    }

    fn now() -> FilterValue {
        FilterValue::Timestamp(Utc::now().naive_utc())
    }

    /// Run a read and hydrate its rows, eager loads included
    async fn fetch(&self, query: &Query, operation: RepositoryOperation) -> Result<Vec<M>> {
        let rows = self.store.select(query).await?;
        let rows = self.load_relations(query, rows).await?;
        rows.into_iter()
            .map(|row| hydrate(row, operation))
            .collect()
    }

    /// Attach eager-loaded relations and relation counts to `rows`
    async fn load_relations(&self, query: &Query, mut rows: Vec<Record>) -> Result<Vec<Record>> {
        if rows.is_empty() {
            return Ok(rows);
        }
        let table = query.table();

        for name in query.eager_loads() {
            let relation = table.relation(name)?;
            let empty = if relation.is_many() {
                Value::Array(Vec::new())
            } else {
                Value::Null
            };
            for row in rows.iter_mut() {
                row.insert(name.clone(), empty.clone());
            }
            for join in relation.joins(table, None) {
                let related = self.related_rows(&join, &rows).await?;
                for row in rows.iter_mut() {
                    let matches = matching(&join, row, &related);
                    if matches.is_empty() {
                        continue;
                    }
                    let value = if relation.is_many() {
                        Value::Array(matches)
                    } else {
                        matches.into_iter().next().unwrap_or(Value::Null)
                    };
                    row.insert(name.clone(), value);
                }
            }
        }

        for name in query.relation_counts() {
            let relation = table.relation(name)?;
            let key = format!("{}_count", name);
            let mut counts = vec![0_u64; rows.len()];
            for join in relation.joins(table, None) {
                let related = self.related_rows(&join, &rows).await?;
                for (count, row) in counts.iter_mut().zip(rows.iter()) {
                    *count += matching(&join, row, &related).len() as u64;
                }
            }
            for (count, row) in counts.into_iter().zip(rows.iter_mut()) {
                row.insert(key.clone(), Value::from(count));
            }
        }

        Ok(rows)
    }

    /// Related rows for every parent in `rows` reachable through `join`
    async fn related_rows(&self, join: &RelationJoin, rows: &[Record]) -> Result<Vec<Record>> {
        let mut keys: Vec<FilterValue> = Vec::new();
        for row in rows.iter().filter(|row| parent_type_matches(join, row)) {
            let key = row.get(&join.parent_key).map(FilterValue::from_json);
            if let Some(key) = key.filter(|k| !k.is_null()) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = Query::for_table(join.related).where_in(join.related_key.clone(), keys);
        if let Some((column, value)) = &join.related_type {
            query = query.where_eq(column.clone(), value.clone());
        }
        self.store.select(&query).await
    }

    async fn first_matching(&mut self, conditions: &Attributes) -> Result<Option<Record>> {
        let query = self.fresh_entity()?.where_all(conditions.clone()).limit(1);
        Ok(self.store.select(&query).await?.into_iter().next())
    }

    fn with_timestamps(&self, mut values: Attributes, creating: bool) -> Attributes {
        if self.table().timestamps {
            let now = Self::now();
            if creating {
                values.entry(CREATED_AT.to_string()).or_insert_with(|| now.clone());
            }
            values.entry(UPDATED_AT.to_string()).or_insert(now);
        }
        values
    }

    async fn update_by_key(
        &mut self,
        id: FilterValue,
        values: Attributes,
        operation: RepositoryOperation,
    ) -> Result<M> {
        let table = self.table();
        let query = self.fresh_entity()?.where_eq(table.primary_key, id.clone());
        let values = self.with_timestamps(values, false);
        let row = self
            .store
            .update(&query, &values)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RepositoryError::not_found(table.table, id.to_string()).with_operation(operation)
            })?;
        tracing::debug!(table = table.table, id = %id, "Updated row");
        hydrate(row, operation)
    }
}

impl<M: Model, S: Store> Repository<M> for EntityRepository<M, S> {
    fn make_entity(&self) -> Result<Query> {
        self.container.resolve_query::<M>()
    }

    fn entity(&self) -> &Query {
        &self.entity
    }

    fn set_entity(&mut self, query: Query) -> &mut Self {
        self.entity = query;
        self
    }

    fn map_entity(&mut self, f: impl FnOnce(Query) -> Query) -> &mut Self {
        let current = mem::replace(&mut self.entity, Query::for_model::<M>());
        self.entity = f(current);
        self
    }

    fn push_criteria<C: Criterion>(&mut self, criterion: C) -> &mut Self {
        self.criteria.push(criterion);
        self
    }

    fn pop_criteria<C: Criterion>(&mut self) -> Result<&mut Self> {
        self.criteria.pop::<C>();
        self.reset_entity()
    }

    fn clear_criteria(&mut self) -> Result<&mut Self> {
        self.criteria.clear();
        self.reset_entity()
    }

    fn skip_criteria(&mut self, skip: bool) -> &mut Self {
        self.criteria.skip(skip);
        self
    }

    fn criteria(&self) -> &CriteriaStack {
        &self.criteria
    }

    fn apply_criteria(&mut self) -> &mut Self {
        let current = mem::replace(&mut self.entity, Query::for_model::<M>());
        self.entity = self.criteria.apply(current);
        self
    }

    async fn all(&mut self, columns: &[&str]) -> Result<Vec<M>> {
        let query = self.fresh_entity()?.select_default(columns);
        self.fetch(&query, RepositoryOperation::Get).await
    }

    async fn get(&mut self, columns: &[&str]) -> Result<Vec<M>> {
        let query = self.take_entity()?.select_default(columns);
        self.fetch(&query, RepositoryOperation::Get).await
    }

    async fn first(&mut self, columns: &[&str]) -> Result<Option<M>> {
        let query = self.take_entity()?.select_default(columns).limit(1);
        Ok(self
            .fetch(&query, RepositoryOperation::Get)
            .await?
            .into_iter()
            .next())
    }

    async fn first_or_new(&mut self, attributes: Attributes) -> Result<M> {
        let row = match self.first_matching(&attributes).await? {
            Some(row) => row,
            None => attributes
                .iter()
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect(),
        };
        hydrate(row, RepositoryOperation::Get)
    }

    async fn find_where(&mut self, conditions: Attributes, columns: &[&str]) -> Result<Vec<M>> {
        let query = self.take_entity()?.where_all(conditions).select_default(columns);
        self.fetch(&query, RepositoryOperation::Get).await
    }

    async fn find_where_in<V: Into<FilterValue> + Send>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V> + Send,
        columns: &[&str],
    ) -> Result<Vec<M>> {
        let values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();
        let query = self.take_entity()?.where_in(column, values).select_default(columns);
        self.fetch(&query, RepositoryOperation::Get).await
    }

    async fn find_where_not_in<V: Into<FilterValue> + Send>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V> + Send,
        columns: &[&str],
    ) -> Result<Vec<M>> {
        let values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();
        let query = self.take_entity()?.where_not_in(column, values).select_default(columns);
        self.fetch(&query, RepositoryOperation::Get).await
    }

    async fn count(&mut self) -> Result<u64> {
        let query = self.take_entity()?;
        self.store.count(&query).await
    }

    async fn sum(&mut self, column: &str) -> Result<f64> {
        let query = self.take_entity()?;
        self.store.sum(&query, column).await
    }

    async fn paginate(
        &mut self,
        per_page: Option<u64>,
        columns: &[&str],
        page_name: &str,
        page: Option<u64>,
    ) -> Result<LengthAwarePaginator<M>> {
        let per_page = page_size::<M>(per_page);
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let query = self.take_entity()?;

        let total = self.store.count(&query).await?;
        let items = if total > 0 {
            let query = query.select_default(columns).for_page(page, per_page);
            self.fetch(&query, RepositoryOperation::Paginate).await?
        } else {
            Vec::new()
        };
        Ok(LengthAwarePaginator::new(items, total, per_page, page, page_name))
    }

    async fn simple_paginate(
        &mut self,
        per_page: Option<u64>,
        columns: &[&str],
        page_name: &str,
        page: Option<u64>,
    ) -> Result<Paginator<M>> {
        let per_page = page_size::<M>(per_page);
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let query = self
            .take_entity()?
            .select_default(columns)
            .for_page(page, per_page)
            .limit(per_page.saturating_add(1));
        let items = self.fetch(&query, RepositoryOperation::Paginate).await?;
        Ok(Paginator::new(items, per_page, page, page_name))
    }

    async fn chunk<F>(&mut self, size: u64, columns: &[&str], mut callback: F) -> Result<bool>
    where
        F: FnMut(Vec<M>) -> bool + Send,
    {
        let mut query = self.take_entity()?.select_default(columns);
        if size == 0 {
            return Ok(false);
        }
        if query.orders().is_empty() {
            query = query.order_by(M::PRIMARY_KEY, OrderDirection::Ascending);
        }

        let mut page = 1;
        loop {
            let batch = query.clone().for_page(page, size);
            let models = self.fetch(&batch, RepositoryOperation::Chunk).await?;
            let fetched = models.len() as u64;
            if fetched == 0 {
                break;
            }
            if !callback(models) {
                return Ok(false);
            }
            if fetched < size {
                break;
            }
            page += 1;
        }
        Ok(true)
    }

    async fn create(&mut self, attributes: Attributes) -> Result<M> {
        self.fresh_entity()?;
        let table = self.table();
        let values = self.with_timestamps(attributes, true);
        let row = self.store.insert(&table, &values).await?;
        tracing::debug!(table = table.table, "Created row");
        hydrate(row, RepositoryOperation::Create)
    }

    async fn update(
        &mut self,
        id: impl Into<FilterValue> + Send,
        attributes: Attributes,
    ) -> Result<M> {
        self.update_by_key(id.into(), attributes, RepositoryOperation::Update)
            .await
    }

    async fn update_or_create(&mut self, conditions: Attributes, values: Attributes) -> Result<M> {
        let table = self.table();
        match self.first_matching(&conditions).await? {
            Some(row) => {
                let id = row
                    .get(table.primary_key)
                    .map(FilterValue::from_json)
                    .unwrap_or(FilterValue::Null);
                self.update_by_key(id, values, RepositoryOperation::UpdateOrCreate)
                    .await
            }
            None => {
                let mut merged = conditions;
                merged.extend(values);
                let merged = self.with_timestamps(merged, true);
                let row = self.store.insert(&table, &merged).await?;
                tracing::debug!(table = table.table, "Created row");
                hydrate(row, RepositoryOperation::UpdateOrCreate)
            }
        }
    }

    async fn delete(&mut self, id: impl Into<FilterValue> + Send) -> Result<()> {
        let id = id.into();
        let table = self.table();
        let query = self.fresh_entity()?.where_eq(table.primary_key, id.clone());

        let deleted = if table.soft_deletes {
            let mut values = Attributes::new();
            values.insert(DELETED_AT.to_string(), Self::now());
            let values = self.with_timestamps(values, false);
            !self.store.update(&query, &values).await?.is_empty()
        } else {
            self.store.delete(&query).await? > 0
        };
        if !deleted {
            return Err(RepositoryError::not_found(table.table, id.to_string())
                .with_operation(RepositoryOperation::Delete)
                .into());
        }
        tracing::debug!(
            table = table.table,
            id = %id,
            soft = table.soft_deletes,
            "Deleted row"
        );
        Ok(())
    }

    async fn transaction_begin(&mut self) -> Result<()> {
        self.store.begin().await
    }

    async fn transaction_commit(&mut self) -> Result<()> {
        self.store.commit().await
    }

    async fn transaction_rollback(&mut self) -> Result<()> {
        self.store.rollback().await
    }
}

fn default_name<M>() -> String {
    let full = std::any::type_name::<M>();
    let short = full.rsplit("::").next().unwrap_or(full);
    format!("{}Repository", short)
}

fn page_size<M: Model>(per_page: Option<u64>) -> u64 {
    per_page.filter(|n| *n > 0).unwrap_or(M::PER_PAGE)
}

fn hydrate<M: Model>(row: Record, operation: RepositoryOperation) -> Result<M> {
    serde_json::from_value(Value::Object(row)).map_err(|e| {
        RepositoryError::serialization_error(operation, e.to_string())
            .with_entity(M::TABLE, "-")
            .into()
    })
}

fn parent_type_matches(join: &RelationJoin, row: &Record) -> bool {
    match &join.parent_type {
        Some((column, expected)) => {
            row.get(column).and_then(Value::as_str) == Some(expected.as_str())
        }
        None => true,
    }
}

/// Related rows belonging to `row` through `join`
fn matching(join: &RelationJoin, row: &Record, related: &[Record]) -> Vec<Value> {
    if !parent_type_matches(join, row) {
        return Vec::new();
    }
    let Some(key) = row.get(&join.parent_key).filter(|k| !k.is_null()) else {
        return Vec::new();
    };
    related
        .iter()
        .filter(|candidate| {
            candidate
                .get(&join.related_key)
                .and_then(|value| crate::query::compare_json(value, key))
                == Some(std::cmp::Ordering::Equal)
        })
        .map(|candidate| Value::Object(candidate.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{
        DateCriteria, FindWhereCriteria, FindWhereOrWhereCriteria, LimitCriteria, SearchCriteria,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::error::Error;
    use crate::model::{attributes, Relation};
    use crate::query::FilterOperator;
    use crate::store::MemoryStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Post {
        id: Option<i64>,
        title: Option<String>,
        status: Option<String>,
        created_at: Option<String>,
        deleted_at: Option<String>,
        #[serde(default)]
        comments: Option<Vec<Comment>>,
        #[serde(default)]
        comments_count: Option<u64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Comment {
        id: Option<i64>,
        post_id: Option<i64>,
        body: Option<String>,
        #[serde(default)]
        post: Option<Box<Post>>,
    }

    impl Model for Post {
        const TABLE: &'static str = "posts";
        const SOFT_DELETES: bool = true;
        const PER_PAGE: u64 = 2;

        fn relations() -> Vec<Relation> {
            vec![Relation::has_many::<Comment>("comments", "post_id")]
        }
    }

    impl Model for Comment {
        const TABLE: &'static str = "comments";
        const TIMESTAMPS: bool = false;

        fn relations() -> Vec<Relation> {
            vec![Relation::belongs_to::<Post>("post", "post_id")]
        }
    }

    async fn seeded() -> EntityRepository<Post, MemoryStore> {
        let mut posts = EntityRepository::new(MemoryStore::new());
        for (title, status, created_at) in [
            ("alpha", "active", "2024-01-05 10:00:00"),
            ("beta", "draft", "2024-01-20 10:00:00"),
            ("gamma", "active", "2024-02-10 10:00:00"),
            ("delta", "active", "2024-03-01 10:00:00"),
        ] {
            posts
                .create(attributes([
                    ("title", title),
                    ("status", status),
                    ("created_at", created_at),
                ]))
                .await
                .unwrap();
        }
        posts
    }

    fn titles(posts: &[Post]) -> Vec<&str> {
        posts.iter().filter_map(|p| p.title.as_deref()).collect()
    }

    #[tokio::test]
    async fn test_default_name() {
        let posts = EntityRepository::<Post, _>::new(MemoryStore::new());
        assert_eq!(posts.name(), "PostRepository");
        assert_eq!(posts.named("Articles").name(), "Articles");
    }

    #[tokio::test]
    async fn test_create_fills_timestamps() {
        let mut posts = EntityRepository::<Post, _>::new(MemoryStore::new());
        let post = posts.create(attributes([("title", "new")])).await.unwrap();
        assert_eq!(post.id, Some(1));
        assert!(post.created_at.is_some());
        assert!(post.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_criteria_apply_to_every_read() {
        let mut posts = seeded().await;
        posts.push_criteria(FindWhereCriteria::new(attributes([("status", "active")])));

        assert_eq!(posts.count().await.unwrap(), 3);
        assert_eq!(posts.get(&["*"]).await.unwrap().len(), 3);
        let first = posts
            .order_by("title", OrderDirection::Descending)
            .first(&["*"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.title.as_deref(), Some("gamma"));
        // criteria persist, builder state does not
        assert_eq!(posts.entity().orders().len(), 0);
        assert_eq!(posts.criteria().len(), 1);
    }

    #[tokio::test]
    async fn test_date_range_and_where() {
        let mut posts = seeded().await;
        posts
            .push_criteria(DateCriteria::between("2024-01-01 00:00:00", "2024-01-31 23:59:59"))
            .push_criteria(FindWhereCriteria::new(attributes([("status", "active")])));
        let found = posts.get(&["*"]).await.unwrap();
        assert_eq!(titles(&found), vec!["alpha"]);
    }

    #[tokio::test]
    async fn test_where_or_where_branches() {
        let mut posts = seeded().await;
        posts.push_criteria(
            FindWhereOrWhereCriteria::new(attributes([("status", "draft")]))
                .or_where(attributes([("title", "delta")])),
        );
        let found = posts
            .order_by("id", OrderDirection::Ascending)
            .get(&["*"])
            .await
            .unwrap();
        assert_eq!(titles(&found), vec!["beta", "delta"]);
    }

    #[tokio::test]
    async fn test_pop_and_clear_criteria() {
        let mut posts = seeded().await;
        posts
            .push_criteria(FindWhereCriteria::new(attributes([("status", "draft")])))
            .push_criteria(LimitCriteria::new(1));
        posts.pop_criteria::<LimitCriteria>().unwrap();
        assert_eq!(posts.criteria().type_names().len(), 1);
        assert_eq!(posts.count().await.unwrap(), 1);

        posts.clear_criteria().unwrap();
        assert!(posts.criteria().is_empty());
        assert_eq!(posts.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_pop_and_clear_propagate_resolution_errors() {
        let resolved = AtomicUsize::new(0);
        let mut container = Container::new();
        container.bind_query::<Post>(move || {
            if resolved.fetch_add(1, Ordering::SeqCst) == 0 {
                Query::for_model::<Post>()
            } else {
                Query::for_model::<Comment>()
            }
        });
        let mut posts =
            EntityRepository::<Post, _>::resolve(Arc::new(container), MemoryStore::new()).unwrap();
        posts.push_criteria(LimitCriteria::new(1));

        let err = posts.pop_criteria::<LimitCriteria>().unwrap_err();
        assert!(matches!(err, Error::EntityType(_)));
        let err = posts.clear_criteria().unwrap_err();
        assert!(matches!(err, Error::EntityType(_)));
    }

    #[tokio::test]
    async fn test_search_projection_survives_terminal_columns() {
        let mut posts = seeded().await;
        posts.push_criteria(SearchCriteria::new("alp", &["id", "title"], "title"));

        let found = posts.get(&["*"]).await.unwrap();
        assert_eq!(titles(&found), vec!["alpha"]);
        assert!(found[0].id.is_some());
        assert!(found[0].status.is_none());

        let page = posts
            .paginate(None, &["*"], "page", None)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items[0].status.is_none());

        // without a criterion projection the caller's columns apply
        posts.clear_criteria().unwrap();
        let first = posts.first(&["title"]).await.unwrap().unwrap();
        assert!(first.title.is_some());
        assert!(first.status.is_none());
    }

    #[tokio::test]
    async fn test_skip_criteria_keeps_stack() {
        let mut posts = seeded().await;
        posts
            .push_criteria(FindWhereCriteria::new(attributes([("status", "draft")])))
            .skip_criteria(true);
        assert_eq!(posts.count().await.unwrap(), 4);

        posts.skip_criteria(false);
        assert_eq!(posts.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_all_ignores_criteria() {
        let mut posts = seeded().await;
        posts.push_criteria(LimitCriteria::new(1));
        assert_eq!(posts.all(&["*"]).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_find_where_in_and_not_in() {
        let mut posts = seeded().await;
        let found = posts
            .find_where_in("title", ["alpha", "beta"], &["id", "title"])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.status.is_none()));

        let found = posts
            .find_where_not_in("id", [1_i64, 2, 3], &["*"])
            .await
            .unwrap();
        assert_eq!(titles(&found), vec!["delta"]);
    }

    #[tokio::test]
    async fn test_first_or_new() {
        let mut posts = seeded().await;
        let existing = posts
            .first_or_new(attributes([("title", "beta")]))
            .await
            .unwrap();
        assert_eq!(existing.id, Some(2));

        let fresh = posts
            .first_or_new(attributes([("title", "omega")]))
            .await
            .unwrap();
        assert_eq!(fresh.id, None);
        assert_eq!(fresh.title.as_deref(), Some("omega"));
        assert_eq!(posts.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_paginate() {
        let mut posts = seeded().await;
        let page = posts
            .paginate(None, &["*"], "page", Some(2))
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.per_page, 2);
        assert_eq!(page.last_page, 2);
        assert_eq!(titles(&page.items), vec!["gamma", "delta"]);
        assert!(!page.has_more_pages());

        let simple = posts
            .simple_paginate(Some(3), &["*"], "p", None)
            .await
            .unwrap();
        assert_eq!(simple.items.len(), 3);
        assert!(simple.has_more);
        assert_eq!(simple.page_name, "p");
    }

    #[tokio::test]
    async fn test_huge_page_numbers_saturate() {
        let mut posts = seeded().await;
        let page = posts
            .simple_paginate(Some(10), &["*"], "page", Some(u64::MAX))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);

        let page = posts
            .paginate(Some(u64::MAX), &["*"], "page", Some(u64::MAX))
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_stops_when_callback_declines() {
        let mut posts = seeded().await;
        let mut seen = Vec::new();
        let finished = posts
            .chunk(3, &["*"], |batch| {
                seen.push(batch.len());
                true
            })
            .await
            .unwrap();
        assert!(finished);
        assert_eq!(seen, vec![3, 1]);

        let mut calls = 0;
        let finished = posts
            .chunk(1, &["*"], |_| {
                calls += 1;
                calls < 2
            })
            .await
            .unwrap();
        assert!(!finished);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_update_and_update_or_create() {
        let mut posts = seeded().await;
        let updated = posts
            .update(2_i64, attributes([("status", "active")]))
            .await
            .unwrap();
        assert_eq!(updated.status.as_deref(), Some("active"));

        let same = posts
            .update_or_create(attributes([("title", "alpha")]), attributes([("status", "archived")]))
            .await
            .unwrap();
        assert_eq!(same.id, Some(1));
        assert_eq!(same.status.as_deref(), Some("archived"));

        let created = posts
            .update_or_create(attributes([("title", "omega")]), attributes([("status", "draft")]))
            .await
            .unwrap();
        assert_eq!(created.id, Some(5));
        assert_eq!(created.status.as_deref(), Some("draft"));
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let mut posts = seeded().await;
        let err = posts
            .update(99_i64, attributes([("status", "x")]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = posts.delete(99_i64).await.unwrap_err();
        match err {
            Error::Repository(e) => {
                assert_eq!(e.operation, RepositoryOperation::Delete);
                assert_eq!(e.entity_id.as_deref(), Some("99"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_soft_delete_scopes() {
        let mut posts = seeded().await;
        posts.delete(1_i64).await.unwrap();

        assert_eq!(posts.count().await.unwrap(), 3);
        assert_eq!(posts.with_trashed().count().await.unwrap(), 4);
        assert_eq!(posts.only_trashed().count().await.unwrap(), 1);

        // trashed rows are invisible to writes
        let err = posts.delete(1_i64).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_eager_loading_and_counts() {
        let mut posts = seeded().await;
        let mut comments = EntityRepository::<Comment, _>::new(posts.store().clone());
        for (post_id, body) in [(1_i64, "one"), (1, "two"), (3, "three")] {
            comments
                .create(attributes([("post_id", FilterValue::from(post_id)), ("body", body.into())]))
                .await
                .unwrap();
        }

        let loaded = posts
            .with(&["comments"])
            .with_count(&["comments"])
            .order_by("id", OrderDirection::Ascending)
            .get(&["*"])
            .await
            .unwrap();
        assert_eq!(loaded[0].comments.as_ref().map(Vec::len), Some(2));
        assert_eq!(loaded[0].comments_count, Some(2));
        assert_eq!(loaded[1].comments.as_ref().map(Vec::len), Some(0));
        assert_eq!(loaded[2].comments_count, Some(1));

        let owned = comments.with(&["post"]).first(&["*"]).await.unwrap().unwrap();
        assert_eq!(owned.post.and_then(|p| p.title), Some("alpha".to_string()));
    }

    #[tokio::test]
    async fn test_relation_existence_filters() {
        let mut posts = seeded().await;
        let mut comments = EntityRepository::<Comment, _>::new(posts.store().clone());
        for (post_id, body) in [(1_i64, "one"), (1, "two"), (3, "three")] {
            comments
                .create(attributes([("post_id", FilterValue::from(post_id)), ("body", body.into())]))
                .await
                .unwrap();
        }

        assert_eq!(posts.has("comments", FilterOperator::GreaterThanOrEqual, 2).count().await.unwrap(), 1);
        assert_eq!(posts.doesnt_have("comments").count().await.unwrap(), 2);
        let found = posts
            .where_has("comments", |c| c.where_eq("body", "three"), FilterOperator::GreaterThanOrEqual, 1)
            .get(&["*"])
            .await
            .unwrap();
        assert_eq!(titles(&found), vec!["gamma"]);
    }

    #[tokio::test]
    async fn test_unknown_relation_fails() {
        let mut posts = seeded().await;
        let err = posts.with(&["authors"]).get(&["*"]).await.unwrap_err();
        assert!(matches!(err, Error::RelationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_bad_binding_is_entity_type_error() {
        let mut container = Container::new();
        container.bind(Container::binding_name::<Post>(), || "not a query");
        let container = Arc::new(container);

        let err = EntityRepository::<Post, _>::resolve(container, MemoryStore::new()).unwrap_err();
        assert!(matches!(err, Error::EntityType(_)));
    }

    #[tokio::test]
    async fn test_bound_query_scopes_every_read() {
        let mut container = Container::new();
        container.bind_query::<Post>(|| Query::for_model::<Post>().where_eq("status", "active"));
        let store = seeded().await.store().clone();

        let mut posts = EntityRepository::<Post, _>::resolve(Arc::new(container), store).unwrap();
        assert_eq!(posts.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let mut posts = seeded().await;
        posts.transaction_begin().await.unwrap();
        posts.create(attributes([("title", "temp")])).await.unwrap();
        assert_eq!(posts.count().await.unwrap(), 5);
        posts.transaction_rollback().await.unwrap();
        assert_eq!(posts.count().await.unwrap(), 4);

        assert!(matches!(posts.transaction_commit().await, Err(Error::Transaction(_))));
    }
}
