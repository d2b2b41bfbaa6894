//! Query builder
//!
//! [`Query`] is the handle a repository carries between calls. It is a plain
//! value: every builder method consumes it and returns the extended query, so
//! a repository stores the result back as its current handle. Nothing is
//! executed here; a [`Store`](crate::store::Store) interprets the query.
//!
//! Where-clauses live in a [`Conditions`] tree. Clauses are joined with
//! AND/OR, AND binding tighter, exactly as SQL reads them. The
//! [`Filterable`] trait supplies the where-building methods to both
//! [`Query`] and [`Conditions`], so nested groups and relation constraints are
//! written with the same vocabulary.
//!
//! # Example
//!
//! ```rust
//! use acton_repository::model::Model;
//! use acton_repository::query::{Filterable, OrderDirection, Query};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize)]
//! # struct Post { id: Option<i64> }
//! # impl Model for Post { const TABLE: &'static str = "posts"; }
//!
//! let query = Query::for_model::<Post>()
//!     .where_eq("status", "published")
//!     .or_where_group(|q| q.where_eq("status", "draft").where_eq("author_id", 7_i64))
//!     .order_by("created_at", OrderDirection::Descending)
//!     .limit(10);
//!
//! assert_eq!(query.conditions().len(), 2);
//! assert_eq!(query.limit_value(), Some(10));
//! ```

mod filter;

pub use filter::{
    compare_json, FilterCondition, FilterOperator, FilterValue, OrderDirection, DATE_FORMAT,
    TIMESTAMP_FORMAT,
};

use serde::{Deserialize, Serialize};

use crate::model::{Attributes, Model, TableMeta};

/// Connector placed before a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boolean {
    /// `AND`
    And,
    /// `OR`
    Or,
}

/// One entry in a [`Conditions`] tree
#[derive(Debug, Clone)]
pub enum Clause {
    /// `column <op> value`
    Filter(FilterCondition),
    /// Parenthesised sub-tree
    Group(Conditions),
    /// Relation existence / count test
    Relation(RelationClause),
}

/// Relation existence test: the number of related rows satisfying
/// `constraint` compared against `count` with `operator`
#[derive(Debug, Clone)]
pub struct RelationClause {
    /// Relation name on the table being filtered
    pub relation: String,
    /// Polymorphic owner tables to consider (`*` for all)
    pub morph_types: Option<Vec<String>>,
    /// Extra conditions on the related rows
    pub constraint: Conditions,
    /// Comparison applied to the related row count
    pub operator: FilterOperator,
    /// Count compared against
    pub count: u64,
}

impl RelationClause {
    /// Whether the clause is a plain `EXISTS` test
    pub fn is_exists(&self) -> bool {
        self.operator == FilterOperator::GreaterThanOrEqual && self.count == 1
    }

    /// Whether the clause is a plain `NOT EXISTS` test
    pub fn is_not_exists(&self) -> bool {
        self.operator == FilterOperator::LessThan && self.count == 1
    }
}

/// Ordered where-clauses
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    clauses: Vec<(Boolean, Clause)>,
}

impl Conditions {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no clause has been added
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of top-level clauses
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Top-level clauses with their connectors
    pub fn iter(&self) -> impl Iterator<Item = &(Boolean, Clause)> {
        self.clauses.iter()
    }

    /// Append a clause
    pub fn push(&mut self, boolean: Boolean, clause: Clause) {
        self.clauses.push((boolean, clause));
    }

    /// Evaluate the tree with SQL precedence, given a way to test one clause
    pub fn evaluate<E>(
        &self,
        mut test: impl FnMut(&Clause) -> Result<bool, E>,
    ) -> Result<bool, E> {
        let mut any = false;
        let mut current: Option<bool> = None;
        for (boolean, clause) in &self.clauses {
            let value = test(clause)?;
            current = Some(match (current, boolean) {
                (None, _) => value,
                (Some(acc), Boolean::And) => acc && value,
                (Some(acc), Boolean::Or) => {
                    any |= acc;
                    value
                }
            });
        }
        Ok(any || current.unwrap_or(true))
    }
}

/// Where-building vocabulary shared by [`Query`] and [`Conditions`]
pub trait Filterable: Sized {
    /// The tree new clauses are appended to
    fn conditions_mut(&mut self) -> &mut Conditions;

    /// Append a clause with the given connector
    fn add_clause(mut self, boolean: Boolean, clause: Clause) -> Self {
        self.conditions_mut().push(boolean, clause);
        self
    }

    /// `AND column <op> value`
    fn filter(self, condition: FilterCondition) -> Self {
        self.add_clause(Boolean::And, Clause::Filter(condition))
    }

    /// `OR column <op> value`
    fn or_filter(self, condition: FilterCondition) -> Self {
        self.add_clause(Boolean::Or, Clause::Filter(condition))
    }

    /// `AND column = value`
    fn where_eq(self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter(FilterCondition::eq(column, value))
    }

    /// `OR column = value`
    fn or_where_eq(self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.or_filter(FilterCondition::eq(column, value))
    }

    /// `AND column <operator> value`
    fn where_op(
        self,
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.filter(FilterCondition::new(column, operator, value.into()))
    }

    /// `AND (a = 1 AND b = 2 ...)` from an equality map
    fn where_all(self, attributes: Attributes) -> Self {
        self.add_clause(Boolean::And, Clause::Group(equality_group(attributes)))
    }

    /// `OR (a = 1 AND b = 2 ...)` from an equality map
    fn or_where_all(self, attributes: Attributes) -> Self {
        self.add_clause(Boolean::Or, Clause::Group(equality_group(attributes)))
    }

    /// `AND column IN (...)`
    fn where_in<V: Into<FilterValue>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(FilterCondition::is_in(column, values))
    }

    /// `AND column NOT IN (...)`
    fn where_not_in<V: Into<FilterValue>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(FilterCondition::not_in(column, values))
    }

    /// `AND column IS NULL`
    fn where_null(self, column: impl Into<String>) -> Self {
        self.filter(FilterCondition::is_null(column))
    }

    /// `AND column IS NOT NULL`
    fn where_not_null(self, column: impl Into<String>) -> Self {
        self.filter(FilterCondition::is_not_null(column))
    }

    /// `AND column LIKE pattern`
    fn where_like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(FilterCondition::like(column, pattern))
    }

    /// `AND ( ... )` built by `build`
    fn where_group(self, build: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.add_clause(Boolean::And, Clause::Group(build(Conditions::new())))
    }

    /// `OR ( ... )` built by `build`
    fn or_where_group(self, build: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.add_clause(Boolean::Or, Clause::Group(build(Conditions::new())))
    }

    /// Rows with at least/most `count` related rows, per `operator`
    fn has(self, relation: impl Into<String>, operator: FilterOperator, count: u64) -> Self {
        self.relation_clause(Boolean::And, relation, None, Conditions::new(), operator, count)
    }

    /// OR variant of [`has`](Self::has)
    fn or_has(self, relation: impl Into<String>, operator: FilterOperator, count: u64) -> Self {
        self.relation_clause(Boolean::Or, relation, None, Conditions::new(), operator, count)
    }

    /// Rows without any related row
    fn doesnt_have(self, relation: impl Into<String>) -> Self {
        self.relation_clause(
            Boolean::And,
            relation,
            None,
            Conditions::new(),
            FilterOperator::LessThan,
            1,
        )
    }

    /// OR variant of [`doesnt_have`](Self::doesnt_have)
    fn or_doesnt_have(self, relation: impl Into<String>) -> Self {
        self.relation_clause(
            Boolean::Or,
            relation,
            None,
            Conditions::new(),
            FilterOperator::LessThan,
            1,
        )
    }

    /// Rows whose related rows matching `constraint` satisfy the count test
    fn where_has(
        self,
        relation: impl Into<String>,
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> Self {
        let constraint = constraint(Conditions::new());
        self.relation_clause(Boolean::And, relation, None, constraint, operator, count)
    }

    /// OR variant of [`where_has`](Self::where_has)
    fn or_where_has(
        self,
        relation: impl Into<String>,
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> Self {
        let constraint = constraint(Conditions::new());
        self.relation_clause(Boolean::Or, relation, None, constraint, operator, count)
    }

    /// Rows without related rows matching `constraint`
    fn where_doesnt_have(
        self,
        relation: impl Into<String>,
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> Self {
        let constraint = constraint(Conditions::new());
        self.relation_clause(
            Boolean::And,
            relation,
            None,
            constraint,
            FilterOperator::LessThan,
            1,
        )
    }

    /// OR variant of [`where_doesnt_have`](Self::where_doesnt_have)
    fn or_where_doesnt_have(
        self,
        relation: impl Into<String>,
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> Self {
        let constraint = constraint(Conditions::new());
        self.relation_clause(
            Boolean::Or,
            relation,
            None,
            constraint,
            FilterOperator::LessThan,
            1,
        )
    }

    /// [`has`](Self::has) restricted to the given polymorphic owner tables
    fn has_morph(
        self,
        relation: impl Into<String>,
        types: &[&str],
        operator: FilterOperator,
        count: u64,
    ) -> Self {
        let types = Some(morph_types(types));
        self.relation_clause(Boolean::And, relation, types, Conditions::new(), operator, count)
    }

    /// OR variant of [`has_morph`](Self::has_morph)
    fn or_has_morph(
        self,
        relation: impl Into<String>,
        types: &[&str],
        operator: FilterOperator,
        count: u64,
    ) -> Self {
        let types = Some(morph_types(types));
        self.relation_clause(Boolean::Or, relation, types, Conditions::new(), operator, count)
    }

    /// [`doesnt_have`](Self::doesnt_have) restricted to the given owner tables
    fn doesnt_have_morph(self, relation: impl Into<String>, types: &[&str]) -> Self {
        let types = Some(morph_types(types));
        self.relation_clause(
            Boolean::And,
            relation,
            types,
            Conditions::new(),
            FilterOperator::LessThan,
            1,
        )
    }

    /// OR variant of [`doesnt_have_morph`](Self::doesnt_have_morph)
    fn or_doesnt_have_morph(self, relation: impl Into<String>, types: &[&str]) -> Self {
        let types = Some(morph_types(types));
        self.relation_clause(
            Boolean::Or,
            relation,
            types,
            Conditions::new(),
            FilterOperator::LessThan,
            1,
        )
    }

    /// [`where_has`](Self::where_has) restricted to the given owner tables
    fn where_has_morph(
        self,
        relation: impl Into<String>,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> Self {
        let types = Some(morph_types(types));
        let constraint = constraint(Conditions::new());
        self.relation_clause(Boolean::And, relation, types, constraint, operator, count)
    }

    /// OR variant of [`where_has_morph`](Self::where_has_morph)
    fn or_where_has_morph(
        self,
        relation: impl Into<String>,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> Self {
        let types = Some(morph_types(types));
        let constraint = constraint(Conditions::new());
        self.relation_clause(Boolean::Or, relation, types, constraint, operator, count)
    }

    /// [`where_doesnt_have`](Self::where_doesnt_have) restricted to the given
    /// owner tables
    fn where_doesnt_have_morph(
        self,
        relation: impl Into<String>,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> Self {
        let types = Some(morph_types(types));
        let constraint = constraint(Conditions::new());
        self.relation_clause(
            Boolean::And,
            relation,
            types,
            constraint,
            FilterOperator::LessThan,
            1,
        )
    }

    /// OR variant of [`where_doesnt_have_morph`](Self::where_doesnt_have_morph)
    fn or_where_doesnt_have_morph(
        self,
        relation: impl Into<String>,
        types: &[&str],
        constraint: impl FnOnce(Conditions) -> Conditions,
    ) -> Self {
        let types = Some(morph_types(types));
        let constraint = constraint(Conditions::new());
        self.relation_clause(
            Boolean::Or,
            relation,
            types,
            constraint,
            FilterOperator::LessThan,
            1,
        )
    }

    #[doc(hidden)]
    fn relation_clause(
        self,
        boolean: Boolean,
        relation: impl Into<String>,
        morph_types: Option<Vec<String>>,
        constraint: Conditions,
        operator: FilterOperator,
        count: u64,
    ) -> Self {
        self.add_clause(
            boolean,
            Clause::Relation(RelationClause {
                relation: relation.into(),
                morph_types,
                constraint,
                operator,
                count,
            }),
        )
    }
}

impl Filterable for Conditions {
    fn conditions_mut(&mut self) -> &mut Conditions {
        self
    }
}

fn equality_group(attributes: Attributes) -> Conditions {
    attributes
        .into_iter()
        .fold(Conditions::new(), |group, (column, value)| {
            group.where_eq(column, value)
        })
}

fn morph_types(types: &[&str]) -> Vec<String> {
    types.iter().map(|t| t.to_string()).collect()
}

/// Which rows the soft-delete scope lets through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrashedScope {
    /// Only rows that are not soft deleted
    #[default]
    Exclude,
    /// Every row
    With,
    /// Only soft-deleted rows
    Only,
}

/// Query handle for one table
#[derive(Debug, Clone)]
pub struct Query {
    table: TableMeta,
    conditions: Conditions,
    columns: Vec<String>,
    orders: Vec<(String, OrderDirection)>,
    limit: Option<u64>,
    offset: Option<u64>,
    trashed: TrashedScope,
    eager: Vec<String>,
    counts: Vec<String>,
}

impl Filterable for Query {
    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

impl Query {
    /// Fresh, unfiltered query for a model's table
    pub fn for_model<M: Model>() -> Self {
        Self::for_table(TableMeta::of::<M>())
    }

    /// Fresh, unfiltered query for a table
    pub fn for_table(table: TableMeta) -> Self {
        Self {
            table,
            conditions: Conditions::new(),
            columns: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            trashed: TrashedScope::default(),
            eager: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// Table being queried
    pub fn table(&self) -> &TableMeta {
        &self.table
    }

    /// User where-clauses (without the soft-delete scope)
    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Projected columns; empty means every column
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Order-by entries in application order
    pub fn orders(&self) -> &[(String, OrderDirection)] {
        &self.orders
    }

    /// Row limit
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Row offset
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Soft-delete scope
    pub fn trashed(&self) -> TrashedScope {
        self.trashed
    }

    /// Relations to eager load
    pub fn eager_loads(&self) -> &[String] {
        &self.eager
    }

    /// Relations to count
    pub fn relation_counts(&self) -> &[String] {
        &self.counts
    }

    /// Whether the soft-delete scope filters rows of this table
    pub fn scopes_trashed(&self) -> bool {
        self.table.soft_deletes && self.trashed != TrashedScope::With
    }

    /// Project the given columns; `*` (or nothing) selects every column
    #[must_use]
    pub fn select<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns
            .iter()
            .map(|c| c.as_ref().to_string())
            .filter(|c| c != "*")
            .collect();
        self
    }

    /// Project `columns` only when nothing is projected yet
    ///
    /// Terminal reads use this so a projection set by a criterion survives
    /// the caller's `["*"]`.
    #[must_use]
    pub fn select_default<S: AsRef<str>>(self, columns: &[S]) -> Self {
        if self.columns.is_empty() {
            self.select(columns)
        } else {
            self
        }
    }

    /// Limit the number of rows
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Limit/offset for a 1-indexed page; the offset saturates
    #[must_use]
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        self.offset(page.saturating_sub(1).saturating_mul(per_page))
            .limit(per_page)
    }

    /// Append an order-by entry
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.orders.push((column.into(), direction));
        self
    }

    /// Eager load relations
    #[must_use]
    pub fn with<S: AsRef<str>>(mut self, relations: &[S]) -> Self {
        self.eager
            .extend(relations.iter().map(|r| r.as_ref().to_string()));
        self
    }

    /// Attach `{relation}_count` to each row
    #[must_use]
    pub fn with_count<S: AsRef<str>>(mut self, relations: &[S]) -> Self {
        self.counts
            .extend(relations.iter().map(|r| r.as_ref().to_string()));
        self
    }

    /// Include soft-deleted rows
    #[must_use]
    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedScope::With;
        self
    }

    /// Only soft-deleted rows
    #[must_use]
    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Only;
        self
    }

    /// Drop eager loads and relation counts
    #[must_use]
    pub fn without_relations(mut self) -> Self {
        self.eager.clear();
        self.counts.clear();
        self
    }
}
