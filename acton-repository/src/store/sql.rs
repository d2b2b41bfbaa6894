//! PostgreSQL statement rendering
//!
//! Turns [`Query`] values into parameterised SQL with `$n` placeholders.
//! Identifiers are double-quoted (`posts.id` becomes `"posts"."id"`), list
//! values are expanded into one placeholder per element, and `NULL` values
//! are written inline so they never need a bind type.
//!
//! # Example
//!
//! ```rust
//! use acton_repository::model::Model;
//! use acton_repository::query::{Filterable, Query};
//! use acton_repository::store::sql;
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize)]
//! # struct Post { id: Option<i64> }
//! # impl Model for Post { const TABLE: &'static str = "posts"; }
//!
//! let query = Query::for_model::<Post>().where_eq("status", "active").limit(5);
//! let statement = sql::select(&query).unwrap();
//! assert_eq!(
//!     statement.sql,
//!     r#"SELECT * FROM "posts" WHERE "status" = $1 LIMIT 5"#
//! );
//! assert_eq!(statement.params.len(), 1);
//! ```

use crate::error::{Error, Result};
use crate::model::{Attributes, RelationJoin, TableMeta, DELETED_AT};
use crate::query::{
    Boolean, Clause, Conditions, FilterCondition, FilterOperator, FilterValue, Query,
    RelationClause, TrashedScope,
};

/// SQL text plus the values bound to its placeholders, in order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Statement text
    pub sql: String,
    /// Bound values for `$1`, `$2`, ...
    pub params: Vec<FilterValue>,
}

/// `SELECT` honouring projection, order, limit and offset
pub fn select(query: &Query) -> Result<SqlStatement> {
    let mut writer = Writer::default();
    let columns = if query.columns().is_empty() {
        "*".to_string()
    } else {
        query
            .columns()
            .iter()
            .map(|c| ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    writer.push(&format!(
        "SELECT {} FROM {}",
        columns,
        ident(query.table().table)
    ));
    writer.where_clause(query)?;

    if !query.orders().is_empty() {
        let orders = query
            .orders()
            .iter()
            .map(|(column, direction)| {
                format!("{} {}", ident(column), direction.keyword().to_uppercase())
            })
            .collect::<Vec<_>>()
            .join(", ");
        writer.push(&format!(" ORDER BY {}", orders));
    }
    if let Some(limit) = query.limit_value() {
        writer.push(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = query.offset_value() {
        writer.push(&format!(" OFFSET {}", offset));
    }
    Ok(writer.finish())
}

/// `SELECT COUNT(*)`, ignoring projection, order, limit and offset
pub fn count(query: &Query) -> Result<SqlStatement> {
    let mut writer = Writer::default();
    writer.push(&format!(
        "SELECT COUNT(*) AS aggregate FROM {}",
        ident(query.table().table)
    ));
    writer.where_clause(query)?;
    Ok(writer.finish())
}

/// `SELECT SUM(column)` as a double, zero when nothing matches
pub fn sum(query: &Query, column: &str) -> Result<SqlStatement> {
    let mut writer = Writer::default();
    writer.push(&format!(
        "SELECT COALESCE(SUM({}), 0)::float8 AS aggregate FROM {}",
        ident(column),
        ident(query.table().table)
    ));
    writer.where_clause(query)?;
    Ok(writer.finish())
}

/// `INSERT ... RETURNING *`
pub fn insert(table: &TableMeta, values: &Attributes) -> SqlStatement {
    let mut writer = Writer::default();
    if values.is_empty() {
        writer.push(&format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING *",
            ident(table.table)
        ));
        return writer.finish();
    }

    let columns = values.keys().map(|c| ident(c)).collect::<Vec<_>>().join(", ");
    let placeholders = values
        .values()
        .map(|v| writer.value(v))
        .collect::<Vec<_>>()
        .join(", ");
    writer.push(&format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        ident(table.table),
        columns,
        placeholders
    ));
    writer.finish()
}

/// `UPDATE ... RETURNING *` over the rows the query selects
pub fn update(query: &Query, values: &Attributes) -> Result<SqlStatement> {
    if values.is_empty() {
        return Err(Error::InvalidQuery(format!(
            "Update on {} has no values to set",
            query.table().table
        )));
    }

    let mut writer = Writer::default();
    let assignments = values
        .iter()
        .map(|(column, value)| format!("{} = {}", ident(column), writer.value(value)))
        .collect::<Vec<_>>()
        .join(", ");
    writer.push(&format!(
        "UPDATE {} SET {}",
        ident(query.table().table),
        assignments
    ));
    writer.where_clause(query)?;
    writer.push(" RETURNING *");
    Ok(writer.finish())
}

/// `DELETE` over the rows the query selects
pub fn delete(query: &Query) -> Result<SqlStatement> {
    let mut writer = Writer::default();
    writer.push(&format!("DELETE FROM {}", ident(query.table().table)));
    writer.where_clause(query)?;
    Ok(writer.finish())
}

/// Double-quote an identifier, splitting on `.`
pub fn ident(name: &str) -> String {
    name.split('.')
        .map(|part| {
            if part == "*" {
                part.to_string()
            } else {
                format!("\"{}\"", part.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Default)]
struct Writer {
    sql: String,
    params: Vec<FilterValue>,
}

impl Writer {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }

    /// Placeholder for a value, or `NULL` inline
    fn value(&mut self, value: &FilterValue) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.params.push(value.clone());
        format!("${}", self.params.len())
    }

    fn where_clause(&mut self, query: &Query) -> Result<()> {
        let table = query.table();
        let user = self.conditions(table, query.conditions())?;
        let scope = trashed_scope(table, query.trashed());
        let clause = match (user.is_empty(), scope) {
            (true, None) => return Ok(()),
            (true, Some(scope)) => scope,
            (false, None) => user,
            (false, Some(scope)) => format!("({}) AND {}", user, scope),
        };
        self.push(" WHERE ");
        self.push(&clause);
        Ok(())
    }

    fn conditions(&mut self, table: &TableMeta, conditions: &Conditions) -> Result<String> {
        let mut sql = String::new();
        for (i, (boolean, clause)) in conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(match boolean {
                    Boolean::And => " AND ",
                    Boolean::Or => " OR ",
                });
            }
            let rendered = match clause {
                Clause::Filter(filter) => self.filter(filter),
                Clause::Group(group) if group.is_empty() => "1 = 1".to_string(),
                Clause::Group(group) => format!("({})", self.conditions(table, group)?),
                Clause::Relation(relation) => self.relation(table, relation)?,
            };
            sql.push_str(&rendered);
        }
        Ok(sql)
    }

    fn filter(&mut self, filter: &FilterCondition) -> String {
        let column = ident(&filter.field);
        match filter.operator {
            FilterOperator::IsNull => format!("{} IS NULL", column),
            FilterOperator::IsNotNull => format!("{} IS NOT NULL", column),
            FilterOperator::In | FilterOperator::NotIn => {
                let negated = filter.operator == FilterOperator::NotIn;
                let items = match &filter.value {
                    FilterValue::List(items) => items.clone(),
                    single => vec![single.clone()],
                };
                if items.is_empty() {
                    return if negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let placeholders = items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} {} ({})", column, filter.operator.sql(), placeholders)
            }
            operator => format!("{} {} {}", column, operator.sql(), self.value(&filter.value)),
        }
    }

    fn relation(&mut self, parent: &TableMeta, clause: &RelationClause) -> Result<String> {
        let relation = parent.relation(&clause.relation)?;
        let joins = relation.joins(parent, clause.morph_types.as_deref());

        if clause.is_exists() || clause.is_not_exists() {
            let exists = if joins.is_empty() {
                "1 = 0".to_string()
            } else {
                let mut parts = Vec::with_capacity(joins.len());
                for join in &joins {
                    let subquery = self.related(parent, join, &clause.constraint, "1")?;
                    parts.push(format!("EXISTS ({})", subquery));
                }
                parts.join(" OR ")
            };
            return Ok(match (clause.is_not_exists(), joins.len()) {
                (false, n) if n > 1 => format!("({})", exists),
                (false, _) => exists,
                (true, 1) => format!("NOT {}", exists),
                (true, _) => format!("NOT ({})", exists),
            });
        }

        let total = if joins.is_empty() {
            "0".to_string()
        } else {
            let mut parts = Vec::with_capacity(joins.len());
            for join in &joins {
                let subquery = self.related(parent, join, &clause.constraint, "COUNT(*)")?;
                parts.push(format!("({})", subquery));
            }
            parts.join(" + ")
        };
        let count = self.value(&FilterValue::Integer(clause.count as i64));
        Ok(format!("{} {} {}", total, clause.operator.sql(), count))
    }

    fn related(
        &mut self,
        parent: &TableMeta,
        join: &RelationJoin,
        constraint: &Conditions,
        projection: &str,
    ) -> Result<String> {
        let related = join.related.table;
        let mut conditions = vec![format!(
            "{}.{} = {}.{}",
            ident(related),
            ident(&join.related_key),
            ident(parent.table),
            ident(&join.parent_key)
        )];
        if let Some((column, value)) = &join.related_type {
            let placeholder = self.value(&FilterValue::from(value));
            conditions.push(format!("{}.{} = {}", ident(related), ident(column), placeholder));
        }
        if let Some((column, value)) = &join.parent_type {
            let placeholder = self.value(&FilterValue::from(value));
            conditions.push(format!(
                "{}.{} = {}",
                ident(parent.table),
                ident(column),
                placeholder
            ));
        }
        if !constraint.is_empty() {
            conditions.push(format!("({})", self.conditions(&join.related, constraint)?));
        }
        if let Some(scope) = trashed_scope(&join.related, TrashedScope::Exclude) {
            conditions.push(scope);
        }
        Ok(format!(
            "SELECT {} FROM {} WHERE {}",
            projection,
            ident(related),
            conditions.join(" AND ")
        ))
    }
}

fn trashed_scope(table: &TableMeta, scope: TrashedScope) -> Option<String> {
    if !table.soft_deletes {
        return None;
    }
    let column = format!("{}.{}", ident(table.table), ident(DELETED_AT));
    match scope {
        TrashedScope::Exclude => Some(format!("{} IS NULL", column)),
        TrashedScope::Only => Some(format!("{} IS NOT NULL", column)),
        TrashedScope::With => None,
    }
}
