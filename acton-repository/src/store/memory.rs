//! In-process store
//!
//! Tables are vectors of [`Record`]s behind a shared mutex. Where-clauses are
//! evaluated with SQL semantics (NULL never compares, AND binds tighter than
//! OR), `LIKE` patterns are matched with `regex`, and ascending sorts put
//! NULLs last the way PostgreSQL does.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;

use super::Store;
use crate::error::{Error, Result};
use crate::model::{Attributes, Record, RelationJoin, TableMeta, DELETED_AT};
use crate::query::{
    compare_json, Clause, Conditions, FilterCondition, FilterOperator, FilterValue,
    OrderDirection, Query, RelationClause, TrashedScope,
};

static NULL: Value = Value::Null;

#[derive(Debug, Default, Clone)]
struct Table {
    rows: Vec<Record>,
    last_id: i64,
}

type Tables = HashMap<String, Table>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    snapshot: Option<Tables>,
}

/// Store keeping every table in memory
///
/// Clones share the same tables. Integer primary keys are generated when an
/// insert leaves them out. One transaction may be open at a time; rolling it
/// back restores every table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    reads: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read queries (`select`, `count`, `sum`) executed so far
    pub fn query_count(&self) -> u64 {
        self.reads.load(AtomicOrdering::SeqCst)
    }

    /// Every stored row of a table, soft-deleted rows included
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

impl Store for MemoryStore {
    async fn select(&self, query: &Query) -> Result<Vec<Record>> {
        self.record_read();
        let state = self.state.lock().await;
        let Some(stored) = state.tables.get(query.table().table) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<&Record> = matching_indices(&state.tables, query)?
            .into_iter()
            .map(|i| &stored.rows[i])
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, query.orders()));

        let offset = query.offset_value().unwrap_or(0) as usize;
        let limit = query.limit_value().map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, query.columns()))
            .collect())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        self.record_read();
        let state = self.state.lock().await;
        Ok(matching_indices(&state.tables, query)?.len() as u64)
    }

    async fn sum(&self, query: &Query, column: &str) -> Result<f64> {
        self.record_read();
        let state = self.state.lock().await;
        let Some(stored) = state.tables.get(query.table().table) else {
            return Ok(0.0);
        };
        Ok(matching_indices(&state.tables, query)?
            .into_iter()
            .filter_map(|i| numeric(column_value(&stored.rows[i], column)))
            .sum())
    }

    async fn insert(&self, table: &TableMeta, values: &Attributes) -> Result<Record> {
        let mut state = self.state.lock().await;
        let stored = state.tables.entry(table.table.to_string()).or_default();

        let mut record: Record = values
            .iter()
            .map(|(column, value)| (column.clone(), value.to_json()))
            .collect();
        let key = record.get(table.primary_key).cloned().unwrap_or(Value::Null);
        match key.as_i64() {
            Some(id) => stored.last_id = stored.last_id.max(id),
            None if key.is_null() => {
                stored.last_id += 1;
                record.insert(table.primary_key.to_string(), Value::from(stored.last_id));
            }
            None => {}
        }

        stored.rows.push(record.clone());
        Ok(record)
    }

    async fn update(&self, query: &Query, values: &Attributes) -> Result<Vec<Record>> {
        let mut state = self.state.lock().await;
        let indices = matching_indices(&state.tables, query)?;
        let Some(stored) = state.tables.get_mut(query.table().table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::with_capacity(indices.len());
        for i in indices {
            let row = &mut stored.rows[i];
            for (column, value) in values {
                row.insert(column.clone(), value.to_json());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, query: &Query) -> Result<u64> {
        let mut state = self.state.lock().await;
        let indices = matching_indices(&state.tables, query)?;
        let Some(stored) = state.tables.get_mut(query.table().table) else {
            return Ok(0);
        };

        let mut position = 0;
        stored.rows.retain(|_| {
            let keep = indices.binary_search(&position).is_err();
            position += 1;
            keep
        });
        Ok(indices.len() as u64)
    }

    async fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.snapshot.is_some() {
            return Err(Error::Transaction(
                "a transaction is already active".to_string(),
            ));
        }
        state.snapshot = Some(state.tables.clone());
        tracing::debug!("Memory store transaction started");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .snapshot
            .take()
            .ok_or_else(|| Error::Transaction("no active transaction to commit".to_string()))?;
        tracing::debug!("Memory store transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| Error::Transaction("no active transaction to roll back".to_string()))?;
        state.tables = snapshot;
        tracing::debug!("Memory store transaction rolled back");
        Ok(())
    }
}

fn column_value<'a>(row: &'a Record, column: &str) -> &'a Value {
    let name = column.rsplit('.').next().unwrap_or(column);
    row.get(name).unwrap_or(&NULL)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn project(row: &Record, columns: &[String]) -> Record {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .map(|column| {
            let name = column.rsplit('.').next().unwrap_or(column);
            (name.to_string(), column_value(row, column).clone())
        })
        .collect()
}

fn compare_rows(a: &Record, b: &Record, orders: &[(String, OrderDirection)]) -> Ordering {
    for (column, direction) in orders {
        let (left, right) = (column_value(a, column), column_value(b, column));
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_json(left, right).unwrap_or(Ordering::Equal),
        };
        let ordering = match direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn matching_indices(tables: &Tables, query: &Query) -> Result<Vec<usize>> {
    let Some(stored) = tables.get(query.table().table) else {
        return Ok(Vec::new());
    };
    let mut indices = Vec::new();
    for (i, row) in stored.rows.iter().enumerate() {
        if row_matches(tables, query, row)? {
            indices.push(i);
        }
    }
    Ok(indices)
}

fn row_matches(tables: &Tables, query: &Query, row: &Record) -> Result<bool> {
    let table = query.table();
    if table.soft_deletes {
        let trashed = !column_value(row, DELETED_AT).is_null();
        let visible = match query.trashed() {
            TrashedScope::Exclude => !trashed,
            TrashedScope::With => true,
            TrashedScope::Only => trashed,
        };
        if !visible {
            return Ok(false);
        }
    }
    conditions_match(tables, table, query.conditions(), row)
}

fn conditions_match(
    tables: &Tables,
    table: &TableMeta,
    conditions: &Conditions,
    row: &Record,
) -> Result<bool> {
    conditions.evaluate(|clause| match clause {
        Clause::Filter(filter) => filter_matches(filter, row),
        Clause::Group(group) => conditions_match(tables, table, group, row),
        Clause::Relation(relation) => relation_matches(tables, table, relation, row),
    })
}

fn filter_matches(filter: &FilterCondition, row: &Record) -> Result<bool> {
    let value = column_value(row, &filter.field);
    Ok(match filter.operator {
        FilterOperator::IsNull => value.is_null(),
        FilterOperator::IsNotNull => !value.is_null(),
        FilterOperator::In => in_list(value, &filter.value),
        FilterOperator::NotIn => !value.is_null() && !in_list(value, &filter.value),
        FilterOperator::Like => match text(value) {
            Some(text) => like_pattern(&filter.value)?.is_match(&text),
            None => false,
        },
        FilterOperator::NotLike => match text(value) {
            Some(text) => !like_pattern(&filter.value)?.is_match(&text),
            None => false,
        },
        operator => operator.accepts(compare_json(value, &filter.value.to_json())),
    })
}

fn in_list(value: &Value, list: &FilterValue) -> bool {
    let equals = |item: &FilterValue| compare_json(value, &item.to_json()) == Some(Ordering::Equal);
    match list {
        FilterValue::List(items) => items.iter().any(equals),
        single => equals(single),
    }
}

fn like_pattern(pattern: &FilterValue) -> Result<Regex> {
    let pattern = pattern.to_string();
    let mut source = String::from("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source)
        .map_err(|e| Error::InvalidQuery(format!("Invalid LIKE pattern '{}': {}", pattern, e)))
}

fn relation_matches(
    tables: &Tables,
    parent: &TableMeta,
    clause: &RelationClause,
    row: &Record,
) -> Result<bool> {
    let relation = parent.relation(&clause.relation)?;
    let mut total = 0_u64;
    for join in relation.joins(parent, clause.morph_types.as_deref()) {
        total += related_count(tables, &join, row, &clause.constraint)?;
    }
    Ok(clause.operator.accepts(Some(total.cmp(&clause.count))))
}

fn related_count(
    tables: &Tables,
    join: &RelationJoin,
    row: &Record,
    constraint: &Conditions,
) -> Result<u64> {
    if let Some((column, expected)) = &join.parent_type {
        if column_value(row, column).as_str() != Some(expected.as_str()) {
            return Ok(0);
        }
    }
    let key = column_value(row, &join.parent_key);
    if key.is_null() {
        return Ok(0);
    }
    let Some(stored) = tables.get(join.related.table) else {
        return Ok(0);
    };

    let mut count = 0;
    for related in &stored.rows {
        if compare_json(column_value(related, &join.related_key), key) != Some(Ordering::Equal) {
            continue;
        }
        if let Some((column, expected)) = &join.related_type {
            if column_value(related, column).as_str() != Some(expected.as_str()) {
                continue;
            }
        }
        if join.related.soft_deletes && !column_value(related, DELETED_AT).is_null() {
            continue;
        }
        if conditions_match(tables, &join.related, constraint, related)? {
            count += 1;
        }
    }
    Ok(count)
}
