//! Reusable query criteria
//!
//! A [`Criterion`] is an immutable value that knows how to narrow a
//! [`Query`]. Repositories keep an ordered [`CriteriaStack`] and fold it over
//! their query handle before every terminal read, so the same filters apply
//! uniformly to `get`, `first`, `count`, `paginate`, and the rest.
//!
//! Each criterion also describes itself as JSON. The stack's
//! [`fingerprint`](CriteriaStack::fingerprint) is built from those
//! descriptions and feeds cache keys: two stacks holding the same criteria
//! types with the same parameters, in the same order, fingerprint
//! identically.
//!
//! # Example
//!
//! ```rust
//! use acton_repository::criteria::{CriteriaStack, FindWhereCriteria, LimitCriteria};
//! use acton_repository::model::{attributes, Model};
//! use acton_repository::query::Query;
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize)]
//! # struct Post { id: Option<i64> }
//! # impl Model for Post { const TABLE: &'static str = "posts"; }
//!
//! let mut stack = CriteriaStack::new();
//! stack.push(FindWhereCriteria::new(attributes([("status", "active")])));
//! stack.push(LimitCriteria::new(10));
//!
//! let query = stack.apply(Query::for_model::<Post>());
//! assert_eq!(query.limit_value(), Some(10));
//!
//! stack.pop::<LimitCriteria>();
//! assert_eq!(stack.len(), 1);
//! ```

mod date;
mod find_where;
mod limit;
mod search;

pub use date::DateCriteria;
pub use find_where::{
    FindWhereCriteria, FindWhereInCriteria, FindWhereNotInCriteria, FindWhereOrWhereCriteria,
    OrWhereCriteria,
};
pub use limit::{LimitCriteria, OffsetCriteria};
pub use search::SearchCriteria;

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::query::Query;

/// A named, reusable query filter
///
/// `apply` must be a pure function of the criterion's fields and the
/// incoming query. `describe` returns those fields as JSON; built-in criteria
/// derive `Serialize` and return `serde_json::to_value(self)`.
pub trait Criterion: fmt::Debug + Send + Sync + 'static {
    /// Narrow the query
    fn apply(&self, query: Query) -> Query;

    /// Field values identifying this criterion's effect
    fn describe(&self) -> serde_json::Result<Value>;
}

#[derive(Clone)]
struct Entry {
    type_id: TypeId,
    type_name: &'static str,
    criterion: Arc<dyn Criterion>,
}

/// Ordered criteria; insertion order is application order
#[derive(Clone, Default)]
pub struct CriteriaStack {
    entries: Vec<Entry>,
    skipped: bool,
}

impl fmt::Debug for CriteriaStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriteriaStack")
            .field(
                "criteria",
                &self.entries.iter().map(|e| &e.criterion).collect::<Vec<_>>(),
            )
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl CriteriaStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a criterion; duplicates are kept
    pub fn push<C: Criterion>(&mut self, criterion: C) {
        tracing::debug!(criterion = std::any::type_name::<C>(), "Pushing criterion");
        self.entries.push(Entry {
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            criterion: Arc::new(criterion),
        });
    }

    /// Remove every criterion of type `C`, returning how many were removed
    pub fn pop<C: Criterion>(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.type_id != TypeId::of::<C>());
        let removed = before - self.entries.len();
        tracing::debug!(
            criterion = std::any::type_name::<C>(),
            removed,
            "Popped criteria"
        );
        removed
    }

    /// Remove every criterion
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Turn application off (or back on) without touching the stack
    pub fn skip(&mut self, skip: bool) {
        self.skipped = skip;
    }

    /// Whether application is turned off
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Number of criteria held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no criterion is held
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Criteria in application order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Criterion> {
        self.entries.iter().map(|e| e.criterion.as_ref())
    }

    /// Type names of the held criteria, in application order
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.type_name).collect()
    }

    /// Fold the criteria over `query` in order; a no-op while skipped
    pub fn apply(&self, query: Query) -> Query {
        if self.skipped {
            return query;
        }
        self.entries
            .iter()
            .fold(query, |query, entry| entry.criterion.apply(query))
    }

    /// Deterministic description of what [`apply`](Self::apply) would do
    ///
    /// One entry per applied criterion: its type name and its parameters.
    /// A criterion whose description fails is identified by a hash of its
    /// `Debug` output instead. A skipped stack fingerprints as empty.
    pub fn fingerprint(&self) -> Value {
        if self.skipped {
            return Value::Array(Vec::new());
        }
        let entries = self
            .entries
            .iter()
            .map(|entry| match entry.criterion.describe() {
                Ok(parameters) => json!({
                    "criterion": entry.type_name,
                    "parameters": parameters,
                }),
                Err(e) => {
                    tracing::warn!(
                        criterion = entry.type_name,
                        error = %e,
                        "Criterion could not describe itself; fingerprinting its debug output"
                    );
                    let debug = format!("{:?}", entry.criterion);
                    json!({
                        "criterion": entry.type_name,
                        "hash": blake3::hash(debug.as_bytes()).to_hex().to_string(),
                    })
                }
            })
            .collect();
        Value::Array(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{attributes, Model};
    use crate::query::Filterable;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize)]
    struct Post {
        id: Option<i64>,
    }

    impl Model for Post {
        const TABLE: &'static str = "posts";
    }

    /// Criterion whose parameters cannot be described as JSON
    #[derive(Debug)]
    struct OpaqueCriteria {
        weights: HashMap<Vec<u8>, u8>,
    }

    impl Criterion for OpaqueCriteria {
        fn apply(&self, query: Query) -> Query {
            query.where_not_null("weight")
        }

        fn describe(&self) -> serde_json::Result<Value> {
            // Map keys must be strings
            serde_json::to_value(&self.weights)
        }
    }

    fn opaque(weight: u8) -> OpaqueCriteria {
        OpaqueCriteria {
            weights: HashMap::from([(vec![1], weight)]),
        }
    }

    #[test]
    fn test_apply_in_insertion_order() {
        let mut stack = CriteriaStack::new();
        stack.push(LimitCriteria::new(5));
        stack.push(LimitCriteria::new(10));
        let query = stack.apply(Query::for_model::<Post>());
        assert_eq!(query.limit_value(), Some(10));
    }

    #[test]
    fn test_pop_removes_every_instance_of_a_type() {
        let mut stack = CriteriaStack::new();
        stack.push(LimitCriteria::new(5));
        stack.push(FindWhereCriteria::new(attributes([("a", 1_i64)])));
        stack.push(LimitCriteria::new(10));

        assert_eq!(stack.pop::<LimitCriteria>(), 2);
        assert_eq!(stack.type_names().len(), 1);
        assert!(stack.type_names()[0].ends_with("FindWhereCriteria"));
        assert_eq!(stack.pop::<OffsetCriteria>(), 0);
    }

    #[test]
    fn test_skip_keeps_stack() {
        let mut stack = CriteriaStack::new();
        stack.push(LimitCriteria::new(5));
        stack.skip(true);
        assert_eq!(stack.apply(Query::for_model::<Post>()).limit_value(), None);
        assert_eq!(stack.fingerprint(), json!([]));
        stack.skip(false);
        assert_eq!(stack.apply(Query::for_model::<Post>()).limit_value(), Some(5));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let build = |status: &str| {
            let mut stack = CriteriaStack::new();
            stack.push(FindWhereCriteria::new(attributes([("status", status)])));
            stack.push(LimitCriteria::new(3));
            stack.fingerprint()
        };
        assert_eq!(build("active"), build("active"));
        assert_ne!(build("active"), build("draft"));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let mut first = CriteriaStack::new();
        first.push(LimitCriteria::new(3));
        first.push(OffsetCriteria::new(3));
        let mut second = CriteriaStack::new();
        second.push(OffsetCriteria::new(3));
        second.push(LimitCriteria::new(3));
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_cleared_stack_fingerprints_like_a_new_one() {
        let mut stack = CriteriaStack::new();
        stack.push(LimitCriteria::new(3));
        stack.clear();
        assert_eq!(stack.fingerprint(), CriteriaStack::new().fingerprint());
    }

    #[test]
    fn test_fingerprint_falls_back_to_debug_hash() {
        let mut stack = CriteriaStack::new();
        stack.push(opaque(1));
        let fingerprint = stack.fingerprint();
        assert!(fingerprint[0]["hash"].is_string());
        assert!(fingerprint[0].get("parameters").is_none());

        let mut other = CriteriaStack::new();
        other.push(opaque(2));
        assert_ne!(fingerprint, other.fingerprint());
    }
}
