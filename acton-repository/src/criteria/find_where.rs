use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Criterion;
use crate::model::Attributes;
use crate::query::{Conditions, Filterable, FilterValue, Query};

/// `AND (column = value AND ...)` from an equality map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindWhereCriteria {
    /// Column/value pairs that must all match
    pub conditions: Attributes,
}

impl FindWhereCriteria {
    /// Criterion matching every pair
    pub fn new(conditions: Attributes) -> Self {
        Self { conditions }
    }
}

impl Criterion for FindWhereCriteria {
    fn apply(&self, query: Query) -> Query {
        query.where_all(self.conditions.clone())
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// `OR (column = value AND ...)` from an equality map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrWhereCriteria {
    /// Column/value pairs of the alternative
    pub conditions: Attributes,
}

impl OrWhereCriteria {
    /// Criterion adding one OR alternative
    pub fn new(conditions: Attributes) -> Self {
        Self { conditions }
    }
}

impl Criterion for OrWhereCriteria {
    fn apply(&self, query: Query) -> Query {
        query.or_where_all(self.conditions.clone())
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// `AND column IN (...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindWhereInCriteria {
    /// Column tested
    pub column: String,
    /// Accepted values
    pub values: Vec<FilterValue>,
}

impl FindWhereInCriteria {
    /// Criterion accepting `values`
    pub fn new<V: Into<FilterValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Criterion for FindWhereInCriteria {
    fn apply(&self, query: Query) -> Query {
        query.where_in(&self.column, self.values.iter().cloned())
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// `AND column NOT IN (...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindWhereNotInCriteria {
    /// Column tested
    pub column: String,
    /// Rejected values
    pub values: Vec<FilterValue>,
}

impl FindWhereNotInCriteria {
    /// Criterion rejecting `values`
    pub fn new<V: Into<FilterValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Criterion for FindWhereNotInCriteria {
    fn apply(&self, query: Query) -> Query {
        query.where_not_in(&self.column, self.values.iter().cloned())
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// `AND ((a = 1 AND ...) OR (b = 2 AND ...) OR ...)`
///
/// The equality map and its alternatives are wrapped in one group so the OR
/// branches cannot escape criteria applied before or after this one.
///
/// ```rust
/// use acton_repository::criteria::FindWhereOrWhereCriteria;
/// use acton_repository::model::attributes;
///
/// let criterion = FindWhereOrWhereCriteria::new(attributes([("status", "active")]))
///     .or_where(attributes([("status", "pending")]));
/// assert_eq!(criterion.or_where.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindWhereOrWhereCriteria {
    /// Pairs of the first branch
    #[serde(rename = "where")]
    pub where_: Attributes,
    /// Pairs of each further branch
    pub or_where: Vec<Attributes>,
}

impl FindWhereOrWhereCriteria {
    /// Criterion with a single branch
    pub fn new(where_: Attributes) -> Self {
        Self {
            where_,
            or_where: Vec::new(),
        }
    }

    /// Add an OR branch
    #[must_use]
    pub fn or_where(mut self, conditions: Attributes) -> Self {
        self.or_where.push(conditions);
        self
    }
}

impl Criterion for FindWhereOrWhereCriteria {
    fn apply(&self, query: Query) -> Query {
        query.where_group(|group: Conditions| {
            self.or_where
                .iter()
                .fold(group.where_all(self.where_.clone()), |group, branch| {
                    group.or_where_all(branch.clone())
                })
        })
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
