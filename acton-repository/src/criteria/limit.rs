use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Criterion;
use crate::query::Query;

/// Cap the number of rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCriteria {
    /// Maximum rows returned
    pub limit: u64,
}

impl LimitCriteria {
    /// Limit to `limit` rows
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl Criterion for LimitCriteria {
    fn apply(&self, query: Query) -> Query {
        query.limit(self.limit)
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Skip leading rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCriteria {
    /// Rows skipped
    pub offset: u64,
}

impl OffsetCriteria {
    /// Skip `offset` rows
    pub fn new(offset: u64) -> Self {
        Self { offset }
    }
}

impl Criterion for OffsetCriteria {
    fn apply(&self, query: Query) -> Query {
        query.offset(self.offset)
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
