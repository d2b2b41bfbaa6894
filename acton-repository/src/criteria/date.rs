use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Criterion;
use crate::model::CREATED_AT;
use crate::query::{Filterable, FilterOperator, FilterValue, Query};

/// Rows whose date column falls in an inclusive range
///
/// Either bound may be left open.
///
/// ```rust
/// use acton_repository::criteria::DateCriteria;
/// use chrono::NaiveDate;
///
/// let january = DateCriteria::between(
///     NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
/// );
/// let since_launch = DateCriteria::since("2021-06-01").column("published_at");
/// # let _ = (january, since_launch);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateCriteria {
    /// Lower bound (`>=`)
    pub from: Option<FilterValue>,
    /// Upper bound (`<=`)
    pub to: Option<FilterValue>,
    /// Column compared, `created_at` by default
    pub column: String,
}

impl DateCriteria {
    /// Range with optional bounds
    pub fn new(from: Option<FilterValue>, to: Option<FilterValue>) -> Self {
        Self {
            from,
            to,
            column: CREATED_AT.to_string(),
        }
    }

    /// Closed range
    pub fn between(from: impl Into<FilterValue>, to: impl Into<FilterValue>) -> Self {
        Self::new(Some(from.into()), Some(to.into()))
    }

    /// Everything from `from` on
    pub fn since(from: impl Into<FilterValue>) -> Self {
        Self::new(Some(from.into()), None)
    }

    /// Everything up to `to`
    pub fn until(to: impl Into<FilterValue>) -> Self {
        Self::new(None, Some(to.into()))
    }

    /// Compare another column
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

impl Criterion for DateCriteria {
    fn apply(&self, mut query: Query) -> Query {
        if let Some(from) = &self.from {
            query = query.where_op(&self.column, FilterOperator::GreaterThanOrEqual, from.clone());
        }
        if let Some(to) = &self.to {
            query = query.where_op(&self.column, FilterOperator::LessThanOrEqual, to.clone());
        }
        query
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
