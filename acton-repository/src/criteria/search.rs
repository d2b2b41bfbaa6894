use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Criterion;
use crate::query::{Filterable, Query};

/// Default number of suggestions returned
pub const DEFAULT_SEARCH_LIMIT: u64 = 5;

/// Fuzzy search for autocomplete widgets
///
/// Projects `select`, keeps rows whose `field` contains `phrase`, and caps
/// the result at `limit` rows.
///
/// ```rust
/// use acton_repository::criteria::SearchCriteria;
///
/// let criterion = SearchCriteria::new("ali", &["id", "name"], "name").limit(10);
/// assert_eq!(criterion.limit, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Text searched for
    pub phrase: String,
    /// Columns returned
    pub select: Vec<String>,
    /// Column searched
    pub field: String,
    /// Maximum rows returned
    pub limit: u64,
}

impl SearchCriteria {
    /// Search `field` for `phrase`, returning `select`
    pub fn new<S: AsRef<str>>(phrase: impl Into<String>, select: &[S], field: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            select: select.iter().map(|s| s.as_ref().to_string()).collect(),
            field: field.into(),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Override the row cap
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }
}

impl Criterion for SearchCriteria {
    fn apply(&self, query: Query) -> Query {
        query
            .select(&self.select)
            .where_like(&self.field, format!("%{}%", self.phrase))
            .limit(self.limit)
    }

    fn describe(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
