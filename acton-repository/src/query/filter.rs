//! Filter primitives for repository queries
//!
//! A [`FilterCondition`] is one `column <op> value` test. Conditions are
//! combined into [`Conditions`](super::Conditions) trees by the query builder.
//!
//! # Example
//!
//! ```rust
//! use acton_repository::query::{FilterCondition, FilterOperator, OrderDirection};
//!
//! let status = FilterCondition::eq("status", "active");
//! let adults = FilterCondition::gte("age", 18_i64);
//! assert_eq!(adults.operator, FilterOperator::GreaterThanOrEqual);
//! assert_eq!(format!("{}", OrderDirection::Descending), "desc");
//! ```

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage format for timestamp columns
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format for date columns
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Sort order of an `order_by` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    /// Keyword used when rendering SQL
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Operator of a single `column <op> value` test
///
/// `In`/`NotIn` expect a [`FilterValue::List`]; `IsNull`/`IsNotNull` ignore
/// the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Evaluate a comparison outcome against this operator
    ///
    /// Only meaningful for the ordering operators; `None` (a NULL on either
    /// side) never satisfies a comparison.
    pub fn accepts(&self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
            Self::LessThan => ordering == Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
            _ => false,
        }
    }

    /// SQL spelling of the operator
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// Scalar or list operand of a condition, also used for row attributes
///
/// Dates and timestamps are kept typed so they render with the storage
/// formats above.
///
/// ```rust
/// use acton_repository::query::FilterValue;
///
/// assert_eq!(FilterValue::from("draft"), FilterValue::String("draft".into()));
/// assert_eq!(FilterValue::from(7_i32), FilterValue::Integer(7));
/// assert_eq!(FilterValue::from(None::<i64>), FilterValue::Null);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    /// Stored as UTC
    Timestamp(NaiveDateTime),
    List(Vec<FilterValue>),
    Null,
}

impl FilterValue {
    /// Convert to the JSON shape rows are stored in
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            Self::Timestamp(t) => Value::String(t.format(TIMESTAMP_FORMAT).to_string()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null => Value::Null,
        }
    }

    /// Convert a stored JSON value back into a filter value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(_) => Self::String(value.to_string()),
        }
    }

    /// Whether this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Null => write!(f, "null"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

macro_rules! filter_value_from {
    ($($source:ty => |$v:ident| $convert:expr;)*) => {
        $(
            impl From<$source> for FilterValue {
                fn from($v: $source) -> Self {
                    $convert
                }
            }
        )*
    };
}

filter_value_from! {
    &str => |v| Self::String(v.to_owned());
    String => |v| Self::String(v);
    &String => |v| Self::String(v.to_owned());
    i64 => |v| Self::Integer(v);
    i32 => |v| Self::Integer(v.into());
    u32 => |v| Self::Integer(v.into());
    f64 => |v| Self::Float(v);
    bool => |v| Self::Boolean(v);
    NaiveDate => |v| Self::Date(v);
    NaiveDateTime => |v| Self::Timestamp(v);
    DateTime<Utc> => |v| Self::Timestamp(v.naive_utc());
    Vec<String> => |v| Self::List(v.into_iter().map(Self::String).collect());
    Vec<&str> => |v| Self::List(v.into_iter().map(Self::from).collect());
    Vec<i64> => |v| Self::List(v.into_iter().map(Self::Integer).collect());
    Vec<FilterValue> => |v| Self::List(v);
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Compare two stored JSON values the way SQL compares column values
///
/// Returns `None` when either side is NULL or the types are not comparable.
pub fn compare_json(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// A single `column <op> value` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// The column to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FilterValue,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Equality filter (field = value)
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    /// Not-equal filter (field != value)
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value.into())
    }

    /// Greater-than filter (field > value)
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value.into())
    }

    /// Greater-than-or-equal filter (field >= value)
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// Less-than filter (field < value)
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThan, value.into())
    }

    /// Less-than-or-equal filter (field <= value)
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// LIKE pattern filter (`%` and `_` wildcards)
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Like, FilterValue::String(pattern.into()))
    }

    /// NOT LIKE pattern filter
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::NotLike, FilterValue::String(pattern.into()))
    }

    /// IN list filter
    pub fn is_in<V: Into<FilterValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(
            field,
            FilterOperator::In,
            FilterValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// NOT IN list filter
    pub fn not_in<V: Into<FilterValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(
            field,
            FilterOperator::NotIn,
            FilterValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// IS NULL filter
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, FilterValue::Null)
    }

    /// IS NOT NULL filter
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, FilterValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_direction_display() {
        assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
        assert_eq!(format!("{}", OrderDirection::Descending), "desc");
        assert_eq!(OrderDirection::default(), OrderDirection::Ascending);
    }

    #[test]
    fn test_filter_operator_display() {
        assert_eq!(format!("{}", FilterOperator::Equal), "=");
        assert_eq!(format!("{}", FilterOperator::NotEqual), "!=");
        assert_eq!(format!("{}", FilterOperator::GreaterThanOrEqual), ">=");
        assert_eq!(format!("{}", FilterOperator::NotLike), "NOT LIKE");
        assert_eq!(format!("{}", FilterOperator::NotIn), "NOT IN");
        assert_eq!(format!("{}", FilterOperator::IsNotNull), "IS NOT NULL");
    }

    #[test]
    fn test_operator_accepts_orderings() {
        assert!(FilterOperator::GreaterThanOrEqual.accepts(Some(Ordering::Equal)));
        assert!(FilterOperator::GreaterThanOrEqual.accepts(Some(Ordering::Greater)));
        assert!(!FilterOperator::LessThan.accepts(Some(Ordering::Equal)));
        assert!(!FilterOperator::NotEqual.accepts(None));
    }

    #[test]
    fn test_filter_value_conversions() {
        assert_eq!(FilterValue::from("a"), FilterValue::String("a".to_string()));
        assert_eq!(FilterValue::from(42_i32), FilterValue::Integer(42));
        assert_eq!(FilterValue::from(Some(true)), FilterValue::Boolean(true));
        assert_eq!(
            FilterValue::from(vec![1_i64, 2]),
            FilterValue::List(vec![FilterValue::Integer(1), FilterValue::Integer(2)])
        );
    }

    #[test]
    fn test_dates_use_storage_format() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(FilterValue::from(date).to_json(), json!("2020-01-31"));

        let stamp = date.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(FilterValue::from(stamp).to_json(), json!("2020-01-31 13:05:00"));
    }

    #[test]
    fn test_from_json_round_trips_scalars() {
        assert_eq!(FilterValue::from_json(&json!(7)), FilterValue::Integer(7));
        assert_eq!(FilterValue::from_json(&json!(1.5)), FilterValue::Float(1.5));
        assert_eq!(FilterValue::from_json(&json!(null)), FilterValue::Null);
    }

    #[test]
    fn test_compare_json() {
        assert_eq!(compare_json(&json!(1), &json!(1.0)), Some(Ordering::Equal));
        assert_eq!(
            compare_json(&json!("2020-01-15 10:00:00"), &json!("2020-01-31")),
            Some(Ordering::Less)
        );
        assert_eq!(compare_json(&json!(null), &json!(1)), None);
        assert_eq!(compare_json(&json!("1"), &json!(1)), None);
    }

    #[test]
    fn test_filter_condition_builders() {
        let filter = FilterCondition::is_in("status", ["active", "pending"]);
        assert_eq!(filter.operator, FilterOperator::In);
        assert_eq!(
            filter.value,
            FilterValue::List(vec!["active".into(), "pending".into()])
        );

        let filter = FilterCondition::is_null("deleted_at");
        assert_eq!(filter.value, FilterValue::Null);

        let filter = FilterCondition::like("email", "%@example.com");
        assert_eq!(filter.operator, FilterOperator::Like);
    }
}
