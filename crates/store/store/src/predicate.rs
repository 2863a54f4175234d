//! Backend-neutral filter expressions.
//!
//! The memory store evaluates predicates directly with
//! [`Predicate::matches`]; the Postgres store renders them to SQL with bound
//! parameters. Both must agree on semantics, including null handling: a
//! comparison against a null column never matches.

use chrono::{DateTime, Utc};

use logscope_core::{SortDirection, SqlOperation, is_potentially_slow};

use crate::entity::{Column, FieldValue, LogEntity};

/// A literal compared for equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate<C> {
    Eq(C, Scalar),
    /// Case-insensitive substring match.
    Contains(C, String),
    AtOrAfter(C, DateTime<Utc>),
    AtOrBefore(C, DateTime<Utc>),
    /// Strictly before; the exclusive end of a window.
    Before(C, DateTime<Utc>),
    IsNull(C),
    IsNotNull(C),
    /// The column's statement classifies as the given operation.
    Operation(C, SqlOperation),
    /// The column's statement trips at least one slow-query heuristic.
    PotentiallySlow(C),
    /// Empty `And` is always true.
    And(Vec<Predicate<C>>),
    /// Empty `Or` is always false.
    Or(Vec<Predicate<C>>),
    Not(Box<Predicate<C>>),
}

impl<C: Column> Predicate<C> {
    pub fn equals(column: C, value: impl Into<Scalar>) -> Self {
        Self::Eq(column, value.into())
    }

    pub fn contains(column: C, needle: impl Into<String>) -> Self {
        Self::Contains(column, needle.into())
    }

    pub fn negate(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Evaluate against an in-memory record.
    pub fn matches<E>(&self, record: &E) -> bool
    where
        E: LogEntity<Column = C>,
    {
        match self {
            Self::Eq(column, expected) => match (record.field(*column), expected) {
                (FieldValue::Int(actual), Scalar::Int(expected)) => actual == *expected,
                (FieldValue::Text(actual), Scalar::Text(expected)) => actual == expected,
                _ => false,
            },
            Self::Contains(column, needle) => record
                .field(*column)
                .as_text()
                .is_some_and(|haystack| contains_ignore_case(haystack, needle)),
            Self::AtOrAfter(column, bound) => {
                matches!(record.field(*column), FieldValue::Time(t) if t >= *bound)
            }
            Self::AtOrBefore(column, bound) => {
                matches!(record.field(*column), FieldValue::Time(t) if t <= *bound)
            }
            Self::Before(column, bound) => {
                matches!(record.field(*column), FieldValue::Time(t) if t < *bound)
            }
            Self::IsNull(column) => record.field(*column).is_null(),
            Self::IsNotNull(column) => !record.field(*column).is_null(),
            Self::Operation(column, op) => record
                .field(*column)
                .as_text()
                .is_some_and(|stmt| SqlOperation::classify(stmt) == *op),
            Self::PotentiallySlow(column) => record
                .field(*column)
                .as_text()
                .is_some_and(is_potentially_slow),
            Self::And(all) => all.iter().all(|p| p.matches(record)),
            Self::Or(any) => any.iter().any(|p| p.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }
}

/// True when every predicate in the slice matches.
pub fn matches_all<E: LogEntity>(predicates: &[Predicate<E::Column>], record: &E) -> bool {
    predicates.iter().all(|p| p.matches(record))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// One resolved sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<C> {
    pub column: C,
    pub direction: SortDirection,
}

impl<C> Sort<C> {
    pub fn new(column: C, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    pub fn asc(column: C) -> Self {
        Self::new(column, SortDirection::Asc)
    }

    pub fn desc(column: C) -> Self {
        Self::new(column, SortDirection::Desc)
    }
}

/// What a grouped count groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey<C> {
    /// The column's value. Rows where it is null are not counted.
    Column(C),
    /// The SQL operation classified from the column's statement text.
    Operation(C),
}

impl<C: Column> GroupKey<C> {
    /// Group label for a record, or `None` if the record is not counted.
    pub fn label_of<E>(&self, record: &E) -> Option<String>
    where
        E: LogEntity<Column = C>,
    {
        match self {
            Self::Column(column) => record.field(*column).label(),
            Self::Operation(column) => record
                .field(*column)
                .as_text()
                .map(|stmt| SqlOperation::classify(stmt).as_str().to_owned()),
        }
    }
}
