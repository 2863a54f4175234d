//! Text heuristics over raw SQL statements.
//!
//! Nothing here parses SQL. Classification looks only at the leading
//! keyword, and the "potentially slow" check is a fixed disjunction of
//! pattern matches. Both are advisory; store backends that push these
//! checks down into the database use the same patterns exported here.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::QueryError;

/// Statement kind derived from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Other,
}

impl SqlOperation {
    /// Every operation that is recognized by a leading keyword, in match order.
    pub const KEYWORDED: [Self; 7] = [
        Self::Select,
        Self::Insert,
        Self::Update,
        Self::Delete,
        Self::Create,
        Self::Alter,
        Self::Drop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Drop => "DROP",
            Self::Other => "OTHER",
        }
    }

    /// Classify a statement by its leading keyword, ignoring leading
    /// whitespace and case. Anything unrecognized is [`SqlOperation::Other`].
    pub fn classify(statement: &str) -> Self {
        let head = statement.trim_start();
        Self::KEYWORDED
            .into_iter()
            .find(|op| {
                let keyword = op.as_str();
                head.get(..keyword.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
            })
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlOperation {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::KEYWORDED
            .into_iter()
            .chain([Self::Other])
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| QueryError::UnknownOperation(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for SqlOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// `SELECT * FROM`, whitespace-tolerant.
pub const SELECT_STAR_PATTERN: &str = r"select\s+\*\s+from";
/// Two or more occurrences of `join`.
pub const MULTIPLE_JOIN_PATTERN: &str = r"join.*join";
pub const ORDER_BY_PATTERN: &str = r"order\s+by";
pub const LIMIT_PATTERN: &str = r"limit";
pub const GROUP_BY_PATTERN: &str = r"group\s+by";
pub const HAVING_PATTERN: &str = r"having";

fn compile(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("slow query pattern is valid")
}

static SELECT_STAR: LazyLock<Regex> = LazyLock::new(|| compile(SELECT_STAR_PATTERN));
static MULTIPLE_JOIN: LazyLock<Regex> = LazyLock::new(|| compile(MULTIPLE_JOIN_PATTERN));
static ORDER_BY: LazyLock<Regex> = LazyLock::new(|| compile(ORDER_BY_PATTERN));
static LIMIT: LazyLock<Regex> = LazyLock::new(|| compile(LIMIT_PATTERN));
static GROUP_BY: LazyLock<Regex> = LazyLock::new(|| compile(GROUP_BY_PATTERN));
static HAVING: LazyLock<Regex> = LazyLock::new(|| compile(HAVING_PATTERN));

/// One rule of the "potentially slow" classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowQueryHeuristic {
    SelectStar,
    MultipleJoins,
    OrderByWithLimit,
    GroupByWithHaving,
}

impl SlowQueryHeuristic {
    pub const ALL: [Self; 4] = [
        Self::SelectStar,
        Self::MultipleJoins,
        Self::OrderByWithLimit,
        Self::GroupByWithHaving,
    ];

    /// Whether this rule fires for `statement`.
    pub fn matches(self, statement: &str) -> bool {
        match self {
            Self::SelectStar => SELECT_STAR.is_match(statement),
            Self::MultipleJoins => MULTIPLE_JOIN.is_match(statement),
            Self::OrderByWithLimit => ORDER_BY.is_match(statement) && LIMIT.is_match(statement),
            Self::GroupByWithHaving => {
                GROUP_BY.is_match(statement) && HAVING.is_match(statement)
            }
        }
    }

    /// Patterns that must all match for this rule to fire.
    pub fn patterns(self) -> &'static [&'static str] {
        match self {
            Self::SelectStar => &[SELECT_STAR_PATTERN],
            Self::MultipleJoins => &[MULTIPLE_JOIN_PATTERN],
            Self::OrderByWithLimit => &[ORDER_BY_PATTERN, LIMIT_PATTERN],
            Self::GroupByWithHaving => &[GROUP_BY_PATTERN, HAVING_PATTERN],
        }
    }
}

/// Heuristics that fire for `statement`, in [`SlowQueryHeuristic::ALL`] order.
pub fn slow_query_reasons(statement: &str) -> Vec<SlowQueryHeuristic> {
    SlowQueryHeuristic::ALL
        .into_iter()
        .filter(|h| h.matches(statement))
        .collect()
}

/// Advisory "potentially slow" label for a single statement.
pub fn is_potentially_slow(statement: &str) -> bool {
    SlowQueryHeuristic::ALL
        .into_iter()
        .any(|h| h.matches(statement))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_leading_keyword() {
        assert_eq!(SqlOperation::classify("SELECT * FROM orders"), SqlOperation::Select);
        assert_eq!(
            SqlOperation::classify("  \n\tinsert into x values (1)"),
            SqlOperation::Insert
        );
        assert_eq!(SqlOperation::classify("Update x set a = 1"), SqlOperation::Update);
        assert_eq!(
            SqlOperation::classify("delete from x where id=1"),
            SqlOperation::Delete
        );
        assert_eq!(SqlOperation::classify("CREATE INDEX i ON t (a)"), SqlOperation::Create);
        assert_eq!(SqlOperation::classify("alter table t add c int"), SqlOperation::Alter);
        assert_eq!(SqlOperation::classify("DROP TABLE t"), SqlOperation::Drop);
        assert_eq!(
            SqlOperation::classify("WITH x AS (SELECT 1) SELECT * FROM x"),
            SqlOperation::Other
        );
        assert_eq!(SqlOperation::classify(""), SqlOperation::Other);
        assert_eq!(SqlOperation::classify("sel"), SqlOperation::Other);
    }

    #[test]
    fn classification_does_not_split_multibyte_heads() {
        assert_eq!(SqlOperation::classify("ünïcødé"), SqlOperation::Other);
    }

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("delete".parse::<SqlOperation>().unwrap(), SqlOperation::Delete);
        assert_eq!("Other".parse::<SqlOperation>().unwrap(), SqlOperation::Other);
        assert!("merge".parse::<SqlOperation>().is_err());
        assert_eq!(
            serde_json::to_string(&SqlOperation::Select).unwrap(),
            "\"SELECT\""
        );
    }

    #[test]
    fn select_star_is_slow() {
        let stmt = "SELECT * FROM orders";
        assert_eq!(SqlOperation::classify(stmt), SqlOperation::Select);
        assert!(is_potentially_slow(stmt));
        assert_eq!(slow_query_reasons(stmt), vec![SlowQueryHeuristic::SelectStar]);
    }

    #[test]
    fn plain_delete_is_not_slow() {
        let stmt = "delete from x where id=1";
        assert_eq!(SqlOperation::classify(stmt), SqlOperation::Delete);
        assert!(!SlowQueryHeuristic::SelectStar.matches(stmt));
        assert!(!is_potentially_slow(stmt));
    }

    #[test]
    fn join_heuristic_needs_two_occurrences() {
        assert!(!is_potentially_slow("select a from t join u on t.id = u.id"));
        assert!(is_potentially_slow(
            "select a from t JOIN u on t.id = u.id\nLEFT JOIN v on v.id = u.id"
        ));
    }

    #[test]
    fn paired_heuristics_need_both_parts() {
        assert!(!is_potentially_slow("select a from t order by a"));
        assert!(is_potentially_slow("select a from t ORDER  BY a LIMIT 10"));
        assert!(!is_potentially_slow("select a, count(*) from t group by a"));
        assert_eq!(
            slow_query_reasons("select a, count(*) from t GROUP BY a HAVING count(*) > 1"),
            vec![SlowQueryHeuristic::GroupByWithHaving]
        );
    }

    #[test]
    fn every_heuristic_exposes_its_patterns() {
        for h in SlowQueryHeuristic::ALL {
            assert!(!h.patterns().is_empty());
        }
    }
}
