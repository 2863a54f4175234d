//! Turns query-log statistics into ranked, human-readable findings.
//!
//! Every rule is independent and best-effort. A column literally named
//! `join_date` will trip the join rule; that is accepted.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::stats::{GroupCount, QueryLogStatistics};

/// A page whose share of total query volume exceeds `1 / CACHING_SHARE_DIVISOR`
/// (10%) is reported as a caching candidate.
pub const CACHING_SHARE_DIVISOR: u64 = 10;

/// More than this many `join` occurrences in one statement triggers the
/// indexing rule.
pub const JOIN_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationFinding {
    pub category: String,
    pub finding: String,
    pub impact: Impact,
    pub recommendation: String,
}

impl OptimizationFinding {
    fn new(
        category: &str,
        finding: impl Into<String>,
        impact: Impact,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            category: category.to_owned(),
            finding: finding.into(),
            impact,
            recommendation: recommendation.into(),
        }
    }
}

/// Statistics plus the findings derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternAnalysis {
    pub statistics: QueryLogStatistics,
    /// One entry per insight, same order.
    pub recommendations: Vec<String>,
    pub performance_insights: Vec<OptimizationFinding>,
}

/// Run every rule over `statistics`. Findings are ordered high impact first;
/// within one impact level they keep rule order.
pub fn analyze(statistics: QueryLogStatistics) -> PatternAnalysis {
    let mut insights: Vec<OptimizationFinding> = Vec::new();
    insights.extend(select_star_finding(&statistics.top_queries));
    insights.extend(join_finding(&statistics.top_queries));
    insights.extend(caching_findings(&statistics.top_pages, statistics.total));
    insights.sort_by_key(|f| Reverse(f.impact));

    let recommendations = insights.iter().map(|f| f.recommendation.clone()).collect();

    PatternAnalysis {
        statistics,
        recommendations,
        performance_insights: insights,
    }
}

fn select_star_finding(top_queries: &[GroupCount]) -> Option<OptimizationFinding> {
    let hits = top_queries
        .iter()
        .filter(|q| q.label.to_ascii_lowercase().contains("select *"))
        .count();
    (hits > 0).then(|| {
        OptimizationFinding::new(
            "Query Optimization",
            format!("{hits} of the most frequent queries use SELECT *"),
            Impact::Medium,
            "Replace SELECT * with explicit column lists to reduce data transfer",
        )
    })
}

fn join_finding(top_queries: &[GroupCount]) -> Option<OptimizationFinding> {
    let hits = top_queries
        .iter()
        .filter(|q| q.label.to_ascii_lowercase().matches("join").count() > JOIN_THRESHOLD)
        .count();
    (hits > 0).then(|| {
        OptimizationFinding::new(
            "Indexing",
            format!("{hits} of the most frequent queries join more than {JOIN_THRESHOLD} times"),
            Impact::High,
            "Review indexes on the columns used in join conditions",
        )
    })
}

fn caching_findings(top_pages: &[GroupCount], total: u64) -> Vec<OptimizationFinding> {
    top_pages
        .iter()
        .filter(|p| p.count.saturating_mul(CACHING_SHARE_DIVISOR) > total)
        .map(|p| {
            OptimizationFinding::new(
                "Caching",
                format!(
                    "{} accounts for {:.1}% of all queries ({} of {total})",
                    p.label, p.percentage, p.count
                ),
                Impact::High,
                format!("Cache results served by {}", p.label),
            )
        })
        .collect()
}
