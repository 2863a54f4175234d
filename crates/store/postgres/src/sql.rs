//! Rendering of store predicates into Postgres SQL.
//!
//! Identifiers come only from [`Column::name`]; every caller-supplied value
//! is bound as a parameter.

use sqlx::{Postgres, QueryBuilder};

use logscope_core::{SlowQueryHeuristic, SqlOperation};
use logscope_store::entity::Column;
use logscope_store::predicate::{GroupKey, Predicate, Scalar, Sort};

/// Quoted column identifier.
pub fn column<C: Column>(c: C) -> String {
    format!("\"{}\"", c.name())
}

/// `%needle%` with LIKE wildcards in `needle` escaped.
pub fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

/// SQL expression classifying the statement in `c` by its leading keyword.
pub fn operation_expr<C: Column>(c: C) -> String {
    let col = column(c);
    let arms: Vec<String> = SqlOperation::KEYWORDED
        .iter()
        .map(|op| {
            let kw = op.as_str();
            format!(
                "WHEN UPPER(LEFT(LTRIM({col}, E' \\t\\n\\r\\f'), {len})) = '{kw}' THEN '{kw}'",
                len = kw.len()
            )
        })
        .collect();
    format!("CASE {} ELSE 'OTHER' END", arms.join(" "))
}

/// SQL expression for a grouped-count label.
pub fn group_label_expr<C: Column>(key: GroupKey<C>) -> String {
    match key {
        GroupKey::Column(c) => format!("CAST({} AS TEXT)", column(c)),
        GroupKey::Operation(c) => operation_expr(c),
    }
}

/// Append ` WHERE ...` for `predicates`, or nothing when empty.
pub fn push_where<C: Column>(qb: &mut QueryBuilder<'_, Postgres>, predicates: &[Predicate<C>]) {
    if predicates.is_empty() {
        return;
    }
    qb.push(" WHERE ");
    push_joined(qb, predicates, " AND ");
}

/// Append ` ORDER BY ...` for a resolved sort list.
pub fn push_order<C: Column>(qb: &mut QueryBuilder<'_, Postgres>, sort: &[Sort<C>]) {
    if sort.is_empty() {
        return;
    }
    let keys: Vec<String> = sort
        .iter()
        .map(|s| format!("{} {}", column(s.column), s.direction.as_sql()))
        .collect();
    qb.push(" ORDER BY ").push(keys.join(", "));
}

fn push_joined<C: Column>(
    qb: &mut QueryBuilder<'_, Postgres>,
    predicates: &[Predicate<C>],
    separator: &str,
) {
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        push_predicate(qb, predicate);
    }
}

fn push_predicate<C: Column>(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate<C>) {
    match predicate {
        Predicate::Eq(c, Scalar::Int(v)) => {
            qb.push(column(*c)).push(" = ").push_bind(*v);
        }
        Predicate::Eq(c, Scalar::Text(v)) => {
            qb.push(column(*c)).push(" = ").push_bind(v.clone());
        }
        Predicate::Contains(c, needle) => {
            qb.push(column(*c))
                .push(" ILIKE ")
                .push_bind(like_pattern(needle));
        }
        Predicate::AtOrAfter(c, t) => {
            qb.push(column(*c)).push(" >= ").push_bind(*t);
        }
        Predicate::AtOrBefore(c, t) => {
            qb.push(column(*c)).push(" <= ").push_bind(*t);
        }
        Predicate::Before(c, t) => {
            qb.push(column(*c)).push(" < ").push_bind(*t);
        }
        Predicate::IsNull(c) => {
            qb.push(column(*c)).push(" IS NULL");
        }
        Predicate::IsNotNull(c) => {
            qb.push(column(*c)).push(" IS NOT NULL");
        }
        Predicate::Operation(c, op) => {
            qb.push("(")
                .push(operation_expr(*c))
                .push(") = ")
                .push_bind(op.as_str());
        }
        Predicate::PotentiallySlow(c) => push_slow(qb, *c),
        Predicate::And(all) if all.is_empty() => {
            qb.push("TRUE");
        }
        Predicate::Or(any) if any.is_empty() => {
            qb.push("FALSE");
        }
        Predicate::And(all) => {
            qb.push("(");
            push_joined(qb, all, " AND ");
            qb.push(")");
        }
        Predicate::Or(any) => {
            qb.push("(");
            push_joined(qb, any, " OR ");
            qb.push(")");
        }
        Predicate::Not(inner) => {
            qb.push("NOT (");
            push_predicate(qb, inner);
            qb.push(")");
        }
    }
}

/// Disjunction of every slow-query heuristic, each a conjunction of
/// case-insensitive regex matches.
fn push_slow<C: Column>(qb: &mut QueryBuilder<'_, Postgres>, c: C) {
    let col = column(c);
    qb.push("(");
    for (i, heuristic) in SlowQueryHeuristic::ALL.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push("(");
        for (j, pattern) in heuristic.patterns().iter().enumerate() {
            if j > 0 {
                qb.push(" AND ");
            }
            qb.push(&col).push(" ~* ").push_bind(*pattern);
        }
        qb.push(")");
    }
    qb.push(")");
}
