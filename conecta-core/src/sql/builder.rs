//! SQL text wrappers around user queries.
//!
//! Every wrapper treats the user query as an opaque subquery, so the row
//! selection the caller wrote is preserved.

use crate::partition::planner::SubRange;

/// `SELECT COUNT(*)` over the query.
pub fn count_query(query: &str) -> String {
    format!("SELECT COUNT(*) FROM ({query}) AS t")
}

/// Count plus the bounds of `column`, in a single pass.
pub fn count_min_max_query(query: &str, column: &str) -> String {
    format!(
        "SELECT COUNT(*), CAST(MIN({column}) AS BIGINT), CAST(MAX({column}) AS BIGINT) \
         FROM ({query}) AS t"
    )
}

/// One row with one count column per query.
pub fn merged_count_query<S: AsRef<str>>(queries: &[S]) -> String {
    let columns = queries
        .iter()
        .enumerate()
        .map(|(i, query)| format!("(SELECT COUNT(*) FROM ({}) AS t{i})", query.as_ref()))
        .collect::<Vec<_>>();
    format!("SELECT {}", columns.join(",\n       "))
}

/// Restrict the query to one sub-range of `column`.
pub fn bounded_query(query: &str, column: &str, range: &SubRange) -> String {
    let upper_op = if range.upper_inclusive { "<=" } else { "<" };
    format!(
        "SELECT * FROM ({query}) AS t_inner WHERE {column} >= {lower} AND {column} {upper_op} {upper}",
        lower = range.lower,
        upper = range.upper,
    )
}

/// Zero-row probe returning only the result schema.
pub fn schema_query(query: &str) -> String {
    format!("SELECT * FROM ({query}) AS t LIMIT 0")
}
