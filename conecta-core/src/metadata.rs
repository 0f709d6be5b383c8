//! Metadata probe run before planning.
//!
//! At most one query is issued: a count, a count plus column bounds, or one
//! merged count per caller-supplied query.

use tracing::{debug, instrument};

use crate::error::{ConectaError, Result};
use crate::partition::config::{NeededMetadataFromSource, PartitionConfig, QueryPartitionMode};
use crate::source::Source;
use crate::sql::builder::{count_min_max_query, count_query, merged_count_query};

/// What the probe learned about the source data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMetadata {
    /// Total rows across all queries.
    pub count: Option<u64>,
    /// Rows per caller-supplied query (`PartitionedQueries` only).
    pub counts: Vec<u64>,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub metadata_query: Option<String>,
}

/// Fetch the metadata `config` needs. The probe is skipped entirely when
/// preallocation is off and the partition bounds are already known.
#[instrument(skip_all, fields(source = source.name()))]
pub fn probe(source: &dyn Source, config: &PartitionConfig) -> Result<QueryMetadata> {
    let mut metadata = QueryMetadata::default();
    if let Some((min, max)) = config.partition_range() {
        metadata.min_value = Some(min);
        metadata.max_value = Some(max);
    }

    let needs_bounds =
        config.needed_metadata_from_source() == NeededMetadataFromSource::CountAndMinMax;
    if !needs_bounds && !config.preallocation() {
        debug!("metadata probe not needed");
        return Ok(metadata);
    }

    let queries = config.queries();
    let sql = match (config.query_partition_mode(), needs_bounds) {
        (QueryPartitionMode::PartitionedQueries, _) => merged_count_query(queries),
        (_, true) => {
            let column = config.partition_on().ok_or_else(|| {
                ConectaError::config("partition_on is required to fetch column bounds")
            })?;
            count_min_max_query(&queries[0], column)
        }
        (_, false) => count_query(&queries[0]),
    };

    debug!(sql = %sql, "running metadata query");
    let row = source
        .acquire()?
        .query_i64_row(&sql)
        .map_err(|err| match err {
            err @ ConectaError::Connection(_) => err,
            other => ConectaError::Connection(format!("metadata query failed: {other}")),
        })?;

    match config.query_partition_mode() {
        QueryPartitionMode::PartitionedQueries => {
            if row.len() != queries.len() {
                return Err(ConectaError::Internal(format!(
                    "metadata query returned {} counts for {} queries",
                    row.len(),
                    queries.len()
                )));
            }
            metadata.counts = row.iter().map(|c| to_count(*c)).collect();
            metadata.count = Some(metadata.counts.iter().sum());
        }
        _ => {
            let count = to_count(row.first().copied().flatten());
            metadata.count = Some(count);
            metadata.counts = vec![count];
            if needs_bounds {
                metadata.min_value = row.get(1).copied().flatten();
                metadata.max_value = row.get(2).copied().flatten();
            }
        }
    }
    metadata.metadata_query = Some(sql);
    debug!(
        count = ?metadata.count,
        min_value = ?metadata.min_value,
        max_value = ?metadata.max_value,
        "metadata probe finished"
    );
    Ok(metadata)
}

fn to_count(value: Option<i64>) -> u64 {
    value.map_or(0, |count| count.max(0) as u64)
}
