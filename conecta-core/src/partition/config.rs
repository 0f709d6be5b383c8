use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ReadOptions;
use crate::error::{ConectaError, Result};
use crate::sql::UserQuery;

/// What the metadata probe has to fetch before planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeededMetadataFromSource {
    Count,
    CountAndMinMax,
}

/// How the caller's queries map onto partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryPartitionMode {
    /// One query, no partition column: read as-is by a single worker.
    OneUnpartitionedQuery,
    /// One query split on `partition_on` into `partition_num` ranges.
    OnePartitionedQuery,
    /// The caller already split the work; each query is one partition.
    PartitionedQueries,
}

impl QueryPartitionMode {
    pub fn infer(query_count: usize, has_partition_column: bool) -> Self {
        match (query_count, has_partition_column) {
            (1, false) => QueryPartitionMode::OneUnpartitionedQuery,
            (1, true) => QueryPartitionMode::OnePartitionedQuery,
            _ => QueryPartitionMode::PartitionedQueries,
        }
    }
}

/// Raw partitioning input, as handed over by a caller.
#[derive(Debug, Clone, Default)]
pub struct PartitionRequest {
    pub queries: Vec<String>,
    pub partition_on: Option<String>,
    pub partition_range: Option<(i64, i64)>,
    pub partition_num: Option<u32>,
}

impl PartitionRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self::with_queries([query])
    }

    pub fn with_queries<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn partition_on(mut self, column: impl Into<String>) -> Self {
        self.partition_on = Some(column.into());
        self
    }

    pub fn partition_num(mut self, num: u32) -> Self {
        self.partition_num = Some(num);
        self
    }

    pub fn partition_range(mut self, min: i64, max: i64) -> Self {
        self.partition_range = Some((min, max));
        self
    }
}

/// Validated, normalized partitioning request.
///
/// Built once by [`PartitionConfig::new`] and read-only afterwards; the
/// derived enums always agree with the queries it holds.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionConfig {
    queries: Vec<String>,
    partition_on: Option<String>,
    partition_num: Option<u32>,
    partition_range: Option<(i64, i64)>,
    needed_metadata_from_source: NeededMetadataFromSource,
    query_partition_mode: QueryPartitionMode,
    preallocation: bool,
    max_pool_size: Option<u32>,
}

impl PartitionConfig {
    pub fn new(request: PartitionRequest, options: &ReadOptions) -> Result<Self> {
        let PartitionRequest {
            queries,
            partition_on,
            partition_range,
            partition_num,
        } = request;

        if queries.is_empty() {
            return Err(ConectaError::config("at least one query is required"));
        }
        let queries = queries
            .iter()
            .map(|q| -> Result<String> {
                let parsed = UserQuery::parse(q)?;
                debug!(table = parsed.table().unwrap_or("<unknown>"), "validated query");
                Ok(parsed.sql().to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        let partition_on = match partition_on {
            Some(column) if column.trim().is_empty() => {
                return Err(ConectaError::config("partition_on must not be empty"))
            }
            other => other.map(|c| c.trim().to_string()),
        };

        if partition_num == Some(0) {
            return Err(ConectaError::config("partition_num must be greater than 0"));
        }
        if options.max_pool_size == Some(0) {
            return Err(ConectaError::config("max_pool_size must be greater than 0"));
        }
        if let Some((min, max)) = partition_range {
            if min > max {
                return Err(ConectaError::config(format!(
                    "partition_range min ({min}) is greater than max ({max})"
                )));
            }
        }

        let query_partition_mode = QueryPartitionMode::infer(queries.len(), partition_on.is_some());
        match query_partition_mode {
            QueryPartitionMode::OneUnpartitionedQuery => {
                if partition_num.is_some_and(|n| n > 1) {
                    return Err(ConectaError::config(
                        "partition_on is required to split a single query into several partitions",
                    ));
                }
                if partition_range.is_some() {
                    return Err(ConectaError::config("partition_range requires partition_on"));
                }
            }
            QueryPartitionMode::OnePartitionedQuery => {}
            QueryPartitionMode::PartitionedQueries => {
                if partition_on.is_some() {
                    return Err(ConectaError::config(
                        "partition_on cannot be combined with several queries; \
                         each query is already one partition",
                    ));
                }
                if partition_range.is_some() {
                    return Err(ConectaError::config(
                        "partition_range cannot be combined with several queries",
                    ));
                }
                if let Some(n) = partition_num {
                    if n as usize != queries.len() {
                        return Err(ConectaError::config(format!(
                            "partition_num ({n}) does not match the number of queries ({})",
                            queries.len()
                        )));
                    }
                }
            }
        }

        let needed_metadata_from_source = match (query_partition_mode, partition_range) {
            (QueryPartitionMode::OnePartitionedQuery, None) => {
                NeededMetadataFromSource::CountAndMinMax
            }
            _ => NeededMetadataFromSource::Count,
        };

        debug!(
            ?query_partition_mode,
            ?needed_metadata_from_source,
            queries = queries.len(),
            "validated partition config"
        );

        Ok(Self {
            queries,
            partition_on,
            partition_num,
            partition_range,
            needed_metadata_from_source,
            query_partition_mode,
            preallocation: options.preallocation,
            max_pool_size: options.max_pool_size,
        })
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn partition_on(&self) -> Option<&str> {
        self.partition_on.as_deref()
    }

    pub fn partition_num(&self) -> Option<u32> {
        self.partition_num
    }

    pub fn partition_range(&self) -> Option<(i64, i64)> {
        self.partition_range
    }

    pub fn needed_metadata_from_source(&self) -> NeededMetadataFromSource {
        self.needed_metadata_from_source
    }

    pub fn query_partition_mode(&self) -> QueryPartitionMode {
        self.query_partition_mode
    }

    pub fn preallocation(&self) -> bool {
        self.preallocation
    }

    pub fn max_pool_size(&self) -> Option<u32> {
        self.max_pool_size
    }

    /// Connections the pool may open; sequential unless the caller raised it.
    pub fn pool_size(&self) -> u32 {
        self.max_pool_size.unwrap_or(1)
    }

    /// Number of data queries the plan will contain.
    pub fn partition_count(&self) -> usize {
        match self.query_partition_mode {
            QueryPartitionMode::OneUnpartitionedQuery => 1,
            QueryPartitionMode::OnePartitionedQuery => self.partition_num.unwrap_or(1) as usize,
            QueryPartitionMode::PartitionedQueries => self.queries.len(),
        }
    }
}
