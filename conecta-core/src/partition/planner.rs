//! Turns a validated [`PartitionConfig`] plus probed metadata into the
//! executable list of partition queries.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{ConectaError, Result};
use crate::metadata::{self, QueryMetadata};
use crate::partition::config::{PartitionConfig, QueryPartitionMode};
use crate::source::Source;
use crate::sql::builder::bounded_query;

/// Contiguous slice `[lower, upper)` of the partition column, or
/// `[lower, upper]` for the last slice.
///
/// Bounds are 128-bit so `max + 1` never overflows for `i64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubRange {
    pub lower: i128,
    pub upper: i128,
    pub upper_inclusive: bool,
}

#[cfg(test)]
impl SubRange {
    fn contains(&self, value: i64) -> bool {
        let value = value as i128;
        value >= self.lower
            && if self.upper_inclusive {
                value <= self.upper
            } else {
                value < self.upper
            }
    }

    fn is_empty(&self) -> bool {
        if self.upper_inclusive {
            self.lower > self.upper
        } else {
            self.lower >= self.upper
        }
    }
}

/// Split `[min, max]` into `partitions` contiguous slices of width
/// `ceil((max - min + 1) / partitions)`. The last slice ends at `max`
/// inclusive; slices that start past `max` are empty.
pub fn split_range(min: i64, max: i64, partitions: usize) -> Result<Vec<SubRange>> {
    if partitions == 0 {
        return Err(ConectaError::config("partition_num must be greater than 0"));
    }
    if min > max {
        return Err(ConectaError::config(format!(
            "invalid partition range: min ({min}) is greater than max ({max})"
        )));
    }

    let (min, max) = (min as i128, max as i128);
    let n = partitions as i128;
    let span = max - min + 1;
    let width = (span + n - 1) / n;
    let end = max + 1;

    let ranges = (0..n)
        .map(|i| {
            let lower = (min + i * width).min(end);
            if i == n - 1 {
                SubRange {
                    lower,
                    upper: max,
                    upper_inclusive: true,
                }
            } else {
                SubRange {
                    lower,
                    upper: (lower + width).min(end),
                    upper_inclusive: false,
                }
            }
        })
        .collect();
    Ok(ranges)
}

/// The executable artifact driving one read.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionPlan {
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    /// Total rows the metadata probe reported, if it ran.
    pub count: Option<u64>,
    /// Estimated rows per partition, used to size buffers.
    pub counts: Vec<u64>,
    pub metadata_query: Option<String>,
    /// Column slice per partition in `OnePartitionedQuery` mode.
    pub ranges: Vec<SubRange>,
    pub data_queries: Vec<String>,
    pub partition_config: PartitionConfig,
}

impl PartitionPlan {
    /// Derive the plan for `config` from already probed metadata.
    pub fn build(config: PartitionConfig, metadata: QueryMetadata) -> Result<Self> {
        let partitions = config.partition_count();
        let QueryMetadata {
            count,
            counts,
            min_value,
            max_value,
            metadata_query,
        } = metadata;

        let (ranges, data_queries, counts) = match config.query_partition_mode() {
            QueryPartitionMode::OneUnpartitionedQuery => {
                let counts = vec![count.unwrap_or(0)];
                (Vec::new(), config.queries().to_vec(), counts)
            }
            QueryPartitionMode::OnePartitionedQuery => {
                let column = config.partition_on().ok_or_else(|| {
                    ConectaError::config("partition_on is required to split a query")
                })?;
                let query = &config.queries()[0];
                let (lo, hi) = match (min_value, max_value) {
                    (Some(lo), Some(hi)) => (lo, hi),
                    _ => {
                        debug!("source returned no bounds, planning over an empty range");
                        (0, 0)
                    }
                };
                let ranges = split_range(lo, hi, partitions)?;
                let data_queries = ranges
                    .iter()
                    .map(|range| bounded_query(query, column, range))
                    .collect();
                let per_partition = count.unwrap_or(0).div_ceil(partitions as u64);
                (ranges, data_queries, vec![per_partition; partitions])
            }
            QueryPartitionMode::PartitionedQueries => {
                let counts = if counts.len() == partitions {
                    counts
                } else {
                    vec![0; partitions]
                };
                (Vec::new(), config.queries().to_vec(), counts)
            }
        };

        let plan = Self {
            min_value,
            max_value,
            count,
            counts,
            metadata_query,
            ranges,
            data_queries,
            partition_config: config,
        };
        debug_assert_eq!(plan.data_queries.len(), plan.counts.len());
        Ok(plan)
    }

    pub fn partitions(&self) -> usize {
        self.data_queries.len()
    }

    /// Buffer capacity for partition `index`, zero when preallocation is off.
    pub fn capacity_hint(&self, index: usize) -> usize {
        if !self.partition_config.preallocation() {
            return 0;
        }
        self.counts.get(index).copied().unwrap_or(0) as usize
    }
}

/// Probe the source as needed and build the plan. Issues no data queries.
#[instrument(skip_all, fields(source = source.name(), mode = ?config.query_partition_mode()))]
pub fn create_partition_plan(source: &dyn Source, config: PartitionConfig) -> Result<PartitionPlan> {
    let metadata = metadata::probe(source, &config)?;
    let plan = PartitionPlan::build(config, metadata)?;
    info!(
        partitions = plan.partitions(),
        min_value = ?plan.min_value,
        max_value = ?plan.max_value,
        count = ?plan.count,
        "created partition plan"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadOptions;
    use crate::partition::config::PartitionRequest;
    use proptest::prelude::*;

    fn config(request: PartitionRequest) -> PartitionConfig {
        PartitionConfig::new(request, &ReadOptions::default()).unwrap()
    }

    fn metadata(count: u64, bounds: Option<(i64, i64)>) -> QueryMetadata {
        QueryMetadata {
            count: Some(count),
            counts: vec![count],
            min_value: bounds.map(|b| b.0),
            max_value: bounds.map(|b| b.1),
            metadata_query: Some("probe".to_string()),
        }
    }

    fn assert_covers(ranges: &[SubRange], min: i64, max: i64) {
        let first = ranges.first().unwrap();
        assert_eq!(first.lower, min as i128);
        for pair in ranges.windows(2) {
            assert!(!pair[0].upper_inclusive);
            assert_eq!(pair[0].upper, pair[1].lower, "gap or overlap in {ranges:?}");
            assert!(pair[0].lower <= pair[0].upper);
        }
        let last = ranges.last().unwrap();
        assert!(last.upper_inclusive);
        assert_eq!(last.upper, max as i128);
        assert!(last.lower <= max as i128 + 1);
    }

    #[test]
    fn split_range_gives_remainder_to_last_partition() {
        let ranges = split_range(0, 9, 4).unwrap();
        let bounds: Vec<_> = ranges
            .iter()
            .map(|r| (r.lower, r.upper, r.upper_inclusive))
            .collect();
        assert_eq!(
            bounds,
            vec![(0, 3, false), (3, 6, false), (6, 9, false), (9, 9, true)]
        );
    }

    #[test]
    fn split_range_more_partitions_than_values_yields_empty_tail() {
        let ranges = split_range(5, 7, 5).unwrap();
        assert_eq!(ranges.len(), 5);
        assert_covers(&ranges, 5, 7);
        assert!(!ranges[0].is_empty());
        assert!(ranges[3].is_empty());
        assert!(ranges[4].is_empty());
        assert_eq!((5..=7).filter(|v| ranges[4].contains(*v)).count(), 0);
    }

    #[test]
    fn split_range_handles_extreme_bounds() {
        let ranges = split_range(i64::MIN, i64::MAX, 3).unwrap();
        assert_covers(&ranges, i64::MIN, i64::MAX);
        assert!(ranges[2].contains(i64::MAX));
        assert!(ranges[0].contains(i64::MIN));
    }

    #[test]
    fn split_range_rejects_zero_partitions() {
        assert!(matches!(
            split_range(0, 10, 0),
            Err(ConectaError::Config(_))
        ));
    }

    #[test]
    fn plan_for_lineitem_bounds_has_two_queries() {
        let config = config(
            PartitionRequest::new("select * from lineitem_small")
                .partition_on("l_orderkey")
                .partition_num(2),
        );
        let plan =
            PartitionPlan::build(config, metadata(10_000, Some((1_108_353, 1_197_255)))).unwrap();
        assert_eq!(plan.min_value, Some(1_108_353));
        assert_eq!(plan.max_value, Some(1_197_255));
        assert_eq!(plan.data_queries.len(), 2);
        assert_eq!(plan.counts, vec![5_000, 5_000]);
        assert_eq!(
            plan.data_queries[0],
            "SELECT * FROM (select * from lineitem_small) AS t_inner \
             WHERE l_orderkey >= 1108353 AND l_orderkey < 1152805"
        );
        assert_eq!(
            plan.data_queries[1],
            "SELECT * FROM (select * from lineitem_small) AS t_inner \
             WHERE l_orderkey >= 1152805 AND l_orderkey <= 1197255"
        );
    }

    #[test]
    fn unpartitioned_plan_keeps_the_original_query() {
        let plan = PartitionPlan::build(
            config(PartitionRequest::new("select * from t;")),
            metadata(3, None),
        )
        .unwrap();
        assert_eq!(plan.data_queries, vec!["select * from t".to_string()]);
        assert_eq!(plan.counts, vec![3]);
        assert!(plan.ranges.is_empty());
    }

    #[test]
    fn partitioned_queries_are_used_verbatim() {
        let queries = ["select * from t where id < 5", "select * from t where id >= 5"];
        let meta = QueryMetadata {
            count: Some(10),
            counts: vec![4, 6],
            min_value: None,
            max_value: None,
            metadata_query: None,
        };
        let plan = PartitionPlan::build(config(PartitionRequest::with_queries(queries)), meta)
            .unwrap();
        assert_eq!(plan.data_queries, queries.map(String::from).to_vec());
        assert_eq!(plan.counts, vec![4, 6]);
        assert_eq!(plan.capacity_hint(1), 6);
    }

    #[test]
    fn empty_source_still_yields_requested_partitions() {
        let config = config(
            PartitionRequest::new("select * from t")
                .partition_on("id")
                .partition_num(3),
        );
        let plan = PartitionPlan::build(config, metadata(0, None)).unwrap();
        assert_eq!(plan.data_queries.len(), 3);
        assert_eq!(plan.min_value, None);
    }

    #[test]
    fn capacity_hint_is_zero_without_preallocation() {
        let options = ReadOptions {
            preallocation: false,
            ..ReadOptions::default()
        };
        let config = PartitionConfig::new(PartitionRequest::new("select 1"), &options).unwrap();
        let plan = PartitionPlan::build(config, metadata(42, None)).unwrap();
        assert_eq!(plan.capacity_hint(0), 0);
    }

    proptest! {
        #[test]
        fn split_range_covers_exactly(
            min in -1_000_000i64..1_000_000,
            span in 0i64..100_000,
            partitions in 1usize..64,
        ) {
            let max = min + span;
            let ranges = split_range(min, max, partitions).unwrap();
            prop_assert_eq!(ranges.len(), partitions);
            assert_covers(&ranges, min, max);
        }

        #[test]
        fn every_value_lands_in_exactly_one_range(
            min in -500i64..500,
            span in 0i64..200,
            partitions in 1usize..16,
            offset in 0i64..200,
        ) {
            let max = min + span;
            let value = min + offset.min(span);
            let ranges = split_range(min, max, partitions).unwrap();
            let hits = ranges.iter().filter(|r| r.contains(value)).count();
            prop_assert_eq!(hits, 1);
        }
    }
}
