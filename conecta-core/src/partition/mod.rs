//! Partition configuration and planning.

pub mod config;
pub mod planner;

pub use config::{NeededMetadataFromSource, PartitionConfig, PartitionRequest, QueryPartitionMode};
pub use planner::{create_partition_plan, split_range, PartitionPlan, SubRange};
