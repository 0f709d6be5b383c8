//! Partitioned, parallel SQL reads into Arrow.
//!
//! A read is planned once ([`partition::PartitionConfig`] ->
//! [`partition::PartitionPlan`]), executed on a bounded worker pool
//! ([`engine::execute_plan`]), assembled in partition order
//! ([`assemble::Table`]) and handed to an output sink ([`sink::OutputFormat`]).

pub mod assemble;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod logging;
pub mod metadata;
pub mod partition;
pub mod perf;
pub mod pool;
pub mod sink;
pub mod source;
pub mod sql;
pub mod types;

pub use assemble::Table;
pub use config::{LoaderSettings, ReadOptions};
pub use error::{ConectaError, Result};
pub use loader::{
    create_partition_plan, probe_schema, query_schema, read_from_source, read_sql,
    read_sql_with_options, read_sql_with_registry,
};
pub use partition::{PartitionConfig, PartitionPlan, PartitionRequest};
pub use sink::{ColumnarSink, OutputFormat, SinkRegistry, TableOutput};
pub use source::{ConnectionTarget, DuckDbSource, PostgresSource, Source};
