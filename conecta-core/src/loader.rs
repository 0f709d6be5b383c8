//! Entry points: plan a partitioned read, or run it end to end.

use std::collections::HashMap;

use arrow_schema::SchemaRef;
use tracing::{info, instrument};

use crate::assemble::assemble;
use crate::config::ReadOptions;
use crate::engine::{execute_plan, Cancellation};
use crate::error::Result;
use crate::partition::{planner, PartitionConfig, PartitionPlan, PartitionRequest};
use crate::perf::PerfLog;
use crate::pool::PoolOptions;
use crate::sink::{ColumnarSink, OutputFormat, SinkRegistry, TableOutput};
use crate::source::{ConnectionTarget, Source};
use crate::sql::builder::schema_query;
use crate::sql::UserQuery;

/// Pool sizing for one read.
pub fn pool_options(config: &PartitionConfig, options: &ReadOptions) -> PoolOptions {
    PoolOptions {
        max_size: config.pool_size(),
        acquire_timeout: options.acquire_timeout,
    }
}

/// Validate the request, probe the source and return the plan without
/// reading any data.
#[instrument(skip_all)]
pub fn create_partition_plan(
    target: &str,
    request: PartitionRequest,
    options: &ReadOptions,
) -> Result<PartitionPlan> {
    let config = PartitionConfig::new(request, options)?;
    let target = ConnectionTarget::parse(target)?;
    let source = target.open(pool_options(&config, options))?;
    planner::create_partition_plan(source.as_ref(), config)
}

/// Read the request from `target` into `output_format`.
///
/// `extra_options` carries `max_pool_size` and `preallocation`; unknown
/// keys are ignored. The format and request are validated before any
/// connection is opened.
pub fn read_sql(
    target: &str,
    request: PartitionRequest,
    output_format: &str,
    extra_options: &HashMap<String, String>,
) -> Result<TableOutput> {
    read_sql_with_registry(
        target,
        request,
        output_format,
        extra_options,
        &SinkRegistry::default(),
    )
}

/// [`read_sql`] with caller-installed output adapters available by name.
#[instrument(skip_all, fields(format = output_format))]
pub fn read_sql_with_registry(
    target: &str,
    request: PartitionRequest,
    output_format: &str,
    extra_options: &HashMap<String, String>,
    registry: &SinkRegistry,
) -> Result<TableOutput> {
    let mut perf = PerfLog::start();
    let sink = registry.resolve(output_format)?;
    let options = ReadOptions::from_extra_options(extra_options)?;
    open_and_run(target, request, sink, &options, &mut perf)
}

/// [`read_sql`] with already parsed format and options.
#[instrument(skip_all, fields(%format))]
pub fn read_sql_with_options(
    target: &str,
    request: PartitionRequest,
    format: OutputFormat,
    options: &ReadOptions,
) -> Result<TableOutput> {
    let mut perf = PerfLog::start();
    open_and_run(target, request, format.sink(), options, &mut perf)
}

/// Plan, execute, assemble and convert against an already opened source.
#[instrument(skip_all, fields(source = source.name()))]
pub fn read_from_source(
    source: &dyn Source,
    config: PartitionConfig,
    sink: Box<dyn ColumnarSink>,
) -> Result<TableOutput> {
    let mut perf = PerfLog::start();
    run(source, config, sink, &mut perf)
}

/// Result schema of `query`, fetched with a zero-row probe.
pub fn query_schema(source: &dyn Source, query: &str) -> Result<SchemaRef> {
    let query = UserQuery::parse(query)?;
    let mut conn = source.acquire()?;
    let buffer = conn.read_partition(&schema_query(query.sql()), 0, &Cancellation::default())?;
    Ok(buffer.schema().clone())
}

/// [`query_schema`] against a connection target.
pub fn probe_schema(target: &str, query: &str, options: &ReadOptions) -> Result<SchemaRef> {
    let source = ConnectionTarget::parse(target)?.open(PoolOptions {
        max_size: 1,
        acquire_timeout: options.acquire_timeout,
    })?;
    query_schema(source.as_ref(), query)
}

fn open_and_run(
    target: &str,
    request: PartitionRequest,
    sink: Box<dyn ColumnarSink>,
    options: &ReadOptions,
    perf: &mut PerfLog,
) -> Result<TableOutput> {
    let config = PartitionConfig::new(request, options)?;
    let target = ConnectionTarget::parse(target)?;
    perf.checkpoint("validated parameters");

    info!(url = %target, partitions = config.partition_count(), "reading");
    let source = target.open(pool_options(&config, options))?;
    run(source.as_ref(), config, sink, perf)
}

fn run(
    source: &dyn Source,
    config: PartitionConfig,
    sink: Box<dyn ColumnarSink>,
    perf: &mut PerfLog,
) -> Result<TableOutput> {
    let plan = planner::create_partition_plan(source, config)?;
    perf.checkpoint("created partition plan");
    let batches = execute_plan(source, &plan)?;
    perf.checkpoint("executed partitions");
    let table = assemble(batches)?;
    perf.checkpoint("assembled table");
    let output = table.write_to(sink)?;
    perf.checkpoint("converted output");
    perf.finish();
    Ok(output)
}
