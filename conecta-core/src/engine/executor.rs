//! Runs every partition query of a plan on a bounded set of workers.
//!
//! `min(pool_size, partitions)` scoped threads pull the next partition index
//! from a shared counter, so an idle worker never waits behind a slow one.
//! Each worker keeps its own finished batches; they are placed by partition
//! index once every worker has joined. The first failure cancels the
//! remaining work and is the error returned.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use arrow_array::RecordBatch;
use tracing::{debug, info, instrument, warn};

use crate::engine::Cancellation;
use crate::error::{ConectaError, Result};
use crate::partition::PartitionPlan;
use crate::source::Source;

/// Execute all data queries of `plan`, returning one batch per partition in
/// partition order.
#[instrument(skip_all, fields(source = source.name(), partitions = plan.partitions()))]
pub fn execute_plan(source: &dyn Source, plan: &PartitionPlan) -> Result<Vec<RecordBatch>> {
    let partitions = plan.partitions();
    if partitions == 0 {
        return Err(ConectaError::Internal("plan has no partitions".into()));
    }
    let workers = (plan.partition_config.pool_size() as usize).clamp(1, partitions);
    let cancel = Cancellation::default();
    let failure: Mutex<Option<ConectaError>> = Mutex::new(None);
    let next = AtomicUsize::new(0);
    let started = Instant::now();

    let finished = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let (cancel, failure, next) = (&cancel, &failure, &next);
                scope.spawn(move || {
                    let mut done: Vec<(usize, RecordBatch)> = Vec::new();
                    while !cancel.is_cancelled() {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        if index >= partitions {
                            break;
                        }
                        let query = &plan.data_queries[index];
                        match run_partition(source, index, query, plan.capacity_hint(index), cancel) {
                            Ok(batch) => done.push((index, batch)),
                            Err(ConectaError::Cancelled) => break,
                            Err(err) => {
                                cancel.cancel();
                                let err = err.in_partition(index, query);
                                let mut first = failure.lock().unwrap_or_else(|p| p.into_inner());
                                if first.is_none() {
                                    warn!(worker, partition = index, error = %err, "partition failed");
                                    *first = Some(err);
                                }
                                break;
                            }
                        }
                    }
                    if cancel.is_cancelled() {
                        debug!(worker, "worker stopped after failure");
                    }
                    done
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect::<Vec<_>>()
    });

    if let Some(err) = failure.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(err);
    }

    let mut slots: Vec<Option<RecordBatch>> = vec![None; partitions];
    for joined in finished {
        let done = joined.map_err(|_| ConectaError::Internal("partition worker panicked".into()))?;
        for (index, batch) in done {
            slots[index] = Some(batch);
        }
    }

    let batches = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                ConectaError::Internal(format!("partition {index} produced no result"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    info!(
        workers,
        rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "executed partition plan"
    );
    Ok(batches)
}

fn run_partition(
    source: &dyn Source,
    index: usize,
    query: &str,
    capacity: usize,
    cancel: &Cancellation,
) -> Result<RecordBatch> {
    cancel.check()?;
    let started = Instant::now();
    let buffer = {
        let mut conn = source.acquire()?;
        conn.read_partition(query, capacity, cancel)?
    };
    debug!(
        partition = index,
        rows = buffer.num_rows(),
        reserved = buffer.reserved(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "partition loaded"
    );
    buffer.finish()
}
