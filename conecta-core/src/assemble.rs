//! Combines per-partition batches into one table.

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use tracing::debug;

use crate::error::{ConectaError, Result};
use crate::sink::{ColumnarSink, TableOutput};

/// Columnar result of a read: one schema, batches in partition order.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// Copy all batches into a single contiguous batch.
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(arrow_select::concat::concat_batches(
            &self.schema,
            &self.batches,
        )?)
    }

    /// Stream the table through `sink`.
    pub fn write_to(&self, mut sink: Box<dyn ColumnarSink>) -> Result<TableOutput> {
        sink.begin(&self.schema)?;
        for batch in &self.batches {
            sink.write_batch(batch)?;
        }
        sink.finish()
    }
}

/// Check that every partition agrees with partition 0 on column names and
/// types, then wrap the batches without copying.
pub fn assemble(partitions: Vec<RecordBatch>) -> Result<Table> {
    let reference = partitions
        .first()
        .ok_or_else(|| ConectaError::Internal("no partitions to assemble".into()))?
        .schema();

    for (partition, batch) in partitions.iter().enumerate().skip(1) {
        let schema = batch.schema();
        let expected = reference.fields();
        let actual = schema.fields();
        for (position, expected_field) in expected.iter().enumerate() {
            let Some(actual_field) = actual.get(position) else {
                return Err(ConectaError::SchemaMismatch {
                    partition,
                    column: expected_field.name().clone(),
                    detail: format!(
                        "column missing: partition has {} columns, expected {}",
                        actual.len(),
                        expected.len()
                    ),
                });
            };
            if actual_field.name() != expected_field.name() {
                return Err(ConectaError::SchemaMismatch {
                    partition,
                    column: expected_field.name().clone(),
                    detail: format!(
                        "found column '{}' at position {position}",
                        actual_field.name()
                    ),
                });
            }
            if actual_field.data_type() != expected_field.data_type() {
                return Err(ConectaError::SchemaMismatch {
                    partition,
                    column: expected_field.name().clone(),
                    detail: format!(
                        "expected type {}, found {}",
                        expected_field.data_type(),
                        actual_field.data_type()
                    ),
                });
            }
        }
        if let Some(extra) = actual.get(expected.len()) {
            return Err(ConectaError::SchemaMismatch {
                partition,
                column: extra.name().clone(),
                detail: format!(
                    "unexpected column: partition has {} columns, expected {}",
                    actual.len(),
                    expected.len()
                ),
            });
        }
    }

    let table = Table {
        schema: reference,
        batches: partitions,
    };
    debug!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        batches = table.batches.len(),
        "assembled table"
    );
    Ok(table)
}
