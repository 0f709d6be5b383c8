//! Per-partition columnar buffers.
//!
//! A [`ColumnBuffer`] owns one Arrow builder per result column. Builders
//! are sized up front from the plan's row estimate when preallocation is
//! on, and grow on demand otherwise.

use std::sync::Arc;

use arrow_array::builder::{
    ArrayBuilder, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder,
    Float32Builder, Float64Builder, Int16Builder, Int32Builder, Int64Builder, Int8Builder,
    StringBuilder, TimestampMicrosecondBuilder, UInt16Builder, UInt32Builder, UInt64Builder,
    UInt8Builder,
};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, TimestampMicrosecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};

use crate::error::{ConectaError, Result};
use crate::types::SqlValue;

/// Bytes reserved per value for variable-width columns.
const VARIABLE_WIDTH_HINT: usize = 16;

macro_rules! with_builder {
    ($builder:expr, $b:ident => $body:expr) => {
        match $builder {
            ColumnBuilder::Boolean($b) => $body,
            ColumnBuilder::Int8($b) => $body,
            ColumnBuilder::Int16($b) => $body,
            ColumnBuilder::Int32($b) => $body,
            ColumnBuilder::Int64($b) => $body,
            ColumnBuilder::UInt8($b) => $body,
            ColumnBuilder::UInt16($b) => $body,
            ColumnBuilder::UInt32($b) => $body,
            ColumnBuilder::UInt64($b) => $body,
            ColumnBuilder::Float32($b) => $body,
            ColumnBuilder::Float64($b) => $body,
            ColumnBuilder::Utf8($b) => $body,
            ColumnBuilder::Binary($b) => $body,
            ColumnBuilder::Date32($b) => $body,
            ColumnBuilder::TimestampMicros($b) => $body,
            ColumnBuilder::Decimal128($b) => $body,
        }
    };
}

macro_rules! extend_from {
    ($builder:expr, $values:expr) => {{
        for value in $values.iter() {
            $builder.append_option(value);
        }
    }};
}

/// Growable builder for one column.
pub enum ColumnBuilder {
    Boolean(BooleanBuilder),
    Int8(Int8Builder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    UInt8(UInt8Builder),
    UInt16(UInt16Builder),
    UInt32(UInt32Builder),
    UInt64(UInt64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
    Date32(Date32Builder),
    TimestampMicros(TimestampMicrosecondBuilder),
    Decimal128(Decimal128Builder),
}

impl ColumnBuilder {
    pub fn with_capacity(data_type: &DataType, capacity: usize) -> Result<Self> {
        let bytes = capacity.saturating_mul(VARIABLE_WIDTH_HINT);
        let builder = match data_type {
            DataType::Boolean => Self::Boolean(BooleanBuilder::with_capacity(capacity)),
            DataType::Int8 => Self::Int8(Int8Builder::with_capacity(capacity)),
            DataType::Int16 => Self::Int16(Int16Builder::with_capacity(capacity)),
            DataType::Int32 => Self::Int32(Int32Builder::with_capacity(capacity)),
            DataType::Int64 => Self::Int64(Int64Builder::with_capacity(capacity)),
            DataType::UInt8 => Self::UInt8(UInt8Builder::with_capacity(capacity)),
            DataType::UInt16 => Self::UInt16(UInt16Builder::with_capacity(capacity)),
            DataType::UInt32 => Self::UInt32(UInt32Builder::with_capacity(capacity)),
            DataType::UInt64 => Self::UInt64(UInt64Builder::with_capacity(capacity)),
            DataType::Float32 => Self::Float32(Float32Builder::with_capacity(capacity)),
            DataType::Float64 => Self::Float64(Float64Builder::with_capacity(capacity)),
            DataType::Utf8 => Self::Utf8(StringBuilder::with_capacity(capacity, bytes)),
            DataType::Binary => Self::Binary(BinaryBuilder::with_capacity(capacity, bytes)),
            DataType::Date32 => Self::Date32(Date32Builder::with_capacity(capacity)),
            DataType::Timestamp(TimeUnit::Microsecond, tz) => Self::TimestampMicros(
                TimestampMicrosecondBuilder::with_capacity(capacity).with_timezone_opt(tz.clone()),
            ),
            DataType::Decimal128(precision, scale) => Self::Decimal128(
                Decimal128Builder::with_capacity(capacity)
                    .with_precision_and_scale(*precision, *scale)?,
            ),
            other => return Err(ConectaError::UnsupportedType(other.to_string())),
        };
        Ok(builder)
    }

    pub fn len(&self) -> usize {
        with_builder!(self, b => b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every value of `array`. The caller checks the data type first.
    fn append_array(&mut self, array: &dyn Array) {
        match self {
            Self::Boolean(b) => extend_from!(b, array.as_boolean()),
            Self::Int8(b) => extend_from!(b, array.as_primitive::<Int8Type>()),
            Self::Int16(b) => extend_from!(b, array.as_primitive::<Int16Type>()),
            Self::Int32(b) => extend_from!(b, array.as_primitive::<Int32Type>()),
            Self::Int64(b) => extend_from!(b, array.as_primitive::<Int64Type>()),
            Self::UInt8(b) => extend_from!(b, array.as_primitive::<UInt8Type>()),
            Self::UInt16(b) => extend_from!(b, array.as_primitive::<UInt16Type>()),
            Self::UInt32(b) => extend_from!(b, array.as_primitive::<UInt32Type>()),
            Self::UInt64(b) => extend_from!(b, array.as_primitive::<UInt64Type>()),
            Self::Float32(b) => extend_from!(b, array.as_primitive::<Float32Type>()),
            Self::Float64(b) => extend_from!(b, array.as_primitive::<Float64Type>()),
            Self::Utf8(b) => extend_from!(b, array.as_string::<i32>()),
            Self::Binary(b) => extend_from!(b, array.as_binary::<i32>()),
            Self::Date32(b) => extend_from!(b, array.as_primitive::<Date32Type>()),
            Self::TimestampMicros(b) => {
                extend_from!(b, array.as_primitive::<TimestampMicrosecondType>())
            }
            Self::Decimal128(b) => extend_from!(b, array.as_primitive::<Decimal128Type>()),
        }
    }

    /// Append one decoded cell; the value kind must match the column.
    pub fn append_value(&mut self, value: SqlValue) -> Result<()> {
        match (self, value) {
            (builder, SqlValue::Null) => with_builder!(builder, b => b.append_null()),
            (Self::Boolean(b), SqlValue::Boolean(v)) => b.append_value(v),
            (Self::Int16(b), SqlValue::Int16(v)) => b.append_value(v),
            (Self::Int32(b), SqlValue::Int32(v)) => b.append_value(v),
            (Self::Int64(b), SqlValue::Int64(v)) => b.append_value(v),
            (Self::Float32(b), SqlValue::Float32(v)) => b.append_value(v),
            (Self::Float64(b), SqlValue::Float64(v)) => b.append_value(v),
            (Self::Utf8(b), SqlValue::Utf8(v)) => b.append_value(v),
            (Self::Binary(b), SqlValue::Binary(v)) => b.append_value(v),
            (Self::Date32(b), SqlValue::Date32(v)) => b.append_value(v),
            (Self::TimestampMicros(b), SqlValue::TimestampMicros(v)) => b.append_value(v),
            (_, value) => {
                return Err(ConectaError::Internal(format!(
                    "cannot append {} value to this column",
                    value.type_name()
                )))
            }
        }
        Ok(())
    }

    pub fn finish(&mut self) -> ArrayRef {
        with_builder!(self, b => Arc::new(b.finish()) as ArrayRef)
    }
}

/// Builders for every column of one partition's result.
pub struct ColumnBuffer {
    schema: SchemaRef,
    columns: Vec<ColumnBuilder>,
    reserved: usize,
    rows: usize,
}

impl ColumnBuffer {
    /// Allocate builders for `schema`, reserving `capacity` rows per column.
    ///
    /// Output fields are always nullable, whatever the source declared.
    pub fn new(schema: &Schema, capacity: usize) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| ColumnBuilder::with_capacity(field.data_type(), capacity))
            .collect::<Result<Vec<_>>>()?;
        let fields = schema
            .fields()
            .iter()
            .map(|field| Field::new(field.name(), field.data_type().clone(), true))
            .collect::<Vec<_>>();
        Ok(Self {
            schema: Arc::new(Schema::new(fields)),
            columns,
            reserved: capacity,
            rows: 0,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Rows reserved at construction time.
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Copy a batch whose columns line up with this buffer.
    pub fn append_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        if batch.num_columns() != self.columns.len() {
            return Err(ConectaError::Internal(format!(
                "batch has {} columns, buffer expects {}",
                batch.num_columns(),
                self.columns.len()
            )));
        }
        for ((builder, field), array) in self
            .columns
            .iter_mut()
            .zip(self.schema.fields())
            .zip(batch.columns())
        {
            if array.data_type() != field.data_type() {
                return Err(ConectaError::Internal(format!(
                    "column '{}' changed type from {} to {} mid-stream",
                    field.name(),
                    field.data_type(),
                    array.data_type()
                )));
            }
            builder.append_array(array.as_ref());
        }
        self.rows += batch.num_rows();
        Ok(())
    }

    /// Append one row of decoded cells, in column order.
    pub fn append_row(&mut self, values: Vec<SqlValue>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(ConectaError::Internal(format!(
                "row has {} values, buffer expects {}",
                values.len(),
                self.columns.len()
            )));
        }
        for (builder, value) in self.columns.iter_mut().zip(values) {
            builder.append_value(value)?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Freeze the builders into a single batch.
    pub fn finish(mut self) -> Result<RecordBatch> {
        let arrays = self
            .columns
            .iter_mut()
            .map(ColumnBuilder::finish)
            .collect::<Vec<_>>();
        let options = RecordBatchOptions::new().with_row_count(Some(self.rows));
        Ok(RecordBatch::try_new_with_options(self.schema, arrays, &options)?)
    }
}
