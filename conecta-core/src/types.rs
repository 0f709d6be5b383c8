//! Type conversion between source column types and Arrow.
//!
//! DuckDB already hands out Arrow batches, so only row-oriented sources
//! (Postgres) go through the mapping here.

use arrow_schema::{DataType, TimeUnit};
use postgres::types::Type;

use crate::error::{ConectaError, Result};

/// Days between 0001-01-01 and 1970-01-01, the Date32 epoch.
pub const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A single cell decoded from a row-oriented source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Days since the Unix epoch.
    Date32(i32),
    /// Microseconds since the Unix epoch.
    TimestampMicros(i64),
}

impl SqlValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Boolean(_) => "boolean",
            SqlValue::Int16(_) => "int16",
            SqlValue::Int32(_) => "int32",
            SqlValue::Int64(_) => "int64",
            SqlValue::Float32(_) => "float32",
            SqlValue::Float64(_) => "float64",
            SqlValue::Utf8(_) => "utf8",
            SqlValue::Binary(_) => "binary",
            SqlValue::Date32(_) => "date32",
            SqlValue::TimestampMicros(_) => "timestamp",
        }
    }
}

/// Map a Postgres column type to the Arrow type its values load into.
pub fn postgres_type_to_arrow(pg_type: &Type) -> Result<DataType> {
    let mapping = [
        (Type::BOOL, DataType::Boolean),
        (Type::INT2, DataType::Int16),
        (Type::INT4, DataType::Int32),
        (Type::INT8, DataType::Int64),
        (Type::FLOAT4, DataType::Float32),
        (Type::FLOAT8, DataType::Float64),
        (Type::TEXT, DataType::Utf8),
        (Type::VARCHAR, DataType::Utf8),
        (Type::BPCHAR, DataType::Utf8),
        (Type::NAME, DataType::Utf8),
        (Type::BYTEA, DataType::Binary),
        (Type::DATE, DataType::Date32),
        (Type::TIMESTAMP, DataType::Timestamp(TimeUnit::Microsecond, None)),
        (
            Type::TIMESTAMPTZ,
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        ),
    ];
    let data_type = mapping
        .into_iter()
        .find(|(candidate, _)| candidate == pg_type)
        .map(|(_, data_type)| data_type)
        .ok_or_else(|| {
            ConectaError::UnsupportedType(format!("postgres type {}", pg_type.name()))
        })?;
    Ok(data_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_postgres_types() {
        assert_eq!(postgres_type_to_arrow(&Type::INT8).unwrap(), DataType::Int64);
        assert_eq!(postgres_type_to_arrow(&Type::BPCHAR).unwrap(), DataType::Utf8);
        assert_eq!(
            postgres_type_to_arrow(&Type::TIMESTAMPTZ).unwrap(),
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
    }

    #[test]
    fn unsupported_postgres_type_is_reported_by_name() {
        let err = postgres_type_to_arrow(&Type::JSONB).unwrap_err();
        assert!(matches!(err, ConectaError::UnsupportedType(msg) if msg.contains("jsonb")));
    }
}
