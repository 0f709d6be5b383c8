use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConectaError {
    /// Invalid request: partition count, output format, missing partition column...
    #[error("configuration error: {0}")]
    Config(String),
    #[error("connection error: {0}")]
    Connection(String),
    /// A partition query failed at the source.
    #[error("partition {partition} failed: {message} (query: {query})")]
    Query {
        partition: usize,
        query: String,
        message: String,
    },
    #[error("schema mismatch in partition {partition}, column '{column}': {detail}")]
    SchemaMismatch {
        partition: usize,
        column: String,
        detail: String,
    },
    #[error("bind error: {0}")]
    Bind(String),
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
    /// A sibling partition failed and this one stopped early.
    #[error("partition cancelled after a sibling failure")]
    Cancelled,
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConectaError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach partition context, leaving errors that already carry it untouched.
    pub(crate) fn in_partition(self, partition: usize, query: &str) -> Self {
        match self {
            err @ ConectaError::Query { .. } => err,
            other => ConectaError::Query {
                partition,
                query: query.to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ConectaError>;
