//! DuckDB source.
//!
//! The database is opened once; pooled connections are clones of that root
//! connection, so every worker sees the same catalog (including in-memory
//! tables created before the read).

use std::path::Path;
use std::sync::Mutex;

use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use arrow_array::{Array, RecordBatch};
use arrow_schema::DataType;
use duckdb::{Config, Connection};
use r2d2::ManageConnection;
use tracing::{debug, info, instrument};

use crate::engine::{Cancellation, ColumnBuffer};
use crate::error::{ConectaError, Result};
use crate::pool::{ConnectionPool, PoolOptions, PoolStatus, PooledConnection};
use crate::source::{Source, SourceConnection};

/// Manager that hands out clones of the root connection.
pub struct DuckDbManager {
    root: Mutex<Connection>,
}

impl DuckDbManager {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let config = Config::default().enable_autoload_extension(true)?;
        let conn = match path {
            Some(path) => Connection::open_with_flags(path, config)?,
            None => Connection::open_in_memory_with_flags(config)?,
        };
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            root: Mutex::new(conn),
        }
    }
}

impl ManageConnection for DuckDbManager {
    type Connection = Connection;
    type Error = ConectaError;

    fn connect(&self) -> Result<Self::Connection> {
        let root = self
            .root
            .lock()
            .map_err(|_| ConectaError::Internal("duckdb root connection mutex poisoned".into()))?;
        Ok(root.try_clone()?)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<()> {
        conn.execute_batch("SELECT 1;")?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub struct DuckDbSource {
    pool: ConnectionPool<DuckDbManager>,
}

impl DuckDbSource {
    /// Open a database file, or an in-memory database when `path` is `None`.
    #[instrument(skip(options))]
    pub fn open(path: Option<&Path>, options: PoolOptions) -> Result<Self> {
        let manager = DuckDbManager::open(path)?;
        info!(max_size = options.max_size, "opened duckdb source");
        Self::with_manager(manager, options)
    }

    /// Wrap an existing connection, e.g. an in-memory database already
    /// populated by the caller.
    pub fn from_connection(conn: Connection, options: PoolOptions) -> Result<Self> {
        Self::with_manager(DuckDbManager::from_connection(conn), options)
    }

    /// Run setup SQL (extensions, ATTACH, temp data) on the shared database.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn with_manager(manager: DuckDbManager, options: PoolOptions) -> Result<Self> {
        Ok(Self {
            pool: ConnectionPool::new(manager, options)?,
        })
    }
}

impl Source for DuckDbSource {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn acquire(&self) -> Result<Box<dyn SourceConnection>> {
        Ok(Box::new(DuckDbConnection {
            conn: self.pool.get()?,
        }))
    }

    fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }
}

struct DuckDbConnection {
    conn: PooledConnection<DuckDbManager>,
}

impl SourceConnection for DuckDbConnection {
    fn query_i64_row(&mut self, sql: &str) -> Result<Vec<Option<i64>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches
            .iter()
            .find(|batch| batch.num_rows() > 0)
            .ok_or_else(|| ConectaError::Internal(format!("query returned no rows: {sql}")))?;

        batch
            .columns()
            .iter()
            .map(|column| {
                let column = arrow_cast::cast(column.as_ref(), &DataType::Int64)?;
                let values = column.as_primitive::<Int64Type>();
                Ok(values.is_valid(0).then(|| values.value(0)))
            })
            .collect()
    }

    fn read_partition(
        &mut self,
        sql: &str,
        capacity: usize,
        cancel: &Cancellation,
    ) -> Result<ColumnBuffer> {
        let mut stmt = self.conn.prepare(sql)?;
        let arrow = stmt.query_arrow([])?;
        let schema = arrow.get_schema();
        let mut buffer = ColumnBuffer::new(&schema, capacity)?;

        let mut batches = 0usize;
        for batch in arrow {
            cancel.check()?;
            buffer.append_batch(&batch)?;
            batches += 1;
        }
        debug!(batches, rows = buffer.num_rows(), "read duckdb partition");
        Ok(buffer)
    }
}
