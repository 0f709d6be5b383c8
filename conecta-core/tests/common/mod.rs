#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use conecta_core::Table;
use tempfile::TempDir;

pub const LINEITEM_ROWS: usize = 10_000;
pub const MIN_ORDERKEY: i64 = 1_108_353;
pub const MAX_ORDERKEY: i64 = 1_197_255;

/// A DuckDB file with a `lineitem_small` table spanning the order keys
/// `MIN_ORDERKEY..=MAX_ORDERKEY`.
pub struct LineitemDb {
    _dir: TempDir,
    path: PathBuf,
}

impl LineitemDb {
    pub fn create() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tpch.duckdb");
        let conn = duckdb::Connection::open(&path)?;
        conn.execute_batch(&format!(
            "CREATE TABLE lineitem_small AS
             SELECT CAST({MIN_ORDERKEY} + (i * {span}) // {last} AS BIGINT) AS l_orderkey,
                    CAST(i AS BIGINT) AS l_linenumber,
                    CAST(i % 7 AS DOUBLE) AS l_quantity,
                    'item ' || i AS l_comment
             FROM range({LINEITEM_ROWS}) t(i);",
            span = MAX_ORDERKEY - MIN_ORDERKEY,
            last = LINEITEM_ROWS - 1,
        ))?;
        drop(conn);
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> String {
        format!("duckdb://{}", self.path.display())
    }
}

/// All values of an Int64 column, in table order.
pub fn int64_column(table: &Table, name: &str) -> Vec<i64> {
    let index = table
        .schema()
        .index_of(name)
        .unwrap_or_else(|_| panic!("missing column {name}"));
    table
        .batches()
        .iter()
        .flat_map(|batch| {
            batch
                .column(index)
                .as_primitive::<Int64Type>()
                .values()
                .to_vec()
        })
        .collect()
}
