//! Output adapters: the assembled table as Arrow, IPC stream or Parquet.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::SchemaRef;
use parquet::arrow::ArrowWriter;
use tracing::info;

use crate::assemble::Table;
use crate::error::{ConectaError, Result};

/// Requested result representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// In-memory Arrow table.
    Arrow,
    /// Arrow IPC stream bytes.
    ArrowIpc,
    /// Parquet file bytes.
    Parquet,
}

impl FromStr for OutputFormat {
    type Err = ConectaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrow" | "pyarrow" => Ok(Self::Arrow),
            "ipc" | "arrow-ipc" | "arrow_ipc" => Ok(Self::ArrowIpc),
            "parquet" => Ok(Self::Parquet),
            other => Err(ConectaError::config(format!(
                "unknown output format '{other}' (expected arrow, ipc or parquet)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Arrow => "arrow",
            Self::ArrowIpc => "ipc",
            Self::Parquet => "parquet",
        })
    }
}

impl OutputFormat {
    pub fn sink(self) -> Box<dyn ColumnarSink> {
        match self {
            Self::Arrow => Box::<ArrowSink>::default(),
            Self::ArrowIpc => Box::<IpcSink>::default(),
            Self::Parquet => Box::<ParquetSink>::default(),
        }
    }
}

/// Materialized result of a read.
#[derive(Debug)]
pub enum TableOutput {
    Arrow(Table),
    ArrowIpc(Vec<u8>),
    Parquet(Vec<u8>),
    /// Bytes produced by an adapter installed in a [`SinkRegistry`].
    Custom { format: String, bytes: Vec<u8> },
}

impl TableOutput {
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Arrow(table) => Some(table),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Arrow(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::ArrowIpc(bytes) | Self::Parquet(bytes) | Self::Custom { bytes, .. } => {
                Some(bytes)
            }
            Self::Arrow(_) => None,
        }
    }
}

/// Consumer of an assembled table, fed schema first and then batches in
/// partition order.
pub trait ColumnarSink {
    fn begin(&mut self, schema: &SchemaRef) -> Result<()>;
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<TableOutput>;
}

/// Builds a fresh sink for every read.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn ColumnarSink> + Send + Sync>;

/// Output adapters by name: the built-in formats plus any the caller
/// installs, e.g. a bridge into a dataframe library.
///
/// Installed adapters live only in this registry value; nothing global is
/// patched, and [`SinkRegistry::uninstall`] restores the previous state.
#[derive(Default, Clone)]
pub struct SinkRegistry {
    adapters: BTreeMap<String, SinkFactory>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`. Built-in names and names already
    /// installed are rejected.
    pub fn install(&mut self, name: &str, factory: SinkFactory) -> Result<()> {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(ConectaError::config("adapter name must not be empty"));
        }
        if key.parse::<OutputFormat>().is_ok() {
            return Err(ConectaError::config(format!(
                "'{key}' is a built-in output format"
            )));
        }
        if self.adapters.contains_key(&key) {
            return Err(ConectaError::config(format!(
                "output adapter '{key}' is already installed"
            )));
        }
        info!(adapter = %key, "installed output adapter");
        self.adapters.insert(key, factory);
        Ok(())
    }

    /// Remove an installed adapter; `false` if it was not installed.
    pub fn uninstall(&mut self, name: &str) -> bool {
        let removed = self
            .adapters
            .remove(&name.trim().to_ascii_lowercase())
            .is_some();
        if removed {
            info!(adapter = name, "uninstalled output adapter");
        }
        removed
    }

    pub fn installed(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Resolve a format name to a fresh sink, built-ins first.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn ColumnarSink>> {
        if let Ok(format) = name.parse::<OutputFormat>() {
            return Ok(format.sink());
        }
        self.adapters
            .get(&name.trim().to_ascii_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| {
                ConectaError::config(format!(
                    "unknown output format '{name}' (expected arrow, ipc, parquet{})",
                    self.adapters
                        .keys()
                        .map(|k| format!(", {k}"))
                        .collect::<String>()
                ))
            })
    }
}

fn not_started() -> ConectaError {
    ConectaError::Internal("sink written before begin".into())
}

#[derive(Default)]
struct ArrowSink {
    schema: Option<SchemaRef>,
    batches: Vec<RecordBatch>,
}

impl ColumnarSink for ArrowSink {
    fn begin(&mut self, schema: &SchemaRef) -> Result<()> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.batches.push(batch.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<TableOutput> {
        if self.schema.is_none() {
            return Err(not_started());
        }
        Ok(TableOutput::Arrow(crate::assemble::assemble(self.batches)?))
    }
}

#[derive(Default)]
struct IpcSink {
    writer: Option<StreamWriter<Vec<u8>>>,
}

impl ColumnarSink for IpcSink {
    fn begin(&mut self, schema: &SchemaRef) -> Result<()> {
        self.writer = Some(StreamWriter::try_new(Vec::new(), schema)?);
        Ok(())
    }

    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.as_mut().ok_or_else(not_started)?.write(batch)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<TableOutput> {
        let mut writer = self.writer.ok_or_else(not_started)?;
        writer.finish()?;
        Ok(TableOutput::ArrowIpc(writer.into_inner()?))
    }
}

#[derive(Default)]
struct ParquetSink {
    writer: Option<ArrowWriter<Vec<u8>>>,
}

impl ColumnarSink for ParquetSink {
    fn begin(&mut self, schema: &SchemaRef) -> Result<()> {
        self.writer = Some(ArrowWriter::try_new(Vec::new(), schema.clone(), None)?);
        Ok(())
    }

    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.as_mut().ok_or_else(not_started)?.write(batch)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<TableOutput> {
        let writer = self.writer.ok_or_else(not_started)?;
        Ok(TableOutput::Parquet(writer.into_inner()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use arrow_array::{Int64Array, StringArray};
    use arrow_ipc::reader::StreamReader;
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn table() -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = |ids: Vec<i64>, names: Vec<&str>| {
            RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(Int64Array::from(ids)),
                    Arc::new(StringArray::from(names)),
                ],
            )
            .unwrap()
        };
        crate::assemble::assemble(vec![batch(vec![1, 2], vec!["a", "b"]), batch(vec![3], vec!["c"])])
            .unwrap()
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("arrow".parse::<OutputFormat>().unwrap(), OutputFormat::Arrow);
        assert_eq!("IPC".parse::<OutputFormat>().unwrap(), OutputFormat::ArrowIpc);
        assert_eq!("parquet".parse::<OutputFormat>().unwrap(), OutputFormat::Parquet);
        assert!(matches!(
            "csv".parse::<OutputFormat>(),
            Err(ConectaError::Config(msg)) if msg.contains("csv")
        ));
    }

    #[test]
    fn arrow_sink_returns_the_table() {
        let out = table().write_to(OutputFormat::Arrow.sink()).unwrap();
        let table = out.into_table().unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.batches().len(), 2);
    }

    #[test]
    fn ipc_stream_reads_back() {
        let out = table().write_to(OutputFormat::ArrowIpc.sink()).unwrap();
        let bytes = out.as_bytes().unwrap().to_vec();
        let reader = StreamReader::try_new(std::io::Cursor::new(bytes), None).unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 3);
    }

    #[test]
    fn parquet_file_reads_back() {
        let out = table().write_to(OutputFormat::Parquet.sink()).unwrap();
        let TableOutput::Parquet(bytes) = out else {
            panic!("expected parquet output");
        };
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 3);
    }

    /// Writes one line per batch with its row count.
    #[derive(Default)]
    struct RowCountSink {
        lines: Vec<String>,
    }

    impl ColumnarSink for RowCountSink {
        fn begin(&mut self, _schema: &SchemaRef) -> Result<()> {
            Ok(())
        }

        fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
            self.lines.push(batch.num_rows().to_string());
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<TableOutput> {
            Ok(TableOutput::Custom {
                format: "rowcount".into(),
                bytes: self.lines.join("\n").into_bytes(),
            })
        }
    }

    fn rowcount() -> SinkFactory {
        Arc::new(|| Box::<RowCountSink>::default() as Box<dyn ColumnarSink>)
    }

    #[test]
    fn installed_adapter_is_resolved_until_uninstalled() {
        let mut registry = SinkRegistry::new();
        registry.install("RowCount", rowcount()).unwrap();
        assert_eq!(registry.installed().collect::<Vec<_>>(), vec!["rowcount"]);

        let out = table().write_to(registry.resolve("rowcount").unwrap()).unwrap();
        assert_eq!(out.as_bytes(), Some(&b"2\n1"[..]));

        assert!(registry.uninstall("rowcount"));
        assert!(!registry.uninstall("rowcount"));
        assert!(matches!(
            registry.resolve("rowcount"),
            Err(ConectaError::Config(_))
        ));
    }

    #[test]
    fn registry_protects_builtins_and_duplicates() {
        let mut registry = SinkRegistry::new();
        assert!(registry.install("parquet", rowcount()).is_err());
        registry.install("rowcount", rowcount()).unwrap();
        assert!(registry.install("rowcount", rowcount()).is_err());
        assert!(registry.resolve("arrow").is_ok());
    }

    #[test]
    fn writing_before_begin_fails() {
        let mut sink = OutputFormat::ArrowIpc.sink();
        assert!(sink.write_batch(&table().concat().unwrap()).is_err());
    }
}
