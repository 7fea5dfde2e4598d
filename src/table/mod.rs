//! In-memory tabular data and the byte-level codecs for it.
//!
//! The relation passed between the ETL stages is an Arrow [`RecordBatch`];
//! this module converts between raw object bytes and batches for the file
//! formats the job understands.

use anyhow::{Context, Result};
use arrow::{
    csv::{reader::Format, ReaderBuilder, WriterBuilder},
    datatypes::Schema,
    record_batch::RecordBatch,
};
use bytes::Bytes;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use serde::Deserialize;
use std::{fmt, io::Cursor, sync::Arc};

/// File format tag used for both source and target objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    /// Extension appended to the target key.
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The relation extract produces when the source listing is empty: no rows
/// and no defined columns.
pub fn empty() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

/// Parse raw object bytes into a single record batch.
///
/// A zero-byte object decodes to the empty relation, mirroring what
/// [`encode`] writes for one.
pub fn decode(data: &[u8], format: FileFormat) -> Result<RecordBatch> {
    if data.is_empty() {
        return Ok(empty());
    }
    match format {
        FileFormat::Csv => decode_csv(data),
        FileFormat::Parquet => decode_parquet(data),
    }
}

/// Serialize a record batch into the bytes of a single object.
///
/// A relation with no columns has no file schema in either format; it is
/// written as a zero-byte object.
pub fn encode(batch: &RecordBatch, format: FileFormat) -> Result<Vec<u8>> {
    if batch.num_columns() == 0 {
        return Ok(Vec::new());
    }
    match format {
        FileFormat::Csv => encode_csv(batch),
        FileFormat::Parquet => encode_parquet(batch),
    }
}

fn decode_csv(data: &[u8]) -> Result<RecordBatch> {
    // Infer per-column types from the full file so that an all-integer year
    // column comes out as Int64 rather than text.
    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(Cursor::new(data), None)
        .context("inferring csv schema")?;
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(Cursor::new(data))
        .context("creating csv reader")?;
    let batches: Vec<RecordBatch> = reader
        .collect::<std::result::Result<_, _>>()
        .context("reading csv batch")?;
    arrow::compute::concat_batches(&schema, &batches).map_err(Into::into)
}

fn decode_parquet(data: &[u8]) -> Result<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(data))
        .context("opening parquet data")?;
    let schema = builder.schema().clone();
    let reader = builder.build().context("creating parquet reader")?;
    let batches: Vec<RecordBatch> = reader
        .collect::<std::result::Result<_, _>>()
        .context("reading parquet batch")?;
    arrow::compute::concat_batches(&schema, &batches).map_err(Into::into)
}

fn encode_csv(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = WriterBuilder::new().with_header(true).build(&mut buffer);
    writer.write(batch).context("writing batch to csv")?;
    drop(writer);
    Ok(buffer)
}

fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;
    Ok(buffer)
}
