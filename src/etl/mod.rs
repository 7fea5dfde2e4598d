//! Extract → transform → load pipeline for the min/max survey report.
//!
//! `extract` concatenates every source object under the configured prefix
//! into one record batch, `transform` reduces it to one row per
//! (year, industry aggregation, industry code) group carrying the minimum
//! and maximum of the value column, and `load` writes the result to the
//! target bucket under a dated key. Each stage is a pure function of the
//! configuration and its input; only `load` has a side effect.

use crate::config::{SourceConfig, TargetConfig};
use crate::storage::ObjectBucket;
use crate::table;
use anyhow::{bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, UInt32Array},
    compute::{cast, concat_batches, filter_record_batch, take},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::{Local, NaiveDateTime};
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};
use tracing::{debug, info};

/// Column names the aggregation step emits before the target rename.
const MIN_VALUE: &str = "min_value";
const MAX_VALUE: &str = "max_value";

/// One report job: source bucket and config in, one object in the target
/// bucket out. Constructed once per run; holds no mutable state.
pub struct ReportEtl {
    src_bucket: Arc<dyn ObjectBucket>,
    trg_bucket: Arc<dyn ObjectBucket>,
    src: SourceConfig,
    trg: TargetConfig,
}

impl ReportEtl {
    pub fn new(
        src_bucket: Arc<dyn ObjectBucket>,
        trg_bucket: Arc<dyn ObjectBucket>,
        src: SourceConfig,
        trg: TargetConfig,
    ) -> Self {
        Self {
            src_bucket,
            trg_bucket,
            src,
            trg,
        }
    }

    /// Extract, transform and load once.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<()> {
        let extracted = self.extract().await?;
        let report = self.transform(extracted)?;
        self.load(&report).await
    }

    /// Read every source object under the configured prefix and concatenate
    /// them, in listing order, into one record batch.
    ///
    /// An empty listing yields the empty relation; that is a meaningful
    /// terminal case, not an error. Any single read failure aborts the whole
    /// extract.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn extract(&self) -> Result<RecordBatch> {
        let keys = self.src_bucket.list_keys(&self.src.src_files_prefix).await?;
        if keys.is_empty() {
            info!(prefix = %self.src.src_files_prefix, "no source files under prefix");
            return Ok(table::empty());
        }

        info!(files = keys.len(), "extracting source files");
        let mut tables = Vec::with_capacity(keys.len());
        for key in &keys {
            debug!(key = %key, "reading source object");
            tables.push(self.src_bucket.read_table(key, self.src.src_format).await?);
        }

        let schema = tables[0].schema();
        concat_batches(&schema, &tables).context("concatenating source files")
    }

    /// Apply the report transformations: project the configured columns,
    /// coerce the value column to numbers, drop rows below the year filter,
    /// aggregate min/max per group and rename the aggregates to their target
    /// names.
    pub fn transform(&self, batch: RecordBatch) -> Result<RecordBatch> {
        if batch.num_rows() == 0 {
            info!("input relation is empty, skipping transformations");
            return Ok(batch);
        }
        let rows_in = batch.num_rows();

        let batch = self.project_columns(&batch)?;
        let batch = self.coerce_value_column(&batch)?;
        let batch = self.filter_by_year(&batch)?;
        let batch = self.aggregate_min_max(&batch)?;
        let batch = rename_column(&batch, MIN_VALUE, &self.trg.trg_col_min_value)?;
        let batch = rename_column(&batch, MAX_VALUE, &self.trg.trg_col_max_value)?;

        info!(rows_in, groups_out = batch.num_rows(), "transformed source data");
        Ok(batch)
    }

    /// Write the report to the target bucket under the dated key.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn load(&self, batch: &RecordBatch) -> Result<()> {
        let key = target_key(&self.trg, Local::now().naive_local());
        self.trg_bucket
            .write_table(batch, &key, self.trg.trg_format)
            .await?;
        info!(key = %key, rows = batch.num_rows(), "report written to target");
        Ok(())
    }

    /// Keep exactly the configured source columns, in configured order.
    fn project_columns(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let indices = self
            .src
            .src_columns
            .iter()
            .map(|name| column_index(&schema, name))
            .collect::<Result<Vec<_>>>()?;
        batch.project(&indices).context("projecting source columns")
    }

    /// Reinterpret the value column as non-null `Float64`.
    ///
    /// Anything that does not parse as a number, including nulls, becomes
    /// zero. Rows are never dropped here.
    fn coerce_value_column(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let idx = column_index(&schema, &self.src.src_col_value)?;
        let column = batch.column(idx);

        let values: Vec<f64> = if let Some(arr) = column.as_any().downcast_ref::<StringArray>() {
            arr.iter().map(|v| v.map_or(0.0, parse_numeric)).collect()
        } else if column.data_type().is_numeric() {
            let casted = cast(column.as_ref(), &DataType::Float64)
                .context("casting value column to Float64")?;
            let arr = casted
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("casting value column to Float64")?;
            arr.iter()
                .map(|v| v.filter(|x| !x.is_nan()).unwrap_or(0.0))
                .collect()
        } else {
            bail!(
                "value column `{}` has unsupported type {}",
                self.src.src_col_value,
                column.data_type()
            );
        };

        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == idx {
                    Field::new(f.name(), DataType::Float64, false)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();
        let mut columns = batch.columns().to_vec();
        columns[idx] = Arc::new(Float64Array::from(values)) as ArrayRef;

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .context("rebuilding batch with coerced value column")
    }

    /// Keep rows whose year is at or above the configured threshold.
    ///
    /// Numeric year columns compare numerically. For textual year columns
    /// both sides are parsed per row and compared as numbers when possible;
    /// rows where either side does not parse fall back to lexical order,
    /// which only matches numeric order for equal-width years (four-digit
    /// years are safe, unpadded mixed-width years are not).
    fn filter_by_year(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let idx = column_index(&schema, &self.src.src_col_year)?;
        let column = batch.column(idx);
        let threshold = self.src.src_col_year_filter.as_str();

        let mask: Vec<bool> = if column.data_type().is_numeric() {
            let bound: f64 = threshold
                .trim()
                .parse()
                .with_context(|| format!("year filter `{threshold}` is not numeric"))?;
            let casted = cast(column.as_ref(), &DataType::Float64)
                .context("casting year column to Float64")?;
            let arr = casted
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("casting year column to Float64")?;
            arr.iter().map(|v| v.is_some_and(|y| y >= bound)).collect()
        } else if let Some(arr) = column.as_any().downcast_ref::<StringArray>() {
            let bound = threshold.trim().parse::<f64>();
            arr.iter()
                .map(|v| {
                    v.is_some_and(|y| match (y.trim().parse::<f64>(), &bound) {
                        (Ok(year), Ok(bound)) => year >= *bound,
                        _ => y >= threshold,
                    })
                })
                .collect()
        } else {
            bail!(
                "year column `{}` has unsupported type {}",
                self.src.src_col_year,
                column.data_type()
            );
        };

        filter_record_batch(batch, &BooleanArray::from(mask)).context("applying year filter")
    }

    /// Partition rows by (year, industry aggregation, industry code) and
    /// emit one row per group with the minimum and maximum of the coerced
    /// value column. Groups come out in first-seen order.
    fn aggregate_min_max(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let year_idx = column_index(&schema, &self.src.src_col_year)?;
        let agg_idx = column_index(&schema, &self.src.src_col_industry_aggregation)?;
        let code_idx = column_index(&schema, &self.src.src_col_industry_code)?;
        let value_idx = column_index(&schema, &self.src.src_col_value)?;

        let values = batch
            .column(value_idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .context("value column was not coerced to Float64")?;

        struct Group {
            first_row: u32,
            min: f64,
            max: f64,
        }
        let mut order: Vec<Group> = Vec::new();
        let mut groups: HashMap<(String, String, String), usize> = HashMap::new();

        for row in 0..batch.num_rows() {
            let key = (
                key_component(batch.column(year_idx), row)?,
                key_component(batch.column(agg_idx), row)?,
                key_component(batch.column(code_idx), row)?,
            );
            let value = values.value(row);
            match groups.entry(key) {
                Entry::Occupied(slot) => {
                    let group = &mut order[*slot.get()];
                    group.min = group.min.min(value);
                    group.max = group.max.max(value);
                }
                Entry::Vacant(slot) => {
                    slot.insert(order.len());
                    order.push(Group {
                        first_row: row as u32,
                        min: value,
                        max: value,
                    });
                }
            }
        }

        // Group-key columns keep the source types: pick each group's first
        // row out of the input columns instead of re-encoding the keys.
        let first_rows = UInt32Array::from(order.iter().map(|g| g.first_row).collect::<Vec<_>>());
        let year_col = take(batch.column(year_idx).as_ref(), &first_rows, None)
            .context("materializing year group keys")?;
        let agg_col = take(batch.column(agg_idx).as_ref(), &first_rows, None)
            .context("materializing aggregation group keys")?;
        let code_col = take(batch.column(code_idx).as_ref(), &first_rows, None)
            .context("materializing industry-code group keys")?;
        let mins = Float64Array::from(order.iter().map(|g| g.min).collect::<Vec<_>>());
        let maxs = Float64Array::from(order.iter().map(|g| g.max).collect::<Vec<_>>());

        let fields = vec![
            schema.field(year_idx).clone(),
            schema.field(agg_idx).clone(),
            schema.field(code_idx).clone(),
            Field::new(MIN_VALUE, DataType::Float64, false),
            Field::new(MAX_VALUE, DataType::Float64, false),
        ];
        RecordBatch::try_new(
            Arc::new(Schema::new(fields)),
            vec![year_col, agg_col, code_col, Arc::new(mins), Arc::new(maxs)],
        )
        .context("building aggregated batch")
    }
}

/// Key of the target object: prefix, then the timestamp rendered with the
/// configured date format, then the format extension.
pub fn target_key(trg: &TargetConfig, now: NaiveDateTime) -> String {
    format!(
        "{}{}.{}",
        trg.trg_key,
        now.format(&trg.trg_key_date_format),
        trg.trg_format.extension()
    )
}

fn column_index(schema: &Schema, name: &str) -> Result<usize> {
    schema
        .index_of(name)
        .with_context(|| format!("configured column `{name}` is missing from the source data"))
}

/// Numeric reinterpretation of a raw value: unparseable text and NaN both
/// coerce to zero.
fn parse_numeric(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if !value.is_nan() => value,
        _ => 0.0,
    }
}

/// Group-key component for one cell; null cells group under the empty
/// string.
fn key_component(column: &ArrayRef, row: usize) -> Result<String> {
    if column.is_null(row) {
        return Ok(String::new());
    }
    let any = column.as_any();
    if let Some(arr) = any.downcast_ref::<StringArray>() {
        Ok(arr.value(row).to_string())
    } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
        Ok(arr.value(row).to_string())
    } else if let Some(arr) = any.downcast_ref::<Float64Array>() {
        Ok(arr.value(row).to_string())
    } else {
        bail!("grouping column has unsupported type {}", column.data_type())
    }
}

fn rename_column(batch: &RecordBatch, from: &str, to: &str) -> Result<RecordBatch> {
    let fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| {
            if f.name() == from {
                f.as_ref().clone().with_name(to)
            } else {
                f.as_ref().clone()
            }
        })
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), batch.columns().to_vec())
        .with_context(|| format!("renaming column `{from}` to `{to}`"))
}
