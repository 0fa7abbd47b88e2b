//! Tabular loading: Parquet files, named-table blobs and seeded sampling

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, SecondsFormat};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::errors::{PipelineError, Result};
use crate::table::{Table, Value};

/// Seed used for every row sample so training runs are reproducible
pub const SAMPLE_SEED: i64 = 42;

/// Dictionary of named tables, iterated in name order
pub type NamedTables = BTreeMap<String, Table>;

/// Read a Parquet file into a [`Table`]
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_columnar<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| PipelineError::Io(format!("cannot open {}: {}", path.display(), e)))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| PipelineError::Io(format!("corrupt columnar file {}: {}", path.display(), e)))?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder
        .build()
        .map_err(|e| PipelineError::Io(format!("corrupt columnar file {}: {}", path.display(), e)))?;

    let mut table = Table::new(columns);
    for batch in reader {
        let batch = batch
            .map_err(|e| PipelineError::Io(format!("corrupt columnar file {}: {}", path.display(), e)))?;
        table.rows.extend(batch_rows(&batch)?);
    }

    info!(
        rows = table.row_count(),
        columns = table.column_count(),
        "Loaded columnar table"
    );
    Ok(table)
}

fn batch_rows(batch: &RecordBatch) -> Result<Vec<Vec<Value>>> {
    let columns = batch
        .columns()
        .iter()
        .zip(batch.schema().fields())
        .map(|(array, field)| column_values(array, field.name()))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..batch.num_rows())
        .map(|row| columns.iter().map(|col| col[row].clone()).collect())
        .collect())
}

fn cast_to(array: &ArrayRef, to: &DataType, name: &str) -> Result<ArrayRef> {
    cast(array, to).map_err(|e| {
        PipelineError::Schema(format!(
            "column `{}` of type {} is not supported: {}",
            name,
            array.data_type(),
            e
        ))
    })
}

/// RFC 3339 UTC text for an epoch offset in `unit`
fn timestamp_text(value: i64, unit: &TimeUnit) -> Option<String> {
    let ts = match unit {
        TimeUnit::Second => DateTime::from_timestamp(value, 0),
        TimeUnit::Millisecond => DateTime::from_timestamp_millis(value),
        TimeUnit::Microsecond => DateTime::from_timestamp_micros(value),
        TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(value)),
    }?;
    Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Timestamp cells as RFC 3339 UTC text.
///
/// Arrow stores every timestamp as a UTC epoch offset, so the zone label
/// (`"UTC"`, `"+00:00"`, `"Europe/Paris"` or none) never changes the instant.
fn timestamp_values(array: &ArrayRef, unit: &TimeUnit, name: &str) -> Result<Vec<Value>> {
    let raw: Vec<Option<i64>> = match unit {
        TimeUnit::Second => array.as_primitive::<TimestampSecondType>().iter().collect(),
        TimeUnit::Millisecond => array.as_primitive::<TimestampMillisecondType>().iter().collect(),
        TimeUnit::Microsecond => array.as_primitive::<TimestampMicrosecondType>().iter().collect(),
        TimeUnit::Nanosecond => array.as_primitive::<TimestampNanosecondType>().iter().collect(),
    };

    raw.into_iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            None => Ok(Value::Null),
            Some(v) => timestamp_text(v, unit).map(Value::Text).ok_or_else(|| {
                PipelineError::Parse(format!(
                    "row {row}: timestamp {v} in column `{name}` is out of range"
                ))
            }),
        })
        .collect()
}

/// Convert one Arrow column into cells.
///
/// Integers widen to `Int`, floats and decimals to `Float`. Timestamps become
/// RFC 3339 UTC text; dates and everything else are carried in their text form.
fn column_values(array: &ArrayRef, name: &str) -> Result<Vec<Value>> {
    let n = array.len();
    let data_type = array.data_type();

    let values = match data_type {
        DataType::Null => vec![Value::Null; n],
        DataType::Boolean => {
            let arr = array.as_boolean();
            (0..n)
                .map(|i| if arr.is_null(i) { Value::Null } else { Value::Bool(arr.value(i)) })
                .collect()
        }
        DataType::Timestamp(unit, _) => timestamp_values(array, unit, name)?,
        dt if dt.is_integer() => {
            let casted = cast_to(array, &DataType::Int64, name)?;
            let arr = casted.as_primitive::<Int64Type>();
            (0..n)
                .map(|i| if arr.is_null(i) { Value::Null } else { Value::Int(arr.value(i)) })
                .collect()
        }
        dt if dt.is_floating() || matches!(dt, DataType::Decimal128(_, _) | DataType::Decimal256(_, _)) => {
            let casted = cast_to(array, &DataType::Float64, name)?;
            let arr = casted.as_primitive::<Float64Type>();
            (0..n)
                .map(|i| if arr.is_null(i) { Value::Null } else { Value::Float(arr.value(i)) })
                .collect()
        }
        _ => {
            let casted = cast_to(array, &DataType::Utf8, name)?;
            let arr = casted.as_string::<i32>();
            (0..n)
                .map(|i| {
                    if arr.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(arr.value(i).to_string())
                    }
                })
                .collect()
        }
    };

    Ok(values)
}

/// Arrow type able to hold every non-null cell of a column
fn infer_type(table: &Table, idx: usize) -> DataType {
    let mut seen = (false, false, false, false); // bool, int, float, text
    for row in &table.rows {
        match &row[idx] {
            Value::Null => {}
            Value::Bool(_) => seen.0 = true,
            Value::Int(_) => seen.1 = true,
            Value::Float(_) => seen.2 = true,
            Value::Text(_) => seen.3 = true,
        }
    }

    match seen {
        (true, false, false, false) => DataType::Boolean,
        (false, true, false, false) => DataType::Int64,
        (false, _, true, false) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

fn to_array(table: &Table, idx: usize, data_type: &DataType) -> ArrayRef {
    let cells = table.rows.iter().map(|row| &row[idx]);
    match data_type {
        DataType::Boolean => Arc::new(
            cells
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        DataType::Int64 => Arc::new(
            cells
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(cells.map(|v| v.as_f64()).collect::<Float64Array>()),
        _ => Arc::new(
            cells
                .map(|v| if v.is_null() { None } else { Some(v.to_string()) })
                .collect::<StringArray>(),
        ),
    }
}

/// Write a [`Table`] as a single-row-group Parquet file
pub fn write_columnar<P: AsRef<Path>>(table: &Table, path: P) -> Result<()> {
    let path = path.as_ref();
    let types: Vec<DataType> = (0..table.column_count()).map(|i| infer_type(table, i)).collect();

    let schema = Arc::new(Schema::new(
        table
            .columns
            .iter()
            .zip(&types)
            .map(|(name, dt)| Field::new(name, dt.clone(), true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = types
        .iter()
        .enumerate()
        .map(|(i, dt)| to_array(table, i, dt))
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| PipelineError::Schema(format!("cannot build record batch: {e}")))?;

    let file = File::create(path)
        .map_err(|e| PipelineError::Io(format!("cannot create {}: {}", path.display(), e)))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)
        .map_err(|e| PipelineError::Io(format!("cannot write {}: {}", path.display(), e)))?;
    writer
        .write(&batch)
        .map_err(|e| PipelineError::Io(format!("cannot write {}: {}", path.display(), e)))?;
    writer
        .close()
        .map_err(|e| PipelineError::Io(format!("cannot write {}: {}", path.display(), e)))?;

    Ok(())
}

/// Decode a named-table dictionary blob
pub fn load_named_tables(blob: &[u8]) -> Result<NamedTables> {
    let tables: NamedTables = bincode::deserialize(blob)
        .map_err(|e| PipelineError::Deserialization(format!("named-table blob: {e}")))?;

    for (name, table) in &tables {
        if let Some(row) = table.rows.iter().find(|r| r.len() != table.column_count()) {
            return Err(PipelineError::Deserialization(format!(
                "table `{}` has a row of width {} for {} columns",
                name,
                row.len(),
                table.column_count()
            )));
        }
        debug!(table = %name, rows = table.row_count(), "Decoded named table");
    }

    Ok(tables)
}

/// Read and decode a named-table dictionary file
pub fn load_named_tables_file<P: AsRef<Path>>(path: P) -> Result<NamedTables> {
    let path = path.as_ref();
    let blob = std::fs::read(path)
        .map_err(|e| PipelineError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    let tables = load_named_tables(&blob)?;
    info!(tables = tables.len(), path = %path.display(), "Loaded named tables");
    Ok(tables)
}

/// Encode a named-table dictionary as a blob
pub fn encode_named_tables(tables: &NamedTables) -> Result<Vec<u8>> {
    bincode::serialize(tables)
        .map_err(|e| PipelineError::Deserialization(format!("cannot encode named tables: {e}")))
}

/// Encode a named-table dictionary and write it to `path`
pub fn save_named_tables<P: AsRef<Path>>(tables: &NamedTables, path: P) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, encode_named_tables(tables)?)
        .map_err(|e| PipelineError::Io(format!("cannot write {}: {}", path.display(), e)))
}

/// Sample `round(fraction * n)` rows without replacement.
///
/// Row order follows the seeded shuffle, so the same seed always yields the
/// same rows in the same order.
pub fn sample(table: &Table, fraction: f64, seed: i64) -> Result<Table> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(PipelineError::Config(format!(
            "sample fraction must be in (0, 1], got {fraction}"
        )));
    }

    let n = table.row_count();
    let k = ((n as f64) * fraction).round() as usize;
    let order = digest_gbdt::permutation(n, seed);

    let sampled = table.take_rows(&order[..k.min(n)]);
    debug!(before = n, after = sampled.row_count(), fraction, "Sampled rows");
    Ok(sampled)
}
