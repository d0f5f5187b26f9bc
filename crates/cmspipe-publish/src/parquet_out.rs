//! Frame → Arrow → parquet with snappy compression.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use camino::Utf8Path;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use cmspipe_kit::frame::Frame;
use cmspipe_schema::SchemaContract;
use cmspipe_types::atomic_write::write_bytes_atomic;
use cmspipe_types::{PipelineError, RoundingMode, Value};

/// Target rows per parquet row group.
const ROW_GROUP_SIZE: usize = 100_000;

fn column_is_integral(frame: &Frame, idx: usize) -> bool {
    let mut any = false;
    for row in frame.rows() {
        match &row[idx] {
            Value::Int(_) => any = true,
            Value::Null => {}
            _ => return false,
        }
    }
    any
}

/// Convert a finalized frame into an Arrow record batch.
///
/// Integer columns become `Int64`; everything else is rendered to its
/// canonical string form (decimals as fixed-point at the contract's
/// precision, dates ISO) so a parquet reader sees exactly the values
/// that were hashed.
pub fn frame_to_record_batch(
    frame: &Frame,
    contract: Option<&SchemaContract>,
) -> Result<RecordBatch, PipelineError> {
    let mut fields = Vec::with_capacity(frame.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(frame.columns().len());

    for (idx, name) in frame.columns().iter().enumerate() {
        if column_is_integral(frame, idx) {
            let values: Int64Array = frame
                .rows()
                .iter()
                .map(|row| match &row[idx] {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            fields.push(Field::new(name, DataType::Int64, true));
            arrays.push(Arc::new(values));
            continue;
        }

        let spec = contract.and_then(|c| c.column(name));
        let precision = spec.and_then(|s| s.precision);
        let rounding = spec
            .and_then(|s| s.rounding)
            .unwrap_or(RoundingMode::HalfUp);
        let values: StringArray = frame
            .rows()
            .iter()
            .map(|row| match &row[idx] {
                Value::Null => None,
                other => Some(other.canonical_render(precision, rounding)),
            })
            .collect();
        fields.push(Field::new(name, DataType::Utf8, true));
        arrays.push(Arc::new(values));
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays)
        .map_err(|e| PipelineError::Internal(format!("record batch build failed: {e}")))
}

/// Write a frame as a snappy-compressed parquet file, atomically.
pub fn write_parquet(
    path: &Utf8Path,
    frame: &Frame,
    contract: Option<&SchemaContract>,
) -> Result<(), PipelineError> {
    let batch = frame_to_record_batch(frame, contract)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .build();

    let mut buffer: Vec<u8> = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
            .map_err(|e| PipelineError::Internal(format!("parquet writer init failed: {e}")))?;
        writer
            .write(&batch)
            .map_err(|e| PipelineError::Internal(format!("parquet write failed: {e}")))?;
        writer
            .close()
            .map_err(|e| PipelineError::Internal(format!("parquet close failed: {e}")))?;
    }
    write_bytes_atomic(path, &buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmspipe_schema::SchemaRegistry;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn cf_frame() -> Frame {
        let mut f = Frame::new(vec![
            "cf_type".into(),
            "cf_value".into(),
            "product_year".into(),
        ]);
        f.push_row(vec![
            Value::Str("physician".into()),
            Value::Dec(Decimal::from_str("32.3465").unwrap()),
            Value::Int(2025),
        ])
        .unwrap();
        f.push_row(vec![
            Value::Str("anesthesia".into()),
            Value::Dec(Decimal::from_str("20.3178").unwrap()),
            Value::Int(2025),
        ])
        .unwrap();
        f
    }

    #[test]
    fn batch_renders_decimals_as_fixed_point_strings() {
        let registry = SchemaRegistry::builtin();
        let contract = registry.get("conversion_factor").unwrap();
        let batch = frame_to_record_batch(&cf_frame(), Some(contract)).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 3);
        let cf_values = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(cf_values.value(0), "32.3465");
        assert_eq!(cf_values.value(1), "20.3178");
        let years = batch
            .column(2)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(years.value(0), 2025);
    }

    #[test]
    fn parquet_file_round_trips() {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("cf.parquet")).unwrap();
        write_parquet(&path, &cf_frame(), None).unwrap();

        let file = std::fs::File::open(path.as_std_path()).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(Result::unwrap).collect();
        assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 2);
    }
}
