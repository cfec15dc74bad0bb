/*!
Columnar reader (spec §4.6). Reconstructs entities by decoding `$data` and
overlaying shredded columns; shredded columns win when present, and a null
shredded column is treated as absent rather than merged in as an explicit
null (spec §4.6 "null shredded columns are treated as absent").
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow_array::{
    Array, BinaryArray, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMillisecondArray,
};
use arrow_schema::DataType;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{ParqueError, Result};
use crate::model::entity::{Entity, FieldValue};

use super::variant;

fn millis_to_utc(millis: i64) -> Result<chrono::DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ParqueError::Decode(format!("invalid timestamp millis {millis}")))
}

/// Decode every entity out of a Parquet data file's raw bytes.
pub fn read_entities(bytes: &[u8]) -> Result<Vec<Entity>> {
    let data = Bytes::copy_from_slice(bytes);
    let reader_builder = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|e| ParqueError::Decode(format!("failed to open parquet reader: {e}")))?;
    let reader = reader_builder
        .build()
        .map_err(|e| ParqueError::Decode(format!("failed to build parquet reader: {e}")))?;

    let mut entities = Vec::new();
    for batch_result in reader {
        let batch = batch_result.map_err(|e| ParqueError::Decode(format!("failed to read row group: {e}")))?;
        entities.extend(decode_batch(&batch)?);
    }
    Ok(entities)
}

fn decode_batch(batch: &arrow_array::RecordBatch) -> Result<Vec<Entity>> {
    let schema = batch.schema();
    let num_rows = batch.num_rows();

    let id_col = downcast::<StringArray>(batch, "$id")?;
    let type_col = downcast::<StringArray>(batch, "$type")?;
    let name_col = downcast::<StringArray>(batch, "name")?;
    let created_at_col = downcast::<TimestampMillisecondArray>(batch, "createdAt")?;
    let created_by_col = downcast::<StringArray>(batch, "createdBy")?;
    let updated_at_col = downcast::<TimestampMillisecondArray>(batch, "updatedAt")?;
    let updated_by_col = downcast::<StringArray>(batch, "updatedBy")?;
    let deleted_at_col = downcast::<TimestampMillisecondArray>(batch, "deletedAt")?;
    let deleted_by_col = downcast::<StringArray>(batch, "deletedBy")?;
    let version_col = downcast::<Int64Array>(batch, "version")?;
    let data_col = downcast::<BinaryArray>(batch, "$data")?;

    let shred_field_indices: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            !matches!(
                f.name().as_str(),
                "$id" | "$type" | "name" | "createdAt" | "createdBy" | "updatedAt" | "updatedBy"
                    | "deletedAt" | "deletedBy" | "version" | "$data"
            )
        })
        .map(|(idx, _)| idx)
        .collect();

    let mut entities = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        let mut fields: BTreeMap<String, FieldValue> = if data_col.is_null(row) {
            BTreeMap::new()
        } else {
            variant::decode(data_col.value(row))?
        };

        for &col_idx in &shred_field_indices {
            let field = schema.field(col_idx);
            let column = batch.column(col_idx);
            if column.is_null(row) {
                // Null shredded column: treated as absent, not merged as null.
                continue;
            }
            let value = decode_shred_value(column, field.data_type(), row)?;
            fields.insert(field.name().clone(), value);
        }

        entities.push(Entity {
            id: id_col.value(row).to_string(),
            type_: type_col.value(row).to_string(),
            name: opt_str(name_col, row),
            created_at: millis_to_utc(created_at_col.value(row))?,
            created_by: opt_str(created_by_col, row),
            updated_at: millis_to_utc(updated_at_col.value(row))?,
            updated_by: opt_str(updated_by_col, row),
            deleted_at: if deleted_at_col.is_null(row) {
                None
            } else {
                Some(millis_to_utc(deleted_at_col.value(row))?)
            },
            deleted_by: opt_str(deleted_by_col, row),
            version: version_col.value(row) as u64,
            fields,
        });
    }
    Ok(entities)
}

fn opt_str(col: &StringArray, row: usize) -> Option<String> {
    if col.is_null(row) {
        None
    } else {
        Some(col.value(row).to_string())
    }
}

fn downcast<'a, T: Array + 'static>(
    batch: &'a arrow_array::RecordBatch,
    name: &str,
) -> Result<&'a T> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| ParqueError::Decode(format!("missing column {name}")))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ParqueError::Decode(format!("column {name} had unexpected array type")))
}

fn decode_shred_value(
    column: &Arc<dyn Array>,
    data_type: &DataType,
    row: usize,
) -> Result<FieldValue> {
    match data_type {
        DataType::Utf8 => {
            let arr = column
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| ParqueError::Decode("expected utf8 array".to_string()))?;
            Ok(FieldValue::String(arr.value(row).to_string()))
        }
        DataType::Int64 => {
            let arr = column
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| ParqueError::Decode("expected int64 array".to_string()))?;
            Ok(FieldValue::Int(arr.value(row)))
        }
        DataType::Float64 => {
            let arr = column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| ParqueError::Decode("expected float64 array".to_string()))?;
            Ok(FieldValue::Float(arr.value(row)))
        }
        DataType::Boolean => {
            let arr = column
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| ParqueError::Decode("expected boolean array".to_string()))?;
            Ok(FieldValue::Bool(arr.value(row)))
        }
        DataType::Binary => {
            let arr = column
                .as_any()
                .downcast_ref::<BinaryArray>()
                .ok_or_else(|| ParqueError::Decode("expected binary array".to_string()))?;
            Ok(FieldValue::Bytes(arr.value(row).to_vec()))
        }
        DataType::Timestamp(arrow_schema::TimeUnit::Millisecond, _) => {
            let arr = column
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .ok_or_else(|| ParqueError::Decode("expected timestamp array".to_string()))?;
            Ok(FieldValue::Timestamp(millis_to_utc(arr.value(row))?))
        }
        other => Err(ParqueError::Decode(format!(
            "unsupported shredded column type {other:?}"
        ))),
    }
}
