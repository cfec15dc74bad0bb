/*!
Event-log segment encoding and path naming (spec §4.3, §6). Segments are
named `seg-<seq:04d>.parquet` under `<location>/events/` and are genuine
columnar Parquet files, mirroring `parquet_io::writer`/`reader`'s approach
to entity data files: fixed-schema columns for everything orderable
(`id`, `ts`, `op`, `target`, `actor`, the schema-version stamps), with the
heterogeneous `before`/`after` entity payloads folded into binary columns
since they don't share one Arrow schema across event kinds.
*/

use std::sync::Arc;

use arrow_array::builder::{BinaryBuilder, Int64Builder, StringBuilder};
use arrow_array::{Array, ArrayRef, BinaryArray, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema as ArrowSchema};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};

use crate::error::{ParqueError, Result};
use crate::model::entity::Entity;
use crate::model::event::{Event, EventBatch, EventMetadata, Op};

/// `<location>/events/seg-<seq:04d>.parquet`.
pub fn segment_path(location: &str, seq: u32) -> String {
    format!("{location}/events/seg-{seq:04}.parquet")
}

/// `<location>/events/archive/<year>/<month:02d>/seg-<seq:04d>.parquet`.
pub fn archive_path(location: &str, seq: u32, year: i32, month: u32) -> String {
    format!("{location}/events/archive/{year}/{month:02}/seg-{seq:04}.parquet")
}

fn op_to_str(op: Op) -> &'static str {
    match op {
        Op::Create => "Create",
        Op::Update => "Update",
        Op::Delete => "Delete",
        Op::RelCreate => "RelCreate",
        Op::RelDelete => "RelDelete",
    }
}

fn op_from_str(s: &str) -> Result<Op> {
    match s {
        "Create" => Ok(Op::Create),
        "Update" => Ok(Op::Update),
        "Delete" => Ok(Op::Delete),
        "RelCreate" => Ok(Op::RelCreate),
        "RelDelete" => Ok(Op::RelDelete),
        other => Err(ParqueError::Decode(format!("unknown event op {other}"))),
    }
}

fn segment_schema() -> Arc<ArrowSchema> {
    Arc::new(ArrowSchema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("ts", DataType::Int64, false),
        ArrowField::new("op", DataType::Utf8, false),
        ArrowField::new("target", DataType::Utf8, false),
        ArrowField::new("before", DataType::Binary, true),
        ArrowField::new("after", DataType::Binary, true),
        ArrowField::new("actor", DataType::Utf8, true),
        ArrowField::new("schemaVersion", DataType::Int64, true),
        ArrowField::new("upgradedFrom", DataType::Int64, true),
    ]))
}

fn encode_entity(entity: &Option<Entity>) -> Result<Option<Vec<u8>>> {
    entity
        .as_ref()
        .map(|e| serde_json::to_vec(e).map_err(|err| ParqueError::Other(err.into())))
        .transpose()
}

fn decode_entity(bytes: Option<&[u8]>) -> Result<Option<Entity>> {
    bytes
        .map(|b| serde_json::from_slice(b).map_err(|err| ParqueError::Decode(format!("failed to parse event entity: {err}"))))
        .transpose()
}

/// Encode a batch of events into one single-row-group Parquet file.
pub fn encode_segment(events: &[Event]) -> Result<Vec<u8>> {
    let schema = segment_schema();

    let mut id_b = StringBuilder::new();
    let mut ts_b = Int64Builder::new();
    let mut op_b = StringBuilder::new();
    let mut target_b = StringBuilder::new();
    let mut before_b = BinaryBuilder::new();
    let mut after_b = BinaryBuilder::new();
    let mut actor_b = StringBuilder::new();
    let mut schema_version_b = Int64Builder::new();
    let mut upgraded_from_b = Int64Builder::new();

    for event in events {
        id_b.append_value(event.id.to_string());
        ts_b.append_value(event.ts);
        op_b.append_value(op_to_str(event.op));
        target_b.append_value(&event.target);

        match encode_entity(&event.before)? {
            Some(bytes) => before_b.append_value(&bytes),
            None => before_b.append_null(),
        }
        match encode_entity(&event.after)? {
            Some(bytes) => after_b.append_value(&bytes),
            None => after_b.append_null(),
        }
        match &event.actor {
            Some(actor) => actor_b.append_value(actor),
            None => actor_b.append_null(),
        }
        match event.metadata.as_ref().and_then(|m| m.schema_version) {
            Some(v) => schema_version_b.append_value(v as i64),
            None => schema_version_b.append_null(),
        }
        match event.metadata.as_ref().and_then(|m| m.upgraded_from) {
            Some(v) => upgraded_from_b.append_value(v as i64),
            None => upgraded_from_b.append_null(),
        }
    }

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(id_b.finish()),
        Arc::new(ts_b.finish()),
        Arc::new(op_b.finish()),
        Arc::new(target_b.finish()),
        Arc::new(before_b.finish()),
        Arc::new(after_b.finish()),
        Arc::new(actor_b.finish()),
        Arc::new(schema_version_b.finish()),
        Arc::new(upgraded_from_b.finish()),
    ];
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| ParqueError::Decode(format!("failed to build segment record batch: {e}")))?;

    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::LZ4_RAW)
        .build();
    let mut buffer: Vec<u8> = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))
        .map_err(|e| ParqueError::Decode(format!("failed to open segment parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| ParqueError::Decode(format!("failed to write segment row group: {e}")))?;
    writer
        .close()
        .map_err(|e| ParqueError::Decode(format!("failed to finalize segment parquet file: {e}")))?;
    Ok(buffer)
}

/// Decode a segment previously written by [encode_segment].
pub fn decode_segment(bytes: &[u8]) -> Result<Vec<Event>> {
    let data = Bytes::copy_from_slice(bytes);
    let reader_builder = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|e| ParqueError::Decode(format!("failed to open segment parquet reader: {e}")))?;
    let reader = reader_builder
        .build()
        .map_err(|e| ParqueError::Decode(format!("failed to build segment parquet reader: {e}")))?;

    let mut events = Vec::new();
    for batch_result in reader {
        let batch = batch_result.map_err(|e| ParqueError::Decode(format!("failed to read segment row group: {e}")))?;
        events.extend(decode_batch(&batch)?);
    }
    Ok(events)
}

fn decode_batch(batch: &RecordBatch) -> Result<Vec<Event>> {
    let id_col = downcast::<StringArray>(batch, "id")?;
    let ts_col = downcast::<Int64Array>(batch, "ts")?;
    let op_col = downcast::<StringArray>(batch, "op")?;
    let target_col = downcast::<StringArray>(batch, "target")?;
    let before_col = downcast::<BinaryArray>(batch, "before")?;
    let after_col = downcast::<BinaryArray>(batch, "after")?;
    let actor_col = downcast::<StringArray>(batch, "actor")?;
    let schema_version_col = downcast::<Int64Array>(batch, "schemaVersion")?;
    let upgraded_from_col = downcast::<Int64Array>(batch, "upgradedFrom")?;

    let mut events = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let id = id_col
            .value(row)
            .parse()
            .map_err(|e| ParqueError::Decode(format!("invalid event ulid: {e}")))?;
        let before = decode_entity(if before_col.is_null(row) { None } else { Some(before_col.value(row)) })?;
        let after = decode_entity(if after_col.is_null(row) { None } else { Some(after_col.value(row)) })?;
        let actor = if actor_col.is_null(row) { None } else { Some(actor_col.value(row).to_string()) };
        let schema_version = if schema_version_col.is_null(row) { None } else { Some(schema_version_col.value(row) as u32) };
        let upgraded_from = if upgraded_from_col.is_null(row) { None } else { Some(upgraded_from_col.value(row) as u32) };
        let metadata = if schema_version.is_none() && upgraded_from.is_none() {
            None
        } else {
            Some(EventMetadata { schema_version, upgraded_from })
        };

        events.push(Event {
            id,
            ts: ts_col.value(row),
            op: op_from_str(op_col.value(row))?,
            target: target_col.value(row).to_string(),
            before,
            after,
            actor,
            metadata,
        });
    }
    Ok(events)
}

fn downcast<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| ParqueError::Decode(format!("missing segment column {name}")))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ParqueError::Decode(format!("segment column {name} had unexpected array type")))
}

/// Metadata about one persisted segment, tracked in the event log's manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentEntry {
    pub seq: u32,
    pub path: String,
    pub min_ts: i64,
    pub max_ts: i64,
    pub count: usize,
    pub size_bytes: usize,
    pub created_at_ms: i64,
}

impl SegmentEntry {
    pub fn from_batch(seq: u32, path: String, batch: &EventBatch, size_bytes: usize, created_at_ms: i64) -> Self {
        SegmentEntry {
            seq,
            path,
            min_ts: batch.min_ts,
            max_ts: batch.max_ts,
            count: batch.count,
            size_bytes,
            created_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn sample_event(ts: i64) -> Event {
        Event {
            id: Ulid::new(),
            ts,
            op: Op::Create,
            target: "users:1".to_string(),
            before: None,
            after: None,
            actor: None,
            metadata: None,
        }
    }

    #[test]
    fn segment_round_trips_events() {
        let events = vec![sample_event(100), sample_event(200)];
        let bytes = encode_segment(&events).unwrap();
        let restored = decode_segment(&bytes).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].ts, 100);
        assert_eq!(restored[0].id, events[0].id);
    }

    #[test]
    fn segment_round_trips_entity_payloads_and_metadata() {
        use chrono::Utc;

        let mut event = sample_event(300);
        event.op = Op::Update;
        event.actor = Some("alice".to_string());
        event.metadata = Some(EventMetadata { schema_version: Some(2), upgraded_from: Some(1) });
        event.after = Some(Entity {
            id: "users/1".to_string(),
            type_: "user".to_string(),
            name: None,
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            version: 2,
            fields: Default::default(),
        });

        let bytes = encode_segment(std::slice::from_ref(&event)).unwrap();
        let restored = decode_segment(&bytes).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].actor.as_deref(), Some("alice"));
        assert_eq!(restored[0].after.as_ref().unwrap().id, "users/1");
        let metadata = restored[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.schema_version, Some(2));
        assert_eq!(metadata.upgraded_from, Some(1));
    }

    #[test]
    fn segment_path_is_zero_padded() {
        assert_eq!(segment_path("wh/db/users", 7), "wh/db/users/events/seg-0007.parquet");
    }

    #[test]
    fn archive_path_is_year_month_bucketed() {
        assert_eq!(
            archive_path("wh/db/users", 7, 2024, 3),
            "wh/db/users/events/archive/2024/03/seg-0007.parquet"
        );
    }
}
