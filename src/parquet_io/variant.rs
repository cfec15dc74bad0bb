/*!
Binary encoding for the `$data` blob (spec §4.6, §9 "Variant encoding for
on-disk `$data`"). Follows the same tag-plus-varint discipline as the
compact index encoding in §4.7: a one-byte type tag followed by a
type-specific payload, so nested [FieldValue] trees encode without a schema.
*/

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use crate::error::{ParqueError, Result};
use crate::model::entity::FieldValue;

const TAG_NULL: u8 = 0;
const TAG_BOOL_FALSE: u8 = 1;
const TAG_BOOL_TRUE: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_TIMESTAMP: u8 = 7;
const TAG_LIST: u8 = 8;
const TAG_MAP: u8 = 9;

/// Encode a map of fields into the Variant binary blob stored in `$data`.
pub fn encode(fields: &BTreeMap<String, FieldValue>) -> Vec<u8> {
    let mut out = Vec::new();
    encode_map_fields(fields, &mut out);
    out
}

/// Decode a Variant blob back into a field map.
pub fn decode(bytes: &[u8]) -> Result<BTreeMap<String, FieldValue>> {
    let mut cursor = 0usize;
    let value = decode_value(bytes, &mut cursor)?;
    match value {
        FieldValue::Map(map) => Ok(map),
        _ => Err(ParqueError::Decode(
            "variant root must encode a map".to_string(),
        )),
    }
}

fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_varint(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(*cursor)
            .ok_or_else(|| ParqueError::Decode("truncated varint".to_string()))?;
        *cursor += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

fn encode_value(value: &FieldValue, out: &mut Vec<u8>) {
    match value {
        FieldValue::Null => out.push(TAG_NULL),
        FieldValue::Bool(false) => out.push(TAG_BOOL_FALSE),
        FieldValue::Bool(true) => out.push(TAG_BOOL_TRUE),
        FieldValue::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        FieldValue::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_le_bytes());
        }
        FieldValue::String(s) => {
            out.push(TAG_STRING);
            write_varint(s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
        }
        FieldValue::Bytes(b) => {
            out.push(TAG_BYTES);
            write_varint(b.len() as u64, out);
            out.extend_from_slice(b);
        }
        FieldValue::Timestamp(ts) => {
            out.push(TAG_TIMESTAMP);
            out.extend_from_slice(&ts.timestamp_millis().to_le_bytes());
        }
        FieldValue::List(items) => {
            out.push(TAG_LIST);
            write_varint(items.len() as u64, out);
            for item in items {
                encode_value(item, out);
            }
        }
        FieldValue::Map(map) => {
            out.push(TAG_MAP);
            encode_map_fields(map, out);
        }
    }
}

fn encode_map_fields(fields: &BTreeMap<String, FieldValue>, out: &mut Vec<u8>) {
    // `undefined`/missing values are elided rather than written as null
    // entries (spec §4.6 "Values of undefined are elided").
    let present: Vec<(&String, &FieldValue)> =
        fields.iter().filter(|(_, v)| !v.is_null()).collect();
    write_varint(present.len() as u64, out);
    for (key, value) in present {
        write_varint(key.len() as u64, out);
        out.extend_from_slice(key.as_bytes());
        encode_value(value, out);
    }
}

fn decode_value(bytes: &[u8], cursor: &mut usize) -> Result<FieldValue> {
    let tag = *bytes
        .get(*cursor)
        .ok_or_else(|| ParqueError::Decode("truncated variant tag".to_string()))?;
    *cursor += 1;
    match tag {
        TAG_NULL => Ok(FieldValue::Null),
        TAG_BOOL_FALSE => Ok(FieldValue::Bool(false)),
        TAG_BOOL_TRUE => Ok(FieldValue::Bool(true)),
        TAG_INT => {
            let bytes8 = read_fixed::<8>(bytes, cursor)?;
            Ok(FieldValue::Int(i64::from_le_bytes(bytes8)))
        }
        TAG_FLOAT => {
            let bytes8 = read_fixed::<8>(bytes, cursor)?;
            Ok(FieldValue::Float(f64::from_le_bytes(bytes8)))
        }
        TAG_STRING => {
            let len = read_varint(bytes, cursor)? as usize;
            let raw = read_slice(bytes, cursor, len)?;
            String::from_utf8(raw.to_vec())
                .map(FieldValue::String)
                .map_err(|e| ParqueError::Decode(format!("invalid utf8 in variant string: {e}")))
        }
        TAG_BYTES => {
            let len = read_varint(bytes, cursor)? as usize;
            let raw = read_slice(bytes, cursor, len)?;
            Ok(FieldValue::Bytes(raw.to_vec()))
        }
        TAG_TIMESTAMP => {
            let bytes8 = read_fixed::<8>(bytes, cursor)?;
            let millis = i64::from_le_bytes(bytes8);
            let dt = Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| ParqueError::Decode("invalid variant timestamp".to_string()))?;
            Ok(FieldValue::Timestamp(dt))
        }
        TAG_LIST => {
            let len = read_varint(bytes, cursor)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value(bytes, cursor)?);
            }
            Ok(FieldValue::List(items))
        }
        TAG_MAP => {
            let count = read_varint(bytes, cursor)? as usize;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let key_len = read_varint(bytes, cursor)? as usize;
                let key_bytes = read_slice(bytes, cursor, key_len)?;
                let key = String::from_utf8(key_bytes.to_vec())
                    .map_err(|e| ParqueError::Decode(format!("invalid utf8 in variant key: {e}")))?;
                let value = decode_value(bytes, cursor)?;
                map.insert(key, value);
            }
            Ok(FieldValue::Map(map))
        }
        other => Err(ParqueError::Decode(format!("unknown variant tag {other}"))),
    }
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = *cursor + len;
    let slice = bytes
        .get(*cursor..end)
        .ok_or_else(|| ParqueError::Decode("truncated variant payload".to_string()))?;
    *cursor = end;
    Ok(slice)
}

fn read_fixed<const N: usize>(bytes: &[u8], cursor: &mut usize) -> Result<[u8; N]> {
    let slice = read_slice(bytes, cursor, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}
