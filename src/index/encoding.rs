/*!
The compact persisted-index encoding described in spec §4.7: a small
varint-based binary format shared by the hash index and any other index
that needs to persist `(key -> location)` entries compactly.

```text
Header (6 bytes): version(1) | flags(1, bit0=hasKeyHash) | entryCount(u32 LE)
Entry (base): rowGroup(u16 LE) | rowOffset(varint) | docIdLen(u8) | docId(bytes)
With key-hash variant, prepend keyHash(u32 LE).
```
*/

use crate::error::{ParqueError, Result};

/// Current writer format version. Readers dispatch on the first header byte
/// so versions 1-3 can coexist on disk.
pub const CURRENT_VERSION: u8 = 3;

const FLAG_HAS_KEY_HASH: u8 = 0b0000_0001;

/// One persisted entry: a row-group/row-offset location plus the owning
/// document id, optionally tagged with an FNV-1a hash of its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// FNV-1a 32-bit hash of the canonical key bytes, when key hashing is enabled.
    pub key_hash: Option<u32>,
    /// Row group the entry's value lives in.
    pub row_group: u16,
    /// Offset of the row within its row group.
    pub row_offset: u64,
    /// Document id the entry points at.
    pub doc_id: Vec<u8>,
}

/// FNV-1a 32-bit hash, used to tag entries with their key hash.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
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
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(*cursor)
            .ok_or_else(|| ParqueError::Decode("truncated varint in index entry".to_string()))?;
        *cursor += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

/// Serialize a set of entries using the compact format. `with_key_hash`
/// controls whether each entry is tagged with its FNV-1a key hash.
pub fn write_entries(entries: &[IndexEntry], with_key_hash: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(CURRENT_VERSION);
    let flags = if with_key_hash { FLAG_HAS_KEY_HASH } else { 0 };
    out.push(flags);
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    for entry in entries {
        if with_key_hash {
            let hash = entry.key_hash.unwrap_or(0);
            out.extend_from_slice(&hash.to_le_bytes());
        }
        out.extend_from_slice(&entry.row_group.to_le_bytes());
        write_varint(entry.row_offset, &mut out);
        out.push(entry.doc_id.len() as u8);
        out.extend_from_slice(&entry.doc_id);
    }
    out
}

/// Deserialize entries previously written by [write_entries]. Dispatches on
/// the leading version byte so older on-disk formats keep loading.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<IndexEntry>> {
    if bytes.len() < 6 {
        return Err(ParqueError::Decode(
            "index payload shorter than the 6-byte header".to_string(),
        ));
    }
    let version = bytes[0];
    if !(1..=3).contains(&version) {
        return Err(ParqueError::Decode(format!(
            "unsupported index format version {version}"
        )));
    }
    let flags = bytes[1];
    let has_key_hash = version >= 2 && (flags & FLAG_HAS_KEY_HASH != 0);
    let entry_count = u32::from_le_bytes(bytes[2..6].try_into().unwrap()) as usize;

    let mut cursor = 6usize;
    let mut entries = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        let key_hash = if has_key_hash {
            let hash_bytes = bytes
                .get(cursor..cursor + 4)
                .ok_or_else(|| ParqueError::Decode("truncated key hash".to_string()))?;
            cursor += 4;
            Some(u32::from_le_bytes(hash_bytes.try_into().unwrap()))
        } else {
            None
        };
        let row_group_bytes = bytes
            .get(cursor..cursor + 2)
            .ok_or_else(|| ParqueError::Decode("truncated row group".to_string()))?;
        let row_group = u16::from_le_bytes(row_group_bytes.try_into().unwrap());
        cursor += 2;
        let row_offset = read_varint(bytes, &mut cursor)?;
        let doc_id_len = *bytes
            .get(cursor)
            .ok_or_else(|| ParqueError::Decode("truncated doc id length".to_string()))?
            as usize;
        cursor += 1;
        let doc_id = bytes
            .get(cursor..cursor + doc_id_len)
            .ok_or_else(|| ParqueError::Decode("truncated doc id".to_string()))?
            .to_vec();
        cursor += doc_id_len;
        entries.push(IndexEntry {
            key_hash,
            row_group,
            row_offset,
            doc_id,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<IndexEntry> {
        vec![
            IndexEntry {
                key_hash: Some(fnv1a_32(b"alice")),
                row_group: 0,
                row_offset: 3,
                doc_id: b"users/01H9Z".to_vec(),
            },
            IndexEntry {
                key_hash: Some(fnv1a_32(b"bob")),
                row_group: 1,
                row_offset: 500_000,
                doc_id: b"users/01H9Y".to_vec(),
            },
        ]
    }

    #[test]
    fn round_trips_with_key_hash() {
        let entries = sample_entries();
        let bytes = write_entries(&entries, true);
        let restored = read_entries(&bytes).unwrap();
        assert_eq!(restored, entries);
    }

    #[test]
    fn round_trips_without_key_hash() {
        let entries = sample_entries();
        let bytes = write_entries(&entries, false);
        let restored = read_entries(&bytes).unwrap();
        assert_eq!(restored.len(), entries.len());
        assert!(restored.iter().all(|e| e.key_hash.is_none()));
    }

    #[test]
    fn large_row_offset_round_trips_through_varint() {
        let entries = vec![IndexEntry {
            key_hash: None,
            row_group: 7,
            row_offset: u64::MAX / 2,
            doc_id: b"x".to_vec(),
        }];
        let bytes = write_entries(&entries, false);
        let restored = read_entries(&bytes).unwrap();
        assert_eq!(restored[0].row_offset, u64::MAX / 2);
    }
}
