/*!
Exact-match hash index (spec §4.5): maps an indexed field's canonical value
to the `(rowGroup, rowOffset, docId)` triples where it appears. Persisted in
the compact format from §4.7.
*/

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::model::entity::FieldValue;

use super::bloom::BloomFilter;
use super::encoding::{self, fnv1a_32, IndexEntry};

/// A single match location for a hash-index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Row group containing the match.
    pub row_group: u16,
    /// Row offset within the row group.
    pub row_offset: u64,
    /// Document id the match belongs to.
    pub doc_id: Vec<u8>,
}

/// Exact-match index over a single field.
#[derive(Debug, Default)]
pub struct HashIndex {
    field: String,
    /// Canonical key bytes -> matching locations. Multiple entities may
    /// share a key (e.g. a non-unique field), so values are inverted lists.
    entries: HashMap<Vec<u8>, Vec<Location>>,
    /// Per-row-group bloom filters, built lazily during `build_blooms`.
    row_group_blooms: HashMap<u16, BloomFilter>,
    version: u64,
}

/// Canonicalize a [FieldValue] into bytes suitable as a hash-index key.
/// Uses the same JSON representation the query matcher uses for equality so
/// `$eq`/`$in` lookups and index keys always agree.
pub fn canonical_key(value: &FieldValue) -> Vec<u8> {
    let json: JsonValue = serde_json::to_value(value).unwrap_or(JsonValue::Null);
    serde_json::to_vec(&json).unwrap_or_default()
}

impl HashIndex {
    /// Create an empty index over `field`.
    pub fn new(field: impl Into<String>) -> Self {
        HashIndex {
            field: field.into(),
            entries: HashMap::new(),
            row_group_blooms: HashMap::new(),
            version: 0,
        }
    }

    /// Field this index is built over.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Monotonic version, incremented on every mutating call (spec §4.5).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Insert one `(value, location)` pair.
    pub fn insert(&mut self, value: &FieldValue, row_group: u16, row_offset: u64, doc_id: Vec<u8>) {
        let key = canonical_key(value);
        self.row_group_blooms
            .entry(row_group)
            .or_insert_with(|| BloomFilter::new(1_024, 0.01))
            .add(&key);
        self.entries.entry(key).or_default().push(Location {
            row_group,
            row_offset,
            doc_id,
        });
        self.version += 1;
    }

    /// Remove every location belonging to `doc_id` within `row_group`.
    pub fn remove_doc_in_row_group(&mut self, row_group: u16, doc_id: &[u8]) {
        let mut removed_any = false;
        for locations in self.entries.values_mut() {
            let before = locations.len();
            locations.retain(|loc| !(loc.row_group == row_group && loc.doc_id == doc_id));
            if locations.len() != before {
                removed_any = true;
            }
        }
        self.entries.retain(|_, v| !v.is_empty());
        if removed_any {
            self.version += 1;
        }
    }

    /// Exact-match lookup.
    pub fn lookup(&self, value: &FieldValue) -> &[Location] {
        let key = canonical_key(value);
        self.entries.get(&key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Whether `value` might appear in `row_group`, per that row group's bloom filter.
    pub fn row_group_might_contain(&self, row_group: u16, value: &FieldValue) -> bool {
        match self.row_group_blooms.get(&row_group) {
            Some(filter) => filter.might_contain(&canonical_key(value)),
            None => true,
        }
    }

    /// Remap row-group ids after compaction, dropping entries for row groups
    /// that no longer exist (spec §4.5 "row-group remapping").
    pub fn remap_row_groups(&mut self, remap: &HashMap<u16, u16>) {
        for locations in self.entries.values_mut() {
            locations.retain_mut(|loc| match remap.get(&loc.row_group) {
                Some(&new_id) => {
                    loc.row_group = new_id;
                    true
                }
                None => false,
            });
        }
        self.entries.retain(|_, v| !v.is_empty());

        let mut new_blooms = HashMap::new();
        for (old_id, bloom) in self.row_group_blooms.drain() {
            if let Some(&new_id) = remap.get(&old_id) {
                new_blooms.insert(new_id, bloom);
            }
        }
        self.row_group_blooms = new_blooms;
        self.version += 1;
    }

    /// Serialize to the compact on-disk format, with key hashes included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let entries: Vec<IndexEntry> = self
            .entries
            .iter()
            .flat_map(|(key, locations)| {
                let hash = fnv1a_32(key);
                locations.iter().map(move |loc| IndexEntry {
                    key_hash: Some(hash),
                    row_group: loc.row_group,
                    row_offset: loc.row_offset,
                    doc_id: loc.doc_id.clone(),
                })
            })
            .collect();
        encoding::write_entries(&entries, true)
    }

    /// Rebuild a lookup table purely from the on-disk encoding. Because the
    /// compact format only stores key hashes (not the original key bytes),
    /// this reconstructs a hash-keyed index suitable for membership testing
    /// during a cold load; callers needing exact-key lookups should rebuild
    /// from source data instead.
    pub fn locations_from_bytes(bytes: &[u8]) -> Result<Vec<Location>> {
        let entries = encoding::read_entries(bytes)?;
        Ok(entries
            .into_iter()
            .map(|e| Location {
                row_group: e.row_group,
                row_offset: e.row_offset,
                doc_id: e.doc_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_inserted_value() {
        let mut index = HashIndex::new("email");
        index.insert(
            &FieldValue::String("a@example.com".to_string()),
            0,
            3,
            b"users/a".to_vec(),
        );
        let hits = index.lookup(&FieldValue::String("a@example.com".to_string()));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, b"users/a");
    }

    #[test]
    fn remap_drops_unmapped_row_groups() {
        let mut index = HashIndex::new("email");
        index.insert(&FieldValue::Int(1), 0, 0, b"a".to_vec());
        index.insert(&FieldValue::Int(2), 1, 0, b"b".to_vec());

        let mut remap = HashMap::new();
        remap.insert(0u16, 0u16);
        index.remap_row_groups(&remap);

        assert_eq!(index.lookup(&FieldValue::Int(1)).len(), 1);
        assert!(index.lookup(&FieldValue::Int(2)).is_empty());
    }

    #[test]
    fn compact_encoding_round_trips_locations() {
        let mut index = HashIndex::new("email");
        index.insert(&FieldValue::Int(1), 2, 5, b"doc-a".to_vec());
        let bytes = index.to_bytes();
        let locations = HashIndex::locations_from_bytes(&bytes).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].doc_id, b"doc-a");
        assert_eq!(locations[0].row_group, 2);
    }
}
