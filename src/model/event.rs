/*!
The [Event] / [EventBatch] types that make up the write-ahead log unit
(spec §3, §4.3).
*/

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::entity::Entity;

/// The kind of mutation an [Event] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// A new entity was created.
    Create,
    /// An existing entity was mutated.
    Update,
    /// An entity was soft- or hard-deleted.
    Delete,
    /// A relationship edge was created.
    RelCreate,
    /// A relationship edge was removed.
    RelDelete,
}

/// Event metadata: schema version stamps and upgrade provenance (spec §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    /// The schema version the event's `before`/`after` payloads were written against.
    pub schema_version: Option<u32>,
    /// Set by the field-rename upgrader once it has rewritten a stale event.
    pub upgraded_from: Option<u32>,
}

/// An immutable record of a single mutation. Events are append-only; they
/// are never modified once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// ULID identifying the event, used as the ordering tie-breaker.
    pub id: Ulid,
    /// Millisecond timestamp of the mutation.
    pub ts: i64,
    /// The kind of mutation.
    pub op: Op,
    /// `ns:id` for entities, `fromNs:fromId:predicate:toNs:toId` for relationships.
    pub target: String,
    /// State before the mutation, when applicable.
    pub before: Option<Entity>,
    /// State after the mutation, when applicable.
    pub after: Option<Entity>,
    /// The actor responsible for the mutation.
    pub actor: Option<String>,
    /// Free-form metadata, including schema-versioning provenance.
    pub metadata: Option<EventMetadata>,
}

impl Event {
    /// Ordering key used everywhere events are sorted: `(ts, id)`.
    pub fn order_key(&self) -> (i64, Ulid) {
        (self.ts, self.id)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

/// The unit the WAL flushes: a batch of events plus the summary stats needed
/// to size adaptive thresholds and segment headers.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    /// Events in submission order.
    pub events: Vec<Event>,
    /// Minimum `ts` across `events`.
    pub min_ts: i64,
    /// Maximum `ts` across `events`.
    pub max_ts: i64,
    /// `events.len()`.
    pub count: usize,
    /// Approximate size of the batch's serialized form, used for flush thresholds.
    pub size_bytes: usize,
}

impl EventBatch {
    /// Build a batch from a vector of events, computing the summary stats.
    pub fn from_events(events: Vec<Event>, size_bytes: usize) -> Self {
        let min_ts = events.iter().map(|e| e.ts).min().unwrap_or(0);
        let max_ts = events.iter().map(|e| e.ts).max().unwrap_or(0);
        let count = events.len();
        EventBatch {
            events,
            min_ts,
            max_ts,
            count,
            size_bytes,
        }
    }

    /// True when the batch carries no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_break_on_id() {
        let a = Ulid::from_parts(0, 1);
        let b = Ulid::from_parts(0, 2);
        assert!(a < b);
    }

    #[test]
    fn batch_tracks_min_max_ts() {
        let events = vec![
            Event {
                id: Ulid::new(),
                ts: 200,
                op: Op::Create,
                target: "ns:a".into(),
                before: None,
                after: None,
                actor: None,
                metadata: None,
            },
            Event {
                id: Ulid::new(),
                ts: 100,
                op: Op::Update,
                target: "ns:a".into(),
                before: None,
                after: None,
                actor: None,
                metadata: None,
            },
        ];
        let batch = EventBatch::from_events(events, 128);
        assert_eq!(batch.min_ts, 100);
        assert_eq!(batch.max_ts, 200);
        assert_eq!(batch.count, 2);
    }
}
