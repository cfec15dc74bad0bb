/*!
Secondary index substrate (spec §4.5): hash, bloom, HNSW, and FTS indexes,
tied together by an [IndexManager] that tracks row-group checksums to apply
incremental `{added, modified, removed}` updates and remaps row groups after
compaction.
*/

pub mod bloom;
pub mod encoding;
pub mod fts;
pub mod hash;
pub mod hnsw;

use std::collections::HashMap;

use tracing::warn;

use crate::error::{ParqueError, Result};
use crate::model::event::Event;

pub use fts::FtsIndex;
pub use hash::HashIndex;
pub use hnsw::{HnswIndex, HnswParams, Metric};

/// Classification of a row group's state relative to previously stored
/// checksums (spec §4.5 "Change detection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowGroupChange {
    Added(u16),
    Modified(u16),
    Removed(u16),
}

/// Diff `new` checksums against `old`, classifying every row group.
pub fn diff_row_groups(old: &HashMap<u16, u32>, new: &HashMap<u16, u32>) -> Vec<RowGroupChange> {
    let mut changes = Vec::new();
    for (&row_group, &checksum) in new {
        match old.get(&row_group) {
            None => changes.push(RowGroupChange::Added(row_group)),
            Some(&old_checksum) if old_checksum != checksum => {
                changes.push(RowGroupChange::Modified(row_group))
            }
            _ => {}
        }
    }
    for &row_group in old.keys() {
        if !new.contains_key(&row_group) {
            changes.push(RowGroupChange::Removed(row_group));
        }
    }
    changes
}

/// One named index backed by a specific substrate.
pub enum IndexHandle {
    Hash(HashIndex),
    Fts(FtsIndex),
    Vector(HnswIndex),
}

/// Hook invoked when a listener errors while handling an event. Invoked
/// after the error is recorded; errors raised inside the hook itself are
/// ignored (spec §9 "Listener error policy").
pub type OnErrorHook = Box<dyn Fn(&ParqueError, &Event, &str) + Send + Sync>;

/// How the index manager reacts to a listener failing while processing an
/// event (spec §9).
pub struct ListenerErrorPolicy {
    pub on_error: Option<OnErrorHook>,
    /// Default `false`: swallow with a warning. When `true`, every
    /// listener still runs, but their errors are collected and raised as
    /// one aggregate error afterward.
    pub throw_on_listener_error: bool,
}

impl Default for ListenerErrorPolicy {
    fn default() -> Self {
        ListenerErrorPolicy {
            on_error: None,
            throw_on_listener_error: false,
        }
    }
}

type EventListener = Box<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// Coordinates every secondary index for a namespace: owns the index
/// instances, the row-group checksums each one has last synced to, and the
/// live-event listener registry used for incremental maintenance.
pub struct IndexManager {
    indexes: HashMap<String, IndexHandle>,
    checksums: HashMap<String, HashMap<u16, u32>>,
    listeners: Vec<(String, EventListener)>,
    policy: ListenerErrorPolicy,
}

impl Default for IndexManager {
    fn default() -> Self {
        IndexManager {
            indexes: HashMap::new(),
            checksums: HashMap::new(),
            listeners: Vec::new(),
            policy: ListenerErrorPolicy::default(),
        }
    }
}

impl IndexManager {
    pub fn new(policy: ListenerErrorPolicy) -> Self {
        IndexManager {
            indexes: HashMap::new(),
            checksums: HashMap::new(),
            listeners: Vec::new(),
            policy,
        }
    }

    /// Register an index under `name`, replacing any existing one.
    pub fn register(&mut self, name: impl Into<String>, index: IndexHandle) {
        self.indexes.insert(name.into(), index);
    }

    pub fn get(&self, name: &str) -> Option<&IndexHandle> {
        self.indexes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut IndexHandle> {
        self.indexes.get_mut(name)
    }

    /// Register a listener that reacts to every event applied through the
    /// manager. Typically one per index, closing over that index's update
    /// logic.
    pub fn add_listener(&mut self, name: impl Into<String>, listener: EventListener) {
        self.listeners.push((name.into(), listener));
    }

    /// Run every registered listener against `event`. Errors are routed
    /// through the configured [ListenerErrorPolicy]; by default they are
    /// swallowed with a warning, but every listener always runs regardless
    /// of earlier failures.
    pub fn notify(&self, event: &Event) -> Result<()> {
        let mut errors = Vec::new();
        for (name, listener) in &self.listeners {
            if let Err(err) = listener(event) {
                if let Some(hook) = &self.policy.on_error {
                    hook(&err, event, name);
                } else {
                    warn!(listener = %name, error = %err, "index listener failed");
                }
                if self.policy.throw_on_listener_error {
                    errors.push(format!("{name}: {err}"));
                }
            }
        }
        if !errors.is_empty() {
            return Err(ParqueError::Other(anyhow::anyhow!(
                "{} listener(s) failed: {}",
                errors.len(),
                errors.join("; ")
            )));
        }
        Ok(())
    }

    /// Record the checksums an index has just synced to, used as the basis
    /// for the next [diff_row_groups] call.
    pub fn set_checksums(&mut self, index_name: impl Into<String>, checksums: HashMap<u16, u32>) {
        self.checksums.insert(index_name.into(), checksums);
    }

    pub fn checksums(&self, index_name: &str) -> HashMap<u16, u32> {
        self.checksums.get(index_name).cloned().unwrap_or_default()
    }

    /// Remap row groups on every registered index after compaction, and
    /// drop any stored checksums for row groups no longer present.
    pub fn remap_row_groups(&mut self, remap: &HashMap<u16, u16>) {
        for index in self.indexes.values_mut() {
            match index {
                IndexHandle::Hash(h) => h.remap_row_groups(remap),
                IndexHandle::Vector(v) => v.remap_row_groups(remap),
                IndexHandle::Fts(_) => {}
            }
        }
        for checksums in self.checksums.values_mut() {
            let remapped: HashMap<u16, u32> = checksums
                .iter()
                .filter_map(|(old, checksum)| remap.get(old).map(|&new| (new, *checksum)))
                .collect();
            *checksums = remapped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use ulid::Ulid;

    use crate::model::event::{Event, Op};

    fn sample_event() -> Event {
        Event {
            id: Ulid::new(),
            ts: 0,
            op: Op::Create,
            target: "users/01H9Z".to_string(),
            before: None,
            after: None,
            actor: None,
            metadata: None,
        }
    }

    #[test]
    fn diff_classifies_added_modified_removed() {
        let mut old = HashMap::new();
        old.insert(0u16, 1u32);
        old.insert(1u16, 2u32);
        let mut new = HashMap::new();
        new.insert(0u16, 1u32);
        new.insert(1u16, 99u32);
        new.insert(2u16, 3u32);

        let changes = diff_row_groups(&old, &new);
        assert!(changes.contains(&RowGroupChange::Modified(1)));
        assert!(changes.contains(&RowGroupChange::Added(2)));
        assert!(!changes.iter().any(|c| matches!(c, RowGroupChange::Added(0))));
    }

    #[test]
    fn diff_classifies_removed() {
        let mut old = HashMap::new();
        old.insert(0u16, 1u32);
        let new = HashMap::new();
        let changes = diff_row_groups(&old, &new);
        assert_eq!(changes, vec![RowGroupChange::Removed(0)]);
    }

    #[test]
    fn failing_listener_does_not_block_others_and_is_swallowed_by_default() {
        let mut manager = IndexManager::default();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        manager.add_listener(
            "broken",
            Box::new(|_event| Err(ParqueError::Aborted)),
        );
        manager.add_listener(
            "healthy",
            Box::new(move |_event| {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let result = manager.notify(&sample_event());
        assert!(result.is_ok());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn throw_on_listener_error_aggregates_after_running_all() {
        let mut manager = IndexManager::new(ListenerErrorPolicy {
            on_error: None,
            throw_on_listener_error: true,
        });
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        manager.add_listener("broken", Box::new(|_event| Err(ParqueError::Aborted)));
        manager.add_listener(
            "healthy",
            Box::new(move |_event| {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let result = manager.notify(&sample_event());
        assert!(result.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remap_prunes_stored_checksums() {
        let mut manager = IndexManager::default();
        manager.register("by_email", IndexHandle::Hash(HashIndex::new("email")));
        let mut checksums = HashMap::new();
        checksums.insert(0u16, 10u32);
        checksums.insert(1u16, 20u32);
        manager.set_checksums("by_email", checksums);

        let mut remap = HashMap::new();
        remap.insert(0u16, 0u16);
        manager.remap_row_groups(&remap);

        let remaining = manager.checksums("by_email");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.get(&0), Some(&10));
    }
}
