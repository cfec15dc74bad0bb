/*!
Backward event replay (spec §4.4): given a known state at `current_ts`, undo
events with `ts > τ` by reversing each operation, walking latest-first.
*/

use std::cmp::Reverse;

use crate::model::entity::Entity;
use crate::model::event::{Event, Op};

use super::forward::ReplayResult;

/// Undo `events` with `ts > to_ts`, starting from `current_state`, walking
/// from the most recent event backward.
pub fn backward_replay(current_state: Option<Entity>, events: &[Event], to_ts: i64) -> ReplayResult {
    let mut to_undo: Vec<&Event> = events.iter().filter(|e| e.ts > to_ts).collect();
    to_undo.sort_by_key(|e| Reverse(e.order_key()));

    let mut state = current_state;
    let mut count = 0;
    for event in to_undo {
        count += 1;
        match event.op {
            // The event created the target; undoing it removes it entirely.
            Op::Create | Op::RelCreate => state = None,
            // Revert to whatever existed immediately before the mutation.
            Op::Update => state = event.before.clone(),
            Op::Delete | Op::RelDelete => state = event.before.clone(),
        }
    }
    ReplayResult {
        existed: state.is_some(),
        state,
        events_replayed: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{Entity, FieldValue};
    use chrono::Utc;
    use ulid::Ulid;

    fn entity(title: &str) -> Entity {
        Entity {
            id: "posts/1".to_string(),
            type_: "post".to_string(),
            name: None,
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            version: 1,
            fields: [("title".to_string(), FieldValue::String(title.to_string()))]
                .into_iter()
                .collect(),
        }
    }

    fn event(ts: i64, op: Op, before: Option<Entity>, after: Option<Entity>) -> Event {
        Event {
            id: Ulid::new(),
            ts,
            op,
            target: "posts:1".to_string(),
            before,
            after,
            actor: None,
            metadata: None,
        }
    }

    #[test]
    fn undoing_an_update_restores_the_prior_value() {
        let events = vec![event(2000, Op::Update, Some(entity("V1")), Some(entity("V2")))];
        let result = backward_replay(Some(entity("V2")), &events, 1500);
        assert_eq!(
            result.state.unwrap().fields.get("title"),
            Some(&FieldValue::String("V1".to_string()))
        );
    }

    #[test]
    fn undoing_a_create_removes_the_target() {
        let events = vec![event(1000, Op::Create, None, Some(entity("V1")))];
        let result = backward_replay(Some(entity("V1")), &events, 500);
        assert!(!result.existed);
        assert!(result.state.is_none());
    }

    #[test]
    fn undoing_a_delete_restores_the_pre_delete_state() {
        let events = vec![event(2000, Op::Delete, Some(entity("V1")), None)];
        let result = backward_replay(None, &events, 1500);
        assert!(result.existed);
        assert_eq!(
            result.state.unwrap().fields.get("title"),
            Some(&FieldValue::String("V1".to_string()))
        );
    }
}
