//! Keyed collection of operation records
//!
//! [`AsyncStore`] maps operation id to [`AsyncRecord`] with O(1) lookup,
//! update and removal. It is a plain value: the single-writer task in
//! [`service`](crate::service) owns the live instance, and snapshots handed
//! out to callers are clones.
//!
//! # Transition policy
//!
//! | Transition        | Known id                                         | Unknown id |
//! |-------------------|--------------------------------------------------|------------|
//! | `create`          | overwrite with a fresh idle record               | insert     |
//! | `start`           | idle → pending, otherwise no-op                  | no-op      |
//! | `resolve*`        | idle/pending → resolved, otherwise no-op         | no-op      |
//! | `delete`          | remove                                           | no-op      |
//! | `cancel`          | no-op (intent only)                              | no-op      |
//!
//! Timestamps are clamped so that `created_ts <= started_ts <= resolved_ts`
//! even if the wall clock stepped backwards between calls.

use crate::error::Result;
use crate::record::{AsyncRecord, AsyncStatus, ResolvedStatus};
use crate::transition::Transition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalized mapping from operation id to its lifecycle record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsyncStore {
    states: HashMap<String, AsyncRecord>,
}

impl AsyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&AsyncRecord> {
        self.states.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterate over all live records, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &AsyncRecord> {
        self.states.values()
    }

    /// Records currently in the given status
    pub fn with_status(&self, status: AsyncStatus) -> impl Iterator<Item = &AsyncRecord> {
        self.states.values().filter(move |r| r.status == status)
    }

    /// Apply a transition in place.
    ///
    /// Returns `true` when the record for the transition's id changed
    /// (inserted, updated or removed). Never fails.
    pub fn apply(&mut self, transition: Transition) -> bool {
        match transition {
            Transition::Create {
                id,
                kind,
                payload,
                ts,
            } => {
                let record = AsyncRecord::new(id.clone(), kind, payload, ts);
                self.states.insert(id, record);
                true
            }
            Transition::Start { id, ts } => match self.states.get_mut(&id) {
                Some(record) if record.status == AsyncStatus::Idle => {
                    record.status = AsyncStatus::Pending;
                    record.started_ts = Some(ts.max(record.created_ts));
                    true
                }
                _ => false,
            },
            Transition::Resolve {
                id,
                status,
                result,
                ts,
            } => match self.states.get_mut(&id) {
                Some(record) if record.status != AsyncStatus::Resolved => {
                    let floor = record.started_ts.unwrap_or(record.created_ts);
                    record.status = AsyncStatus::Resolved;
                    record.resolved_status = Some(status);
                    record.resolved_ts = Some(ts.max(floor));
                    match status {
                        ResolvedStatus::Success | ResolvedStatus::Error => record.result = result,
                        ResolvedStatus::Cancel => {}
                    }
                    true
                }
                _ => false,
            },
            Transition::Delete { id } => self.states.remove(&id).is_some(),
            Transition::Cancel { .. } => false,
        }
    }

    /// Serialize the store to its snapshot JSON shape
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Restore a store from its snapshot JSON shape
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::reduce;
    use proptest::prelude::*;
    use serde_json::json;

    fn created(id: &str) -> AsyncStore {
        reduce(AsyncStore::new(), Transition::create(id, "fetch", None, 100))
    }

    #[test]
    fn test_create_then_start() {
        let store = reduce(created("op1"), Transition::start("op1", 110));
        let record = store.get("op1").unwrap();

        assert_eq!(record.status, AsyncStatus::Pending);
        assert_eq!(record.started_ts, Some(110));
        assert_eq!(record.resolved_ts, None);
        assert_eq!(record.resolved_status, None);
    }

    #[test]
    fn test_resolve_success_sets_result() {
        let store = reduce(created("op1"), Transition::start("op1", 110));
        let store = reduce(store, Transition::resolve_success("op1", Some(json!(42)), 120));
        let record = store.get("op1").unwrap();

        assert_eq!(record.status, AsyncStatus::Resolved);
        assert_eq!(record.resolved_status, Some(ResolvedStatus::Success));
        assert_eq!(record.resolved_ts, Some(120));
        assert_eq!(record.result, Some(json!(42)));
    }

    #[test]
    fn test_resolve_before_start_is_accepted() {
        let store = reduce(created("op1"), Transition::resolve_error("op1", Some(json!("boom")), 105));
        let record = store.get("op1").unwrap();

        assert_eq!(record.outcome(), Some(ResolvedStatus::Error));
        assert_eq!(record.started_ts, None);
        assert_eq!(record.result, Some(json!("boom")));
    }

    #[test]
    fn test_resolved_record_ignores_further_transitions() {
        let store = reduce(created("op1"), Transition::resolve_success("op1", Some(json!(1)), 110));
        let before = store.clone();

        let store = reduce(store, Transition::start("op1", 120));
        let store = reduce(store, Transition::resolve_error("op1", Some(json!(2)), 130));
        let store = reduce(store, Transition::resolve_cancel("op1", 140));

        assert_eq!(store, before);
    }

    #[test]
    fn test_start_twice_keeps_first_timestamp() {
        let store = reduce(created("op1"), Transition::start("op1", 110));
        let store = reduce(store, Transition::start("op1", 150));
        assert_eq!(store.get("op1").unwrap().started_ts, Some(110));
    }

    #[test]
    fn test_duplicate_create_overwrites() {
        let store = reduce(created("op1"), Transition::start("op1", 110));
        let store = reduce(
            store,
            Transition::create("op1", "upload", Some(json!({"n": 1})), 200),
        );
        let record = store.get("op1").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(record.kind, "upload");
        assert_eq!(record.status, AsyncStatus::Idle);
        assert_eq!(record.created_ts, 200);
        assert_eq!(record.started_ts, None);
        assert_eq!(record.payload, Some(json!({"n": 1})));
    }

    #[test]
    fn test_unknown_id_leaves_store_unchanged() {
        let store = created("op1");
        let before = store.clone();

        let mut store = store;
        assert!(!store.apply(Transition::start("ghost", 110)));
        assert!(!store.apply(Transition::resolve_success("ghost", None, 110)));
        assert!(!store.apply(Transition::resolve_error("ghost", None, 110)));
        assert!(!store.apply(Transition::resolve_cancel("ghost", 110)));
        assert!(!store.apply(Transition::delete("ghost")));

        assert_eq!(store, before);
        assert!(!store.contains("ghost"));
    }

    #[test]
    fn test_cancel_intent_has_no_effect() {
        let mut store = reduce(created("op1"), Transition::start("op1", 110));
        let before = store.clone();
        assert!(!store.apply(Transition::cancel("op1")));
        assert_eq!(store, before);
    }

    #[test]
    fn test_resolve_cancel_keeps_result_empty() {
        let store = reduce(created("op1"), Transition::start("op1", 110));
        let store = reduce(store, Transition::resolve_cancel("op1", 120));
        let record = store.get("op1").unwrap();

        assert_eq!(record.outcome(), Some(ResolvedStatus::Cancel));
        assert_eq!(record.result, None);
    }

    #[test]
    fn test_delete_removes_regardless_of_status() {
        let store = reduce(created("op1"), Transition::start("op1", 110));
        let store = reduce(store, Transition::delete("op1"));
        assert!(store.get("op1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_timestamps_clamped_when_clock_steps_back() {
        let store = reduce(created("op1"), Transition::start("op1", 90));
        let store = reduce(store, Transition::resolve_success("op1", None, 80));
        let record = store.get("op1").unwrap();

        assert_eq!(record.started_ts, Some(100));
        assert_eq!(record.resolved_ts, Some(100));
    }

    #[test]
    fn test_snapshot_json_roundtrip_shape() {
        let store = reduce(created("op1"), Transition::start("op1", 110));
        let value = store.to_json().unwrap();

        assert_eq!(value["states"]["op1"]["status"], json!("pending"));
        assert_eq!(value["states"]["op1"]["startedTs"], json!(110));
        assert_eq!(AsyncStore::from_json(value).unwrap(), store);
    }

    fn arb_transition() -> impl Strategy<Value = Transition> {
        let id = prop::sample::select(vec!["a", "b", "c"]);
        (id, 0u8..6, 0i64..1_000).prop_map(|(id, op, ts)| match op {
            0 => Transition::create(id, "t", None, ts),
            1 => Transition::start(id, ts),
            2 => Transition::resolve_success(id, None, ts),
            3 => Transition::resolve_error(id, None, ts),
            4 => Transition::resolve_cancel(id, ts),
            _ => Transition::cancel(id),
        })
    }

    proptest! {
        #[test]
        fn prop_status_only_advances(transitions in prop::collection::vec(arb_transition(), 0..40)) {
            let mut store = AsyncStore::new();
            for transition in transitions {
                let recreated = matches!(transition, Transition::Create { .. } | Transition::Delete { .. });
                let id = transition.id().to_string();
                let before = store.get(&id).map(|r| r.status);
                store.apply(transition);

                if let Some(record) = store.get(&id) {
                    if !recreated {
                        if let Some(before) = before {
                            prop_assert!(record.status.rank() >= before.rank());
                        }
                    }
                    prop_assert_eq!(record.resolved_status.is_some(), record.is_resolved());
                    prop_assert_eq!(record.resolved_ts.is_some(), record.is_resolved());
                    if let Some(started) = record.started_ts {
                        prop_assert!(started >= record.created_ts);
                    }
                    if let Some(resolved) = record.resolved_ts {
                        prop_assert!(resolved >= record.started_ts.unwrap_or(record.created_ts));
                    }
                }
            }
        }
    }
}
