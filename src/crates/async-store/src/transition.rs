//! Store transitions
//!
//! A [`Transition`] is one requested change to the store. Timestamps are
//! stamped by the caller (usually [`AsyncActionService`](crate::AsyncActionService))
//! so that applying a transition stays a pure function of the prior store.

use crate::record::{ResolvedStatus, Timestamp};
use crate::store::AsyncStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A requested change to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Transition {
    /// Insert a fresh idle record, overwriting any record with the same id
    Create {
        id: String,
        kind: String,
        payload: Option<Value>,
        ts: Timestamp,
    },
    /// Move an idle record to pending
    Start { id: String, ts: Timestamp },
    /// Remove a record regardless of its status
    Delete { id: String },
    /// Bare cancellation intent; has no effect on the store.
    /// Cancellation is realized by [`Transition::Resolve`] with
    /// [`ResolvedStatus::Cancel`].
    Cancel { id: String },
    /// Resolve an idle or pending record
    Resolve {
        id: String,
        status: ResolvedStatus,
        result: Option<Value>,
        ts: Timestamp,
    },
}

impl Transition {
    pub fn create(
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: Option<Value>,
        ts: Timestamp,
    ) -> Self {
        Self::Create {
            id: id.into(),
            kind: kind.into(),
            payload,
            ts,
        }
    }

    pub fn start(id: impl Into<String>, ts: Timestamp) -> Self {
        Self::Start { id: id.into(), ts }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self::Delete { id: id.into() }
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        Self::Cancel { id: id.into() }
    }

    pub fn resolve_success(id: impl Into<String>, result: Option<Value>, ts: Timestamp) -> Self {
        Self::Resolve {
            id: id.into(),
            status: ResolvedStatus::Success,
            result,
            ts,
        }
    }

    pub fn resolve_error(id: impl Into<String>, result: Option<Value>, ts: Timestamp) -> Self {
        Self::Resolve {
            id: id.into(),
            status: ResolvedStatus::Error,
            result,
            ts,
        }
    }

    /// Cancel resolutions never carry a result
    pub fn resolve_cancel(id: impl Into<String>, ts: Timestamp) -> Self {
        Self::Resolve {
            id: id.into(),
            status: ResolvedStatus::Cancel,
            result: None,
            ts,
        }
    }

    /// Id of the record this transition targets
    pub fn id(&self) -> &str {
        match self {
            Transition::Create { id, .. }
            | Transition::Start { id, .. }
            | Transition::Delete { id }
            | Transition::Cancel { id }
            | Transition::Resolve { id, .. } => id,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Create { .. } => "create",
            Transition::Start { .. } => "start",
            Transition::Delete { .. } => "delete",
            Transition::Cancel { .. } => "cancel",
            Transition::Resolve {
                status: ResolvedStatus::Success,
                ..
            } => "resolveSuccess",
            Transition::Resolve {
                status: ResolvedStatus::Error,
                ..
            } => "resolveError",
            Transition::Resolve {
                status: ResolvedStatus::Cancel,
                ..
            } => "resolveCancel",
        }
    }
}

/// Pure transition function: `(prior store, transition) -> next store`
///
/// Never fails. Transitions that target unknown ids, or that would move a
/// record backwards in its lifecycle, return the store unchanged.
pub fn reduce(mut store: AsyncStore, transition: Transition) -> AsyncStore {
    store.apply(transition);
    store
}
