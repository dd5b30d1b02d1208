//! Operation records and their lifecycle enums
//!
//! An [`AsyncRecord`] is the tracked state of one asynchronous action. Its
//! status only advances:
//!
//! ```text
//! Idle ──start──▶ Pending ──resolve*──▶ Resolved(Success | Error | Cancel)
//!   └──────────────resolve*──────────────────▲
//! ```
//!
//! `resolved_status` and `resolved_ts` are present exactly when the status is
//! [`AsyncStatus::Resolved`]. Records are only ever mutated by the store's
//! transition function, which keeps these invariants.
//!
//! Serialized field names follow the store's externally observable snapshot
//! shape (`createdTs`, `resolvedStatus`, ...).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle stage of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncStatus {
    /// Created but not started
    Idle,
    /// Started, waiting for an outcome
    Pending,
    /// Outcome reported; see [`ResolvedStatus`]
    Resolved,
}

impl AsyncStatus {
    /// Position in the lifecycle, used to check that status only advances
    pub fn rank(self) -> u8 {
        match self {
            AsyncStatus::Idle => 0,
            AsyncStatus::Pending => 1,
            AsyncStatus::Resolved => 2,
        }
    }
}

impl fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AsyncStatus::Idle => "idle",
            AsyncStatus::Pending => "pending",
            AsyncStatus::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// Outcome of a resolved operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedStatus {
    Success,
    Error,
    Cancel,
}

impl fmt::Display for ResolvedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolvedStatus::Success => "success",
            ResolvedStatus::Error => "error",
            ResolvedStatus::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Tracked state of one asynchronous action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncRecord {
    /// Unique key while the record is live
    pub id: String,

    /// Opaque category tag
    #[serde(rename = "type")]
    pub kind: String,

    pub created_ts: Timestamp,

    pub status: AsyncStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_ts: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_status: Option<ResolvedStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_ts: Option<Timestamp>,

    /// Operation input, opaque to the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Success value or error value, opaque to the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl AsyncRecord {
    /// Fresh idle record
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: Option<Value>,
        created_ts: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            created_ts,
            status: AsyncStatus::Idle,
            started_ts: None,
            resolved_status: None,
            resolved_ts: None,
            payload,
            result: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == AsyncStatus::Idle
    }

    pub fn is_pending(&self) -> bool {
        self.status == AsyncStatus::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.status == AsyncStatus::Resolved
    }

    /// Outcome, if the record is resolved
    pub fn outcome(&self) -> Option<ResolvedStatus> {
        match self.status {
            AsyncStatus::Resolved => self.resolved_status,
            AsyncStatus::Idle | AsyncStatus::Pending => None,
        }
    }
}
