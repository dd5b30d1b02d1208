//! Action facade over the single-writer store task
//!
//! [`AsyncActionService`] is a cheap, cloneable handle. Every mutating method
//! stamps wall-clock time, enqueues a [`Transition`] and returns immediately;
//! one owning task drains the queue and applies transitions in order, so
//! concurrent callers observe a single total order of mutations.
//!
//! # Architecture
//!
//! ```text
//!  caller A ──┐                       ┌───────────────────────────────┐
//!  caller B ──┼── unbounded queue ──▶ │ store task                    │
//!  engine   ──┘   (Command)           │  AsyncStore::apply(transition)│
//!                                     │  watchers[id].send(record)    │
//!                                     └──────────────┬────────────────┘
//!                                                    │ one queue per subscriber
//!                                   select(id) ◀─────┘ (current value first)
//! ```
//!
//! Subscriptions are created through the same queue as transitions, so the
//! first value a [`RecordStream`] yields already reflects every transition
//! the subscribing caller submitted before calling [`AsyncActionService::select`].
//!
//! # Example
//!
//! ```rust,no_run
//! use async_store::{AsyncActionService, StoreConfig};
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> async_store::Result<()> {
//!     let actions = AsyncActionService::spawn(StoreConfig::default());
//!
//!     actions.create("op1", "fetch", None)?;
//!     actions.start("op1")?;
//!
//!     let mut updates = actions.select("op1").await?;
//!     actions.resolve_success("op1", Some(json!(42)))?;
//!
//!     while let Some(record) = updates.next().await {
//!         if record.as_ref().is_some_and(|r| r.is_resolved()) {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use crate::config::StoreConfig;
use crate::error::Result;
use crate::record::{now_ms, AsyncRecord};
use crate::store::AsyncStore;
use crate::transition::Transition;
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::Instrument;

/// Messages consumed by the store task
enum Command {
    Apply(Transition),
    Select {
        id: String,
        reply: oneshot::Sender<mpsc::UnboundedReceiver<Option<AsyncRecord>>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Option<AsyncRecord>>,
    },
    Snapshot {
        reply: oneshot::Sender<AsyncStore>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Imperative API over the operation store
///
/// Cloning the service clones the handle, not the store. The store task
/// stops once every handle has been dropped; live [`RecordStream`]s end at
/// that point.
#[derive(Debug, Clone)]
pub struct AsyncActionService {
    tx: mpsc::UnboundedSender<Command>,
}

impl AsyncActionService {
    /// Start a store task with an empty store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: StoreConfig) -> Self {
        Self::spawn_with_store(AsyncStore::new(), config)
    }

    /// Start a store task seeded with an existing store (e.g. a snapshot).
    pub fn spawn_with_store(store: AsyncStore, config: StoreConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::debug_span!("async_store", name = %config.name);
        tokio::spawn(run_store(rx, store, config).instrument(span));
        Self { tx }
    }

    /// Submit a pre-built transition
    pub fn dispatch(&self, transition: Transition) -> Result<()> {
        self.tx.send(Command::Apply(transition))?;
        Ok(())
    }

    /// Create an idle record, overwriting any record with the same id
    pub fn create(
        &self,
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: Option<Value>,
    ) -> Result<()> {
        self.dispatch(Transition::create(id, kind, payload, now_ms()))
    }

    /// Mark an idle record as pending
    pub fn start(&self, id: impl Into<String>) -> Result<()> {
        self.dispatch(Transition::start(id, now_ms()))
    }

    /// Record a cancellation intent.
    ///
    /// This does not change the record. Use [`resolve_cancel`](Self::resolve_cancel)
    /// to actually end an operation as cancelled.
    pub fn cancel(&self, id: impl Into<String>) -> Result<()> {
        self.dispatch(Transition::cancel(id))
    }

    /// Remove a record regardless of its status
    pub fn delete(&self, id: impl Into<String>) -> Result<()> {
        self.dispatch(Transition::delete(id))
    }

    pub fn resolve_success(&self, id: impl Into<String>, result: Option<Value>) -> Result<()> {
        self.dispatch(Transition::resolve_success(id, result, now_ms()))
    }

    pub fn resolve_error(&self, id: impl Into<String>, result: Option<Value>) -> Result<()> {
        self.dispatch(Transition::resolve_error(id, result, now_ms()))
    }

    pub fn resolve_cancel(&self, id: impl Into<String>) -> Result<()> {
        self.dispatch(Transition::resolve_cancel(id, now_ms()))
    }

    /// Live view of one record.
    ///
    /// The stream yields the current value immediately (`None` if the id is
    /// unknown), then the record after every mutation of that id, and `None`
    /// once it is deleted. It does not complete while the store is alive.
    /// Every change is delivered in order, however slowly the stream is
    /// polled.
    pub async fn select(&self, id: impl Into<String>) -> Result<RecordStream> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Select {
            id: id.into(),
            reply,
        })?;
        Ok(RecordStream::new(rx.await?))
    }

    /// Current record for an id, after all previously submitted transitions
    pub async fn get(&self, id: impl Into<String>) -> Result<Option<AsyncRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Get {
            id: id.into(),
            reply,
        })?;
        Ok(rx.await?)
    }

    /// Copy of the whole store
    pub async fn snapshot(&self) -> Result<AsyncStore> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Snapshot { reply })?;
        Ok(rx.await?)
    }

    /// Wait until every previously submitted command has been applied
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Flush { reply })?;
        Ok(rx.await?)
    }

    /// Whether the store task is still running
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owning loop: the only place the live store is mutated.
async fn run_store(
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut store: AsyncStore,
    config: StoreConfig,
) {
    let mut watchers: Watchers = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Apply(transition) => {
                let id = transition.id().to_string();
                let name = transition.name();
                let changed = store.apply(transition);

                if config.log_transitions {
                    tracing::debug!(id = %id, transition = name, changed, "Applied transition");
                }
                if changed {
                    notify(&mut watchers, &store, &id);
                }
            }
            Command::Select { id, reply } => {
                prune(&mut watchers);
                let (tx, rx) = mpsc::unbounded_channel();
                // The receiver is still held here, so the send cannot fail
                let _ = tx.send(store.get(&id).cloned());
                if reply.send(rx).is_ok() {
                    watchers.entry(id).or_default().push(tx);
                }
            }
            Command::Get { id, reply } => {
                let _ = reply.send(store.get(&id).cloned());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(store.clone());
            }
            Command::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }

    tracing::debug!(records = store.len(), "Async store closed");
}

type Watchers = HashMap<String, Vec<mpsc::UnboundedSender<Option<AsyncRecord>>>>;

fn notify(watchers: &mut Watchers, store: &AsyncStore, id: &str) {
    let Some(senders) = watchers.get_mut(id) else {
        return;
    };
    let record = store.get(id).cloned();
    senders.retain(|tx| tx.send(record.clone()).is_ok());
    if senders.is_empty() {
        watchers.remove(id);
    }
}

/// Drop subscriptions whose streams are gone
fn prune(watchers: &mut Watchers) {
    watchers.retain(|_, senders| {
        senders.retain(|tx| !tx.is_closed());
        !senders.is_empty()
    });
}

/// Stream of values for one record id, see [`AsyncActionService::select`]
pub struct RecordStream {
    inner: UnboundedReceiverStream<Option<AsyncRecord>>,
}

impl RecordStream {
    fn new(rx: mpsc::UnboundedReceiver<Option<AsyncRecord>>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
        }
    }
}

impl Stream for RecordStream {
    type Item = Option<AsyncRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream").finish_non_exhaustive()
    }
}
