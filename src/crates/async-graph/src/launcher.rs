//! Hand-off of fired operations to the code that performs them
//!
//! When a node fires, the engine creates and starts its operation records,
//! then passes one [`Launch`] per operation to the run's
//! [`OperationLauncher`]. The launcher starts the external work; that work
//! reports its outcome through the [`AsyncActionService`] carried by the
//! launch, and the engine picks the resolution up from the store.
//!
//! Cancellation is cooperative: once the engine resolves an operation as
//! cancelled, a late `succeed`/`fail` from the work is a no-op in the store.
//! Work that wants to stop early can watch its record with
//! [`Launch::record`].
//!
//! Three launchers cover the common cases:
//!
//! - any `Fn(Launch) + Send + Sync` closure
//! - [`ChannelLauncher`] forwards launches to a channel, for callers that
//!   drive operations themselves
//! - [`TaskLauncher`] spawns an async function per launch and resolves the
//!   record with its `Result`

use async_store::{AsyncActionService, RecordStream};
use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc;

/// One operation the engine has created and started
#[derive(Debug, Clone)]
pub struct Launch {
    pub run_id: String,
    pub node: String,
    /// Id of the operation record
    pub operation: String,
    /// Position among the node's concurrent operations
    pub index: usize,
    pub kind: String,
    pub payload: Option<Value>,
    pub actions: AsyncActionService,
}

impl Launch {
    pub fn succeed(&self, result: Option<Value>) -> async_store::Result<()> {
        self.actions.resolve_success(self.operation.clone(), result)
    }

    pub fn fail(&self, error: Option<Value>) -> async_store::Result<()> {
        self.actions.resolve_error(self.operation.clone(), error)
    }

    pub fn cancel(&self) -> async_store::Result<()> {
        self.actions.resolve_cancel(self.operation.clone())
    }

    /// Live view of this operation's record
    pub async fn record(&self) -> async_store::Result<RecordStream> {
        self.actions.select(self.operation.clone()).await
    }
}

/// Starts the external work behind fired operations
pub trait OperationLauncher: Send + Sync {
    /// Start the work for one operation. Must not block.
    fn launch(&self, launch: Launch);
}

impl<F> OperationLauncher for F
where
    F: Fn(Launch) + Send + Sync,
{
    fn launch(&self, launch: Launch) {
        self(launch)
    }
}

/// Forwards every launch to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelLauncher {
    tx: mpsc::UnboundedSender<Launch>,
}

impl ChannelLauncher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Launch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OperationLauncher for ChannelLauncher {
    fn launch(&self, launch: Launch) {
        if let Err(err) = self.tx.send(launch) {
            tracing::warn!(
                operation = %err.0.operation,
                "Launch receiver dropped; operation stays pending"
            );
        }
    }
}

/// Runs an async function per launch and resolves the record with its outcome.
///
/// `Ok(value)` resolves success with `value`, `Err(value)` resolves error.
pub struct TaskLauncher<F> {
    work: F,
}

impl<F> TaskLauncher<F> {
    pub fn new(work: F) -> Self {
        Self { work }
    }
}

impl<F, Fut> OperationLauncher for TaskLauncher<F>
where
    F: Fn(Launch) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Value>> + Send + 'static,
{
    fn launch(&self, launch: Launch) {
        let actions = launch.actions.clone();
        let operation = launch.operation.clone();
        let work = (self.work)(launch);

        tokio::spawn(async move {
            let reported = match work.await {
                Ok(value) => actions.resolve_success(operation.clone(), Some(value)),
                Err(error) => actions.resolve_error(operation.clone(), Some(error)),
            };
            if let Err(err) = reported {
                tracing::warn!(operation = %operation, error = %err, "Could not report outcome");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_store::{ResolvedStatus, StoreConfig};
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn launch(actions: &AsyncActionService, operation: &str) -> Launch {
        Launch {
            run_id: "run".into(),
            node: "node".into(),
            operation: operation.into(),
            index: 0,
            kind: "job".into(),
            payload: Some(json!(3)),
            actions: actions.clone(),
        }
    }

    #[tokio::test]
    async fn test_closure_launcher() {
        let actions = AsyncActionService::spawn(StoreConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let launcher = move |_: Launch| {
            counter.fetch_add(1, Ordering::SeqCst);
        };

        launcher.launch(launch(&actions, "op1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_launcher_forwards() {
        let actions = AsyncActionService::spawn(StoreConfig::default());
        let (launcher, mut rx) = ChannelLauncher::new();

        launcher.launch(launch(&actions, "op1"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.operation, "op1");
        assert_eq!(received.payload, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_task_launcher_resolves_record() {
        let actions = AsyncActionService::spawn(StoreConfig::default());
        actions.create("ok", "job", None).unwrap();
        actions.create("bad", "job", None).unwrap();
        actions.start("ok").unwrap();
        actions.start("bad").unwrap();

        let launcher = TaskLauncher::new(|launch: Launch| async move {
            if launch.operation == "ok" {
                Ok(json!("done"))
            } else {
                Err(json!("boom"))
            }
        });
        launcher.launch(launch(&actions, "ok"));
        launcher.launch(launch(&actions, "bad"));

        let mut ok = launch(&actions, "ok").record().await.unwrap();
        let mut bad = launch(&actions, "bad").record().await.unwrap();
        let ok_record = loop {
            let record = ok.next().await.unwrap().unwrap();
            if record.is_resolved() {
                break record;
            }
        };
        let bad_record = loop {
            let record = bad.next().await.unwrap().unwrap();
            if record.is_resolved() {
                break record;
            }
        };

        assert_eq!(ok_record.outcome(), Some(ResolvedStatus::Success));
        assert_eq!(ok_record.result, Some(json!("done")));
        assert_eq!(bad_record.outcome(), Some(ResolvedStatus::Error));
        assert_eq!(bad_record.result, Some(json!("boom")));
    }
}
