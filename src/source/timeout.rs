use crate::error::SourceError;
use crate::source::{Connector, RawMessage};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Bounds every call on the wrapped connector. A call that overruns is
/// reported as `SourceError::Timeout`; its worker thread is left to finish on
/// its own.
#[derive(Debug, Clone)]
pub struct TimedConnector<C> {
    inner: C,
    timeout: Duration,
}

impl<C> TimedConnector<C>
where
    C: Connector + Clone + Send + 'static,
{
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(C) -> Result<T, SourceError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let inner = self.inner.clone();
        thread::Builder::new()
            .name(format!("connector-{op}"))
            .spawn(move || {
                let _ = tx.send(f(inner));
            })
            .map_err(|err| SourceError::Unavailable(format!("failed to spawn {op} worker: {err}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(op, millis, "connector call timed out");
                Err(SourceError::Timeout { op, millis })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SourceError::Unavailable(format!(
                "{op} worker exited without a result"
            ))),
        }
    }
}

impl<C> Connector for TimedConnector<C>
where
    C: Connector + Clone + Send + 'static,
{
    fn list_messages(&self, folder: &str) -> Result<Vec<RawMessage>, SourceError> {
        let folder = folder.to_string();
        self.call("list_messages", move |c| c.list_messages(&folder))
    }

    fn move_message(&self, external_id: &str, target: &str) -> Result<String, SourceError> {
        let id = external_id.to_string();
        let target = target.to_string();
        self.call("move_message", move |c| c.move_message(&id, &target))
    }

    fn delete(&self, external_id: &str) -> Result<(), SourceError> {
        let id = external_id.to_string();
        self.call("delete", move |c| c.delete(&id))
    }
}
