//! Per-instance execution queue.
//!
//! Each provider runs on its own OS thread that owns the engine. Host calls,
//! fetch completions and timers all arrive as [`Job`]s on one FIFO channel
//! and run strictly one after another. Pending promise jobs are drained
//! after every job.
//!
//! The host holds the only strong senders. Guest-side async work holds a
//! [`WeakQueue`], so dropping the provider closes the channel and stops the
//! thread even while requests are in flight.

use std::path::PathBuf;
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::error::ExtensionResult;
use super::ipc::HttpBridge;
use super::isolate::{ExtensionIsolate, LoadedInstance};

/// Work for the queue thread.
pub(crate) type Job = Box<dyn FnOnce(&mut ExtensionIsolate) + Send>;

pub(crate) enum QueueMessage {
    Run(Job),
    Shutdown,
}

/// Stack for queue threads. The engine's own limit sits below this.
const THREAD_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Everything needed to start an instance.
#[derive(Debug, Clone)]
pub(crate) struct LoadRequest {
    pub source: String,
    pub origin: String,
    pub data_dir: PathBuf,
    pub memory_limit: usize,
    pub max_stack_size: usize,
    pub execution_timeout: Duration,
    pub http: HttpBridge,
}

/// Strong handle used by the host to post work.
#[derive(Clone)]
pub(crate) struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueMessage>,
    thread: ThreadId,
}

impl QueueHandle {
    /// Post a job. Returns `false` (dropping the job) if the queue has stopped.
    pub(crate) fn post(&self, job: impl FnOnce(&mut ExtensionIsolate) + Send + 'static) -> bool {
        self.tx.send(QueueMessage::Run(Box::new(job))).is_ok()
    }

    /// Ask the thread to stop after the current job. Queued jobs are dropped.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(QueueMessage::Shutdown);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether the caller is running on this queue's thread.
    pub(crate) fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread
    }
}

/// Weak handle for completions that must not keep an instance alive.
#[derive(Clone)]
pub(crate) struct WeakQueue {
    tx: mpsc::WeakUnboundedSender<QueueMessage>,
}

impl WeakQueue {
    /// Post a job if the instance is still running.
    pub(crate) fn post(&self, job: impl FnOnce(&mut ExtensionIsolate) + Send + 'static) -> bool {
        self.tx
            .upgrade()
            .is_some_and(|tx| tx.send(QueueMessage::Run(Box::new(job))).is_ok())
    }

    /// A handle whose queue is already gone.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            tx: tx.downgrade(),
        }
    }
}

/// Start an instance thread.
///
/// Returns the queue handle immediately and the load outcome through the
/// receiver once the program text has been evaluated.
pub(crate) fn spawn(
    request: LoadRequest,
) -> ExtensionResult<(QueueHandle, oneshot::Receiver<ExtensionResult<LoadedInstance>>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let weak = WeakQueue {
        tx: tx.downgrade(),
    };

    let name = format!("awery-ext-{}", thread_label(&request.origin));
    let thread = thread::Builder::new()
        .name(name)
        .stack_size(THREAD_STACK_SIZE)
        .spawn(move || run(request, weak, rx, ready_tx))?;

    let handle = QueueHandle {
        tx,
        thread: thread.thread().id(),
    };
    Ok((handle, ready_rx))
}

fn run(
    request: LoadRequest,
    queue: WeakQueue,
    mut rx: mpsc::UnboundedReceiver<QueueMessage>,
    ready: oneshot::Sender<ExtensionResult<LoadedInstance>>,
) {
    let origin = request.origin.clone();
    let mut isolate = match ExtensionIsolate::load(request, queue) {
        Ok((isolate, loaded)) => {
            if ready.send(Ok(loaded)).is_err() {
                tracing::debug!(
                    origin = %origin,
                    "Installer went away before the extension was ready"
                );
                return;
            }
            isolate
        }
        Err(e) => {
            tracing::warn!(origin = %origin, error = %e, "Extension failed to initialize");
            let _ = ready.send(Err(e));
            return;
        }
    };

    let label = isolate.label();
    tracing::debug!(extension = %label, "Queue thread started");

    while let Some(message) = rx.blocking_recv() {
        match message {
            QueueMessage::Run(job) => isolate.run(job),
            QueueMessage::Shutdown => break,
        }
    }

    // Drop queued jobs now so their callers observe abandonment promptly.
    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    tracing::debug!(extension = %label, dropped, "Queue thread stopped");
}

fn thread_label(origin: &str) -> String {
    let name = origin
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(origin)
        .trim_end_matches(".js");
    name.chars().take(24).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_label() {
        assert_eq!(thread_label("/srv/ext/anilist.js"), "anilist");
        assert_eq!(thread_label("inline"), "inline");
    }
}
