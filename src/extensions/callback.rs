//! Callback adapter.
//!
//! Guest methods receive a callback object as their last argument and settle
//! it with `resolve(value)` or `reject(error)`, either before returning or
//! from a later job on the queue. A [`CallbackAdapter`] turns that into a
//! host [`PendingCall`]: the first settlement is decoded and delivered, later
//! ones are ignored with a warning.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::error::{ExtensionError, ExtensionResult};
use super::value::GuestValue;

type Decoder<T> = Box<dyn FnOnce(GuestValue) -> ExtensionResult<T> + Send>;

struct Sink<T> {
    decode: Decoder<T>,
    tx: oneshot::Sender<ExtensionResult<T>>,
}

/// Type-erased settlement surface handed to guest code.
pub trait Settle: Send + Sync {
    /// Settle with a guest value. Returns `false` if already settled.
    fn resolve(&self, value: GuestValue) -> bool;

    /// Settle with an error. Returns `false` if already settled.
    fn reject(&self, error: ExtensionError) -> bool;

    fn is_settled(&self) -> bool;

    fn is_cancelled(&self) -> bool;
}

/// Native side of one guest callback.
pub struct CallbackAdapter<T> {
    extension: String,
    function: &'static str,
    sink: Mutex<Option<Sink<T>>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> CallbackAdapter<T> {
    /// Create an adapter and the pending call it settles.
    ///
    /// `decode` runs once, on the thread that settles the callback.
    pub fn new(
        extension: &str,
        function: &'static str,
        decode: impl FnOnce(GuestValue) -> ExtensionResult<T> + Send + 'static,
    ) -> (Arc<Self>, PendingCall<T>) {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let adapter = Arc::new(Self {
            extension: extension.to_string(),
            function,
            sink: Mutex::new(Some(Sink {
                decode: Box::new(decode),
                tx,
            })),
            cancel: cancel.clone(),
        });

        let pending = PendingCall {
            extension: extension.to_string(),
            inner: Inner::Waiting {
                rx,
                adapter: Arc::downgrade(&adapter),
                cancel,
            },
        };

        (adapter, pending)
    }

    fn settle(&self, outcome: impl FnOnce(Decoder<T>) -> ExtensionResult<T>) -> bool {
        let Some(sink) = self.take_sink() else {
            if self.cancel.is_cancelled() {
                tracing::debug!(
                    extension = %self.extension,
                    function = self.function,
                    "Ignoring settlement of a cancelled call"
                );
            } else {
                tracing::warn!(
                    extension = %self.extension,
                    function = self.function,
                    "Callback settled more than once; ignoring"
                );
            }
            return false;
        };

        let result = outcome(sink.decode);
        if sink.tx.send(result).is_err() {
            tracing::debug!(
                extension = %self.extension,
                function = self.function,
                "Caller stopped waiting before settlement"
            );
        }
        true
    }
}

impl<T> CallbackAdapter<T> {
    fn take_sink(&self) -> Option<Sink<T>> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Drop the sink without settling.
    fn detach(&self) {
        drop(self.take_sink());
    }
}

impl<T: Send + 'static> Settle for CallbackAdapter<T> {
    fn resolve(&self, value: GuestValue) -> bool {
        self.settle(|decode| decode(value))
    }

    fn reject(&self, error: ExtensionError) -> bool {
        self.settle(|_| Err(error))
    }

    fn is_settled(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

enum Inner<T> {
    Waiting {
        rx: oneshot::Receiver<ExtensionResult<T>>,
        adapter: Weak<CallbackAdapter<T>>,
        cancel: CancellationToken,
    },
    Done(Option<ExtensionResult<T>>),
}

/// Result of a provider call that may settle now or much later.
///
/// Await it, block on it with [`wait`](Self::wait), or poll it with
/// [`try_take`](Self::try_take). Dropping it cancels the call.
#[must_use = "dropping a PendingCall cancels it"]
pub struct PendingCall<T> {
    extension: String,
    inner: Inner<T>,
}

// Never pin-projected; the receiver is polled through `Pin::new`.
impl<T> Unpin for PendingCall<T> {}

impl<T> PendingCall<T> {
    /// A call that failed before reaching the guest.
    pub(crate) fn failed(extension: &str, error: ExtensionError) -> Self {
        Self {
            extension: extension.to_string(),
            inner: Inner::Done(Some(Err(error))),
        }
    }

    /// Extension the call was made on.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Cancel the call. Any later settlement by the guest is discarded and
    /// `callback.isCancelled()` starts returning `true`.
    pub fn cancel(&self) {
        if let Inner::Waiting { adapter, cancel, .. } = &self.inner {
            cancel.cancel();
            if let Some(adapter) = adapter.upgrade() {
                adapter.detach();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            Inner::Waiting { cancel, .. } => cancel.is_cancelled(),
            Inner::Done(_) => false,
        }
    }

    /// Token that cancels this call, for wiring into host cancellation.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        match &self.inner {
            Inner::Waiting { cancel, .. } => Some(cancel.clone()),
            Inner::Done(_) => None,
        }
    }

    /// Take the result if the call has settled.
    pub fn try_take(&mut self) -> Option<ExtensionResult<T>> {
        let outcome = match &mut self.inner {
            Inner::Done(slot) => return slot.take(),
            Inner::Waiting { rx, cancel, .. } => match rx.try_recv() {
                Ok(result) => result,
                Err(oneshot::error::TryRecvError::Empty) if !cancel.is_cancelled() => return None,
                Err(_) => self.closed_error(),
            },
        };
        self.inner = Inner::Done(None);
        Some(outcome)
    }

    /// Block the current thread until the call settles.
    ///
    /// Must not be called from inside an async runtime or from the
    /// extension's own queue thread; await the call instead.
    pub fn wait(mut self) -> ExtensionResult<T> {
        match std::mem::replace(&mut self.inner, Inner::Done(None)) {
            Inner::Done(slot) => slot.unwrap_or(Err(ExtensionError::Cancelled)),
            Inner::Waiting { rx, cancel, .. } => {
                if cancel.is_cancelled() {
                    return Err(ExtensionError::Cancelled);
                }
                rx.blocking_recv().unwrap_or_else(|_| {
                    if cancel.is_cancelled() {
                        Err(ExtensionError::Cancelled)
                    } else {
                        Err(ExtensionError::Abandoned(self.extension.clone()))
                    }
                })
            }
        }
    }

    fn closed_error(&self) -> ExtensionResult<T> {
        if self.is_cancelled() {
            Err(ExtensionError::Cancelled)
        } else {
            Err(ExtensionError::Abandoned(self.extension.clone()))
        }
    }
}

impl<T> Future for PendingCall<T> {
    type Output = ExtensionResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match &mut this.inner {
            Inner::Done(slot) => {
                return Poll::Ready(slot.take().unwrap_or(Err(ExtensionError::Cancelled)))
            }
            Inner::Waiting { rx, cancel, .. } => {
                if cancel.is_cancelled() {
                    Err(ExtensionError::Cancelled)
                } else {
                    match Pin::new(rx).poll(cx) {
                        Poll::Ready(Ok(result)) => result,
                        Poll::Ready(Err(_)) => this.closed_error(),
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        };
        this.inner = Inner::Done(None);
        Poll::Ready(outcome)
    }
}

impl<T> Drop for PendingCall<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T> std::fmt::Debug for PendingCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("extension", &self.extension)
            .field("settled", &matches!(self.inner, Inner::Done(_)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn adapter() -> (Arc<CallbackAdapter<f64>>, PendingCall<f64>) {
        CallbackAdapter::new("demo", "awerySearchMedia", |value| {
            value
                .as_f64()
                .ok_or_else(|| ExtensionError::guest("expected a number"))
        })
    }

    #[test]
    fn test_first_settlement_wins() {
        let (adapter, pending) = adapter();
        assert!(adapter.resolve(GuestValue::Number(1.0)));
        assert!(!adapter.resolve(GuestValue::Number(2.0)));
        assert!(!adapter.reject(ExtensionError::guest("late")));
        assert!(adapter.is_settled());
        assert_eq!(pending.wait().unwrap(), 1.0);
    }

    #[test]
    fn test_decode_failure_reaches_caller() {
        let (adapter, pending) = adapter();
        adapter.resolve(GuestValue::from("nope"));
        assert!(matches!(pending.wait(), Err(ExtensionError::Guest { .. })));
    }

    #[test]
    fn test_settles_from_another_thread() {
        let (adapter, pending) = adapter();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            adapter.resolve(GuestValue::Number(7.0));
        });
        assert_eq!(pending.wait().unwrap(), 7.0);
        worker.join().unwrap();
    }

    #[test]
    fn test_try_take() {
        let (adapter, mut pending) = adapter();
        assert!(pending.try_take().is_none());
        adapter.resolve(GuestValue::Number(3.0));
        assert_eq!(pending.try_take().unwrap().unwrap(), 3.0);
        assert!(pending.try_take().is_none());
    }

    #[test]
    fn test_cancel_detaches_sink() {
        let (adapter, mut pending) = adapter();
        pending.cancel();
        assert!(adapter.is_cancelled());
        assert!(adapter.is_settled());
        assert!(!adapter.resolve(GuestValue::Number(1.0)));
        assert!(matches!(pending.try_take(), Some(Err(ExtensionError::Cancelled))));
    }

    #[test]
    fn test_drop_cancels() {
        let (adapter, pending) = adapter();
        drop(pending);
        assert!(adapter.is_cancelled());
        assert!(!adapter.resolve(GuestValue::Number(1.0)));
    }

    fn cancel_generic<T>(pending: &PendingCall<T>) {
        pending.cancel();
    }

    #[test]
    fn test_cancel_from_generic_context() {
        let (adapter, pending) = adapter();
        cancel_generic(&pending);
        assert!(adapter.is_settled());
        assert!(pending.is_cancelled());
        drop(pending);
        assert!(!adapter.resolve(GuestValue::Number(1.0)));
    }

    #[test]
    fn test_dropped_adapter_abandons_call() {
        let (adapter, pending) = adapter();
        drop(adapter);
        assert!(matches!(pending.wait(), Err(ExtensionError::Abandoned(ext)) if ext == "demo"));
    }

    #[test]
    fn test_await() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (adapter, pending) = adapter();
        adapter.resolve(GuestValue::Number(5.0));
        assert_eq!(runtime.block_on(pending).unwrap(), 5.0);
    }

    #[test]
    fn test_failed_call() {
        let pending = PendingCall::<f64>::failed("demo", ExtensionError::Cancelled);
        assert!(matches!(pending.wait(), Err(ExtensionError::Cancelled)));
    }
}
