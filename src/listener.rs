use crate::capability::TypeKey;
use crate::error::{BoxError, ListenerError, LookupError};
use crate::executor::Executor;
use crate::result::{LookupResult, ResultView};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by `add_listener`, used to unregister the listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Receives a notification whenever the set of instances of a result changes.
///
/// The listener gets the result itself and re-reads whatever it needs; no diff
/// is delivered. Closures taking `&LookupResult<T>` are listeners.
pub trait LookupListener<T: ?Sized>: Send + Sync + 'static {
    fn result_changed(&self, result: &LookupResult<T>) -> Result<(), BoxError>;
}

impl<T, F> LookupListener<T> for F
where
    T: ?Sized,
    F: Fn(&LookupResult<T>) + Send + Sync + 'static,
{
    fn result_changed(&self, result: &LookupResult<T>) -> Result<(), BoxError> {
        self(result);
        Ok(())
    }
}

/// The type-erased listener form stored by results
pub type RawListener =
    Arc<dyn Fn(&Arc<dyn ResultView>) -> Result<(), BoxError> + Send + Sync + 'static>;

/// Receives listener failures on behalf of the owner of a lookup
pub type ErrorHandler = Arc<dyn Fn(ListenerError) + Send + Sync + 'static>;

/// The default [`ErrorHandler`]: logs the failure and moves on
pub fn log_listener_error() -> ErrorHandler {
    Arc::new(|error: ListenerError| {
        tracing::warn!(error = %error, "lookup listener failed");
    })
}

#[derive(Default)]
struct DispatchState {
    pending: usize,
    running: bool,
}

/// Listener registrations of one result plus its ordered dispatch queue.
///
/// Every trigger bumps a pending counter; whoever finds the queue idle drains
/// it. A trigger raised while listeners are running (from a listener, or from
/// another thread) is therefore delivered after the current round, never
/// interleaved with it.
pub(crate) struct ListenerSet {
    query: TypeKey,
    entries: Mutex<Vec<(ListenerId, RawListener)>>,
    dispatch: Mutex<DispatchState>,
    on_error: ErrorHandler,
}

impl ListenerSet {
    pub(crate) fn new(query: TypeKey, on_error: ErrorHandler) -> Arc<Self> {
        Arc::new(Self {
            query,
            entries: Mutex::new(Vec::new()),
            dispatch: Mutex::new(DispatchState::default()),
            on_error,
        })
    }

    pub(crate) fn add(&self, listener: RawListener) -> Result<ListenerId, LookupError> {
        let id = ListenerId::next();
        let mut entries = self.entries.lock().map_err(|_| LookupError::LockError)?;
        entries.push((id, listener));
        Ok(id)
    }

    pub(crate) fn remove(&self, id: ListenerId) -> Result<bool, LookupError> {
        let mut entries = self.entries.lock().map_err(|_| LookupError::LockError)?;
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        Ok(entries.len() != before)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.is_empty())
            .unwrap_or(true)
    }

    /// Queues one notification and delivers it inline or through `executor`
    pub(crate) fn fire(
        self: &Arc<Self>,
        source: Arc<dyn ResultView>,
        executor: Option<&Arc<dyn Executor>>,
    ) {
        if self.is_empty() {
            return;
        }
        self.dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending += 1;
        match executor {
            Some(executor) => {
                let listeners = Arc::clone(self);
                executor.submit(Box::new(move || listeners.drain(&source)));
            }
            None => self.drain(&source),
        }
    }

    fn drain(&self, source: &Arc<dyn ResultView>) {
        {
            let mut state = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
            if state.running {
                return;
            }
            state.running = true;
        }
        loop {
            {
                let mut state = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
                if state.pending == 0 {
                    state.running = false;
                    return;
                }
                state.pending -= 1;
            }
            self.notify_all(source);
        }
    }

    fn notify_all(&self, source: &Arc<dyn ResultView>) {
        let entries: Vec<(ListenerId, RawListener)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::trace!(query = %self.query, listeners = entries.len(), "notifying listeners");

        for (id, listener) in entries {
            let failure = match catch_unwind(AssertUnwindSafe(|| listener(source))) {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => ListenerError::Failed {
                    listener: id.as_u64(),
                    query: self.query.name(),
                    source: error,
                },
                Err(payload) => ListenerError::Panicked {
                    listener: id.as_u64(),
                    query: self.query.name(),
                    message: panic_message(payload.as_ref()),
                },
            };
            (self.on_error)(failure);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
