use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

type Action = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Pending {
    generation: u64,
    action: Action,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    generation: u64,
    pending: Option<Pending>,
}

/// Coalesces bursts of triggers into a single action.
///
/// Each call to [`schedule`](Self::schedule) restarts the quiescence window and
/// replaces the previously scheduled action. Nothing is cancelled when the
/// debouncer is dropped; owners must call [`cancel`](Self::cancel) or
/// [`flush`](Self::flush) on teardown.
#[derive(Clone)]
pub struct Debouncer {
    window: Duration,
    state: Arc<Mutex<State>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Schedules `action` to run once the window elapses without another call.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Box::new(move || action().boxed());
        let mut state = self.state.lock();
        if let Some(previous) = state.pending.take() {
            previous.timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let shared = Arc::clone(&self.state);
        let window = self.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let pending = shared
                .lock()
                .pending
                .take_if(|pending| pending.generation == generation);
            if let Some(pending) = pending {
                (pending.action)().await;
            }
        });

        state.pending = Some(Pending {
            generation,
            action,
            timer,
        });
    }

    /// Runs the pending action now, on the caller's task. No-op if nothing is pending.
    pub async fn flush(&self) {
        let pending = self.state.lock().pending.take();
        if let Some(pending) = pending {
            pending.timer.abort();
            (pending.action)().await;
        }
    }

    /// Discards the pending action without running it. No-op if nothing is pending.
    pub fn cancel(&self) {
        if let Some(pending) = self.state.lock().pending.take() {
            pending.timer.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}
