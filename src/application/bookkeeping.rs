use parking_lot::Mutex;

/// Per-resource sync state, owned by exactly one push executor.
///
/// `S` is the last snapshot seen by the executor and `D` the set of fields
/// still awaiting confirmation from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncBookkeeping<S, D> {
    pub initialized: bool,
    pub in_flight: bool,
    pub last_seen: Option<S>,
    pub dirty: D,
}

impl<S, D: Default> Default for SyncBookkeeping<S, D> {
    fn default() -> Self {
        Self {
            initialized: false,
            in_flight: false,
            last_seen: None,
            dirty: D::default(),
        }
    }
}

impl<S, D: Default> SyncBookkeeping<S, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first observed snapshot as the baseline. It is never pushed.
    pub fn init(&mut self, baseline: S) {
        self.initialized = true;
        self.last_seen = Some(baseline);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Claims the single in-flight slot. Returns false if a push is already running.
    pub fn begin_flight(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn end_flight(&mut self) {
        self.in_flight = false;
    }
}

/// Holds the in-flight slot of a [`SyncBookkeeping`] and releases it on drop.
///
/// The slot is freed even when the push future is dropped before the request
/// completes, e.g. by a timeout or an aborted task.
pub struct FlightGuard<'a, S, D: Default> {
    state: &'a Mutex<SyncBookkeeping<S, D>>,
}

impl<'a, S, D: Default> FlightGuard<'a, S, D> {
    /// Claims the slot. Returns `None` if a push is already running.
    ///
    /// Must not be called while `state` is locked.
    pub fn acquire(state: &'a Mutex<SyncBookkeeping<S, D>>) -> Option<Self> {
        let claimed = state.lock().begin_flight();
        claimed.then(|| Self { state })
    }
}

impl<S, D: Default> Drop for FlightGuard<'_, S, D> {
    fn drop(&mut self) {
        self.state.lock().end_flight();
    }
}

/// What a single reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// First pass: the snapshot became the baseline.
    Initialized,
    /// Skipped because of a gate (in flight, no session, express payment).
    Skipped,
    /// Nothing sendable.
    Clean,
    Sent,
    Failed,
    Aborted,
}
