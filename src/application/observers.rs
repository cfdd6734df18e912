use crate::domain::observer::{CheckoutEvent, EventContext, ObserverResponse};
use crate::error::Result;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Priority given to observers registered without one. Lower runs first.
pub const DEFAULT_PRIORITY: i32 = 10;

/// A callback consulted at a checkout lifecycle event.
///
/// Returning `Ok(None)` means the observer has nothing to report.
#[async_trait]
pub trait CheckoutObserver: Send + Sync {
    async fn observe(
        &self,
        event: CheckoutEvent,
        context: &EventContext,
    ) -> Result<Option<ObserverResponse>>;
}

struct FnObserver<F>(F);

#[async_trait]
impl<F, Fut> CheckoutObserver for FnObserver<F>
where
    F: Fn(CheckoutEvent, EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<ObserverResponse>>> + Send + 'static,
{
    async fn observe(
        &self,
        event: CheckoutEvent,
        context: &EventContext,
    ) -> Result<Option<ObserverResponse>> {
        (self.0)(event, context.clone()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle {
    event: CheckoutEvent,
    id: u64,
}

struct Registration {
    id: u64,
    priority: i32,
    observer: Arc<dyn CheckoutObserver>,
}

/// Fans an event out to every registered observer and collects their responses.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<BTreeMap<CheckoutEvent, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        event: CheckoutEvent,
        priority: i32,
        observer: Arc<dyn CheckoutObserver>,
    ) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut observers = self.observers.write();
        let registrations = observers.entry(event).or_default();
        registrations.push(Registration {
            id,
            priority,
            observer,
        });
        registrations.sort_by_key(|registration| (registration.priority, registration.id));
        ObserverHandle { event, id }
    }

    /// Registers a closure with the default priority.
    pub fn register_fn<F, Fut>(&self, event: CheckoutEvent, observer: F) -> ObserverHandle
    where
        F: Fn(CheckoutEvent, EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<ObserverResponse>>> + Send + 'static,
    {
        self.register(event, DEFAULT_PRIORITY, Arc::new(FnObserver(observer)))
    }

    pub fn unregister(&self, handle: ObserverHandle) -> bool {
        let mut observers = self.observers.write();
        let Some(registrations) = observers.get_mut(&handle.event) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|registration| registration.id != handle.id);
        before != registrations.len()
    }

    pub fn observer_count(&self, event: CheckoutEvent) -> usize {
        self.observers.read().get(&event).map_or(0, Vec::len)
    }

    /// Emits `event` and waits for every observer, in priority order.
    ///
    /// There is no per-observer timeout. An observer that errors or panics is
    /// reported as an [`ObserverResponse::Error`]; observers with nothing to
    /// say are left out of the result.
    pub async fn emit(
        &self,
        event: CheckoutEvent,
        context: &EventContext,
    ) -> Vec<ObserverResponse> {
        let observers: Vec<Arc<dyn CheckoutObserver>> = self
            .observers
            .read()
            .get(&event)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|registration| Arc::clone(&registration.observer))
                    .collect()
            })
            .unwrap_or_default();

        let pending = observers.iter().map(|observer| {
            AssertUnwindSafe(observer.observe(event, context)).catch_unwind()
        });

        join_all(pending)
            .await
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    warn!(%event, error = %err, "Observer failed");
                    Some(ObserverResponse::error(err.to_string()))
                }
                Err(_) => {
                    warn!(%event, "Observer panicked");
                    Some(ObserverResponse::error(format!("An observer of {event} panicked")))
                }
            })
            .collect()
    }
}
