//! The request pool: admission, coalescing, retry, and the pump loop.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::telemetry;

use super::descriptor::{Admission, RequestDescriptor};
use super::gateway::{LoadOptions, LoaderGateway};
use super::queue::ClassQueues;
use super::registry::{ClassRegistry, DemandClass};
use super::tracker::ActiveTracker;

/// Errors surfaced to producers at the pool boundary.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Programmer error: the class was never registered.
    #[error("unknown demand class: {0}")]
    UnknownClass(String),
}

/// A producer's fetch request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub item_id: String,
    pub class: String,
    pub prevent_cache: bool,
    /// Prepend instead of append, for priority re-admission.
    pub at_front: bool,
}

impl FetchRequest {
    pub fn new(item_id: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            class: class.into(),
            prevent_cache: false,
            at_front: false,
        }
    }

    pub fn prevent_cache(mut self) -> Self {
        self.prevent_cache = true;
        self
    }

    pub fn at_front(mut self) -> Self {
        self.at_front = true;
        self
    }
}

/// All mutable scheduler state, touched only under one lock from the
/// admission, tick, and completion paths.
struct PoolState<G: LoaderGateway> {
    registry: ClassRegistry,
    queues: ClassQueues<G::Item>,
    tracker: ActiveTracker<G::Item>,
    awake: bool,
}

/// A dispatch selected by one tick, launched after the state lock drops.
struct Launch {
    item_id: String,
    options: LoadOptions,
}

/// Prioritized, concurrency-bounded scheduler for asynchronous fetches.
///
/// One instance owns its registry, queues, and counters; construct one per
/// session rather than sharing a hidden process-wide singleton. Spawn the
/// pump with [`spawn_pump`] to start dispatching.
pub struct RequestPool<G: LoaderGateway> {
    gateway: Arc<G>,
    state: Arc<Mutex<PoolState<G>>>,
    notify: Arc<Notify>,
    config: PoolConfig,
}

impl<G: LoaderGateway> RequestPool<G> {
    pub fn new(gateway: Arc<G>, config: PoolConfig) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(PoolState {
                registry: ClassRegistry::new(),
                queues: ClassQueues::new(),
                tracker: ActiveTracker::new(),
                awake: false,
            })),
            notify: Arc::new(Notify::new()),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Register (or replace) a demand class.
    pub async fn register_class(&self, class: DemandClass) {
        let mut state = self.state.lock().await;
        state.queues.ensure(&class.name);
        state.registry.register(class);
    }

    /// Register the standard interaction/thumbnail/prefetch/auto-prefetch
    /// classes with caps derived from the configured global ceiling.
    pub async fn register_standard_classes(&self) {
        for class in super::registry::standard_classes(self.config.ceiling.clone()) {
            self.register_class(class).await;
        }
    }

    /// Admit a fetch request.
    ///
    /// The request short-circuits if the gateway already resolved the item,
    /// coalesces into an existing in-flight load, or joins its class queue
    /// and wakes the pump. An empty item id is tolerated as a no-op; an
    /// unregistered class fails fast.
    pub async fn enqueue(&self, request: FetchRequest) -> Result<Admission<G::Item>, PoolError> {
        let mut state = self.state.lock().await;
        let admission = self.admit(&mut state, request)?;
        let wake = matches!(admission, Admission::Queued(_));
        if wake {
            state.awake = true;
        }
        drop(state);
        if wake {
            self.notify.notify_one();
        }
        Ok(admission)
    }

    /// Admit a batch of items ahead of everything already queued in the
    /// class, preserving the previously queued work behind them.
    pub async fn enqueue_prior(
        &self,
        class: &str,
        item_ids: Vec<String>,
        prevent_cache: bool,
    ) -> Result<Vec<Admission<G::Item>>, PoolError> {
        let mut state = self.state.lock().await;
        if !state.registry.contains(class) {
            return Err(PoolError::UnknownClass(class.to_string()));
        }

        let saved = state.queues.drain(class);
        let mut admissions = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let request = FetchRequest {
                item_id,
                class: class.to_string(),
                prevent_cache,
                at_front: false,
            };
            admissions.push(self.admit(&mut state, request)?);
        }
        state.queues.extend_back(class, saved);

        let wake = state.queues.depth(class) > 0;
        if wake {
            state.awake = true;
        }
        drop(state);
        if wake {
            self.notify.notify_one();
        }
        Ok(admissions)
    }

    /// Drop every not-yet-dispatched descriptor for a class. Their callers
    /// are never notified; already-dispatched work is unaffected.
    pub async fn clear_queue(&self, class: &str) -> Result<usize, PoolError> {
        let mut state = self.state.lock().await;
        if !state.registry.contains(class) {
            return Err(PoolError::UnknownClass(class.to_string()));
        }
        let dropped = state.queues.clear(class);
        tracing::debug!(class, dropped, "cleared pending queue");
        Ok(dropped)
    }

    /// Idempotent nudge: resume processing if the pump is asleep.
    pub fn pump(&self) {
        self.notify.notify_one();
    }

    pub async fn is_in_flight(&self, item_id: &str) -> bool {
        self.state.lock().await.tracker.is_in_flight(item_id)
    }

    pub async fn is_awake(&self) -> bool {
        self.state.lock().await.awake
    }

    pub async fn queue_depth(&self, class: &str) -> Result<usize, PoolError> {
        let state = self.state.lock().await;
        if !state.registry.contains(class) {
            return Err(PoolError::UnknownClass(class.to_string()));
        }
        Ok(state.queues.depth(class))
    }

    pub async fn total_in_flight(&self) -> usize {
        self.state.lock().await.tracker.total_in_flight()
    }

    /// Admission path shared by `enqueue` and `enqueue_prior`. Runs under
    /// the state lock; never dispatches.
    fn admit(
        &self,
        state: &mut PoolState<G>,
        request: FetchRequest,
    ) -> Result<Admission<G::Item>, PoolError> {
        if request.item_id.is_empty() {
            return Ok(Admission::Ignored);
        }
        if !state.registry.contains(&request.class) {
            return Err(PoolError::UnknownClass(request.class));
        }

        // Bounded retry: while budget remains, evict a stale cached failure
        // so the next dispatch re-fetches instead of replaying it. Once the
        // budget is exhausted the cached failure is surfaced as-is.
        if self.config.max_retries > 0
            && state.tracker.attempts(&request.item_id) < self.config.max_retries
        {
            if let Some(Err(_)) = self.gateway.lookup(&request.item_id) {
                self.gateway.evict_failed(&request.item_id);
                let attempts = state.tracker.record_attempt(&request.item_id);
                tracing::debug!(
                    item_id = %request.item_id,
                    attempts,
                    max_retries = self.config.max_retries,
                    "evicted failed entry for retry"
                );
            }
        }

        // Already resolved: complete without entering a queue or consuming
        // a concurrency slot. The caller observes it at its own await point.
        if let Some(result) = self.gateway.lookup(&request.item_id) {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let _ = tx.send(result);
            return Ok(Admission::Completed(rx));
        }

        // Already in flight (any class): attach as an additional listener.
        let (tx, rx) = tokio::sync::oneshot::channel();
        match state.tracker.attach_waiter(&request.item_id, tx) {
            Ok(()) => {
                telemetry::record_coalesced(&request.class);
                tracing::debug!(item_id = %request.item_id, "coalesced into in-flight load");
                Ok(Admission::Coalesced(rx))
            }
            Err(tx) => {
                let descriptor = RequestDescriptor {
                    item_id: request.item_id,
                    class: request.class.clone(),
                    prevent_cache: request.prevent_cache,
                    response_tx: tx,
                };
                state.queues.push(&request.class, descriptor, request.at_front);
                Ok(Admission::Queued(rx))
            }
        }
    }

    /// One scheduling pass: fill available global capacity in strict
    /// priority order, rescanning from the top class after every dispatch.
    async fn tick(&self) {
        let mut launches: Vec<Launch> = Vec::new();
        let mut short_circuits = Vec::new();
        {
            let mut state = self.state.lock().await;
            let ceiling = self.config.ceiling.resolve();
            let mut available = ceiling.saturating_sub(state.tracker.total_in_flight());

            while available > 0 {
                let Some(descriptor) = next_eligible(&mut state) else {
                    break;
                };

                // Re-check at dispatch time: a duplicate that was queued
                // before its twin was dispatched coalesces here instead of
                // issuing a second load.
                if let Some(result) = self.gateway.lookup(&descriptor.item_id) {
                    short_circuits.push((descriptor.response_tx, result));
                    continue;
                }
                if state.tracker.is_in_flight(&descriptor.item_id) {
                    telemetry::record_coalesced(&descriptor.class);
                    let _ = state
                        .tracker
                        .attach_waiter(&descriptor.item_id, descriptor.response_tx);
                    continue;
                }

                let hint = state
                    .registry
                    .get(&descriptor.class)
                    .map_or(0, |c| c.load_hint);
                tracing::debug!(
                    item_id = %descriptor.item_id,
                    class = %descriptor.class,
                    hint,
                    "dispatching load"
                );
                telemetry::record_dispatch(&descriptor.class);
                let options = LoadOptions {
                    priority_hint: hint,
                    class: descriptor.class.clone(),
                    prevent_cache: descriptor.prevent_cache,
                };
                state
                    .tracker
                    .begin(&descriptor.item_id, &descriptor.class, descriptor.response_tx);
                available -= 1;
                launches.push(Launch { item_id: descriptor.item_id, options });
            }

            for class in state.registry.classes_by_priority() {
                telemetry::record_queue_depth(&class.name, state.queues.depth(&class.name));
            }
            // Asleep once every queue drains; a class blocked at its cap
            // keeps the pump awake so freed capacity resumes dispatching.
            state.awake = state.queues.total_depth() > 0;
        }

        for (tx, result) in short_circuits {
            let _ = tx.send(result);
        }
        for launch in launches {
            self.spawn_load(launch);
        }
    }

    /// Run one load to completion on its own task, then fan the result out
    /// to every attached waiter and re-arm the pump regardless of outcome.
    fn spawn_load(&self, launch: Launch) {
        let gateway = Arc::clone(&self.gateway);
        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);
        tokio::spawn(async move {
            let class = launch.options.class.clone();
            let started = Instant::now();
            let result = gateway.load(&launch.item_id, launch.options).await;
            telemetry::record_load_completed(&class, started.elapsed(), result.is_err());
            if let Err(error) = &result {
                tracing::warn!(item_id = %launch.item_id, %error, "load failed");
            }

            let entry = {
                let mut state = state.lock().await;
                if result.is_ok() {
                    state.tracker.clear_attempts(&launch.item_id);
                }
                state.tracker.complete(&launch.item_id)
            };
            if let Some(entry) = entry {
                for tx in entry.waiters {
                    let _ = tx.send(result.clone());
                }
            }
            notify.notify_one();
        });
    }
}

/// Pop the next dispatchable descriptor: the first class, in priority
/// order, with queued work and headroom under its resolved cap.
fn next_eligible<G: LoaderGateway>(
    state: &mut PoolState<G>,
) -> Option<RequestDescriptor<G::Item>> {
    let PoolState { registry, queues, tracker, .. } = state;
    let class = registry.classes_by_priority().find(|class| {
        queues.depth(&class.name) > 0
            && tracker.in_flight_count(&class.name) < class.policy.resolve()
    })?;
    let name = class.name.clone();
    queues.pop_front(&name)
}

/// Spawn the pump loop. Returns a handle for shutdown.
///
/// The pump sleeps until an enqueue or completion wakes it, debounces a
/// burst of wakes into one pass via the configured grab delay, then ticks.
pub fn spawn_pump<G: LoaderGateway>(
    pool: Arc<RequestPool<G>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("pump: shutdown signal received");
                    break;
                }
                () = pool.notify.notified() => {}
            }
            tokio::time::sleep(pool.config.grab_delay).await;
            pool.tick().await;
        }
    })
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
