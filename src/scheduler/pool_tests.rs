//! Tests for pool admission and the pump dispatch loop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::scheduler::{
    Admission, ConcurrencyPolicy, DemandClass, FetchError, FetchResult, LoadOptions,
    LoaderGateway,
};
use crate::PoolConfig;

/// Loader double: records calls, serves a cache, optionally holds loads
/// in flight until released.
struct MockGateway {
    cache: StdMutex<HashMap<String, FetchResult<String>>>,
    calls: StdMutex<Vec<(String, LoadOptions)>>,
    failing: StdMutex<HashSet<String>>,
    release: watch::Sender<bool>,
}

impl MockGateway {
    fn new() -> Arc<Self> {
        Self::with_hold(false)
    }

    /// Loads block until `release_all` when `hold` is set.
    fn held() -> Arc<Self> {
        Self::with_hold(true)
    }

    fn with_hold(hold: bool) -> Arc<Self> {
        let (release, _) = watch::channel(!hold);
        Arc::new(Self {
            cache: StdMutex::new(HashMap::new()),
            calls: StdMutex::new(Vec::new()),
            failing: StdMutex::new(HashSet::new()),
            release,
        })
    }

    fn release_all(&self) {
        let _ = self.release.send(true);
    }

    fn fail_item(&self, item_id: &str) {
        self.failing.lock().unwrap().insert(item_id.to_string());
    }

    fn prime(&self, item_id: &str, result: FetchResult<String>) {
        self.cache.lock().unwrap().insert(item_id.to_string(), result);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn called_items(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait::async_trait]
impl LoaderGateway for MockGateway {
    type Item = String;

    fn lookup(&self, item_id: &str) -> Option<FetchResult<String>> {
        self.cache.lock().unwrap().get(item_id).cloned()
    }

    async fn load(&self, item_id: &str, options: LoadOptions) -> FetchResult<String> {
        self.calls.lock().unwrap().push((item_id.to_string(), options.clone()));
        let mut release = self.release.subscribe();
        let _ = release.wait_for(|released| *released).await;

        let result = if self.failing.lock().unwrap().contains(item_id) {
            Err(FetchError::new(format!("cannot load {item_id}")))
        } else {
            Ok(format!("payload:{item_id}"))
        };
        if !options.prevent_cache {
            self.cache.lock().unwrap().insert(item_id.to_string(), result.clone());
        }
        result
    }

    fn evict_failed(&self, item_id: &str) {
        let mut cache = self.cache.lock().unwrap();
        if matches!(cache.get(item_id), Some(Err(_))) {
            cache.remove(item_id);
        }
    }
}

fn test_config(ceiling: usize) -> PoolConfig {
    PoolConfig {
        ceiling: ConcurrencyPolicy::Fixed(ceiling),
        grab_delay: Duration::from_millis(5),
        max_retries: 0,
    }
}

async fn setup(
    gateway: Arc<MockGateway>,
    ceiling: usize,
) -> (Arc<RequestPool<MockGateway>>, CancellationToken) {
    setup_with(gateway, test_config(ceiling)).await
}

async fn setup_with(
    gateway: Arc<MockGateway>,
    config: PoolConfig,
) -> (Arc<RequestPool<MockGateway>>, CancellationToken) {
    let pool = Arc::new(RequestPool::new(gateway, config));
    let shutdown = CancellationToken::new();
    spawn_pump(pool.clone(), shutdown.clone());
    (pool, shutdown)
}

/// Wait until the gateway has seen `expected` calls, or fail after 2s.
async fn wait_for_calls(gateway: &MockGateway, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while gateway.call_count() < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} gateway calls, saw {}",
            gateway.call_count()
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

async fn recv(
    rx: crate::scheduler::ResponseRx<String>,
) -> Result<FetchResult<String>, tokio::sync::oneshot::error::RecvError> {
    tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap()
}

#[tokio::test]
async fn unknown_class_fails_fast() {
    let (pool, shutdown) = setup(MockGateway::new(), 4).await;

    let err = pool.enqueue(FetchRequest::new("item-1", "nope")).await;
    assert!(matches!(err, Err(PoolError::UnknownClass(name)) if name == "nope"));

    let err = pool.clear_queue("nope").await;
    assert!(err.is_err());

    shutdown.cancel();
}

#[tokio::test]
async fn empty_item_id_is_a_noop() {
    let (pool, shutdown) = setup(MockGateway::new(), 4).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    let admission = pool.enqueue(FetchRequest::new("", "batch")).await.unwrap();
    assert!(admission.is_ignored());
    assert_eq!(pool.queue_depth("batch").await.unwrap(), 0);

    shutdown.cancel();
}

#[tokio::test]
async fn cached_item_completes_without_queueing() {
    let gateway = MockGateway::new();
    gateway.prime("item-1", Ok("cached".to_string()));
    let (pool, shutdown) = setup(gateway.clone(), 4).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    let admission = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    assert!(matches!(admission, Admission::Completed(_)));
    assert!(!admission.is_pending());

    let result = recv(admission.into_receiver().unwrap()).await.unwrap();
    assert_eq!(result.unwrap(), "cached");
    assert_eq!(gateway.call_count(), 0, "no load for a resolved item");
    assert_eq!(pool.queue_depth("batch").await.unwrap(), 0);

    shutdown.cancel();
}

#[tokio::test]
async fn enqueued_request_is_dispatched_and_delivered() {
    let gateway = MockGateway::new();
    let (pool, shutdown) = setup(gateway.clone(), 4).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    let admission = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    assert!(admission.is_pending());

    let result = recv(admission.into_receiver().unwrap()).await.unwrap();
    assert_eq!(result.unwrap(), "payload:item-1");
    assert_eq!(gateway.call_count(), 1);
    assert!(!pool.is_in_flight("item-1").await);

    shutdown.cancel();
}

#[tokio::test]
async fn in_flight_duplicate_coalesces() {
    let gateway = MockGateway::held();
    let (pool, shutdown) = setup(gateway.clone(), 4).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    let first = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    wait_for_calls(&gateway, 1).await;
    assert!(pool.is_in_flight("item-1").await);

    let second = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    assert!(matches!(second, Admission::Coalesced(_)));

    gateway.release_all();
    let r1 = recv(first.into_receiver().unwrap()).await.unwrap();
    let r2 = recv(second.into_receiver().unwrap()).await.unwrap();
    assert_eq!(r1.unwrap(), "payload:item-1");
    assert_eq!(r2.unwrap(), "payload:item-1");
    assert_eq!(gateway.call_count(), 1, "one load serves both callers");

    shutdown.cancel();
}

#[tokio::test]
async fn queued_duplicates_coalesce_at_dispatch() {
    let gateway = MockGateway::held();
    // A wide debounce window keeps both enqueues in the same tick.
    let config = PoolConfig {
        grab_delay: Duration::from_millis(40),
        ..test_config(4)
    };
    let (pool, shutdown) = setup_with(gateway.clone(), config).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    // Both admitted before the first tick: neither is in flight yet, so
    // both join the queue; the second must coalesce when popped.
    let first = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    let second = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    assert!(matches!(second, Admission::Queued(_)));

    wait_for_calls(&gateway, 1).await;
    gateway.release_all();

    let r1 = recv(first.into_receiver().unwrap()).await.unwrap();
    let r2 = recv(second.into_receiver().unwrap()).await.unwrap();
    assert!(r1.is_ok());
    assert!(r2.is_ok());
    assert_eq!(gateway.call_count(), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn front_insertion_dispatches_first() {
    let gateway = MockGateway::held();
    let config = PoolConfig {
        grab_delay: Duration::from_millis(40),
        ..test_config(1)
    };
    let (pool, shutdown) = setup_with(gateway.clone(), config).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(1)))
        .await;

    pool.enqueue(FetchRequest::new("a", "batch")).await.unwrap();
    pool.enqueue(FetchRequest::new("b", "batch")).await.unwrap();
    pool.enqueue(FetchRequest::new("urgent", "batch").at_front())
        .await
        .unwrap();

    wait_for_calls(&gateway, 1).await;
    assert_eq!(gateway.called_items(), vec!["urgent".to_string()]);

    gateway.release_all();
    wait_for_calls(&gateway, 3).await;
    assert_eq!(
        gateway.called_items(),
        vec!["urgent".to_string(), "a".to_string(), "b".to_string()]
    );

    shutdown.cancel();
}

#[tokio::test]
async fn class_cap_limits_dispatch() {
    let gateway = MockGateway::held();
    let (pool, shutdown) = setup(gateway.clone(), 8).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    for i in 0..5 {
        pool.enqueue(FetchRequest::new(format!("item-{i}"), "batch"))
            .await
            .unwrap();
    }

    wait_for_calls(&gateway, 2).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(gateway.call_count(), 2, "class cap holds despite global headroom");
    assert_eq!(pool.queue_depth("batch").await.unwrap(), 3);
    assert!(pool.is_awake().await, "blocked at cap stays awake");

    gateway.release_all();
    wait_for_calls(&gateway, 5).await;

    shutdown.cancel();
}

#[tokio::test]
async fn completion_rearms_pump_for_remaining_work() {
    let gateway = MockGateway::held();
    let (pool, shutdown) = setup(gateway.clone(), 1).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(4)))
        .await;

    let a = pool.enqueue(FetchRequest::new("a", "batch")).await.unwrap();
    let b = pool.enqueue(FetchRequest::new("b", "batch")).await.unwrap();

    wait_for_calls(&gateway, 1).await;
    assert_eq!(gateway.call_count(), 1, "global ceiling of one");

    gateway.release_all();
    let ra = recv(a.into_receiver().unwrap()).await.unwrap();
    let rb = recv(b.into_receiver().unwrap()).await.unwrap();
    assert!(ra.is_ok());
    assert!(rb.is_ok());
    assert_eq!(gateway.call_count(), 2);

    shutdown.cancel();
}

#[tokio::test]
async fn clear_queue_drops_pending_without_notification() {
    let gateway = MockGateway::held();
    let (pool, shutdown) = setup(gateway.clone(), 1).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(4)))
        .await;

    let dispatched = pool.enqueue(FetchRequest::new("a", "batch")).await.unwrap();
    wait_for_calls(&gateway, 1).await;
    let pending = pool.enqueue(FetchRequest::new("b", "batch")).await.unwrap();

    let dropped = pool.clear_queue("batch").await.unwrap();
    assert_eq!(dropped, 1);

    // The cleared caller sees a closed channel, never a result.
    let outcome = recv(pending.into_receiver().unwrap()).await;
    assert!(outcome.is_err(), "no callback for a cleared descriptor");

    // Already-dispatched work is unaffected.
    gateway.release_all();
    let result = recv(dispatched.into_receiver().unwrap()).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(gateway.call_count(), 1, "cleared descriptor never loaded");

    shutdown.cancel();
}

#[tokio::test]
async fn enqueue_prior_lands_ahead_of_queued_work() {
    let gateway = MockGateway::held();
    let (pool, shutdown) = setup(gateway.clone(), 1).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(1)))
        .await;

    pool.enqueue(FetchRequest::new("old-1", "batch")).await.unwrap();
    pool.enqueue(FetchRequest::new("old-2", "batch")).await.unwrap();
    wait_for_calls(&gateway, 1).await;

    let admissions = pool
        .enqueue_prior("batch", vec!["prior-1".to_string(), "prior-2".to_string()], false)
        .await
        .unwrap();
    assert_eq!(admissions.len(), 2);

    gateway.release_all();
    wait_for_calls(&gateway, 4).await;
    assert_eq!(
        gateway.called_items(),
        vec![
            "old-1".to_string(),
            "prior-1".to_string(),
            "prior-2".to_string(),
            "old-2".to_string(),
        ]
    );

    shutdown.cancel();
}

#[tokio::test]
async fn pump_sleeps_after_queues_drain() {
    let gateway = MockGateway::new();
    let (pool, shutdown) = setup(gateway.clone(), 4).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    let admission = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    assert!(pool.is_awake().await);

    let result = recv(admission.into_receiver().unwrap()).await.unwrap();
    assert!(result.is_ok());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!pool.is_awake().await, "drained pool goes back to sleep");

    // An idempotent nudge on a sleeping pump stays quiet.
    pool.pump();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(gateway.call_count(), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn prevent_cache_load_bypasses_cache() {
    let gateway = MockGateway::new();
    let (pool, shutdown) = setup(gateway.clone(), 4).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    let first = pool
        .enqueue(FetchRequest::new("item-1", "batch").prevent_cache())
        .await
        .unwrap();
    let result = recv(first.into_receiver().unwrap()).await.unwrap();
    assert!(result.is_ok());

    // Nothing was cached, so a second enqueue loads again.
    let second = pool
        .enqueue(FetchRequest::new("item-1", "batch").prevent_cache())
        .await
        .unwrap();
    assert!(matches!(second, Admission::Queued(_)));
    let result = recv(second.into_receiver().unwrap()).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(gateway.call_count(), 2);

    shutdown.cancel();
}

#[tokio::test]
async fn load_hint_and_class_reach_the_gateway() {
    let gateway = MockGateway::new();
    let (pool, shutdown) = setup(gateway.clone(), 4).await;
    pool.register_class(
        DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)).with_load_hint(-5),
    )
    .await;

    let admission = pool
        .enqueue(FetchRequest::new("item-1", "batch"))
        .await
        .unwrap();
    let _ = recv(admission.into_receiver().unwrap()).await;

    let calls = gateway.calls.lock().unwrap();
    let (_, options) = &calls[0];
    assert_eq!(options.priority_hint, -5);
    assert_eq!(options.class, "batch");
    assert!(!options.prevent_cache);

    shutdown.cancel();
}

#[tokio::test]
async fn load_failure_is_reported_once_and_pump_survives() {
    let gateway = MockGateway::new();
    gateway.fail_item("bad");
    let (pool, shutdown) = setup(gateway.clone(), 4).await;
    pool.register_class(DemandClass::new("batch", 10, ConcurrencyPolicy::Fixed(2)))
        .await;

    let bad = pool.enqueue(FetchRequest::new("bad", "batch")).await.unwrap();
    let result = recv(bad.into_receiver().unwrap()).await.unwrap();
    assert!(result.is_err());

    // The pump keeps dispatching after a failure.
    let good = pool.enqueue(FetchRequest::new("good", "batch")).await.unwrap();
    let result = recv(good.into_receiver().unwrap()).await.unwrap();
    assert_eq!(result.unwrap(), "payload:good");

    shutdown.cancel();
}

#[tokio::test]
async fn dynamic_class_limit_is_resolved_each_tick() {
    let gateway = MockGateway::held();
    let (pool, shutdown) = setup(gateway.clone(), 8).await;

    let limit = Arc::new(StdMutex::new(1usize));
    let supplier_limit = Arc::clone(&limit);
    pool.register_class(DemandClass::new(
        "batch",
        10,
        ConcurrencyPolicy::dynamic(move || *supplier_limit.lock().unwrap()),
    ))
    .await;

    for i in 0..4 {
        pool.enqueue(FetchRequest::new(format!("item-{i}"), "batch"))
            .await
            .unwrap();
    }
    wait_for_calls(&gateway, 1).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(gateway.call_count(), 1);

    // Raising the limit takes effect on the next pass without re-registration.
    *limit.lock().unwrap() = 3;
    pool.pump();
    wait_for_calls(&gateway, 3).await;

    gateway.release_all();
    shutdown.cancel();
}
