//! External contract of the loader/caching service.
//!
//! The pool never performs I/O, decoding, or storage; it only sequences
//! calls into this gateway and observes their completion.

use async_trait::async_trait;

use super::descriptor::FetchResult;

/// Options passed through with each dispatched load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Loader-internal priority hint derived from the demand class. This
    /// is distinct from the class's scheduling priority: the two orderings
    /// may differ (prefetch queues above idle work but is hinted below
    /// interactive fetches).
    pub priority_hint: i32,
    /// Name of the demand class that dispatched the load.
    pub class: String,
    /// Bypass the gateway's cache for this load.
    pub prevent_cache: bool,
}

/// Asynchronous loader and cache the pool dispatches into.
///
/// In-flight coalescing lives in the pool's tracker; `lookup` only
/// reports entries the gateway has already resolved (successfully or
/// not).
#[async_trait]
pub trait LoaderGateway: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    /// Existing resolved cache entry for the item, if any.
    fn lookup(&self, item_id: &str) -> Option<FetchResult<Self::Item>>;

    /// Fetch the item. Completes exactly once with success or failure.
    async fn load(&self, item_id: &str, options: LoadOptions) -> FetchResult<Self::Item>;

    /// Clear a failed cache entry so a future load re-attempts instead of
    /// replaying the cached failure.
    fn evict_failed(&self, item_id: &str);
}
