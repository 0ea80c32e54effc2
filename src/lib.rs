//! Prioritized, concurrency-bounded request pool.
//!
//! Arbitrates asynchronous fetch requests for discrete content items
//! (images, tiles, frames) across competing demand classes (interactive
//! navigation, thumbnailing, prefetch) that share one external loader
//! with a single global concurrency budget.
//!
//! The pool enforces per-class admission limits, preserves strict
//! priority ordering across classes and FIFO ordering within them,
//! coalesces duplicate in-flight requests into a single load, supports a
//! bounded retry budget, and runs on a cooperative pump loop that never
//! recurses into dispatch from a completion.
//!
//! # Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use request_pool::{spawn_pump, FetchRequest, PoolConfig, RequestPool};
//! # use request_pool::scheduler::{FetchResult, LoadOptions, LoaderGateway};
//! # #[derive(Clone)] struct Image;
//! # struct MyLoader;
//! # #[async_trait::async_trait]
//! # impl LoaderGateway for MyLoader {
//! #     type Item = Image;
//! #     fn lookup(&self, _: &str) -> Option<FetchResult<Image>> { None }
//! #     async fn load(&self, _: &str, _: LoadOptions) -> FetchResult<Image> { Ok(Image) }
//! #     fn evict_failed(&self, _: &str) {}
//! # }
//! # async fn demo() {
//! let pool = Arc::new(RequestPool::new(Arc::new(MyLoader), PoolConfig::default()));
//! pool.register_standard_classes().await;
//! let pump = spawn_pump(pool.clone(), tokio_util::sync::CancellationToken::new());
//!
//! let admission = pool
//!     .enqueue(FetchRequest::new("series/1/image/42", "interaction"))
//!     .await
//!     .unwrap();
//! if let Some(rx) = admission.into_receiver() {
//!     let _image = rx.await;
//! }
//! # let _ = pump;
//! # }
//! ```

pub mod config;
pub mod scheduler;
pub mod telemetry;

pub use config::PoolConfig;
pub use scheduler::{
    spawn_pump, Admission, ConcurrencyPolicy, DemandClass, FetchError, FetchRequest,
    LoaderGateway, PoolError, RequestPool,
};
