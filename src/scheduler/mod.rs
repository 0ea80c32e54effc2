//! Request scheduling for the pool.
//!
//! Manages demand-class registration, per-class queueing, duplicate
//! coalescing, retry budgeting, and the pump dispatch loop.

mod descriptor;
mod gateway;
mod pool;
mod queue;
mod registry;
mod tracker;

pub use descriptor::{
    Admission, FetchError, FetchResult, RequestDescriptor, ResponseRx, ResponseTx,
};
pub use gateway::{LoadOptions, LoaderGateway};
pub use pool::{spawn_pump, FetchRequest, PoolError, RequestPool};
pub use queue::ClassQueues;
pub use registry::{
    standard_classes, ClassRegistry, ConcurrencyPolicy, DemandClass, LimitSupplier,
    AUTO_PREFETCH, INTERACTION, PREFETCH, THUMBNAIL,
};
pub use tracker::{ActiveEntry, ActiveTracker};
