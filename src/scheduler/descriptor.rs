//! Request descriptors and completion channel types.

use thiserror::Error;

/// Failure reported by the loader gateway for a single item.
///
/// Cloneable so one failed load can be fanned out to every coalesced
/// waiter and replayed from the gateway cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of a single fetch.
pub type FetchResult<T> = Result<T, FetchError>;

/// Sender half for delivering a fetch result back to one caller.
pub type ResponseTx<T> = tokio::sync::oneshot::Sender<FetchResult<T>>;
/// Receiver half a caller awaits for its fetch result.
pub type ResponseRx<T> = tokio::sync::oneshot::Receiver<FetchResult<T>>;

/// A pending fetch request. Lives in exactly one class queue until it is
/// dispatched, at which point ownership moves to the in-flight tracker.
pub struct RequestDescriptor<T> {
    pub item_id: String,
    pub class: String,
    pub prevent_cache: bool,
    /// Channel for delivering the result to the caller. Consumed exactly
    /// once on completion; dropped silently if the queue is cleared first.
    pub response_tx: ResponseTx<T>,
}

impl<T> std::fmt::Debug for RequestDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("item_id", &self.item_id)
            .field("class", &self.class)
            .field("prevent_cache", &self.prevent_cache)
            .finish()
    }
}

/// How an enqueue was admitted.
///
/// `Completed` and `Coalesced` replace the original pending-callback
/// protocol: the variant tells the caller whether its item was already
/// resolved, merged into an outstanding load, or newly queued.
pub enum Admission<T> {
    /// Joined its class queue; the pump will dispatch it.
    Queued(ResponseRx<T>),
    /// Attached to an already in-flight load for the same item.
    Coalesced(ResponseRx<T>),
    /// Already resolved by the gateway; the receiver completes without the
    /// item ever entering a queue or consuming a concurrency slot.
    Completed(ResponseRx<T>),
    /// Missing item identity; tolerated as a no-op.
    Ignored,
}

impl<T> Admission<T> {
    /// The completion receiver, unless the request was ignored.
    pub fn into_receiver(self) -> Option<ResponseRx<T>> {
        match self {
            Self::Queued(rx) | Self::Coalesced(rx) | Self::Completed(rx) => Some(rx),
            Self::Ignored => None,
        }
    }

    /// True when the result is not yet available (queued or coalesced).
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued(_) | Self::Coalesced(_))
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

impl<T> std::fmt::Debug for Admission<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Self::Queued(_) => "Queued",
            Self::Coalesced(_) => "Coalesced",
            Self::Completed(_) => "Completed",
            Self::Ignored => "Ignored",
        };
        f.write_str(variant)
    }
}
