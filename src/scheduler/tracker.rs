//! In-flight request tracking, duplicate coalescing, and retry state.

use std::collections::HashMap;

use super::descriptor::ResponseTx;

/// One outstanding load and every caller awaiting it.
pub struct ActiveEntry<T> {
    pub class: String,
    /// All attached callers. The refcount for an item is the number of
    /// waiters; it reaches zero exactly when completion fans the result
    /// out to all of them.
    pub waiters: Vec<ResponseTx<T>>,
}

impl<T> std::fmt::Debug for ActiveEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveEntry")
            .field("class", &self.class)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

/// Tracks which items are in flight, how many loads each class has
/// outstanding, and how many retry attempts each item has consumed.
///
/// Mutated only during dispatch and completion, always under the pool's
/// state lock; queue membership and in-flight tracking are mutually
/// exclusive per descriptor.
#[derive(Debug, Default)]
pub struct ActiveTracker<T> {
    active: HashMap<String, ActiveEntry<T>>,
    in_flight: HashMap<String, usize>,
    retries: HashMap<String, u32>,
}

impl<T> ActiveTracker<T> {
    pub fn new() -> Self {
        Self {
            active: HashMap::new(),
            in_flight: HashMap::new(),
            retries: HashMap::new(),
        }
    }

    pub fn is_in_flight(&self, item_id: &str) -> bool {
        self.active.contains_key(item_id)
    }

    /// Record a dispatched load with its first waiter.
    pub fn begin(&mut self, item_id: &str, class: &str, waiter: ResponseTx<T>) {
        self.active.insert(
            item_id.to_string(),
            ActiveEntry { class: class.to_string(), waiters: vec![waiter] },
        );
        *self.in_flight.entry(class.to_string()).or_insert(0) += 1;
    }

    /// Attach an additional caller to an outstanding load. Returns the
    /// waiter back if the item is not in flight.
    pub fn attach_waiter(
        &mut self,
        item_id: &str,
        waiter: ResponseTx<T>,
    ) -> Result<(), ResponseTx<T>> {
        match self.active.get_mut(item_id) {
            Some(entry) => {
                entry.waiters.push(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Remove a completed load, returning its class and waiters for
    /// notification. Decrements the class in-flight count.
    pub fn complete(&mut self, item_id: &str) -> Option<ActiveEntry<T>> {
        let entry = self.active.remove(item_id)?;
        if let Some(count) = self.in_flight.get_mut(&entry.class) {
            *count = count.saturating_sub(1);
        }
        Some(entry)
    }

    pub fn in_flight_count(&self, class: &str) -> usize {
        self.in_flight.get(class).copied().unwrap_or(0)
    }

    /// Distinct items currently in flight across all classes.
    pub fn total_in_flight(&self) -> usize {
        self.active.len()
    }

    /// Retry attempts consumed so far for an item. Monotonic for the
    /// tracker's lifetime unless explicitly cleared.
    pub fn attempts(&self, item_id: &str) -> u32 {
        self.retries.get(item_id).copied().unwrap_or(0)
    }

    pub fn record_attempt(&mut self, item_id: &str) -> u32 {
        let attempts = self.retries.entry(item_id.to_string()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    pub fn clear_attempts(&mut self, item_id: &str) {
        self.retries.remove(item_id);
    }
}
