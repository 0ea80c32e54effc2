//! Per-class pending request queues.

use std::collections::{HashMap, VecDeque};

use super::descriptor::RequestDescriptor;

/// One FIFO queue of pending descriptors per demand class.
///
/// Front insertion supports priority re-admission of previously dequeued
/// work (prior-request batches land ahead of everything already queued).
#[derive(Debug, Default)]
pub struct ClassQueues<T> {
    queues: HashMap<String, VecDeque<RequestDescriptor<T>>>,
}

impl<T> ClassQueues<T> {
    pub fn new() -> Self {
        Self { queues: HashMap::new() }
    }

    /// Create an empty queue for a class if none exists. Re-registration
    /// keeps any descriptors already pending for the name.
    pub fn ensure(&mut self, class: &str) {
        self.queues.entry(class.to_string()).or_default();
    }

    pub fn push(&mut self, class: &str, descriptor: RequestDescriptor<T>, at_front: bool) {
        let queue = self.queues.entry(class.to_string()).or_default();
        if at_front {
            queue.push_front(descriptor);
        } else {
            queue.push_back(descriptor);
        }
    }

    pub fn pop_front(&mut self, class: &str) -> Option<RequestDescriptor<T>> {
        self.queues.get_mut(class)?.pop_front()
    }

    /// Discard all pending descriptors for a class without notifying their
    /// callers. Returns the number dropped.
    pub fn clear(&mut self, class: &str) -> usize {
        match self.queues.get_mut(class) {
            Some(queue) => {
                let dropped = queue.len();
                queue.clear();
                dropped
            }
            None => 0,
        }
    }

    /// Take the entire pending queue for a class, leaving it empty.
    pub fn drain(&mut self, class: &str) -> VecDeque<RequestDescriptor<T>> {
        self.queues
            .get_mut(class)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Append previously drained descriptors behind the current contents.
    pub fn extend_back(&mut self, class: &str, descriptors: VecDeque<RequestDescriptor<T>>) {
        self.queues
            .entry(class.to_string())
            .or_default()
            .extend(descriptors);
    }

    pub fn depth(&self, class: &str) -> usize {
        self.queues.get(class).map_or(0, VecDeque::len)
    }

    pub fn total_depth(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}
