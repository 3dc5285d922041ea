//! Bounded async FIFO used by the admission pipeline.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },
}

/// FIFO with a hard capacity: pushes never block (they fail fast when full),
/// pops wait for an item. Mutex-plus-Notify rather than a channel so the
/// pipeline can inspect occupancy and remove entries for bookkeeping.
pub struct AdmissionQueue<T> {
    items: parking_lot::Mutex<VecDeque<T>>,
    capacity: usize,
    available: Notify,
}

impl<T> AdmissionQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: parking_lot::Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Append, failing fast when the queue is at capacity.
    pub fn try_push(&self, item: T) -> Result<(), QueueError> {
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(QueueError::Full { capacity: self.capacity });
            }
            items.push_back(item);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the head, waiting until one exists.
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.available.notified();
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            notified.await;
        }
    }

    /// Remove the first item matching `predicate`, if any.
    pub fn remove_where<F>(&self, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut items = self.items.lock();
        let index = items.iter().position(|item| predicate(item))?;
        items.remove(index)
    }
}
