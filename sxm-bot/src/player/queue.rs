//! Bounded playback queue
//!
//! FIFO of [`QueuedItem`]s consumed by the single consumption loop. `put`
//! waits a bounded time for space and hands the item back on rejection so
//! the caller can release it; nothing is ever silently dropped.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::item::QueuedItem;

/// Why an item was not enqueued; carries the item back to the caller
#[derive(Debug)]
pub enum Rejected {
    /// Still full when the enqueue timeout elapsed
    Full(QueuedItem),

    /// The queue was closed (player shutting down)
    Closed(QueuedItem),
}

impl Rejected {
    pub fn into_item(self) -> QueuedItem {
        match self {
            Rejected::Full(item) | Rejected::Closed(item) => item,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Rejected::Full(_) => "queue full",
            Rejected::Closed(_) => "shutting down",
        }
    }
}

struct QueueInner {
    items: VecDeque<QueuedItem>,
    closed: bool,
}

/// Bounded FIFO with timeout-bounded enqueue
pub struct PlaybackQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    item_added: Notify,
    slot_freed: Notify,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity: capacity.max(1),
            item_added: Notify::new(),
            slot_freed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`, waiting up to `timeout` for a free slot
    pub async fn put(&self, item: QueuedItem, timeout: Duration) -> Result<(), Rejected> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.slot_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(Rejected::Closed(item));
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.item_added.notify_one();
                    return Ok(());
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Rejected::Full(item));
            }
        }
    }

    /// Dequeue the next item, waiting up to `poll` for one to arrive
    ///
    /// Returns None on timeout or once the queue is closed and empty.
    pub async fn get(&self, poll: Duration) -> Option<QueuedItem> {
        let deadline = Instant::now() + poll;

        loop {
            let notified = self.item_added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.slot_freed.notify_one();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Remove every queued item (caller releases them)
    pub fn drain(&self) -> Vec<QueuedItem> {
        let drained: Vec<_> = self.lock().items.drain(..).collect();
        if !drained.is_empty() {
            self.slot_freed.notify_waiters();
        }
        drained
    }

    /// Reject all further puts and wake every waiter
    pub fn close(&self) {
        self.lock().closed = true;
        self.item_added.notify_waiters();
        self.slot_freed.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
