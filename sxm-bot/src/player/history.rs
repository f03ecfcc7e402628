//! Bounded recent/upcoming history
//!
//! Fixed-capacity ring buffers; inserting into a full buffer overwrites the
//! oldest entry. Entries are plain media references, not native resources.

use std::collections::VecDeque;

/// Fixed-capacity ring buffer
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert newest-first; a full buffer drops its back (oldest) entry
    pub fn push_front(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_back();
        }
        self.items.push_front(item);
    }

    /// Insert in arrival order; a full buffer drops its front (oldest) entry
    pub fn push_back(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Remove the front entry if it matches
    pub fn pop_front_if(&mut self, matches: impl FnOnce(&T) -> bool) -> Option<T> {
        if self.items.front().map(matches).unwrap_or(false) {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// Remove the back entry if it matches
    pub fn pop_back_if(&mut self, matches: impl FnOnce(&T) -> bool) -> Option<T> {
        if self.items.back().map(matches).unwrap_or(false) {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Front-to-back copy of the contents
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
