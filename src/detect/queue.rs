//! Leaky port queue
//!
//! Fixed-capacity record of the most recent distinct destination ports a
//! single source has tried. Once full, every insertion pushes out the oldest
//! insertion (FIFO by arrival, not by timestamp).
//!
//! Backed by a ring buffer so eviction is O(1). Storage grows lazily up to
//! `capacity`, so a large configured threshold costs nothing for sources
//! that only ever touch a port or two.

use std::iter::Chain;
use std::slice::Iter;

/// Largest capacity a queue can have: one slot per TCP port.
pub const MAX_CAPACITY: usize = u16::MAX as usize;

/// A single connection attempt: when it happened and which local port it hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAttempt {
    /// Unix epoch seconds.
    pub timestamp: i64,
    /// Destination (host) port.
    pub port: u16,
}

impl ConnectionAttempt {
    pub fn new(timestamp: i64, port: u16) -> Self {
        Self { timestamp, port }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue capacity must be 1 - {MAX_CAPACITY}, got {0}")]
    InvalidCapacity(usize),
}

#[derive(Debug, Clone)]
pub struct BoundedPortQueue {
    slots: Vec<ConnectionAttempt>,
    /// Index of the oldest element. Stays 0 until the buffer first fills.
    head: usize,
    capacity: usize,
}

impl BoundedPortQueue {
    /// Create an empty queue holding at most `capacity` attempts.
    ///
    /// Fails with [`QueueError::InvalidCapacity`] for 0 or anything above
    /// [`MAX_CAPACITY`].
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        Ok(Self {
            slots: Vec::new(),
            head: 0,
            capacity,
        })
    }

    /// Append `attempt`, evicting the oldest insertion first if the queue is full.
    pub fn add(&mut self, attempt: ConnectionAttempt) -> &mut Self {
        if self.slots.len() < self.capacity {
            self.slots.push(attempt);
        } else if let Some(slot) = self.slots.get_mut(self.head) {
            *slot = attempt;
            self.head = (self.head + 1) % self.capacity;
        }
        self
    }

    /// True if any retained attempt targeted `port`.
    pub fn contains(&self, port: u16) -> bool {
        self.slots.iter().any(|c| c.port == port)
    }

    /// Oldest retained attempt, if any.
    pub fn oldest(&self) -> Option<&ConnectionAttempt> {
        self.slots.get(self.head)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained attempts in insertion order, oldest first.
    pub fn iter(&self) -> Chain<Iter<'_, ConnectionAttempt>, Iter<'_, ConnectionAttempt>> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Retained ports in insertion order, oldest first.
    pub fn ports(&self) -> Vec<u16> {
        self.iter().map(|c| c.port).collect()
    }
}

impl<'a> IntoIterator for &'a BoundedPortQueue {
    type Item = &'a ConnectionAttempt;
    type IntoIter = Chain<Iter<'a, ConnectionAttempt>, Iter<'a, ConnectionAttempt>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
