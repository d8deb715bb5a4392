//! Bounded, per-path deduplicating queue of records awaiting delivery.

use std::collections::VecDeque;

use tracing::debug;

use crate::record::ChangeRecord;

/// What happened when a record was pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended at the tail.
    Appended,
    /// Replaced a queued record for the same path, keeping its slot.
    Replaced,
    /// Appended after evicting the oldest record.
    Evicted(Box<ChangeRecord>),
}

/// FIFO of change records holding at most one record per path.
#[derive(Debug)]
pub struct PendingQueue {
    records: VecDeque<ChangeRecord>,
    capacity: usize,
}

impl PendingQueue {
    /// Create a queue holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Queue a record.
    ///
    /// A record for a path already queued takes the older record's place in
    /// line. Otherwise the oldest record is evicted when the queue is full.
    pub fn push(&mut self, record: ChangeRecord) -> PushOutcome {
        if let Some(slot) = self.records.iter_mut().find(|r| r.path == record.path) {
            debug!(path = %record.path.display(), "Replacing queued record");
            *slot = record;
            return PushOutcome::Replaced;
        }

        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);

        match evicted {
            Some(old) => {
                debug!(path = %old.path.display(), "Evicted oldest queued record");
                PushOutcome::Evicted(Box::new(old))
            }
            None => PushOutcome::Appended,
        }
    }

    /// Remove and return the oldest record.
    pub fn pop(&mut self) -> Option<ChangeRecord> {
        self.records.pop_front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter()
    }
}
