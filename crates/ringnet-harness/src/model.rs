//! Reference model of the outbound message queue.
//!
//! Deliberately naive: a vector and a few rules. Model-based tests drive
//! the model and the real [`ringnet_core::MessageQueue`] with the same
//! operations and compare every result.

use ringnet_core::Resolution;

/// Operation applied to both the model and the real queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOperation {
    /// Append a message
    Enqueue {
        /// Destination nickname
        destination: String,
        /// Message text
        payload: String,
    },
    /// Resolve the head as if its frame returned
    Resolve(Resolution),
}

/// Observable result of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Message accepted
    Queued,
    /// Message refused, queue at capacity
    Full,
    /// Head removed after an ACK
    Delivered(String),
    /// Head kept for the given send number
    Retrying(u32),
    /// Head removed after its last NACK
    Dropped(String),
    /// Head removed, destination unknown
    Undeliverable(String),
    /// Nothing to resolve
    Empty,
}

/// Reference queue.
#[derive(Debug, Clone)]
pub struct QueueModel {
    capacity: usize,
    max_attempts: u32,
    /// (payload, failed sends)
    entries: Vec<(String, u32)>,
}

impl QueueModel {
    /// Empty model.
    pub fn new(capacity: usize, max_attempts: u32) -> Self {
        Self { capacity, max_attempts: max_attempts.max(1), entries: Vec::new() }
    }

    /// Apply one operation.
    pub fn apply(&mut self, operation: &QueueOperation) -> OperationResult {
        match operation {
            QueueOperation::Enqueue { payload, .. } => {
                if self.entries.len() >= self.capacity {
                    OperationResult::Full
                } else {
                    self.entries.push((payload.clone(), 0));
                    OperationResult::Queued
                }
            },
            QueueOperation::Resolve(resolution) => {
                if self.entries.is_empty() {
                    return OperationResult::Empty;
                }
                let (payload, failed) = self.entries.remove(0);
                match resolution {
                    Resolution::Ack => OperationResult::Delivered(payload),
                    Resolution::DestinationUnknown => OperationResult::Undeliverable(payload),
                    Resolution::Nack if failed + 1 < self.max_attempts => {
                        self.entries.insert(0, (payload, failed + 1));
                        OperationResult::Retrying(failed + 2)
                    },
                    Resolution::Nack => OperationResult::Dropped(payload),
                }
            },
        }
    }

    /// Payloads in queue order.
    pub fn payloads(&self) -> Vec<&str> {
        self.entries.iter().map(|(payload, _)| payload.as_str()).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the model is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
