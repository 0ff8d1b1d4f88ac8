//! Outbound message queue.
//!
//! FIFO of messages waiting for the token. Only the head is ever on the
//! wire; it stays at the head until its delivery is resolved.
//!
//! # Retransmission
//!
//! A NACK keeps the head for another attempt until `max_attempts` sends
//! have been made, then drops it. With the default cap of 2 a message is
//! sent at most twice. A retransmission is sent without corruption.

use std::collections::VecDeque;

use ringnet_proto::{Control, DataFrame, Frame, MAX_DATAGRAM_SIZE, validate_nickname};
use thiserror::Error;

/// Default queue depth.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default number of sends per message.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Errors returned by [`MessageQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Queue is at capacity; contents are unchanged.
    #[error("queue is full ({capacity} messages)")]
    Full {
        /// Configured capacity
        capacity: usize,
    },

    /// Encoded frame would not fit in one datagram.
    #[error("message of {size} encoded bytes exceeds the {max} byte datagram limit")]
    PayloadTooLarge {
        /// Worst-case encoded frame size
        size: usize,
        /// Datagram limit
        max: usize,
    },

    /// Destination cannot be carried by the wire format.
    #[error("invalid destination {0:?}")]
    InvalidDestination(String),
}

/// A message waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Destination nickname (or `"ALL"`)
    pub destination: String,
    /// Message text
    pub payload: String,
    /// Sends already NACKed
    pub attempts: u32,
    /// Next send is a retransmission (sent without corruption)
    pub retransmit: bool,
}

/// How the in-flight head was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Destination verified the payload
    Ack,
    /// Destination saw a checksum mismatch
    Nack,
    /// Frame returned unclaimed
    DestinationUnknown,
}

/// Result of [`MessageQueue::resolve_head`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Head acknowledged and removed
    Delivered(QueuedMessage),
    /// Head NACKed and kept for another send
    Retrying {
        /// Number of the upcoming send (2 for the first retransmission)
        attempt: u32,
    },
    /// Head NACKed on its last allowed send and removed
    Dropped(QueuedMessage),
    /// Head had no destination and was removed without retry
    Undeliverable(QueuedMessage),
    /// Queue was empty
    Empty,
}

/// Bounded FIFO of outbound messages.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    /// Nickname written into outgoing frames, used for size checks
    origin: String,
    capacity: usize,
    max_attempts: u32,
    messages: VecDeque<QueuedMessage>,
}

impl MessageQueue {
    /// Empty queue for messages sent by `origin`.
    pub fn new(origin: impl Into<String>, capacity: usize, max_attempts: u32) -> Self {
        Self {
            origin: origin.into(),
            capacity,
            max_attempts: max_attempts.max(1),
            messages: VecDeque::new(),
        }
    }

    /// Append a message.
    pub fn enqueue(
        &mut self,
        destination: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<(), QueueError> {
        let destination = destination.into();
        let payload = payload.into();

        if validate_nickname(&destination).is_err() {
            return Err(QueueError::InvalidDestination(destination));
        }
        if self.messages.len() >= self.capacity {
            return Err(QueueError::Full { capacity: self.capacity });
        }

        let size = self.worst_case_size(&destination, &payload);
        if size > MAX_DATAGRAM_SIZE {
            return Err(QueueError::PayloadTooLarge { size, max: MAX_DATAGRAM_SIZE });
        }

        self.messages.push_back(QueuedMessage {
            destination,
            payload,
            attempts: 0,
            retransmit: false,
        });
        Ok(())
    }

    /// Message at the head, if any.
    pub fn peek_head(&self) -> Option<&QueuedMessage> {
        self.messages.front()
    }

    /// Apply the delivery outcome of the head.
    pub fn resolve_head(&mut self, resolution: Resolution) -> ResolveOutcome {
        match resolution {
            Resolution::Ack => self.pop(ResolveOutcome::Delivered),
            Resolution::DestinationUnknown => self.pop(ResolveOutcome::Undeliverable),
            Resolution::Nack => {
                let max_attempts = self.max_attempts;
                if let Some(head) = self.messages.front_mut()
                    && head.attempts + 1 < max_attempts
                {
                    head.attempts += 1;
                    head.retransmit = true;
                    return ResolveOutcome::Retrying { attempt: head.attempts + 1 };
                }
                self.pop(ResolveOutcome::Dropped)
            },
        }
    }

    /// Copy of the queue contents, head first.
    pub fn snapshot(&self) -> Vec<QueuedMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn pop(&mut self, outcome: fn(QueuedMessage) -> ResolveOutcome) -> ResolveOutcome {
        self.messages.pop_front().map_or(ResolveOutcome::Empty, outcome)
    }

    fn worst_case_size(&self, destination: &str, payload: &str) -> usize {
        let frame = Frame::Data(DataFrame {
            control: Control::Pending,
            origin: self.origin.clone(),
            destination: destination.to_string(),
            crc: u32::MAX,
            payload: payload.to_string(),
        });
        frame.encode().len()
    }
}
