//! Model-based property tests for the outbound queue.
//!
//! These tests generate random operation sequences and verify that the real
//! queue behaves identically to the reference model.
//!
//! ```text
//! proptest generates: Vec<QueueOperation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      QueueModel     MessageQueue    Compare
//!      (reference)       (real)       Results
//! ```

use proptest::prelude::*;
use ringnet_core::{MessageQueue, QueueError, Resolution, ResolveOutcome};
use ringnet_harness::{OperationResult, QueueModel, QueueOperation};

const CAPACITY: usize = 4;

fn apply_real(queue: &mut MessageQueue, operation: &QueueOperation) -> OperationResult {
    match operation {
        QueueOperation::Enqueue { destination, payload } => {
            match queue.enqueue(destination.clone(), payload.clone()) {
                Ok(()) => OperationResult::Queued,
                Err(QueueError::Full { .. }) => OperationResult::Full,
                Err(error) => panic!("unexpected enqueue error: {error}"),
            }
        },
        QueueOperation::Resolve(resolution) => match queue.resolve_head(*resolution) {
            ResolveOutcome::Delivered(message) => OperationResult::Delivered(message.payload),
            ResolveOutcome::Retrying { attempt } => OperationResult::Retrying(attempt),
            ResolveOutcome::Dropped(message) => OperationResult::Dropped(message.payload),
            ResolveOutcome::Undeliverable(message) => {
                OperationResult::Undeliverable(message.payload)
            },
            ResolveOutcome::Empty => OperationResult::Empty,
        },
    }
}

fn operation_strategy() -> impl Strategy<Value = QueueOperation> {
    let destination = prop::sample::select(vec!["ALL", "Bob", "Carol"]);
    let payload = "[a-z ]{0,12}";
    let resolution = prop_oneof![
        Just(Resolution::Ack),
        Just(Resolution::Nack),
        Just(Resolution::DestinationUnknown),
    ];

    prop_oneof![
        3 => (destination, payload).prop_map(|(destination, payload)| QueueOperation::Enqueue {
            destination: destination.to_string(),
            payload,
        }),
        2 => resolution.prop_map(QueueOperation::Resolve),
    ]
}

proptest! {
    /// Every operation returns the same result on model and real queue.
    #[test]
    fn prop_model_matches_real(
        max_attempts in 1u32..4,
        operations in prop::collection::vec(operation_strategy(), 1..60),
    ) {
        let mut model = QueueModel::new(CAPACITY, max_attempts);
        let mut real = MessageQueue::new("Alice", CAPACITY, max_attempts);

        for operation in &operations {
            let expected = model.apply(operation);
            let actual = apply_real(&mut real, operation);
            prop_assert_eq!(&actual, &expected, "operation {:?}", operation);

            let real_payloads: Vec<String> =
                real.snapshot().into_iter().map(|message| message.payload).collect();
            prop_assert_eq!(real_payloads, model.payloads());
            prop_assert!(real.len() <= CAPACITY);
        }
    }

    /// A message is sent at most `max_attempts` times before it leaves.
    #[test]
    fn prop_nacks_bounded_by_max_attempts(max_attempts in 1u32..5) {
        let mut real = MessageQueue::new("Alice", CAPACITY, max_attempts);
        real.enqueue("Bob", "hello").unwrap();

        let mut sends = 1;
        while let ResolveOutcome::Retrying { attempt } = real.resolve_head(Resolution::Nack) {
            sends += 1;
            prop_assert_eq!(attempt, sends);
        }
        prop_assert_eq!(sends, max_attempts);
        prop_assert!(real.is_empty());
    }
}
