//! Async runtime for a ring node.
//!
//! Runs the [`RingNode`] state machine against a [`Transport`] with two
//! tasks sharing one lock:
//!
//! - **Receiver**: waits for a datagram, feeds it to the engine, executes
//!   the returned actions. Frames are handled one at a time in arrival order.
//! - **Manager**: sleeps the poll interval, calls [`RingNode::tick`],
//!   executes the returned actions.
//!
//! The lock is held only while the state machine runs; every network send
//! happens after it is released. Delayed sends are spawned as their own
//! tasks so the receiver never sleeps.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use ringnet_core::{
    DeliveryStatus, Environment, NodeStatus, QueueError, QueuedMessage, RingAction, RingNode,
    Transport,
};
use ringnet_proto::Frame;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Largest datagram the receiver reads; anything above the protocol limit
/// is dropped.
const RECEIVE_BUFFER_SIZE: usize = 65_535;

type SharedNode = Arc<Mutex<RingNode>>;

/// Runtime failures.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Manager task ended.
    #[error("manager task stopped")]
    ManagerStopped,

    /// Manager task panicked or was cancelled.
    #[error("manager task failed: {0}")]
    ManagerFailed(String),
}

/// Events surfaced to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A message addressed to this node arrived intact
    Delivered {
        /// Sender nickname
        origin: String,
        /// Addressed nickname (this node or `"ALL"`)
        destination: String,
        /// Message text
        payload: String,
    },

    /// A message this node sent made progress
    Resolved {
        /// Destination nickname
        destination: String,
        /// Outcome
        status: DeliveryStatus,
    },
}

/// Drives one [`RingNode`].
pub struct Runtime<T, E> {
    node: SharedNode,
    transport: Arc<T>,
    env: Arc<E>,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl<T: Transport, E: Environment> Runtime<T, E> {
    /// Create a runtime and the receiving end of its event stream.
    pub fn new(
        node: RingNode,
        transport: T,
        env: E,
        poll_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<NodeEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let runtime = Self {
            node: Arc::new(Mutex::new(node)),
            transport: Arc::new(transport),
            env: Arc::new(env),
            poll_interval,
            events,
        };
        (runtime, receiver)
    }

    /// Handle for enqueueing messages and querying state.
    pub fn handle(&self) -> NodeHandle<E> {
        NodeHandle { node: Arc::clone(&self.node), env: Arc::clone(&self.env) }
    }

    /// Announce the node and run the receiver and manager until the manager
    /// stops.
    pub async fn run(self) -> Result<(), RuntimeError> {
        let dispatcher = Dispatcher {
            node: Arc::clone(&self.node),
            transport: Arc::clone(&self.transport),
            env: Arc::clone(&self.env),
            events: self.events.clone(),
        };

        let announce = lock(&self.node).start(&*self.env);
        dispatcher.execute(announce).await;

        let manager = tokio::spawn(manager_loop(dispatcher.clone(), self.poll_interval));

        tokio::select! {
            result = manager => match result {
                Ok(()) => Err(RuntimeError::ManagerStopped),
                Err(error) => Err(RuntimeError::ManagerFailed(error.to_string())),
            },
            () = receiver_loop(dispatcher) => Ok(()),
        }
    }
}

/// Cloneable access to a running node.
pub struct NodeHandle<E> {
    node: SharedNode,
    env: Arc<E>,
}

impl<E> Clone for NodeHandle<E> {
    fn clone(&self) -> Self {
        Self { node: Arc::clone(&self.node), env: Arc::clone(&self.env) }
    }
}

impl<E: Environment> NodeHandle<E> {
    /// Queue a message.
    pub fn enqueue(&self, destination: &str, payload: &str) -> Result<(), QueueError> {
        lock(&self.node).enqueue(destination, payload)
    }

    /// Queue contents, head first.
    pub fn queue_snapshot(&self) -> Vec<QueuedMessage> {
        lock(&self.node).queue_snapshot()
    }

    /// Membership entries.
    pub fn membership_snapshot(&self) -> Vec<(String, SocketAddr)> {
        lock(&self.node).membership_snapshot()
    }

    /// Status summary.
    pub fn status(&self) -> NodeStatus {
        lock(&self.node).status(self.env.now())
    }
}

/// Executes [`RingAction`]s against the transport.
struct Dispatcher<T, E> {
    node: SharedNode,
    transport: Arc<T>,
    env: Arc<E>,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl<T, E> Clone for Dispatcher<T, E> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            transport: Arc::clone(&self.transport),
            env: Arc::clone(&self.env),
            events: self.events.clone(),
        }
    }
}

impl<T: Transport, E: Environment> Dispatcher<T, E> {
    async fn execute(&self, actions: Vec<RingAction>) {
        for action in actions {
            match action {
                RingAction::Send { to, frame } => self.send(to, frame).await,
                RingAction::SendAfter { delay, to, frame } => {
                    let dispatcher = self.clone();
                    tokio::spawn(async move {
                        dispatcher.env.sleep(delay).await;
                        dispatcher.send(to, frame).await;
                    });
                },
                RingAction::Deliver { origin, destination, payload } => {
                    self.emit(NodeEvent::Delivered { origin, destination, payload });
                },
                RingAction::Resolved { destination, status } => {
                    self.emit(NodeEvent::Resolved { destination, status });
                },
            }
        }
    }

    async fn send(&self, to: SocketAddr, frame: Frame) {
        let text = frame.encode();
        match self.transport.send_to(text.as_bytes(), to).await {
            Ok(()) => trace!(%to, kind = %frame.kind(), "sent"),
            Err(error) => {
                warn!(%to, kind = %frame.kind(), %error, "send failed");
                lock(&self.node).handle_send_failure(&frame);
            },
        }
    }

    fn emit(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            debug!("no event listener");
        }
    }
}

async fn manager_loop<T: Transport, E: Environment>(
    dispatcher: Dispatcher<T, E>,
    poll_interval: Duration,
) {
    loop {
        dispatcher.env.sleep(poll_interval).await;
        let actions = lock(&dispatcher.node).tick(&*dispatcher.env);
        dispatcher.execute(actions).await;
    }
}

async fn receiver_loop<T: Transport, E: Environment>(dispatcher: Dispatcher<T, E>) {
    let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
    loop {
        match dispatcher.transport.recv_from(&mut buffer).await {
            Ok((len, from)) if len > ringnet_proto::MAX_DATAGRAM_SIZE => {
                warn!(%from, len, "oversize datagram dropped");
            },
            Ok((len, from)) => {
                let datagram = buffer.get(..len).unwrap_or_default();
                let actions =
                    lock(&dispatcher.node).handle_datagram(datagram, from, &*dispatcher.env);
                dispatcher.execute(actions).await;
            },
            Err(error) => warn!(%error, "receive failed"),
        }
    }
}

fn lock(node: &SharedNode) -> MutexGuard<'_, RingNode> {
    node.lock().unwrap_or_else(PoisonError::into_inner)
}
