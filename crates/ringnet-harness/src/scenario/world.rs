//! World state for scenario execution.
//!
//! The World owns every [`RingNode`] in the ring and plays the network
//! between them: datagrams travel through a FIFO, delayed sends wait on the
//! manual clock, and faults rewrite, lose, or fail frames as they leave a
//! node. Every transmission, delivery, and resolution is recorded for the
//! oracle.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    net::SocketAddr,
    time::{Duration, Instant},
};

use ringnet_core::{
    DeliveryStatus, Environment, NodeStatus, QueueError, RingAction, RingNode, corruption,
};
use ringnet_proto::{Control, Frame, FrameKind};
use tracing::trace;

use crate::sim_env::SimEnv;

/// Steps allowed in one drain before the ring is declared livelocked.
const MAX_STEPS_PER_DRAIN: usize = 10_000;

/// Network faults applied as frames leave a node.
///
/// Each fault fires `count` times and is then removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Frames of `kind` sent by `from` vanish in the network
    Drop {
        /// Sending node
        from: String,
        /// Affected frame kind
        kind: FrameKind,
        /// Number of frames to drop
        count: usize,
    },

    /// One payload character of `from`'s own pending data frames is flipped
    /// on the wire
    CorruptData {
        /// Sending node
        from: String,
        /// Number of frames to corrupt
        count: usize,
    },

    /// The socket refuses sends of `kind` by `from`
    FailSend {
        /// Sending node
        from: String,
        /// Affected frame kind
        kind: FrameKind,
        /// Number of sends to fail
        count: usize,
    },
}

impl Fault {
    fn matches(&self, sender: &str, frame: &Frame) -> bool {
        match self {
            Self::Drop { from, kind, .. } | Self::FailSend { from, kind, .. } => {
                from == sender && frame.kind() == *kind
            },
            Self::CorruptData { from, .. } => {
                from == sender
                    && matches!(
                        frame,
                        Frame::Data(data) if data.origin == sender && data.control == Control::Pending
                    )
            },
        }
    }

    fn count_mut(&mut self) -> &mut usize {
        match self {
            Self::Drop { count, .. }
            | Self::CorruptData { count, .. }
            | Self::FailSend { count, .. } => count,
        }
    }
}

/// A frame that left a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    /// Sending node
    pub from: String,
    /// Destination endpoint
    pub to: SocketAddr,
    /// Frame as it went on the wire
    pub frame: Frame,
    /// Simulated time of the send
    pub at: Duration,
}

/// A payload handed to a node's application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Receiving node
    pub node: String,
    /// Sender nickname
    pub origin: String,
    /// Addressed nickname
    pub destination: String,
    /// Verified payload
    pub payload: String,
}

#[derive(Debug)]
struct Datagram {
    from: SocketAddr,
    to: SocketAddr,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct Delayed {
    due: Instant,
    from: String,
    to: SocketAddr,
    frame: Frame,
}

/// World state containing all nodes, the simulated network, and records.
pub struct World {
    env: SimEnv,
    nodes: BTreeMap<String, RingNode>,
    names: HashMap<SocketAddr, String>,
    in_transit: VecDeque<Datagram>,
    delayed: Vec<Delayed>,
    faults: Vec<Fault>,
    transmissions: Vec<Transmission>,
    deliveries: Vec<Delivery>,
    resolutions: Vec<(String, String, DeliveryStatus)>,
    lost: usize,
}

impl World {
    /// Create an empty world on `env`'s clock.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            nodes: BTreeMap::new(),
            names: HashMap::new(),
            in_transit: VecDeque::new(),
            delayed: Vec::new(),
            faults: Vec::new(),
            transmissions: Vec::new(),
            deliveries: Vec::new(),
            resolutions: Vec::new(),
            lost: 0,
        }
    }

    /// Add a node, addressed by its nickname and local endpoint.
    pub fn add_node(&mut self, node: RingNode) {
        let identity = node.identity();
        self.names.insert(identity.local, identity.nickname.clone());
        self.nodes.insert(identity.nickname.clone(), node);
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Node by nickname.
    pub fn node(&self, name: &str) -> Option<&RingNode> {
        self.nodes.get(name)
    }

    /// Status of a node at the current simulated time.
    pub fn status(&self, name: &str) -> Option<NodeStatus> {
        self.nodes.get(name).map(|node| node.status(self.env.now()))
    }

    /// Nicknames of all nodes, sorted.
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Announce every node, in nickname order.
    pub fn start_all(&mut self) {
        for name in self.node_names() {
            if let Some(node) = self.nodes.get_mut(&name) {
                let actions = node.start(&self.env);
                self.execute(&name, actions);
            }
        }
    }

    /// Queue a message on `name`.
    pub fn enqueue(&mut self, name: &str, destination: &str, payload: &str) -> Result<(), String> {
        let node = self.nodes.get_mut(name).ok_or_else(|| format!("no node {name}"))?;
        node.enqueue(destination, payload).map_err(|error: QueueError| error.to_string())
    }

    /// Put a frame on the wire towards `to`, bypassing any node.
    pub fn inject(&mut self, to: &str, from: SocketAddr, frame: &Frame) -> Result<(), String> {
        let to = self.address_of(to).ok_or_else(|| format!("no node {to}"))?;
        self.in_transit.push_back(Datagram { from, to, bytes: frame.encode().into_bytes() });
        Ok(())
    }

    /// Arm a fault.
    pub fn add_fault(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    /// Deliver the oldest datagram in transit. Returns false when idle.
    pub fn step(&mut self) -> bool {
        let Some(datagram) = self.in_transit.pop_front() else {
            return false;
        };

        let Some(name) = self.names.get(&datagram.to).cloned() else {
            trace!(to = %datagram.to, "no node at destination");
            self.lost += 1;
            return true;
        };

        if let Some(node) = self.nodes.get_mut(&name) {
            let actions = node.handle_datagram(&datagram.bytes, datagram.from, &self.env);
            self.execute(&name, actions);
        }
        true
    }

    /// Deliver datagrams until the network is idle.
    pub fn drain(&mut self) -> Result<usize, String> {
        for steps in 0..MAX_STEPS_PER_DRAIN {
            if !self.step() {
                return Ok(steps);
            }
        }
        Err(format!("network still busy after {MAX_STEPS_PER_DRAIN} deliveries"))
    }

    /// Run one manager tick on every node, in nickname order.
    pub fn tick_all(&mut self) {
        for name in self.node_names() {
            if let Some(node) = self.nodes.get_mut(&name) {
                let actions = node.tick(&self.env);
                self.execute(&name, actions);
            }
        }
    }

    /// Move the clock and release delayed sends that came due.
    pub fn advance(&mut self, by: Duration) {
        self.env.advance(by);
        let now = self.env.now();

        let (mut due, waiting): (Vec<Delayed>, Vec<Delayed>) =
            std::mem::take(&mut self.delayed).into_iter().partition(|delayed| delayed.due <= now);
        self.delayed = waiting;
        due.sort_by_key(|delayed| delayed.due);

        for delayed in due {
            self.transmit(&delayed.from, delayed.to, delayed.frame);
        }
    }

    /// Drain, advance by `poll`, tick; repeated for `duration`.
    pub fn run_for(&mut self, duration: Duration, poll: Duration) -> Result<(), String> {
        let deadline = self.env.elapsed() + duration;
        loop {
            self.drain()?;
            if self.env.elapsed() >= deadline {
                return Ok(());
            }
            self.advance(poll);
            self.tick_all();
        }
    }

    /// Like [`Self::run_for`] but stops as soon as `predicate` holds on an
    /// idle network.
    pub fn run_until(
        &mut self,
        predicate: impl Fn(&Self) -> bool,
        timeout: Duration,
        poll: Duration,
    ) -> Result<(), String> {
        let deadline = self.env.elapsed() + timeout;
        loop {
            self.drain()?;
            if predicate(self) {
                return Ok(());
            }
            if self.env.elapsed() >= deadline {
                return Err(format!("condition not reached within {timeout:?}"));
            }
            self.advance(poll);
            self.tick_all();
        }
    }

    /// Every frame that left a node, in send order.
    pub fn transmissions(&self) -> &[Transmission] {
        &self.transmissions
    }

    /// Own data frames `name` put on the wire (first sends and resends).
    pub fn data_sends_by(&self, name: &str) -> usize {
        self.transmissions
            .iter()
            .filter(|sent| {
                sent.from == name
                    && matches!(
                        &sent.frame,
                        Frame::Data(data) if data.origin == name && data.control == Control::Pending
                    )
            })
            .count()
    }

    /// Payloads delivered to `name`'s application.
    pub fn deliveries_to(&self, name: &str) -> Vec<&Delivery> {
        self.deliveries.iter().filter(|delivery| delivery.node == name).collect()
    }

    /// Outcomes reported to `name` for its own messages, in order.
    pub fn resolutions_of(&self, name: &str) -> Vec<(String, DeliveryStatus)> {
        self.resolutions
            .iter()
            .filter(|(node, ..)| node == name)
            .map(|(_, destination, status)| (destination.clone(), *status))
            .collect()
    }

    /// Nodes currently holding a token.
    pub fn token_holders(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.holds_token())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Datagrams that were dropped or had nowhere to go.
    pub fn lost(&self) -> usize {
        self.lost
    }

    fn address_of(&self, name: &str) -> Option<SocketAddr> {
        self.nodes.get(name).map(|node| node.identity().local)
    }

    fn execute(&mut self, name: &str, actions: Vec<RingAction>) {
        for action in actions {
            match action {
                RingAction::Send { to, frame } => self.transmit(name, to, frame),
                RingAction::SendAfter { delay, to, frame } => {
                    let due = self.env.now() + delay;
                    self.delayed.push(Delayed { due, from: name.to_string(), to, frame });
                },
                RingAction::Deliver { origin, destination, payload } => {
                    self.deliveries.push(Delivery {
                        node: name.to_string(),
                        origin,
                        destination,
                        payload,
                    });
                },
                RingAction::Resolved { destination, status } => {
                    self.resolutions.push((name.to_string(), destination, status));
                },
            }
        }
    }

    fn transmit(&mut self, name: &str, to: SocketAddr, mut frame: Frame) {
        if self.take_fault(|fault| matches!(fault, Fault::FailSend { .. }), name, &frame) {
            trace!(node = %name, kind = %frame.kind(), "send refused");
            if let Some(node) = self.nodes.get_mut(name) {
                node.handle_send_failure(&frame);
            }
            return;
        }

        if self.take_fault(|fault| matches!(fault, Fault::CorruptData { .. }), name, &frame)
            && let Frame::Data(data) = &mut frame
        {
            data.payload = corruption::corrupt(&data.payload, &self.env);
        }

        self.transmissions.push(Transmission {
            from: name.to_string(),
            to,
            frame: frame.clone(),
            at: self.env.elapsed(),
        });

        if self.take_fault(|fault| matches!(fault, Fault::Drop { .. }), name, &frame) {
            trace!(node = %name, kind = %frame.kind(), "frame dropped");
            self.lost += 1;
            return;
        }

        let Some(from) = self.address_of(name) else {
            return;
        };
        self.in_transit.push_back(Datagram { from, to, bytes: frame.encode().into_bytes() });
    }

    /// Consume one firing of the first armed fault of the selected variant
    /// that matches this send.
    fn take_fault(&mut self, variant: impl Fn(&Fault) -> bool, sender: &str, frame: &Frame) -> bool {
        let Some(index) =
            self.faults.iter().position(|fault| variant(fault) && fault.matches(sender, frame))
        else {
            return false;
        };

        let Some(fault) = self.faults.get_mut(index) else {
            return false;
        };
        let count = fault.count_mut();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.faults.remove(index);
        }
        true
    }
}
