//! Ring engine.
//!
//! One [`RingNode`] per process combines the membership table, the token
//! controller and the message queue, and turns incoming frames and timer
//! ticks into [`RingAction`]s.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept the environment as a parameter (no stored clock or RNG)
//! - Methods return `Vec<RingAction>`
//! - The runtime executes actions (send datagrams, schedule delayed sends,
//!   surface deliveries)
//!
//! # Receiver dispatch
//!
//! | Frame | Behaviour |
//! |-------|-----------|
//! | Discovery / Update | learn, forward on first learning only |
//! | Token | accept, or drop / collapse per [`TokenVerdict`] |
//! | Data from self | resolve the queue head if it answers the send in flight, release the token |
//! | Pending data for self or `ALL` | verify checksum, reply ACK/NACK to origin |
//! | ACK/NACK for self | stale, dropped |
//! | anything else | relay to next hop |
//!
//! # Manager tick
//!
//! ```text
//! bootstrap (generator, once) ─> timeout? regenerate ─> held?
//!                                                      ├─ awaiting return: release after hold time
//!                                                      ├─ queue head: send, await return
//!                                                      └─ queue empty: release
//! ```

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use ringnet_proto::{
    Announcement, BROADCAST_NICKNAME, Control, DataFrame, FORCED_ERROR_MARKER, Frame, TokenFrame,
    checksum,
};
use tracing::{debug, info, warn};

use crate::{
    corruption,
    env::Environment,
    membership::Membership,
    queue::{MessageQueue, QueueError, QueuedMessage, ResolveOutcome, Resolution},
    token::{TokenConfig, TokenController, TokenStatus, TokenVerdict},
};

/// Who this node is on the ring. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Unique nickname
    pub nickname: String,
    /// Endpoint this node receives on
    pub local: SocketAddr,
    /// Endpoint every ring frame is forwarded to
    pub next_hop: SocketAddr,
    /// Whether this node creates and regenerates the token
    pub generator: bool,
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// How long to wait for an in-flight message before releasing the token
    pub token_hold: Duration,
    /// Generator regenerates the token after this long without circulation
    pub max_token_wait: Duration,
    /// Tokens arriving closer together than this are rejected
    pub min_token_interval: Duration,
    /// Age after which a seen token sequence is forgotten
    pub seen_horizon: Duration,
    /// Maximum number of remembered token sequences
    pub seen_capacity: usize,
    /// Outbound queue depth
    pub queue_capacity: usize,
    /// Sends per message before a NACK drops it
    pub max_attempts: u32,
    /// Probability that a fresh send is corrupted
    pub corruption_probability: f64,
    /// Lower bound of the backoff before forwarding a colliding token
    pub collision_backoff_min: Duration,
    /// Upper bound of the backoff before forwarding a colliding token
    pub collision_backoff_max: Duration,
    /// Generator waits this long after startup before injecting the token
    pub startup_delay: Duration,
    /// Learn unknown origins from the source address of their data frames
    pub learn_from_data: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            token_hold: Duration::from_secs(3),
            max_token_wait: Duration::from_secs(15),
            min_token_interval: Duration::from_millis(10),
            seen_horizon: Duration::from_secs(30),
            seen_capacity: 100,
            queue_capacity: crate::queue::DEFAULT_CAPACITY,
            max_attempts: crate::queue::DEFAULT_MAX_ATTEMPTS,
            corruption_probability: 0.2,
            collision_backoff_min: Duration::from_millis(100),
            collision_backoff_max: Duration::from_millis(500),
            startup_delay: Duration::from_secs(2),
            learn_from_data: true,
        }
    }
}

impl NodeConfig {
    fn token_config(&self) -> TokenConfig {
        TokenConfig {
            max_wait: self.max_token_wait,
            min_interval: self.min_token_interval,
            seen_horizon: self.seen_horizon,
            seen_capacity: self.seen_capacity,
        }
    }
}

/// Final or intermediate outcome of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Acknowledged by the destination
    Delivered,
    /// NACKed, will be sent again
    Retrying {
        /// Number of the upcoming send
        attempt: u32,
    },
    /// NACKed on its last allowed send
    Dropped,
    /// No node claimed the destination
    Undeliverable,
}

/// Actions returned by the ring engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RingAction {
    /// Send this frame now
    Send {
        /// Destination endpoint
        to: SocketAddr,
        /// Frame to encode
        frame: Frame,
    },

    /// Send this frame after a delay
    SendAfter {
        /// Delay before sending
        delay: Duration,
        /// Destination endpoint
        to: SocketAddr,
        /// Frame to encode
        frame: Frame,
    },

    /// Hand a verified payload to the local application
    Deliver {
        /// Sender nickname
        origin: String,
        /// Addressed nickname (this node or `"ALL"`)
        destination: String,
        /// Verified payload
        payload: String,
    },

    /// Report progress on a message this node queued
    Resolved {
        /// Destination of the message
        destination: String,
        /// What happened to it
        status: DeliveryStatus,
    },
}

/// Point-in-time view of the node for the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    /// Node nickname
    pub nickname: String,
    /// Token controller view
    pub token: TokenStatus,
    /// Messages waiting in the queue
    pub queue_len: usize,
    /// Whether a message is on the wire
    pub awaiting_return: bool,
    /// Membership entries, sentinel included
    pub members: usize,
}

/// Our message currently travelling the ring.
#[derive(Debug, Clone)]
struct InFlight {
    destination: String,
    attempt: u32,
    /// Checksum of the intended payload
    crc: u32,
    payload: String,
    /// Payload as sent, possibly corrupted
    wire_payload: String,
}

impl InFlight {
    /// Whether `reply` answers this send rather than an earlier one.
    fn is_answered_by(&self, reply: &DataFrame) -> bool {
        // Broadcasts are answered by whichever node comes first
        if reply.control != Control::Pending
            && self.destination != BROADCAST_NICKNAME
            && reply.destination != self.destination
        {
            return false;
        }

        let payload_matches = reply.payload == self.wire_payload || reply.payload == self.payload;
        if reply.crc == self.crc && payload_matches {
            return true;
        }

        // Forced-error replies carry the cleaned payload and its checksum
        self.wire_payload.contains(FORCED_ERROR_MARKER) && {
            let cleaned = self.wire_payload.replace(FORCED_ERROR_MARKER, "");
            reply.crc == checksum::crc32(&cleaned) && reply.payload == cleaned
        }
    }
}

/// Ring engine for one node.
///
/// Pure state machine - no I/O, no stored environment.
#[derive(Debug, Clone)]
pub struct RingNode {
    identity: NodeIdentity,
    config: NodeConfig,
    membership: Membership,
    token: TokenController,
    queue: MessageQueue,
    in_flight: Option<InFlight>,
    /// Set while the current possession waits for our frame to return
    awaiting_since: Option<Instant>,
    started_at: Instant,
}

impl RingNode {
    /// Create an engine.
    ///
    /// # Arguments
    /// * `identity` - Node identity
    /// * `config` - Engine tuning
    /// * `now` - Current time (from Environment)
    pub fn new(identity: NodeIdentity, config: NodeConfig, now: Instant) -> Self {
        let membership = Membership::new(&identity.nickname, identity.local);
        let token =
            TokenController::new(&*identity.nickname, identity.generator, config.token_config(), now);
        let queue = MessageQueue::new(&*identity.nickname, config.queue_capacity, config.max_attempts);

        Self {
            identity,
            config,
            membership,
            token,
            queue,
            in_flight: None,
            awaiting_since: None,
            started_at: now,
        }
    }

    /// Node identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Whether this node holds the token.
    pub fn holds_token(&self) -> bool {
        self.token.is_held()
    }

    /// Announce this node to the ring.
    ///
    /// Also restarts the generator's settle delay.
    pub fn start(&mut self, env: &impl Environment) -> Vec<RingAction> {
        self.started_at = env.now();
        info!(
            node = %self.identity.nickname,
            local = %self.identity.local,
            next_hop = %self.identity.next_hop,
            generator = self.identity.generator,
            "node started"
        );

        let announcement = Announcement::new(self.identity.nickname.clone(), self.identity.local);
        vec![self.to_next_hop(Frame::Discovery(announcement))]
    }

    /// Decode and dispatch one datagram.
    ///
    /// Malformed datagrams are logged and dropped.
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        from: SocketAddr,
        env: &impl Environment,
    ) -> Vec<RingAction> {
        match Frame::decode_bytes(datagram) {
            Ok(frame) => self.handle_frame(frame, from, env),
            Err(error) => {
                warn!(node = %self.identity.nickname, %from, %error, "dropping malformed frame");
                Vec::new()
            },
        }
    }

    /// Dispatch one decoded frame.
    pub fn handle_frame(
        &mut self,
        frame: Frame,
        from: SocketAddr,
        env: &impl Environment,
    ) -> Vec<RingAction> {
        match frame {
            Frame::LegacyToken => self.on_token(None, env),
            Frame::Token(token) => self.on_token(Some(token), env),
            Frame::Data(data) => self.on_data(data, from, env),
            Frame::Discovery(announcement) => self.on_announcement(announcement, true),
            Frame::MembershipUpdate(announcement) => self.on_announcement(announcement, false),
        }
    }

    /// Periodic manager step.
    ///
    /// Call this every poll interval (e.g. 100ms).
    pub fn tick(&mut self, env: &impl Environment) -> Vec<RingAction> {
        let now = env.now();

        if self.identity.generator && !self.token.is_bootstrapped() {
            if now.duration_since(self.started_at) < self.config.startup_delay {
                return Vec::new();
            }
            let token = self.token.bootstrap(now, env.wall_clock());
            info!(node = %self.identity.nickname, sequence = token.sequence, "injecting initial token");
            return vec![self.to_next_hop(Frame::Token(token))];
        }

        if self.token.check_timeout(now) {
            let token = self.token.regenerate(now, env.wall_clock());
            self.awaiting_since = None;
            warn!(
                node = %self.identity.nickname,
                sequence = token.sequence,
                "token did not return in time, regenerating"
            );
            return vec![self.to_next_hop(Frame::Token(token))];
        }

        if !self.token.is_held() {
            return Vec::new();
        }

        if let Some(since) = self.awaiting_since {
            if now.duration_since(since) < self.config.token_hold {
                return Vec::new();
            }
            info!(
                node = %self.identity.nickname,
                "hold time elapsed before the message returned, releasing token"
            );
            return vec![self.release_token(env)];
        }

        match self.queue.peek_head().cloned() {
            Some(head) => self.send_head(head, now, env),
            None => vec![self.release_token(env)],
        }
    }

    /// React to a failed send of `frame`.
    ///
    /// A failed send of our own message cancels the wait so the head is
    /// retried on the next tick. The message stays queued.
    pub fn handle_send_failure(&mut self, frame: &Frame) {
        match frame {
            Frame::Data(data)
                if data.origin == self.identity.nickname && data.control == Control::Pending =>
            {
                if self.in_flight.take().is_some() {
                    self.awaiting_since = None;
                    warn!(
                        node = %self.identity.nickname,
                        destination = %data.destination,
                        "send failed, message stays queued"
                    );
                }
            },
            Frame::LegacyToken | Frame::Token(_) => {
                warn!(node = %self.identity.nickname, "token send failed");
            },
            _ => debug!(node = %self.identity.nickname, kind = %frame.kind(), "send failed"),
        }
    }

    /// Queue a message for `destination`.
    pub fn enqueue(
        &mut self,
        destination: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<(), QueueError> {
        let destination = destination.into();
        self.queue.enqueue(destination.clone(), payload)?;
        debug!(
            node = %self.identity.nickname,
            %destination,
            queued = self.queue.len(),
            "message queued"
        );
        Ok(())
    }

    /// Queue contents, head first.
    pub fn queue_snapshot(&self) -> Vec<QueuedMessage> {
        self.queue.snapshot()
    }

    /// Membership entries, sorted by nickname.
    pub fn membership_snapshot(&self) -> Vec<(String, SocketAddr)> {
        self.membership.snapshot()
    }

    /// Status summary.
    pub fn status(&self, now: Instant) -> NodeStatus {
        NodeStatus {
            nickname: self.identity.nickname.clone(),
            token: self.token.status(now),
            queue_len: self.queue.len(),
            awaiting_return: self.awaiting_since.is_some(),
            members: self.membership.len(),
        }
    }

    fn on_token(&mut self, token: Option<TokenFrame>, env: &impl Environment) -> Vec<RingAction> {
        let sequence = token.as_ref().map(|token| token.sequence);
        let was_held = self.token.is_held();

        match self.token.on_token_received(token.as_ref(), env.now(), env.wall_clock()) {
            TokenVerdict::Accept => {
                if was_held {
                    warn!(node = %self.identity.nickname, sequence, "absorbed a second token");
                } else {
                    debug!(node = %self.identity.nickname, sequence, "token accepted");
                }
                Vec::new()
            },
            TokenVerdict::RejectDuplicate => {
                debug!(node = %self.identity.nickname, sequence, "duplicate token dropped");
                Vec::new()
            },
            TokenVerdict::RejectTooFast if was_held => {
                // Two tokens on the ring: forward the newcomer, drop ours
                let delay = self.collision_backoff(env);
                self.token.surrender();
                self.awaiting_since = None;
                warn!(
                    node = %self.identity.nickname,
                    sequence,
                    delay_ms = delay.as_millis() as u64,
                    "token arrived while holding, collapsing"
                );
                let frame = token.map_or(Frame::LegacyToken, Frame::Token);
                vec![RingAction::SendAfter { delay, to: self.identity.next_hop, frame }]
            },
            TokenVerdict::RejectTooFast => {
                debug!(node = %self.identity.nickname, sequence, "token arrived too fast, dropped");
                Vec::new()
            },
        }
    }

    fn on_data(
        &mut self,
        data: DataFrame,
        from: SocketAddr,
        env: &impl Environment,
    ) -> Vec<RingAction> {
        if data.origin == self.identity.nickname {
            return self.on_returning(&data, env);
        }

        if self.config.learn_from_data && self.membership.insert_if_new(&data.origin, from) {
            info!(
                node = %self.identity.nickname,
                member = %data.origin,
                endpoint = %from,
                "learned member from data frame"
            );
        }

        let addressed_to_us =
            data.destination == self.identity.nickname || data.destination == BROADCAST_NICKNAME;

        match (addressed_to_us, data.control) {
            (true, Control::Pending) => self.answer(data),
            (true, control) => {
                debug!(
                    node = %self.identity.nickname,
                    origin = %data.origin,
                    %control,
                    "stale response dropped"
                );
                Vec::new()
            },
            (false, _) => vec![self.to_next_hop(Frame::Data(data))],
        }
    }

    fn on_returning(&mut self, data: &DataFrame, env: &impl Environment) -> Vec<RingAction> {
        let Some(in_flight) = self.in_flight.take_if(|sent| sent.is_answered_by(data)) else {
            debug!(
                node = %self.identity.nickname,
                control = %data.control,
                destination = %data.destination,
                awaiting = self.in_flight.is_some(),
                "stale reply ignored"
            );
            return Vec::new();
        };
        self.awaiting_since = None;

        let resolution = match data.control {
            Control::Ack => Resolution::Ack,
            Control::Nack => Resolution::Nack,
            Control::Pending => Resolution::DestinationUnknown,
        };

        let outcome = self.queue.resolve_head(resolution);
        let mut actions = Vec::new();
        if let Some(status) = self.report(&in_flight, outcome) {
            actions.push(RingAction::Resolved { destination: in_flight.destination, status });
        }
        if self.token.is_held() {
            actions.push(self.release_token(env));
        }
        actions
    }

    fn report(&self, in_flight: &InFlight, outcome: ResolveOutcome) -> Option<DeliveryStatus> {
        let node = &self.identity.nickname;
        let destination = &in_flight.destination;

        match outcome {
            ResolveOutcome::Delivered(_) => {
                info!(%node, %destination, attempt = in_flight.attempt, "message acknowledged");
                Some(DeliveryStatus::Delivered)
            },
            ResolveOutcome::Retrying { attempt } => {
                warn!(%node, %destination, attempt, "message rejected, retransmitting");
                Some(DeliveryStatus::Retrying { attempt })
            },
            ResolveOutcome::Dropped(_) => {
                warn!(
                    %node,
                    %destination,
                    attempt = in_flight.attempt,
                    "message rejected again, dropped"
                );
                Some(DeliveryStatus::Dropped)
            },
            ResolveOutcome::Undeliverable(_) => {
                warn!(%node, %destination, "destination unknown, message dropped");
                Some(DeliveryStatus::Undeliverable)
            },
            ResolveOutcome::Empty => None,
        }
    }

    fn answer(&self, data: DataFrame) -> Vec<RingAction> {
        let (control, crc, payload) = if data.has_forced_error() {
            let cleaned = data.payload.replace(FORCED_ERROR_MARKER, "");
            info!(
                node = %self.identity.nickname,
                origin = %data.origin,
                "forced error marker found, acknowledging cleaned payload"
            );
            (Control::Ack, checksum::crc32(&cleaned), cleaned)
        } else if data.checksum_matches() {
            (Control::Ack, data.crc, data.payload.clone())
        } else {
            warn!(node = %self.identity.nickname, origin = %data.origin, "checksum mismatch");
            (Control::Nack, data.crc, data.payload.clone())
        };

        let Some(origin_endpoint) = self.membership.lookup(&data.origin) else {
            // No way to reach the origin directly; let the frame come home unclaimed
            warn!(
                node = %self.identity.nickname,
                origin = %data.origin,
                "origin unknown, returning frame along the ring"
            );
            let unclaimed = DataFrame::pending(
                data.origin,
                self.identity.nickname.clone(),
                data.crc,
                data.payload,
            );
            return vec![self.to_next_hop(Frame::Data(unclaimed))];
        };

        let reply = DataFrame {
            control,
            origin: data.origin.clone(),
            destination: self.identity.nickname.clone(),
            crc,
            payload: payload.clone(),
        };
        let mut actions = vec![RingAction::Send { to: origin_endpoint, frame: Frame::Data(reply) }];

        if control == Control::Ack {
            info!(node = %self.identity.nickname, origin = %data.origin, "message received");
            actions.push(RingAction::Deliver {
                origin: data.origin,
                destination: data.destination,
                payload,
            });
        }
        actions
    }

    fn on_announcement(&mut self, announcement: Announcement, discovery: bool) -> Vec<RingAction> {
        if announcement.nickname == self.identity.nickname {
            debug!(node = %self.identity.nickname, "own announcement returned");
            return Vec::new();
        }
        if !self.membership.insert_if_new(&announcement.nickname, announcement.endpoint) {
            debug!(
                node = %self.identity.nickname,
                member = %announcement.nickname,
                "known member, not forwarding"
            );
            return Vec::new();
        }

        info!(
            node = %self.identity.nickname,
            member = %announcement.nickname,
            endpoint = %announcement.endpoint,
            "learned member"
        );

        // A newcomer gets everything we know
        let snapshot = if discovery {
            self.membership.announcements_except(&announcement.nickname)
        } else {
            Vec::new()
        };
        let newcomer = announcement.endpoint;

        let forwarded = if discovery {
            Frame::Discovery(announcement)
        } else {
            Frame::MembershipUpdate(announcement)
        };

        let mut actions = vec![self.to_next_hop(forwarded)];
        actions.extend(snapshot.into_iter().map(|entry| RingAction::Send {
            to: newcomer,
            frame: Frame::MembershipUpdate(entry),
        }));
        actions
    }

    fn send_head(
        &mut self,
        head: QueuedMessage,
        now: Instant,
        env: &impl Environment,
    ) -> Vec<RingAction> {
        let attempt = head.attempts + 1;
        let crc = checksum::crc32(&head.payload);

        let wire_payload = if head.retransmit {
            head.payload.clone()
        } else {
            match corruption::maybe_corrupt(&head.payload, self.config.corruption_probability, env) {
                Some(corrupted) => {
                    info!(
                        node = %self.identity.nickname,
                        destination = %head.destination,
                        "simulating transmission error"
                    );
                    corrupted
                },
                None => head.payload.clone(),
            }
        };

        info!(
            node = %self.identity.nickname,
            destination = %head.destination,
            attempt,
            "sending message"
        );

        let frame = Frame::Data(DataFrame::pending(
            self.identity.nickname.clone(),
            head.destination.clone(),
            crc,
            wire_payload.clone(),
        ));
        self.in_flight = Some(InFlight {
            destination: head.destination,
            attempt,
            crc,
            payload: head.payload,
            wire_payload,
        });
        self.awaiting_since = Some(now);

        vec![self.to_next_hop(frame)]
    }

    fn release_token(&mut self, env: &impl Environment) -> RingAction {
        let token = self.token.release(env.now(), env.wall_clock());
        self.awaiting_since = None;
        debug!(node = %self.identity.nickname, sequence = token.sequence, "token released");
        self.to_next_hop(Frame::Token(token))
    }

    fn collision_backoff(&self, env: &impl Environment) -> Duration {
        let min = self.config.collision_backoff_min;
        let max = self.config.collision_backoff_max.max(min);
        let span = (max - min).as_millis() as u64;
        min + Duration::from_millis(env.random_below(span + 1))
    }

    fn to_next_hop(&self, frame: Frame) -> RingAction {
        RingAction::Send { to: self.identity.next_hop, frame }
    }
}
