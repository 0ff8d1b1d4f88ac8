//! Token controller.
//!
//! Tracks possession of the circulating token and decides whether an
//! arriving token is accepted.
//!
//! # Acceptance
//!
//! ```text
//!             Accept                      release / regenerate
//! ┌────────┐ ───────────────────────> ┌──────┐ ───────────────> ┌────────┐
//! │ Absent │                          │ Held │                  │ Absent │
//! └────────┘ <─────────────────────── └──────┘                  └────────┘
//!      │        surrender (collapse)
//!      │ generator timeout
//!      └───────────────────────> regenerate: sequence past anything seen
//! ```
//!
//! An arriving token is checked in order:
//!
//! 1. **Duplicate**: its sequence is in the recent `seen` memory. The legacy
//!    token carries no sequence and skips this check.
//! 2. **Too fast**: it arrives within `min_interval` of the last accepted
//!    token.
//!
//! The `seen` memory is bounded both by age (`seen_horizon`) and by size
//! (`seen_capacity`); the oldest entry is evicted first.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use ringnet_proto::TokenFrame;

/// Outcome of [`TokenController::on_token_received`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVerdict {
    /// Token accepted, the node now holds it
    Accept,
    /// Sequence was seen recently
    RejectDuplicate,
    /// Arrived within the minimum interval of the last accepted token
    RejectTooFast,
}

/// Token controller configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Generator regenerates when no circulation is observed for this long
    pub max_wait: Duration,
    /// Minimum spacing between two accepted tokens
    pub min_interval: Duration,
    /// Age after which a seen sequence is forgotten
    pub seen_horizon: Duration,
    /// Maximum number of remembered sequences
    pub seen_capacity: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(15),
            min_interval: Duration::from_millis(10),
            seen_horizon: Duration::from_secs(30),
            seen_capacity: 100,
        }
    }
}

/// Counters for token events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenStats {
    /// Tokens accepted
    pub accepted: u64,
    /// Tokens rejected as duplicates
    pub duplicates: u64,
    /// Tokens rejected for arriving too fast
    pub too_fast: u64,
    /// Generator timeouts observed
    pub timeouts: u64,
    /// Tokens regenerated
    pub regenerations: u64,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    /// Whether this node holds the token
    pub held: bool,
    /// Local sequence (next one to be forwarded)
    pub sequence: u64,
    /// Time since the last accept, release or regeneration
    pub since_circulation: Duration,
    /// Number of remembered sequences
    pub remembered: usize,
    /// Event counters
    pub stats: TokenStats,
}

/// Token possession state machine.
///
/// Pure state machine - time is passed to every method that needs it.
#[derive(Debug, Clone)]
pub struct TokenController {
    /// Nickname stamped on tokens this node generates
    nickname: String,
    generator: bool,
    config: TokenConfig,
    held: bool,
    sequence: u64,
    timestamp: f64,
    /// Generator of the token currently circulating
    token_origin: String,
    last_accept: Option<Instant>,
    last_circulation: Instant,
    seen: VecDeque<(u64, Instant)>,
    regenerating: bool,
    bootstrapped: bool,
    stats: TokenStats,
}

impl TokenController {
    /// Create a controller that does not hold the token.
    pub fn new(
        nickname: impl Into<String>,
        generator: bool,
        config: TokenConfig,
        now: Instant,
    ) -> Self {
        let nickname = nickname.into();
        Self {
            token_origin: nickname.clone(),
            nickname,
            generator,
            config,
            held: false,
            sequence: 0,
            timestamp: 0.0,
            last_accept: None,
            last_circulation: now,
            seen: VecDeque::new(),
            regenerating: false,
            bootstrapped: false,
            stats: TokenStats::default(),
        }
    }

    /// Whether this node holds the token.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Whether the generator has injected its initial token.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Current local sequence.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Event counters.
    pub fn stats(&self) -> TokenStats {
        self.stats
    }

    /// Decide whether an arriving token is accepted.
    ///
    /// `token` is `None` for the legacy sequence-less token, which advances
    /// the local sequence by one instead of adopting the received one.
    pub fn on_token_received(
        &mut self,
        token: Option<&TokenFrame>,
        now: Instant,
        wall: f64,
    ) -> TokenVerdict {
        self.forget_expired(now);

        if let Some(token) = token
            && self.seen.iter().any(|(sequence, _)| *sequence == token.sequence)
        {
            self.stats.duplicates += 1;
            return TokenVerdict::RejectDuplicate;
        }

        if let Some(last) = self.last_accept
            && now.duration_since(last) < self.config.min_interval
        {
            self.stats.too_fast += 1;
            return TokenVerdict::RejectTooFast;
        }

        match token {
            Some(token) => {
                self.remember(token.sequence, now);
                self.sequence = token.sequence + 1;
                self.token_origin.clone_from(&token.origin);
            },
            None => self.sequence += 1,
        }

        self.held = true;
        self.timestamp = wall;
        self.last_accept = Some(now);
        self.last_circulation = now;
        self.stats.accepted += 1;

        TokenVerdict::Accept
    }

    /// Check whether the generator should regenerate a lost token.
    ///
    /// Only the generator times out, only once bootstrapped, and never while
    /// it holds the token itself. Sets the regenerating guard so the timeout
    /// is reported once until [`Self::regenerate`] runs.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if !self.generator || !self.bootstrapped || self.held || self.regenerating {
            return false;
        }

        if now.duration_since(self.last_circulation) > self.config.max_wait {
            self.regenerating = true;
            self.stats.timeouts += 1;
            true
        } else {
            false
        }
    }

    /// Issue a replacement token with a sequence past anything seen.
    pub fn regenerate(&mut self, now: Instant, wall: f64) -> TokenFrame {
        let highest_seen = self.seen.iter().map(|(sequence, _)| *sequence).max().unwrap_or(0);
        self.sequence = self.sequence.max(highest_seen) + 1;
        self.token_origin.clone_from(&self.nickname);
        self.timestamp = wall;
        self.held = false;
        self.regenerating = false;
        self.last_circulation = now;
        self.stats.regenerations += 1;

        self.frame()
    }

    /// Initial token injected by the generator (sequence 0).
    pub fn bootstrap(&mut self, now: Instant, wall: f64) -> TokenFrame {
        self.bootstrapped = true;
        self.sequence = 0;
        self.token_origin.clone_from(&self.nickname);
        self.timestamp = wall;
        self.last_circulation = now;

        self.frame()
    }

    /// Give up possession and return the token to forward.
    pub fn release(&mut self, now: Instant, wall: f64) -> TokenFrame {
        self.held = false;
        self.timestamp = wall;
        self.last_circulation = now;

        self.frame()
    }

    /// Drop possession without forwarding anything.
    ///
    /// Used when two tokens collapse into one: the incoming token is
    /// forwarded instead of ours.
    pub fn surrender(&mut self) {
        self.held = false;
    }

    /// Snapshot for the console.
    pub fn status(&self, now: Instant) -> TokenStatus {
        TokenStatus {
            held: self.held,
            sequence: self.sequence,
            since_circulation: now.saturating_duration_since(self.last_circulation),
            remembered: self.seen.len(),
            stats: self.stats,
        }
    }

    fn frame(&self) -> TokenFrame {
        TokenFrame {
            sequence: self.sequence,
            timestamp: self.timestamp,
            origin: self.token_origin.clone(),
        }
    }

    fn remember(&mut self, sequence: u64, now: Instant) {
        self.seen.push_back((sequence, now));
        while self.seen.len() > self.config.seen_capacity {
            self.seen.pop_front();
        }
    }

    fn forget_expired(&mut self, now: Instant) {
        while let Some((_, at)) = self.seen.front() {
            if now.duration_since(*at) <= self.config.seen_horizon {
                break;
            }
            self.seen.pop_front();
        }
    }
}
