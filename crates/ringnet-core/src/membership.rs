//! Nickname to endpoint table.
//!
//! Entries are learned from discovery, membership updates and (optionally)
//! data frames, and are never removed. The broadcast sentinel and the
//! node's own nickname are seeded at construction and bound to the local
//! endpoint.

use std::{collections::BTreeMap, net::SocketAddr};

use ringnet_proto::{Announcement, BROADCAST_NICKNAME};

/// Ring membership as seen by one node.
#[derive(Debug, Clone)]
pub struct Membership {
    members: BTreeMap<String, SocketAddr>,
}

impl Membership {
    /// Table seeded with `"ALL"` and `nickname`, both bound to `local`.
    pub fn new(nickname: &str, local: SocketAddr) -> Self {
        let mut members = BTreeMap::new();
        members.insert(BROADCAST_NICKNAME.to_string(), local);
        members.insert(nickname.to_string(), local);
        Self { members }
    }

    /// Endpoint for `nickname`, if known.
    pub fn lookup(&self, nickname: &str) -> Option<SocketAddr> {
        self.members.get(nickname).copied()
    }

    /// Insert `nickname` unless it is already present.
    ///
    /// Returns `true` when the entry is new. Existing entries keep their
    /// endpoint.
    pub fn insert_if_new(&mut self, nickname: &str, endpoint: SocketAddr) -> bool {
        if self.members.contains_key(nickname) {
            return false;
        }
        self.members.insert(nickname.to_string(), endpoint);
        true
    }

    /// Announcements describing every real member except `excluded`.
    ///
    /// Used to bootstrap a newly discovered node. The broadcast sentinel is
    /// never announced.
    pub fn announcements_except(&self, excluded: &str) -> Vec<Announcement> {
        self.members
            .iter()
            .filter(|(nickname, _)| {
                nickname.as_str() != BROADCAST_NICKNAME && nickname.as_str() != excluded
            })
            .map(|(nickname, endpoint)| Announcement::new(nickname.clone(), *endpoint))
            .collect()
    }

    /// Sorted copy of every entry, sentinel included.
    pub fn snapshot(&self) -> Vec<(String, SocketAddr)> {
        self.members.iter().map(|(nickname, endpoint)| (nickname.clone(), *endpoint)).collect()
    }

    /// Number of entries, sentinel included.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`: the sentinel and the node itself are permanent.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
