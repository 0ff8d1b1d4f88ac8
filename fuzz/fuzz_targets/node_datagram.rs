//! Feed arbitrary datagrams to a node. It must never panic and never emit a
//! frame it could not decode itself.

#![no_main]

use std::net::SocketAddr;

use libfuzzer_sys::fuzz_target;
use ringnet_core::{NodeConfig, NodeIdentity, RingAction, RingNode, SystemEnv};
use ringnet_proto::Frame;

fuzz_target!(|datagrams: Vec<Vec<u8>>| {
    let env = SystemEnv;
    let identity = NodeIdentity {
        nickname: "Fuzz".into(),
        local: SocketAddr::from(([127, 0, 0, 1], 6000)),
        next_hop: SocketAddr::from(([127, 0, 0, 1], 6001)),
        generator: true,
    };
    let mut node = RingNode::new(identity, NodeConfig::default(), std::time::Instant::now());
    let from = SocketAddr::from(([127, 0, 0, 1], 6002));

    for datagram in &datagrams {
        for action in node.handle_datagram(datagram, from, &env) {
            if let RingAction::Send { frame, .. } | RingAction::SendAfter { frame, .. } = action {
                Frame::decode(&frame.encode()).expect("emitted frame decodes");
            }
        }
    }
});
