//! The real async runtime on a simulated UDP network.
//!
//! Each turmoil host runs one node with [`SimTransport`] and a runtime-clock
//! [`SimEnv`], so the receiver and manager tasks, delayed sends, and the
//! event stream are all exercised as in production.

use std::{
    error::Error,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use ringnet_core::{DeliveryStatus, Environment, NodeConfig, NodeIdentity, RingNode, Transport};
use ringnet_harness::{SimEnv, SimTransport};
use ringnet_node::{NodeEvent, Runtime};
use tokio::sync::mpsc::UnboundedReceiver;

const PORT: u16 = 6000;
const POLL: Duration = Duration::from_millis(100);

fn any_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, PORT))
}

fn identity(nickname: &str, host: &str, next: &str, generator: bool) -> NodeIdentity {
    NodeIdentity {
        nickname: nickname.into(),
        local: SocketAddr::new(turmoil::lookup(host), PORT),
        next_hop: SocketAddr::new(turmoil::lookup(next), PORT),
        generator,
    }
}

fn config() -> NodeConfig {
    NodeConfig {
        corruption_probability: 0.0,
        startup_delay: Duration::from_millis(500),
        ..NodeConfig::default()
    }
}

async fn run_node(nickname: &str, host: &str, next: &str) -> Result<(), Box<dyn Error>> {
    let env = SimEnv::runtime_clock(2);
    let transport = SimTransport::bind(any_addr()).await?;
    let node = RingNode::new(identity(nickname, host, next, false), config(), env.now());
    let (runtime, _events) = Runtime::new(node, transport, env, POLL);
    runtime.run().await?;
    Ok(())
}

async fn next_resolution(events: &mut UnboundedReceiver<NodeEvent>) -> Option<DeliveryStatus> {
    while let Some(event) = events.recv().await {
        if let NodeEvent::Resolved { status, .. } = event {
            return Some(status);
        }
    }
    None
}

#[test]
fn datagrams_cross_the_simulated_network() {
    let mut sim = turmoil::Builder::new().build();

    sim.host("b", || async {
        let transport = SimTransport::bind(any_addr()).await?;
        let mut buffer = [0u8; 64];
        let (len, from) = transport.recv_from(&mut buffer).await?;
        transport.send_to(&buffer[..len], from).await?;
        Ok(())
    });

    sim.client("a", async {
        let transport = SimTransport::bind(any_addr()).await?;
        let b = SocketAddr::new(turmoil::lookup("b"), PORT);

        transport.send_to(b"9000", b).await?;
        let mut buffer = [0u8; 64];
        let (len, from) = transport.recv_from(&mut buffer).await?;

        assert_eq!(&buffer[..len], b"9000");
        assert_eq!(from, b);
        Ok(())
    });

    sim.run().expect("simulation should complete");
}

#[test]
fn message_is_acknowledged_over_udp() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(30)).build();

    sim.host("b", || run_node("B", "b", "a"));

    sim.client("a", async {
        let env = SimEnv::runtime_clock(1);
        let transport = SimTransport::bind(any_addr()).await?;
        let node = RingNode::new(identity("A", "a", "b", true), config(), env.now());
        let (runtime, mut events) = Runtime::new(node, transport, env, POLL);
        let handle = runtime.handle();
        handle.enqueue("B", "hello over udp")?;

        let outcome: Result<(), Box<dyn Error>> = tokio::select! {
            result = runtime.run() => Err(format!("runtime stopped: {result:?}").into()),
            status = next_resolution(&mut events) => {
                assert_eq!(status, Some(DeliveryStatus::Delivered));
                assert!(handle.queue_snapshot().is_empty());
                Ok(())
            },
        };
        outcome
    });

    sim.run().expect("message should be delivered");
}

#[test]
fn token_circulates_between_runtimes() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(30)).build();

    sim.host("b", || run_node("B", "b", "c"));
    sim.host("c", || run_node("C", "c", "a"));

    sim.client("a", async {
        let env = SimEnv::runtime_clock(1);
        let transport = SimTransport::bind(any_addr()).await?;
        let node = RingNode::new(identity("A", "a", "b", true), config(), env.now());
        let (runtime, _events) = Runtime::new(node, transport, env, POLL);
        let handle = runtime.handle();

        let outcome: Result<(), Box<dyn Error>> = tokio::select! {
            result = runtime.run() => Err(format!("runtime stopped: {result:?}").into()),
            () = tokio::time::sleep(Duration::from_secs(5)) => {
                let accepted = handle.status().token.stats.accepted;
                assert!(accepted >= 3, "token reached A only {accepted} times");
                let status = handle.status();
                assert_eq!(status.token.stats.regenerations, 0);
                assert_eq!(handle.membership_snapshot().len(), 4);
                Ok(())
            },
        };
        outcome
    });

    sim.run().expect("token should circulate");
}
