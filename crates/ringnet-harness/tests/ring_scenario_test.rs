//! End-to-end ring scenarios on the in-memory world.
//!
//! Every node runs the real engine; only the network and the clock are
//! simulated. Nodes tick every 100ms and the generator injects the first
//! token two seconds after startup.

use std::time::Duration;

use ringnet_core::{DeliveryStatus, NodeConfig};
use ringnet_harness::{Fault, Scenario, World};
use ringnet_proto::{Frame, FrameKind, TokenFrame};

const TIMEOUT: Duration = Duration::from_secs(10);

fn quiet() -> NodeConfig {
    NodeConfig { corruption_probability: 0.0, ..NodeConfig::default() }
}

fn resolved(world: &World, node: &str, status: DeliveryStatus) -> bool {
    world.resolutions_of(node).iter().any(|(_, reported)| *reported == status)
}

fn token_sequences_from(world: &World, node: &str) -> Vec<u64> {
    world
        .transmissions()
        .iter()
        .filter(|sent| sent.from == node)
        .filter_map(|sent| match &sent.frame {
            Frame::Token(token) => Some(token.sequence),
            _ => None,
        })
        .collect()
}

#[test]
fn message_is_acknowledged_and_token_moves_on() {
    Scenario::new("ack")
        .ring(["A", "B"])
        .enqueue("A", "B", "hello")
        .run_until(
            "A's message acknowledged",
            |world| resolved(world, "A", DeliveryStatus::Delivered),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            let a = world.status("A").ok_or("A missing")?;
            assert_eq!(a.queue_len, 0);
            assert!(!a.awaiting_return);
            assert_eq!(world.token_holders(), vec!["B".to_string()]);
            assert_eq!(world.data_sends_by("A"), 1);

            let delivered = world.deliveries_to("B");
            assert_eq!(delivered.len(), 1);
            assert_eq!(delivered[0].origin, "A");
            assert_eq!(delivered[0].destination, "B");
            assert_eq!(delivered[0].payload, "hello");
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn corrupted_send_is_nacked_then_retransmitted_clean() {
    Scenario::new("nack then ack")
        .ring(["A", "B"])
        .node_config("A", NodeConfig { corruption_probability: 1.0, ..NodeConfig::default() })
        .enqueue("A", "B", "hello")
        .run_until(
            "retransmission acknowledged",
            |world| resolved(world, "A", DeliveryStatus::Delivered),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            assert_eq!(
                world.resolutions_of("A"),
                vec![
                    ("B".to_string(), DeliveryStatus::Retrying { attempt: 2 }),
                    ("B".to_string(), DeliveryStatus::Delivered),
                ]
            );
            assert_eq!(world.data_sends_by("A"), 2);

            let delivered = world.deliveries_to("B");
            assert_eq!(delivered.len(), 1);
            assert_eq!(delivered[0].payload, "hello");
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn second_nack_drops_the_message() {
    Scenario::new("double nack")
        .ring(["A", "B"])
        .fault(Fault::CorruptData { from: "A".into(), count: 2 })
        .enqueue("A", "B", "hello")
        .run_until(
            "message dropped",
            |world| resolved(world, "A", DeliveryStatus::Dropped),
            TIMEOUT,
        )
        .run_for(Duration::from_secs(3))
        .oracle(Box::new(|world| {
            assert_eq!(
                world.resolutions_of("A"),
                vec![
                    ("B".to_string(), DeliveryStatus::Retrying { attempt: 2 }),
                    ("B".to_string(), DeliveryStatus::Dropped),
                ]
            );
            assert_eq!(world.data_sends_by("A"), 2);
            assert!(world.deliveries_to("B").is_empty());
            assert_eq!(world.status("A").ok_or("A missing")?.queue_len, 0);
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn unknown_destination_returns_unclaimed_after_one_lap() {
    Scenario::new("unknown destination")
        .ring(["A", "B", "C"])
        .enqueue("A", "Zed", "anyone?")
        .run_until(
            "message came back unclaimed",
            |world| resolved(world, "A", DeliveryStatus::Undeliverable),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            assert_eq!(world.data_sends_by("A"), 1);
            assert_eq!(world.resolutions_of("A").len(), 1);

            let relays = |node: &str| {
                world
                    .transmissions()
                    .iter()
                    .filter(|sent| {
                        sent.from == node
                            && matches!(&sent.frame, Frame::Data(data) if data.origin == "A")
                    })
                    .count()
            };
            assert_eq!(relays("B"), 1);
            assert_eq!(relays("C"), 1);
            assert!(world.deliveries_to("B").is_empty());
            assert!(world.deliveries_to("C").is_empty());
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn broadcast_is_answered_by_the_first_node() {
    Scenario::new("broadcast")
        .ring(["A", "B", "C"])
        .enqueue("A", "ALL", "hi all")
        .run_until(
            "broadcast acknowledged",
            |world| resolved(world, "A", DeliveryStatus::Delivered),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            let delivered = world.deliveries_to("B");
            assert_eq!(delivered.len(), 1);
            assert_eq!(delivered[0].destination, "ALL");
            assert!(world.deliveries_to("C").is_empty());
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn forced_error_marker_is_acknowledged_without_it() {
    Scenario::new("forced error")
        .ring(["A", "B"])
        .enqueue("A", "B", "helloFORCED_ERROR")
        .run_until(
            "message acknowledged",
            |world| resolved(world, "A", DeliveryStatus::Delivered),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            let delivered = world.deliveries_to("B");
            assert_eq!(delivered.len(), 1);
            assert_eq!(delivered[0].payload, "hello");
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn replayed_token_is_dropped_as_duplicate() {
    Scenario::new("duplicate token")
        .ring(["A", "B", "C"])
        .run_until("B holds the token", |world| world.token_holders() == ["B"], TIMEOUT)
        .apply(|world| {
            let b = world.node("B").ok_or("B missing")?.identity().local;
            let a = world.node("A").ok_or("A missing")?.identity().local;
            let last = world
                .transmissions()
                .iter()
                .rev()
                .find(|sent| sent.to == b && sent.frame.kind() == FrameKind::Token)
                .map(|sent| sent.frame.clone())
                .ok_or("no token was sent to B")?;
            world.inject("B", a, &last)
        })
        .oracle(Box::new(|world| {
            let b = world.status("B").ok_or("B missing")?;
            assert_eq!(b.token.stats.duplicates, 1);
            assert!(b.token.held);
            assert_eq!(world.token_holders().len(), 1);
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn second_token_collapses_into_one() {
    Scenario::new("token collision")
        .ring(["A", "B", "C"])
        .run_until("B holds the token", |world| world.token_holders() == ["B"], TIMEOUT)
        .apply(|world| {
            let a = world.node("A").ok_or("A missing")?.identity().local;
            let stray =
                Frame::Token(TokenFrame { sequence: 1_000, timestamp: 0.0, origin: "X".into() });
            world.inject("B", a, &stray)
        })
        .run_for(Duration::from_secs(5))
        .oracle(Box::new(|world| {
            let b = world.status("B").ok_or("B missing")?;
            assert_eq!(b.token.stats.too_fast, 1);
            assert!(world.token_holders().len() <= 1);

            let last = world
                .transmissions()
                .iter()
                .rev()
                .find_map(|sent| match &sent.frame {
                    Frame::Token(token) => Some(token.sequence),
                    _ => None,
                })
                .ok_or("no token circulating")?;
            assert!(last >= 1_000, "stray token should have replaced ours, last was {last}");
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn generator_regenerates_lost_token() {
    Scenario::new("lost token")
        .ring(["A", "B", "C"])
        .config(NodeConfig { max_token_wait: Duration::from_secs(2), ..quiet() })
        .run_until(
            "token completed a lap",
            |world| world.status("A").is_some_and(|a| a.token.stats.accepted >= 1),
            TIMEOUT,
        )
        .fault(Fault::Drop { from: "B".into(), kind: FrameKind::Token, count: 1 })
        .run_until(
            "generator regenerated",
            |world| world.status("A").is_some_and(|a| a.token.stats.regenerations >= 1),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            let a = world.status("A").ok_or("A missing")?;
            assert_eq!(a.token.stats.timeouts, 1);
            assert_eq!(world.lost(), 1);

            let sent = token_sequences_from(world, "A");
            let [.., previous, regenerated] = sent.as_slice() else {
                return Err(format!("expected at least two tokens from A, got {sent:?}"));
            };
            assert_eq!(*regenerated, previous + 1);
            assert_eq!(world.token_holders(), vec!["B".to_string()]);
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn membership_converges_from_announcements() {
    Scenario::new("discovery")
        .ring(["A", "B", "C", "D"])
        .oracle(Box::new(|world| {
            let expected: Vec<_> = ["A", "B", "C", "D"]
                .iter()
                .map(|name| world.node(name).map(|node| node.identity().local))
                .collect::<Option<_>>()
                .ok_or("node missing")?;

            for name in world.node_names() {
                let members = world.node(&name).ok_or("node missing")?.membership_snapshot();
                assert_eq!(members.len(), 5, "{name} knows {members:?}");
                for (nickname, endpoint) in ["A", "B", "C", "D"].iter().zip(&expected) {
                    assert!(
                        members.contains(&((*nickname).to_string(), *endpoint)),
                        "{name} is missing {nickname}"
                    );
                }
            }
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn refused_send_is_retried_without_counting_an_attempt() {
    Scenario::new("send failure")
        .ring(["A", "B"])
        .fault(Fault::FailSend { from: "A".into(), kind: FrameKind::Data, count: 1 })
        .enqueue("A", "B", "hello")
        .run_until(
            "message acknowledged",
            |world| resolved(world, "A", DeliveryStatus::Delivered),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            assert_eq!(world.resolutions_of("A"), vec![("B".into(), DeliveryStatus::Delivered)]);
            assert_eq!(world.data_sends_by("A"), 1);
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn lost_message_is_resent_after_hold_expires() {
    Scenario::new("hold expiry")
        .ring(["A", "B"])
        .config(NodeConfig { token_hold: Duration::from_secs(1), ..quiet() })
        .fault(Fault::Drop { from: "A".into(), kind: FrameKind::Data, count: 1 })
        .enqueue("A", "B", "hello")
        .run_until(
            "message acknowledged",
            |world| resolved(world, "A", DeliveryStatus::Delivered),
            TIMEOUT,
        )
        .oracle(Box::new(|world| {
            assert_eq!(world.resolutions_of("A"), vec![("B".into(), DeliveryStatus::Delivered)]);
            assert_eq!(world.data_sends_by("A"), 2);
            assert_eq!(world.deliveries_to("B").len(), 1);
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn busy_ring_with_corruption_delivers_everything() {
    let mut scenario = Scenario::new("busy ring")
        .ring(["A", "B", "C"])
        .config(NodeConfig { corruption_probability: 0.2, ..NodeConfig::default() })
        .seed(7);

    for (from, to) in [("A", "B"), ("B", "C"), ("C", "A")] {
        for n in 0..3 {
            scenario = scenario.enqueue(from, to, format!("{from} to {to} #{n}"));
        }
    }

    scenario
        .run_for(Duration::from_secs(60))
        .oracle(Box::new(|world| {
            for name in world.node_names() {
                let status = world.status(&name).ok_or("node missing")?;
                assert_eq!(status.queue_len, 0, "{name} still has messages");

                let finals: Vec<_> = world
                    .resolutions_of(&name)
                    .into_iter()
                    .filter(|(_, status)| !matches!(status, DeliveryStatus::Retrying { .. }))
                    .collect();
                assert_eq!(finals.len(), 3);
                assert!(finals.iter().all(|(_, status)| *status == DeliveryStatus::Delivered));
                assert_eq!(world.deliveries_to(&name).len(), 3);
            }
            assert!(world.token_holders().len() <= 1);
            Ok(())
        }))
        .run()
        .unwrap();
}
