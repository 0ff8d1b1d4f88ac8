//! Line console.
//!
//! Reads commands from stdin, answers on stdout and echoes node events as
//! they arrive. Rendering is kept separate from I/O so it can be tested.

use std::{fmt::Write as _, io, net::SocketAddr};

use ringnet_core::{DeliveryStatus, Environment, NodeStatus, QueuedMessage};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};

use crate::{
    commands::{self, Command, HELP},
    runtime::{NodeEvent, NodeHandle},
};

/// Reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text to print
    Output(String),
    /// Nothing to print
    Silent,
    /// Stop the console
    Quit,
}

/// Run the console until `/quit` or end of input.
pub async fn run<E: Environment>(
    handle: NodeHandle<E>,
    mut events: mpsc::UnboundedReceiver<NodeEvent>,
) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    write(&mut stdout, HELP).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(()) };
                match execute(&handle, commands::parse(&line)) {
                    Reply::Output(text) => write(&mut stdout, &text).await?,
                    Reply::Silent => {},
                    Reply::Quit => return Ok(()),
                }
            },
            Some(event) = events.recv() => write(&mut stdout, &render_event(&event)).await?,
        }
    }
}

/// Apply a parsed command to the node.
pub fn execute<E: Environment>(handle: &NodeHandle<E>, command: Command) -> Reply {
    match command {
        Command::Message { content, .. } if content.is_empty() => Reply::Silent,
        Command::Message { destination, content } => {
            match handle.enqueue(&destination, &content) {
                Ok(()) => Reply::Output(format!("queued for {destination}\n")),
                Err(error) => Reply::Output(format!("not queued: {error}\n")),
            }
        },
        Command::Queue => Reply::Output(render_queue(&handle.queue_snapshot())),
        Command::Members => Reply::Output(render_members(&handle.membership_snapshot())),
        Command::Status => Reply::Output(render_status(&handle.status())),
        Command::Help => Reply::Output(HELP.to_string()),
        Command::Quit => Reply::Quit,
        Command::Unknown { input } => {
            Reply::Output(format!("unknown command {input:?}, try /help\n"))
        },
        Command::InvalidArgs { error, .. } => Reply::Output(format!("{error}\n")),
    }
}

/// Queue listing, head first.
pub fn render_queue(messages: &[QueuedMessage]) -> String {
    if messages.is_empty() {
        return "queue is empty\n".to_string();
    }

    let mut out = String::new();
    for (position, message) in messages.iter().enumerate() {
        let retry = if message.retransmit { " (retransmit)" } else { "" };
        let _ = writeln!(
            out,
            "{}. to {} after {} failed send(s){retry}: {}",
            position + 1,
            message.destination,
            message.attempts,
            message.payload
        );
    }
    out
}

/// Membership listing.
pub fn render_members(members: &[(String, SocketAddr)]) -> String {
    let mut out = String::new();
    for (nickname, endpoint) in members {
        let _ = writeln!(out, "{nickname:<12} {endpoint}");
    }
    out
}

/// Status summary.
pub fn render_status(status: &NodeStatus) -> String {
    let token = &status.token;
    let holder = if token.held { "held" } else { "absent" };
    format!(
        "{}: token {holder} (sequence {}, last circulation {:.1}s ago), \
         {} queued{}, {} members\n\
         tokens: {} accepted, {} duplicate, {} too fast, {} timeouts, {} regenerated\n",
        status.nickname,
        token.sequence,
        token.since_circulation.as_secs_f64(),
        status.queue_len,
        if status.awaiting_return { ", awaiting return" } else { "" },
        status.members,
        token.stats.accepted,
        token.stats.duplicates,
        token.stats.too_fast,
        token.stats.timeouts,
        token.stats.regenerations,
    )
}

/// One-line description of a node event.
pub fn render_event(event: &NodeEvent) -> String {
    match event {
        NodeEvent::Delivered { origin, destination, payload } => {
            format!("[{origin} -> {destination}] {payload}\n")
        },
        NodeEvent::Resolved { destination, status } => match status {
            DeliveryStatus::Delivered => format!("message to {destination} acknowledged\n"),
            DeliveryStatus::Retrying { attempt } => {
                format!("message to {destination} rejected, sending attempt {attempt}\n")
            },
            DeliveryStatus::Dropped => {
                format!("message to {destination} rejected again, dropped\n")
            },
            DeliveryStatus::Undeliverable => format!("{destination} is not on the ring\n"),
        },
    }
}

async fn write(stdout: &mut tokio::io::Stdout, text: &str) -> io::Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await
}
