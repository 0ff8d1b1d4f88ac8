//! ringnet-node: one station of a token ring over UDP.
//!
//! Reads its identity from a configuration file and/or flags, binds the
//! local socket and runs until `/quit` (or forever with `--no-console`).

use std::process::ExitCode;

use clap::Parser;
use ringnet_core::{Environment, RingNode, SystemEnv};
use ringnet_node::{Args, NodeError, Runtime, Settings, UdpTransport, console};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "node stopped");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<(), NodeError> {
    let settings = Settings::resolve(&args)?;
    let identity = settings.identity;

    let transport = UdpTransport::bind(identity.local).await?;
    let env = SystemEnv;

    info!(
        nickname = %identity.nickname,
        local = %identity.local,
        next_hop = %identity.next_hop,
        generator = identity.generator,
        "starting node"
    );

    let node = RingNode::new(identity, settings.node, env.now());
    let (runtime, events) = Runtime::new(node, transport, env, settings.poll_interval);

    if settings.console {
        let handle = runtime.handle();
        tokio::select! {
            result = runtime.run() => result?,
            result = console::run(handle, events) => result?,
        }
    } else {
        drop(events);
        runtime.run().await?;
    }

    info!("node stopped");
    Ok(())
}
