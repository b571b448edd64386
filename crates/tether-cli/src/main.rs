//! TETHER CLI
//!
//! Transparent Endpoint Tunneling over Hosted Relays.

mod config;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use config::Config;
use tether_core::{CommandStatus, ConnectionRegistry, JoinFilter, Role};
use tether_discovery::{DirectConnect, DiscoveryStrategy, StaticRoster};
use tether_transport::MemoryRelayHub;

/// TETHER - game UDP traffic over NAT-traversing relays
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version = tether_core::VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a host and a client in this process over the in-memory
    /// relay, bridging two local UDP ports
    Loopback {
        /// Admission filter for the host side
        #[arg(long, default_value = "controlled")]
        filter: String,

        /// UDP address of the local game server the host forwards to
        #[arg(long)]
        game_addr: Option<SocketAddr>,

        /// Seconds to run before shutting down (0 = until killed)
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref())?;

    let log_filter = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone())
    };
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    match cli.command {
        Commands::Loopback {
            filter,
            game_addr,
            duration,
        } => {
            let filter: JoinFilter = filter.parse()?;
            run_loopback(config, filter, game_addr, duration)?;
        }
    }

    Ok(())
}

/// Host and client registries in one process, joined over the
/// in-memory relay: everything a real deployment does, minus the NAT.
fn run_loopback(
    config: Config,
    filter: JoinFilter,
    game_addr: Option<SocketAddr>,
    duration: u64,
) -> anyhow::Result<()> {
    let hub = MemoryRelayHub::new();

    let mut host_config = config.tunnel.clone();
    host_config.join_filter = filter;
    host_config.game_addr = game_addr.or(host_config.game_addr);
    let mut host = ConnectionRegistry::new(
        host_config,
        Arc::new(hub.endpoint("loopback-host")),
        Arc::new(StaticRoster::new("loopback-host").with_friend("loopback-client")),
    );

    let mut client_config = config.tunnel.clone();
    client_config.join_filter = JoinFilter::Off;
    let mut client = ConnectionRegistry::new(
        client_config,
        Arc::new(hub.endpoint("loopback-client")),
        Arc::new(StaticRoster::new("loopback-client").with_friend("loopback-host")),
    );

    host.tick();
    client.tick();
    host.open_endpoint()?;

    let (status, command) = host.connect_command();
    let request = match (status, command) {
        (CommandStatus::Ok, Some(command)) => {
            info!("shareable connect command: {command}");
            DirectConnect.resolve(&command)?
        }
        _ => DirectConnect.resolve("loopback-host")?,
    };
    client.request_connect(&request.target, request.password.as_deref())?;

    let started = Instant::now();
    let mut announced_port = None;
    loop {
        host.tick();
        client.tick();

        if announced_port.is_none() {
            if let Some(peer) = client.peers().first() {
                if peer.game_ready() {
                    announced_port = Some(peer.port());
                    info!(
                        port = peer.port(),
                        "tunnel up: point the game client at 127.0.0.1:{}",
                        peer.port()
                    );
                }
            }
        }
        if client.role() == Role::NotConnected {
            warn!("tunnel down: connection rejected or closed");
            break;
        }
        if duration > 0 && started.elapsed() >= Duration::from_secs(duration) {
            break;
        }
        std::thread::sleep(Duration::from_millis(15));
    }

    info!("shutting down");
    client.close_all(true);
    host.close_all(true);
    host.close_endpoint();
    Ok(())
}
