//! Replica binary

use clap::{Parser, Subcommand};
use ringbid::common::{parse_deadline, parse_duration_ms, Config, ReplicaConfig};
use ringbid::ReplicaServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ringbid-replica")]
#[command(about = "ringbid auction replica with token-ring convergence")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a replica
    Serve {
        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for the RPC surface
        #[arg(long)]
        bind: Option<String>,

        /// Ring successor base URL
        #[arg(long)]
        successor: Option<String>,

        /// Ring predecessor base URL
        #[arg(long)]
        predecessor: Option<String>,

        /// Auction deadline (RFC 3339 timestamp or duration from now, e.g. 5m)
        #[arg(long)]
        deadline: Option<String>,

        /// Timeout for calls to peers (e.g. 2s)
        #[arg(long)]
        call_timeout: Option<String>,

        /// How long to hold the token before passing it on (e.g. 500ms)
        #[arg(long)]
        hold: Option<String>,

        /// Token silence before originating a new generation (e.g. 5s)
        #[arg(long)]
        token_timeout: Option<String>,

        /// Number of replicas on the ring (checks the token timeout covers a lap)
        #[arg(long)]
        ring_size: Option<usize>,

        /// Originate the first token at startup
        #[arg(long)]
        initial_token: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config from file, then override with CLI arguments
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            id,
            bind,
            successor,
            predecessor,
            deadline,
            call_timeout,
            hold,
            token_timeout,
            ring_size,
            initial_token,
        } => {
            let node_id = id.unwrap_or(config.node_id);
            let mut replica_config: ReplicaConfig = config.replica.unwrap_or_default();

            if let Some(bind) = bind {
                replica_config.bind_addr = bind.parse()?;
            }
            if let Some(successor) = successor {
                replica_config.successor = successor;
            }
            if let Some(predecessor) = predecessor {
                replica_config.predecessor = predecessor;
            }
            if let Some(deadline) = deadline {
                replica_config.deadline = Some(parse_deadline(&deadline, chrono::Utc::now())?);
            }
            if let Some(call_timeout) = call_timeout {
                replica_config.call_timeout_ms = parse_duration_ms(&call_timeout)?;
            }
            if let Some(hold) = hold {
                replica_config.hold_interval_ms = parse_duration_ms(&hold)?;
            }
            if let Some(token_timeout) = token_timeout {
                replica_config.token_timeout_ms = parse_duration_ms(&token_timeout)?;
            }
            if ring_size.is_some() {
                replica_config.ring_size = ring_size;
            }
            if initial_token {
                replica_config.initial_token = true;
            }

            // Configuration errors are fatal to the process
            replica_config.validate()?;

            let server = ReplicaServer::new(replica_config, node_id);
            server.serve().await?;
        }
    }

    Ok(())
}
