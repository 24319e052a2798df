//! CLI for bidding and querying the auction

use clap::{Parser, Subcommand};
use ringbid::client::ReplicaClient;
use ringbid::common::{parse_duration_ms, ClientConfig, Config};
use ringbid::AuctionClient;

#[derive(Parser)]
#[command(name = "ringbid")]
#[command(about = "ringbid auction client")]
#[command(version)]
struct Cli {
    /// Replica URLs in priority order (comma-separated)
    #[arg(long, value_delimiter = ',')]
    replicas: Vec<String>,

    /// Per-call timeout (e.g. 2s)
    #[arg(long)]
    timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place a bid on every replica
    Bid {
        /// Amount to bid
        amount: f64,

        /// Bidder display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Ask the first reachable replica for the current result
    Result,

    /// Show every replica's status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let file_config = Config::load()?.client.unwrap_or_default();

    let mut config = ClientConfig {
        replicas: if cli.replicas.is_empty() {
            file_config.replicas.clone()
        } else {
            cli.replicas.clone()
        },
        ..file_config
    };
    if let Some(timeout) = &cli.timeout {
        config.call_timeout_ms = parse_duration_ms(timeout)?;
    }

    match cli.command {
        Commands::Bid { amount, name } => {
            let name = name
                .or_else(|| config.client_name.clone())
                .ok_or_else(|| anyhow::anyhow!("a bidder name is required (--name)"))?;
            let client = AuctionClient::new(&config)?;
            let results = client.bid(amount, &name).await?;

            println!("Bid of {} by {}:", amount, name);
            for r in results {
                let detail = match &r.result {
                    Ok(ack) => ack.message.clone(),
                    Err(e) => e.to_string(),
                };
                println!("  {} [{}] {}", r.replica, r.verdict(), detail);
            }
        }

        Commands::Result => {
            let client = AuctionClient::new(&config)?;
            let answer = client.result().await?;
            let outcome = answer.outcome;

            println!("Result from {}:", answer.replica);
            if outcome.client_name.is_empty() {
                println!("  No bids yet");
            } else {
                println!("  Highest bid: {} by {}", outcome.amount, outcome.client_name);
            }
            println!(
                "  Auction: {}",
                if outcome.done { "closed" } else { "open" }
            );
        }

        Commands::Status => {
            config.validate()?;
            for address in &config.replicas {
                let client = ReplicaClient::new(address.clone(), config.call_timeout())?;
                match client.status().await {
                    Ok(status) => {
                        println!("{} ({}):", status.node_id, address);
                        println!("  Auction: {} (deadline {})", status.status, status.deadline);
                        match status.highest {
                            Some(h) => println!("  Highest: {} by {}", h.amount, h.client_name),
                            None => println!("  Highest: none"),
                        }
                        println!("  Ledger entries: {}", status.ledger_size);
                        println!("  Pending deltas: {}", status.pending_deltas);
                        println!(
                            "  Token: epoch {} origin {} round {}{}",
                            status.token_epoch,
                            status.token_origin,
                            status.token_round,
                            if status.holding_token { " (holding)" } else { "" }
                        );
                    }
                    Err(e) if e.is_unreachable() => {
                        println!("{}: unreachable ({})", address, e)
                    }
                    Err(e) => println!("{}: error ({})", address, e),
                }
            }
        }
    }

    Ok(())
}
