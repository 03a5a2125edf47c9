//! Ledger node binary
//!
//! Starts the HTTP surface, joins the peer network and bootstraps a chain.

use clap::Parser;
use gossip_ledger::config::{
    parse_difficulty, ConsensusParams, FundsPolicy, NodeConfig, DEFAULT_SEEN_CACHE_SIZE,
};
use gossip_ledger::network::{ChainOrigin, Node, NodeAddr};
use gossip_ledger::create_router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ledger-node")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A minimal proof-of-work ledger node with peer gossip", long_about = None)]
struct Cli {
    /// Hostname peers use to reach this node
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the HTTP surface
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Directory for the mempool, known peers and wallet files
    #[arg(short, long, default_value = ".ledger_data")]
    data_dir: PathBuf,

    /// Leading zero hex characters required in a block hash (at most 64)
    #[arg(long, default_value = "4", value_parser = parse_difficulty)]
    difficulty: usize,

    /// Coinbase reward per block
    #[arg(long, default_value = "50")]
    reward: u64,

    /// Require inputs to equal outputs exactly (no fees)
    #[arg(long)]
    exact_funds: bool,

    /// Bootstrap peer as host:port (repeatable)
    #[arg(long = "peer")]
    peers: Vec<NodeAddr>,

    /// Hex private key for the node wallet
    #[arg(long)]
    private_key: Option<String>,

    /// Timeout for outbound peer calls in milliseconds
    #[arg(long, default_value = "5000")]
    peer_timeout_ms: u64,
}

impl Cli {
    fn into_config(self) -> NodeConfig {
        let funds_policy = if self.exact_funds {
            FundsPolicy::Exact
        } else {
            FundsPolicy::AllowFee
        };

        NodeConfig {
            identity: NodeAddr::new(self.host, self.port),
            data_dir: self.data_dir,
            consensus: ConsensusParams {
                difficulty: self.difficulty,
                block_reward: self.reward,
                funds_policy,
            },
            peer_timeout: Duration::from_millis(self.peer_timeout_ms),
            bootstrap_peers: self.peers,
            seen_cache_size: DEFAULT_SEEN_CACHE_SIZE,
            private_key: self.private_key,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config();
    let node = Arc::new(Node::from_config(&config)?);

    println!("⛓️  Ledger node {}", node.identity());
    println!("   Wallet:     {}", node.wallet().public_key_hash());
    println!("   Difficulty: {}", config.consensus.difficulty);
    println!("   Data dir:   {}", config.data_dir.display());

    // Bind before joining so peers can call back during bootstrap
    let addr = format!("0.0.0.0:{}", config.identity.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let app = create_router(node.clone());

    let bootstrap = node.clone();
    tokio::spawn(async move {
        match bootstrap.initialize().await {
            Ok(ChainOrigin::Existing) => log::info!("Chain already populated"),
            Ok(ChainOrigin::Adopted { peer, length }) => {
                log::info!("Synchronised {} blocks from {}", length, peer)
            }
            Ok(ChainOrigin::Genesis) => log::info!("Started a new chain"),
            Err(e) => log::error!("Bootstrap failed: {}", e),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            println!("\n📴 Shutting down node...");
        })
        .await?;

    node.leave()?;
    Ok(())
}
