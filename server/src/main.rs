use clap::{Parser, ValueEnum};
use log::info;
use server::lockstep::LockstepServer;
use server::network::Server;
use server::rollback::RollbackServer;
use server::sequencer::ServerConfig;
use shared::platformer::Platformer;
use std::time::Duration;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SyncMode {
    Lockstep,
    Rollback,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Synchronization strategy
    #[arg(short, long, value_enum, default_value = "lockstep")]
    mode: SyncMode,

    /// Maximum number of connected clients
    #[arg(short = 'c', long, default_value = "32")]
    max_clients: usize,

    /// Consecutive frame mismatches before a client is re-initialized
    #[arg(long)]
    resync_threshold: Option<u32>,

    /// Interval between full-state snapshots, 0 disables them
    #[arg(long, default_value = "0")]
    snapshot_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        max_clients: args.max_clients,
        resync_threshold: args.resync_threshold,
    };
    let snapshot_interval = match args.snapshot_interval_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting {:?} server on {}", args.mode, address);
    info!("Max clients: {}", config.max_clients);
    if let Some(interval) = snapshot_interval {
        info!("Snapshot interval: {:?}", interval);
    }

    match args.mode {
        SyncMode::Lockstep => {
            let sequencer = LockstepServer::new(Platformer, config);
            Server::new(&address, sequencer, snapshot_interval)
                .await?
                .run()
                .await?;
        }
        SyncMode::Rollback => {
            let sequencer = RollbackServer::new(Platformer, config);
            Server::new(&address, sequencer, snapshot_interval)
                .await?
                .run()
                .await?;
        }
    }

    Ok(())
}
