use clap::{Parser, ValueEnum};
use client::input::BotInput;
use client::lockstep::LockstepClient;
use client::network::{Client, ClientOptions};
use client::rollback::RollbackClient;
use log::info;
use shared::platformer::Platformer;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SyncMode {
    Lockstep,
    Rollback,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Synchronization strategy, must match the server
    #[arg(short, long, value_enum, default_value = "lockstep")]
    mode: SyncMode,

    /// Local frames per second
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,

    /// Stop after submitting this many frames
    #[arg(short = 'f', long)]
    frames: Option<u32>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Seed for the input bot
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting {:?} client...", args.mode);
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let bot = match args.seed {
        Some(seed) => BotInput::seeded(seed),
        None => BotInput::new(),
    };
    let options = ClientOptions {
        tick_rate: args.tick_rate,
        frame_limit: args.frames,
        fake_ping_ms: args.fake_ping,
    };

    match args.mode {
        SyncMode::Lockstep => {
            let reconciler = LockstepClient::new(Platformer);
            let mut client = Client::connect(&args.server, reconciler, bot, options).await?;
            client.run().await?;
        }
        SyncMode::Rollback => {
            let reconciler = RollbackClient::new(Platformer);
            let mut client = Client::connect(&args.server, reconciler, bot, options).await?;
            client.run().await?;
        }
    }

    Ok(())
}
