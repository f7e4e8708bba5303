use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// Player name to join with (watch only when omitted)
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Start a round after joining and after every finished round
    #[arg(long)]
    auto_start: bool,

    /// Only watch, never press tiles
    #[arg(long)]
    no_play: bool,

    /// Milliseconds to wait before each press
    #[arg(short = 'd', long, default_value = "500")]
    think_ms: u64,

    /// Leave after this many finished rounds
    #[arg(short = 'r', long)]
    rounds: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let options = ClientOptions {
        name: args.name,
        auto_start: args.auto_start,
        auto_play: !args.no_play,
        think_time: Duration::from_millis(args.think_ms),
        rounds: args.rounds,
    };

    info!("Starting client...");
    let mut client = Client::connect(&args.server, options).await?;
    let rounds = client.run().await?;
    info!("Client finished after {} rounds", rounds);

    Ok(())
}
