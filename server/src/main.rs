use clap::Parser;
use log::info;
use server::config::{parse_tile, ServerConfig, DEFAULT_MAX_CLIENTS};
use server::game::WinningTilePolicy;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Maximum concurrent connections, spectators included
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Seconds a round may last before it is reset
    #[arg(short = 't', long, default_value = "30")]
    round_timeout_secs: u64,

    /// Pin the winning tile, e.g. "0,0" (random when omitted)
    #[arg(short, long, value_parser = parse_tile)]
    winning_tile: Option<server::game::Tile>,
}

/// Parses command-line arguments, then runs the server until it stops or Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let policy = match args.winning_tile {
        Some(tile) => {
            info!("Winning tile pinned to ({}, {})", tile.x, tile.y);
            WinningTilePolicy::Fixed(tile)
        }
        None => WinningTilePolicy::Random,
    };
    let config = ServerConfig::new(format!("{}:{}", args.host, args.port))
        .with_max_clients(args.max_clients)
        .with_round_timeout(Duration::from_secs(args.round_timeout_secs))
        .with_winning_tile(policy);

    let server = Server::new(&config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
