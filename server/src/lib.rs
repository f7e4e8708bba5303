//! # Tile Hunt Server Library
//!
//! Authoritative server for a small party game: players join a shared lobby
//! over WebSocket, take turns pressing tiles on a 4×4 board, and the first to
//! press the hidden winning tile ends the round. The server holds the only
//! copy of the winning tile and pushes the public state to every connection
//! after each change.
//!
//! ## Architecture
//!
//! ### Single Owner of State
//! All game transitions run on one task that owns the [`game::GameState`],
//! the connection registry and the round watchdog. Connection tasks and
//! timers only send events to it, so transitions never interleave and no lock
//! guards the state.
//!
//! ### Snapshot Protocol
//! Every outbound message carries the full public snapshot of the game. A
//! client never has to merge partial updates; the latest message is the
//! truth.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The state machine: join, start, press, disconnect and reset, each either
//! applied completely or rejected without side effects.
//!
//! ### Protocol Module (`protocol`)
//! Validates inbound messages, applies them to the game, and decides who hears
//! about the result.
//!
//! ### Client Manager Module (`client_manager`)
//! Live connections, the player name each one claimed, and their outbound
//! queues.
//!
//! ### Watchdog Module (`watchdog`)
//! Bounds the length of a round. Stale timers from finished rounds are
//! ignored.
//!
//! ### Network Module (`network`)
//! WebSocket accept loop, per-connection reader and writer tasks, and the game
//! loop.
//!
//! ### Config Module (`config`)
//! Listen address, connection cap, round timeout and winning tile policy.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("127.0.0.1:3000")
//!         .with_round_timeout(Duration::from_secs(30));
//!
//!     let server = Server::new(&config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod protocol;
pub mod watchdog;
