//! # Tile Hunt Client Library
//!
//! A headless client for the tile hunt server. It keeps a local copy of the
//! public game state, applies the same checks the browser client makes before
//! sending anything, and can play on its own: join under a name, start rounds,
//! and press a random free tile whenever it is its turn.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The local mirror of the server snapshot and the turn/tile checks built on
//! it.
//!
//! ### Input Module (`input`)
//! Chooses the next press.
//!
//! ### Network Module (`network`)
//! WebSocket connection and the message loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions {
//!         name: Some("Ada".to_string()),
//!         auto_start: true,
//!         rounds: Some(3),
//!         ..ClientOptions::default()
//!     };
//!
//!     let mut client = Client::connect("ws://127.0.0.1:3000", options).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
