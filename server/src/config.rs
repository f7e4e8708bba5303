//! Runtime configuration for the game server

use crate::game::{Tile, WinningTilePolicy};
use shared::BOARD_SIZE;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CLIENTS: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("round timeout must be greater than zero")]
    ZeroRoundTimeout,
    #[error("max clients must be greater than zero")]
    ZeroMaxClients,
    #[error("winning tile must look like 'x,y', got '{0}'")]
    MalformedTile(String),
    #[error("winning tile ({x}, {y}) is outside the {size}x{size} board")]
    TileOutOfBounds { x: usize, y: usize, size: usize },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub address: String,
    /// Maximum number of concurrent connections, spectators included
    pub max_clients: usize,
    /// How long a round may run before the watchdog resets it
    pub round_timeout: Duration,
    pub winning_tile: WinningTilePolicy,
}

impl ServerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            max_clients: DEFAULT_MAX_CLIENTS,
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            winning_tile: WinningTilePolicy::Random,
        }
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn with_round_timeout(mut self, round_timeout: Duration) -> Self {
        self.round_timeout = round_timeout;
        self
    }

    pub fn with_winning_tile(mut self, policy: WinningTilePolicy) -> Self {
        self.winning_tile = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.round_timeout.is_zero() {
            return Err(ConfigError::ZeroRoundTimeout);
        }
        if self.max_clients == 0 {
            return Err(ConfigError::ZeroMaxClients);
        }
        if let WinningTilePolicy::Fixed(tile) = self.winning_tile {
            check_tile(tile.x, tile.y)?;
        }
        Ok(())
    }
}

/// Parses a `x,y` pair as given on the command line
pub fn parse_tile(input: &str) -> Result<Tile, ConfigError> {
    let malformed = || ConfigError::MalformedTile(input.to_string());

    let (x, y) = input.split_once(',').ok_or_else(malformed)?;
    let x: usize = x.trim().parse().map_err(|_| malformed())?;
    let y: usize = y.trim().parse().map_err(|_| malformed())?;

    check_tile(x, y)?;
    Ok(Tile { x, y })
}

fn check_tile(x: usize, y: usize) -> Result<(), ConfigError> {
    if x >= BOARD_SIZE || y >= BOARD_SIZE {
        return Err(ConfigError::TileOutOfBounds {
            x,
            y,
            size: BOARD_SIZE,
        });
    }
    Ok(())
}
