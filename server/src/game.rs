//! Authoritative game state and the transitions it accepts
//!
//! [`GameState`] is the single source of truth for the lobby: the roster, the
//! board, whose turn it is and the hidden winning tile. Every method is a
//! complete transition; a rejected transition leaves the state untouched.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{empty_board, Board, GameSnapshot, TileStatus, BOARD_SIZE};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
}

/// How the winning tile is chosen when a round starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WinningTilePolicy {
    #[default]
    Random,
    /// Always the same tile. Handy when testing a client by hand.
    Fixed(Tile),
}

/// Identifies the room a game and its connections belong to.
/// The server runs a single lobby room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub fn lobby() -> Self {
        RoomId("lobby".to_string())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::lobby()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    #[error("A game is already in progress.")]
    GameInProgress,
    #[error("This player has already joined the game. Please enter a different name.")]
    DuplicateName,
    #[error("You have already joined the game.")]
    AlreadyJoined,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("game already in progress")]
    AlreadyInProgress,
    #[error("no players have joined")]
    NoPlayers,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PressError {
    #[error("no game in progress")]
    NoGameInProgress,
    #[error("press received out of turn")]
    OutOfTurn,
    #[error("tile ({x}, {y}) is off the board")]
    OutOfBounds { x: i64, y: i64 },
    #[error("tile ({x}, {y}) was already pressed")]
    AlreadyPressed { x: usize, y: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Not the winning tile; the turn moved on
    TilePressed,
    /// The winning tile was found. The caller broadcasts, then calls
    /// [`GameState::finish_victory`].
    Victory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The name was not seated, nothing changed
    NotSeated,
    /// A seated player left while no round was running
    Left,
    /// A seated player left mid-round and the round was reset
    RoundAbandoned,
}

#[derive(Debug)]
pub struct GameState {
    room: RoomId,
    game_in_progress: bool,
    players: Vec<String>,
    board: Board,
    current_player: Option<usize>,
    winning_tile: Option<Tile>,
    /// Incremented at every round start, used to tag watchdog timers
    round: u64,
    policy: WinningTilePolicy,
    rng: StdRng,
}

impl GameState {
    pub fn new(policy: WinningTilePolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    pub fn with_rng(policy: WinningTilePolicy, rng: StdRng) -> Self {
        Self {
            room: RoomId::lobby(),
            game_in_progress: false,
            players: Vec::new(),
            board: empty_board(),
            current_player: None,
            winning_tile: None,
            round: 0,
            policy,
            rng,
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn game_in_progress(&self) -> bool {
        self.game_in_progress
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn current_player_name(&self) -> Option<&str> {
        self.current_player
            .and_then(|index| self.players.get(index))
            .map(String::as_str)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_in_progress: self.game_in_progress,
            players: self.players.clone(),
            board: self.board,
            current_id: self.current_player,
        }
    }

    pub fn join(&mut self, name: &str) -> Result<GameSnapshot, JoinError> {
        if self.game_in_progress {
            return Err(JoinError::GameInProgress);
        }
        if self.players.iter().any(|player| player == name) {
            return Err(JoinError::DuplicateName);
        }

        self.players.push(name.to_string());
        info!("Player '{}' joined {} ({} seated)", name, self.room, self.players.len());
        Ok(self.snapshot())
    }

    pub fn start(&mut self) -> Result<GameSnapshot, StartError> {
        if self.game_in_progress {
            return Err(StartError::AlreadyInProgress);
        }
        if self.players.is_empty() {
            return Err(StartError::NoPlayers);
        }

        self.board = empty_board();
        self.current_player = Some(self.rng.gen_range(0..self.players.len()));
        self.winning_tile = Some(match self.policy {
            WinningTilePolicy::Random => Tile {
                x: self.rng.gen_range(0..BOARD_SIZE),
                y: self.rng.gen_range(0..BOARD_SIZE),
            },
            WinningTilePolicy::Fixed(tile) => tile,
        });
        self.game_in_progress = true;
        self.round += 1;

        info!(
            "Round {} started with {} players, '{}' goes first",
            self.round,
            self.players.len(),
            self.current_player_name().unwrap_or_default()
        );
        Ok(self.snapshot())
    }

    pub fn press(&mut self, name: &str, x: i64, y: i64) -> Result<PressOutcome, PressError> {
        if !self.game_in_progress {
            return Err(PressError::NoGameInProgress);
        }
        if self.current_player_name() != Some(name) {
            return Err(PressError::OutOfTurn);
        }

        let (col, row) = match (usize::try_from(x), usize::try_from(y)) {
            (Ok(col), Ok(row)) if col < BOARD_SIZE && row < BOARD_SIZE => (col, row),
            _ => return Err(PressError::OutOfBounds { x, y }),
        };
        if self.board[row][col] != TileStatus::Unpressed {
            return Err(PressError::AlreadyPressed { x: col, y: row });
        }

        if self.winning_tile == Some(Tile { x: col, y: row }) {
            self.board[row][col] = TileStatus::Winning;
            info!("'{}' found the winning tile ({}, {})", name, col, row);
            return Ok(PressOutcome::Victory);
        }

        self.board[row][col] = TileStatus::Pressed;
        self.advance_turn();
        debug!("'{}' pressed ({}, {})", name, col, row);
        Ok(PressOutcome::TilePressed)
    }

    /// Removes a player from the roster. Abandons the running round if the
    /// player was seated in it.
    pub fn disconnect(&mut self, name: &str) -> DisconnectOutcome {
        let Some(index) = self.players.iter().position(|player| player == name) else {
            return DisconnectOutcome::NotSeated;
        };

        self.players.remove(index);
        info!("Player '{}' left {}", name, self.room);

        if self.game_in_progress {
            self.reset();
            DisconnectOutcome::RoundAbandoned
        } else {
            DisconnectOutcome::Left
        }
    }

    /// Ends the current round. The board keeps its tiles until the next start.
    pub fn reset(&mut self) {
        self.game_in_progress = false;
        self.current_player = None;
        self.winning_tile = None;
    }

    /// Clears the board after the victory broadcast and ends the round
    pub fn finish_victory(&mut self) {
        self.board = empty_board();
        self.reset();
    }

    fn advance_turn(&mut self) {
        if let Some(current) = self.current_player {
            self.current_player = Some((current + 1) % self.players.len());
        }
    }

    #[cfg(test)]
    pub(crate) fn force_turn(&mut self, index: usize) {
        assert!(index < self.players.len());
        self.current_player = Some(index);
    }
}
