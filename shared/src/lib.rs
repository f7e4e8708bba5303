use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const BOARD_SIZE: usize = 4;

pub const JOIN_EVENT: &str = "join";
pub const START_EVENT: &str = "start";
pub const PRESS_EVENT: &str = "press";

/// State of a single tile. Encoded on the wire as 0, 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TileStatus {
    #[default]
    Unpressed,
    Pressed,
    Winning,
}

impl From<TileStatus> for u8 {
    fn from(status: TileStatus) -> Self {
        match status {
            TileStatus::Unpressed => 0,
            TileStatus::Pressed => 1,
            TileStatus::Winning => 2,
        }
    }
}

impl TryFrom<u8> for TileStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TileStatus::Unpressed),
            1 => Ok(TileStatus::Pressed),
            2 => Ok(TileStatus::Winning),
            other => Err(format!("unknown tile status {}", other)),
        }
    }
}

/// Rows first: `board[y][x]`.
pub type Board = [[TileStatus; BOARD_SIZE]; BOARD_SIZE];

pub fn empty_board() -> Board {
    [[TileStatus::Unpressed; BOARD_SIZE]; BOARD_SIZE]
}

/// Public projection of the server's game state.
///
/// Field names follow the browser client's expectations, so the JSON looks like
/// `{"GameInProgress":false,"Players":[],"Board":[[0,0,0,0],...],"CurrentId":null}`.
/// The winning tile is deliberately absent from this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameSnapshot {
    pub game_in_progress: bool,
    pub players: Vec<String>,
    pub board: Board,
    pub current_id: Option<usize>,
}

impl GameSnapshot {
    pub fn new() -> Self {
        Self {
            game_in_progress: false,
            players: Vec::new(),
            board: empty_board(),
            current_id: None,
        }
    }

    /// Name of the player whose turn it is, if a round is running
    pub fn current_player(&self) -> Option<&str> {
        self.current_id
            .and_then(|index| self.players.get(index))
            .map(String::as_str)
    }

    pub fn tile(&self, x: usize, y: usize) -> Option<TileStatus> {
        self.board.get(y).and_then(|row| row.get(x)).copied()
    }

    pub fn unpressed_tiles(&self) -> Vec<(usize, usize)> {
        let mut tiles = Vec::new();
        for (y, row) in self.board.iter().enumerate() {
            for (x, status) in row.iter().enumerate() {
                if *status == TileStatus::Unpressed {
                    tiles.push((x, y));
                }
            }
        }
        tiles
    }
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages sent by clients. Each frame is `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientMessage {
    Join { name: String },
    Start {},
    Press { x: i64, y: i64 },
}

/// Reasons an inbound frame fails its structural check.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Frame(serde_json::Error),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("invalid payload for '{event}': {source}")]
    Payload {
        event: &'static str,
        source: serde_json::Error,
    },
    #[error("empty player name")]
    EmptyName,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct JoinPayload {
    name: String,
}

#[derive(Deserialize)]
struct PressPayload {
    x: i64,
    y: i64,
}

impl ClientMessage {
    /// Decodes a text frame, checking the payload schema of the named event.
    ///
    /// `start` ignores its payload entirely. Unknown payload fields are ignored
    /// for every event.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Frame)?;

        match envelope.event.as_str() {
            JOIN_EVENT => {
                let payload: JoinPayload =
                    serde_json::from_value(envelope.data).map_err(|source| {
                        DecodeError::Payload {
                            event: JOIN_EVENT,
                            source,
                        }
                    })?;
                if payload.name.trim().is_empty() {
                    return Err(DecodeError::EmptyName);
                }
                Ok(ClientMessage::Join { name: payload.name })
            }
            START_EVENT => Ok(ClientMessage::Start {}),
            PRESS_EVENT => {
                let payload: PressPayload =
                    serde_json::from_value(envelope.data).map_err(|source| {
                        DecodeError::Payload {
                            event: PRESS_EVENT,
                            source,
                        }
                    })?;
                Ok(ClientMessage::Press {
                    x: payload.x,
                    y: payload.y,
                })
            }
            _ => Err(DecodeError::UnknownEvent(envelope.event)),
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => JOIN_EVENT,
            ClientMessage::Start {} => START_EVENT,
            ClientMessage::Press { .. } => PRESS_EVENT,
        }
    }
}

/// Messages sent by the server. Every variant carries the public snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    ConnectResult {
        state: GameSnapshot,
    },
    JoinResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        state: GameSnapshot,
    },
    PlayerListUpdate {
        state: GameSnapshot,
    },
    GameStart {
        state: GameSnapshot,
    },
    TilePress {
        state: GameSnapshot,
    },
    Victory {
        state: GameSnapshot,
    },
    GameReset {
        state: GameSnapshot,
    },
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::ConnectResult { .. } => "ConnectResult",
            ServerMessage::JoinResult { .. } => "JoinResult",
            ServerMessage::PlayerListUpdate { .. } => "PlayerListUpdate",
            ServerMessage::GameStart { .. } => "GameStart",
            ServerMessage::TilePress { .. } => "TilePress",
            ServerMessage::Victory { .. } => "Victory",
            ServerMessage::GameReset { .. } => "GameReset",
        }
    }

    pub fn state(&self) -> &GameSnapshot {
        match self {
            ServerMessage::ConnectResult { state }
            | ServerMessage::JoinResult { state, .. }
            | ServerMessage::PlayerListUpdate { state }
            | ServerMessage::GameStart { state }
            | ServerMessage::TilePress { state }
            | ServerMessage::Victory { state }
            | ServerMessage::GameReset { state } => state,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
