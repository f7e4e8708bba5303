use log::{debug, info, warn};
use shared::{GameSnapshot, ServerMessage, TileStatus, BOARD_SIZE};

/// What a server message meant for this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// Nothing beyond a state refresh
    Updated,
    Joined,
    JoinRejected(String),
    Started,
    Won { winner: Option<String> },
    Reset,
}

/// Local mirror of the server's public state plus what only this client knows
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub state: GameSnapshot,
    pub player_name: Option<String>,
    /// Message from the last rejected join
    pub join_error: Option<String>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the local state with the snapshot carried by `message`
    pub fn apply(&mut self, message: &ServerMessage) -> RoundEvent {
        let event = match message {
            ServerMessage::JoinResult {
                success: true,
                name,
                ..
            } => {
                self.player_name = name.clone();
                self.join_error = None;
                RoundEvent::Joined
            }
            ServerMessage::JoinResult {
                success: false,
                message,
                ..
            } => {
                let reason = message.clone().unwrap_or_default();
                warn!("Join rejected: {}", reason);
                self.join_error = Some(reason.clone());
                RoundEvent::JoinRejected(reason)
            }
            ServerMessage::GameStart { .. } => RoundEvent::Started,
            ServerMessage::Victory { state } => RoundEvent::Won {
                winner: state.current_player().map(str::to_string),
            },
            ServerMessage::GameReset { .. } => RoundEvent::Reset,
            ServerMessage::ConnectResult { .. }
            | ServerMessage::PlayerListUpdate { .. }
            | ServerMessage::TilePress { .. } => RoundEvent::Updated,
        };

        self.state = message.state().clone();
        debug!("Applied {} ({:?})", message.name(), event);
        if let RoundEvent::Won { winner } = &event {
            info!("Round won by {}", winner.as_deref().unwrap_or("?"));
        }
        event
    }

    pub fn has_joined(&self) -> bool {
        self.player_name
            .as_ref()
            .is_some_and(|name| self.state.players.contains(name))
    }

    pub fn is_my_turn(&self) -> bool {
        self.state.game_in_progress
            && self.player_name.is_some()
            && self.state.current_player() == self.player_name.as_deref()
    }

    /// The same checks the server makes, so we never send a press it would drop
    pub fn can_press(&self, x: usize, y: usize) -> bool {
        x < BOARD_SIZE
            && y < BOARD_SIZE
            && self.is_my_turn()
            && self.state.tile(x, y) == Some(TileStatus::Unpressed)
    }
}
