use crate::game::{ClientGameState, RoundEvent};
use crate::input::InputManager;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Name to join with; watch only when None
    pub name: Option<String>,
    /// Ask the server to start a round after joining and after each round ends
    pub auto_start: bool,
    /// Press tiles automatically on our turn
    pub auto_play: bool,
    /// Pause before each automatic press
    pub think_time: Duration,
    /// Disconnect after this many finished rounds
    pub rounds: Option<u32>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: None,
            auto_start: false,
            auto_play: true,
            think_time: Duration::from_millis(500),
            rounds: None,
        }
    }
}

pub struct Client {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,

    game_state: ClientGameState,
    input_manager: InputManager,
    options: ClientOptions,

    rounds_finished: u32,
}

impl Client {
    pub async fn connect(
        server_url: &str,
        options: ClientOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", server_url);
        let (ws, _) = connect_async(server_url).await?;
        let (write, read) = ws.split();

        Ok(Client {
            write,
            read,
            game_state: ClientGameState::new(),
            input_manager: InputManager::new(),
            options,
            rounds_finished: 0,
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    async fn send_message(
        &mut self,
        message: &ClientMessage,
    ) -> Result<(), Box<dyn std::error::Error>> {
        debug!("Sending: {}", message.name());
        self.write.send(Message::Text(message.encode()?)).await?;
        Ok(())
    }

    /// Applies one server message and reacts to it.
    /// Returns false once the client is done.
    async fn handle_message(
        &mut self,
        message: ServerMessage,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        let event = self.game_state.apply(&message);
        let may_press = matches!(event, RoundEvent::Started | RoundEvent::Updated);

        match event {
            RoundEvent::Updated if matches!(message, ServerMessage::ConnectResult { .. }) => {
                if let Some(name) = self.options.name.clone() {
                    self.send_message(&ClientMessage::Join { name }).await?;
                }
            }
            RoundEvent::Joined => {
                info!(
                    "Joined as {}",
                    self.game_state.player_name.as_deref().unwrap_or_default()
                );
                if self.options.auto_start {
                    self.send_message(&ClientMessage::Start {}).await?;
                }
            }
            RoundEvent::JoinRejected(_) => {
                if self.options.name.is_some() {
                    return Ok(false);
                }
            }
            RoundEvent::Won { .. } | RoundEvent::Reset => {
                self.rounds_finished += 1;
                if self.options.rounds.is_some_and(|limit| self.rounds_finished >= limit) {
                    info!("Finished {} rounds", self.rounds_finished);
                    return Ok(false);
                }
                if self.options.auto_start && self.game_state.has_joined() {
                    self.send_message(&ClientMessage::Start {}).await?;
                }
            }
            RoundEvent::Started | RoundEvent::Updated => {}
        }

        if may_press && self.options.auto_play && self.game_state.is_my_turn() {
            sleep(self.options.think_time).await;
            if let Some(press) = self.input_manager.next_press(&self.game_state) {
                self.send_message(&press).await?;
            }
        }

        Ok(true)
    }

    /// Runs until the server goes away, the join is refused or the round limit
    /// is reached. Returns the number of rounds seen to completion.
    pub async fn run(&mut self) -> Result<u32, Box<dyn std::error::Error>> {
        while let Some(frame) = self.read.next().await {
            match frame {
                Ok(Message::Text(text)) => match ServerMessage::decode(&text) {
                    Ok(message) => {
                        if !self.handle_message(message).await? {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring undecodable message: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    info!("Server closed the connection: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Connection error: {}", e);
                    break;
                }
            }
        }

        let _ = self.write.close().await;
        info!(
            "Disconnected after {} presses and {} rounds",
            self.input_manager.presses_sent(),
            self.rounds_finished
        );
        Ok(self.rounds_finished)
    }
}
