//! Server network layer handling WebSocket sessions and the game loop
//!
//! Every accepted connection gets a reader task and a writer task. Readers turn
//! incoming frames into [`ServerEvent`]s for the game loop; writers drain the
//! connection's outbound queue. The game loop is the only place the
//! [`ProtocolHandler`] (and therefore the game state) is touched.

use crate::client_manager::{ClientManager, ConnectionId, OUTBOUND_QUEUE};
use crate::config::ServerConfig;
use crate::game::GameState;
use crate::protocol::ProtocolHandler;
use crate::watchdog::TurnWatchdog;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ServerMessage;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Events sent from connection tasks and timers to the game loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
        /// Receives the assigned id, or None when the server is full
        reply: oneshot::Sender<Option<ConnectionId>>,
    },
    Frame {
        client_id: ConnectionId,
        text: String,
    },
    Disconnected {
        client_id: ConnectionId,
    },
    WatchdogFired {
        generation: u64,
    },
    Shutdown,
}

/// Main server coordinating networking and the game state
pub struct Server {
    listener: TcpListener,
    handler: ProtocolHandler,

    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn new(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let handler = ProtocolHandler::new(
            GameState::new(config.winning_tile),
            ClientManager::new(config.max_clients),
            TurnWatchdog::new(config.round_timeout, server_tx.clone()),
        );

        Ok(Server {
            listener,
            handler,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Sender for injecting events, e.g. [`ServerEvent::Shutdown`]
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.server_tx.clone()
    }

    /// Runs the accept loop and the game loop until shutdown
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Server {
            listener,
            mut handler,
            server_tx,
            mut server_rx,
        } = self;

        let acceptor = tokio::spawn(accept_connections(listener, server_tx));
        info!("Server started successfully");

        while let Some(event) = server_rx.recv().await {
            if let ServerEvent::Shutdown = event {
                info!("Server shutting down");
                break;
            }
            handler.handle_event(event);
        }

        acceptor.abort();
        Ok(())
    }
}

async fn accept_connections(listener: TcpListener, server_tx: mpsc::UnboundedSender<ServerEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let server_tx = server_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, server_tx).await {
                        warn!("Connection from {} ended with error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Drives a single WebSocket session from handshake to disconnect
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), BoxError> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let (sender, mut outbound) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);
    let (reply_tx, reply_rx) = oneshot::channel();
    server_tx
        .send(ServerEvent::Connected {
            addr,
            sender,
            reply: reply_tx,
        })
        .map_err(|_| "game loop has stopped")?;

    let Some(client_id) = reply_rx.await? else {
        let frame = CloseFrame {
            code: CloseCode::Again,
            reason: "Server full".into(),
        };
        write.send(Message::Close(Some(frame))).await?;
        return Ok(());
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {}: {}", message.name(), e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(text)).await {
                debug!("Failed to send to client {}: {}", client_id, e);
                break;
            }
        }
        let _ = write.close().await;
    });

    let reader_tx = server_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if reader_tx
                        .send(ServerEvent::Frame { client_id, text })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Binary(_)) => {
                    warn!("Ignoring binary frame from client {}", client_id);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Read error from client {}: {}", client_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let _ = server_tx.send(ServerEvent::Disconnected { client_id });
    Ok(())
}
