//! Message dispatch between connections and the game state
//!
//! The [`ProtocolHandler`] owns the game state, the connection registry and the
//! round watchdog. It is driven by a single task, so every transition runs to
//! completion before the next event is looked at.
//!
//! Validation policy: frames that fail their structural check are logged and
//! dropped. State rejections are reported to the requester only for `join`;
//! rejected `start` and `press` requests are logged and otherwise ignored.

use crate::client_manager::{ClientManager, ConnectionId};
use crate::game::{DisconnectOutcome, GameState, JoinError, PressOutcome};
use crate::network::ServerEvent;
use crate::watchdog::TurnWatchdog;
use log::{debug, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub struct ProtocolHandler {
    game: GameState,
    clients: ClientManager,
    watchdog: TurnWatchdog,
}

impl ProtocolHandler {
    pub fn new(game: GameState, clients: ClientManager, watchdog: TurnWatchdog) -> Self {
        Self {
            game,
            clients,
            watchdog,
        }
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                addr,
                sender,
                reply,
            } => {
                let id = self.on_connect(addr, sender);
                if reply.send(id).is_err() {
                    // The connection task vanished while we registered it
                    if let Some(id) = id {
                        self.on_disconnect(id);
                    }
                }
            }
            ServerEvent::Frame { client_id, text } => self.on_text(client_id, &text),
            ServerEvent::Disconnected { client_id } => self.on_disconnect(client_id),
            ServerEvent::WatchdogFired { generation } => self.on_watchdog(generation),
            ServerEvent::Shutdown => {}
        }
    }

    /// Registers a connection and greets it with the current state
    pub fn on_connect(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Option<ConnectionId> {
        let id = self.clients.add_client(addr, sender)?;
        self.send(
            id,
            ServerMessage::ConnectResult {
                state: self.game.snapshot(),
            },
        );
        Some(id)
    }

    pub fn on_text(&mut self, client_id: ConnectionId, text: &str) {
        match ClientMessage::decode(text) {
            Ok(message) => self.on_message(client_id, message),
            Err(e) => warn!("Dropping frame from client {}: {}", client_id, e),
        }
    }

    pub fn on_message(&mut self, client_id: ConnectionId, message: ClientMessage) {
        if self.clients.get(client_id).is_none() {
            warn!(
                "Ignoring '{}' from unknown client {}",
                message.name(),
                client_id
            );
            return;
        }
        debug!("Received: {} from client {}", message.name(), client_id);

        match message {
            ClientMessage::Join { name } => self.handle_join(client_id, &name),
            ClientMessage::Start {} => self.handle_start(),
            ClientMessage::Press { x, y } => self.handle_press(client_id, x, y),
        }
    }

    fn handle_join(&mut self, client_id: ConnectionId, name: &str) {
        let result = if self.clients.identity(client_id).is_some() {
            Err(JoinError::AlreadyJoined)
        } else {
            self.game.join(name)
        };

        match result {
            Ok(state) => {
                if !self.clients.set_identity(client_id, name) {
                    warn!(
                        "Client {} already had a name when joining as '{}'",
                        client_id, name
                    );
                }
                self.send(
                    client_id,
                    ServerMessage::JoinResult {
                        success: true,
                        message: None,
                        name: Some(name.to_string()),
                        state: state.clone(),
                    },
                );
                self.broadcast(ServerMessage::PlayerListUpdate { state });
            }
            Err(e) => {
                info!("join: client {} rejected as '{}': {:?}", client_id, name, e);
                self.send(
                    client_id,
                    ServerMessage::JoinResult {
                        success: false,
                        message: Some(e.to_string()),
                        name: None,
                        state: self.game.snapshot(),
                    },
                );
            }
        }
    }

    fn handle_start(&mut self) {
        match self.game.start() {
            Ok(state) => {
                self.broadcast(ServerMessage::GameStart { state });
                self.watchdog.arm(self.game.round());
            }
            Err(e) => info!("start: {}", e),
        }
    }

    fn handle_press(&mut self, client_id: ConnectionId, x: i64, y: i64) {
        // Spectators have no seat, so they are never the current player
        let name = self.clients.identity(client_id).unwrap_or_default().to_string();

        match self.game.press(&name, x, y) {
            Ok(PressOutcome::TilePressed) => {
                self.broadcast(ServerMessage::TilePress {
                    state: self.game.snapshot(),
                });
            }
            Ok(PressOutcome::Victory) => {
                self.broadcast(ServerMessage::Victory {
                    state: self.game.snapshot(),
                });
                self.game.finish_victory();
                self.watchdog.disarm();
                self.broadcast(ServerMessage::PlayerListUpdate {
                    state: self.game.snapshot(),
                });
            }
            Err(e) => info!("press: client {} ({:?}): {}", client_id, name, e),
        }
    }

    /// Drops the connection and frees its seat
    pub fn on_disconnect(&mut self, client_id: ConnectionId) {
        let Some(client) = self.clients.remove_client(client_id) else {
            return;
        };

        let outcome = match client.identity.as_deref() {
            Some(name) => self.game.disconnect(name),
            None => DisconnectOutcome::NotSeated,
        };

        if outcome == DisconnectOutcome::RoundAbandoned {
            info!("Round {} abandoned after a player left", self.game.round());
            self.watchdog.disarm();
            self.broadcast(ServerMessage::GameReset {
                state: self.game.snapshot(),
            });
        } else {
            self.broadcast(ServerMessage::PlayerListUpdate {
                state: self.game.snapshot(),
            });
        }
    }

    pub fn on_watchdog(&mut self, generation: u64) {
        if !self.watchdog.fire(generation) {
            debug!("Ignoring stale watchdog for round {}", generation);
            return;
        }
        if !self.game.game_in_progress() || self.game.round() != generation {
            debug!("Watchdog for round {} fired after the round ended", generation);
            return;
        }

        info!(
            "Round {} timed out after {:?}",
            generation,
            self.watchdog.timeout()
        );
        self.game.reset();
        self.broadcast(ServerMessage::GameReset {
            state: self.game.snapshot(),
        });
    }

    fn send(&mut self, client_id: ConnectionId, message: ServerMessage) {
        debug!("Sending: {} to client {}", message.name(), client_id);
        self.clients.send_to(client_id, message);
    }

    fn broadcast(&mut self, message: ServerMessage) {
        debug!(
            "Sending: {} to {} clients",
            message.name(),
            self.clients.len()
        );
        self.clients.broadcast(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Tile, WinningTilePolicy};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{TileStatus, BOARD_SIZE};
    use std::time::Duration;
    use crate::client_manager::OUTBOUND_QUEUE;
    use tokio::sync::mpsc::{Receiver, UnboundedReceiver, UnboundedSender};

    struct Harness {
        handler: ProtocolHandler,
        events: UnboundedReceiver<ServerEvent>,
        _events_tx: UnboundedSender<ServerEvent>,
    }

    struct Conn {
        id: ConnectionId,
        rx: Receiver<ServerMessage>,
    }

    impl Conn {
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message);
            }
            messages
        }

        fn names(&mut self) -> Vec<&'static str> {
            self.drain().iter().map(ServerMessage::name).collect()
        }
    }

    fn harness(timeout: Duration) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let game = GameState::with_rng(
            WinningTilePolicy::Fixed(Tile { x: 0, y: 0 }),
            StdRng::seed_from_u64(3),
        );
        let handler = ProtocolHandler::new(
            game,
            ClientManager::new(8),
            TurnWatchdog::new(timeout, tx.clone()),
        );
        Harness {
            handler,
            events: rx,
            _events_tx: tx,
        }
    }

    impl Harness {
        fn connect(&mut self) -> Conn {
            self.connect_with_queue(OUTBOUND_QUEUE)
        }

        fn connect_with_queue(&mut self, capacity: usize) -> Conn {
            let (tx, rx) = mpsc::channel(capacity);
            let addr = "127.0.0.1:9000".parse().unwrap();
            let id = self.handler.on_connect(addr, tx).unwrap();
            Conn { id, rx }
        }

        fn join(&mut self, conn: &Conn, name: &str) {
            self.handler.on_message(
                conn.id,
                ClientMessage::Join {
                    name: name.to_string(),
                },
            );
        }

        fn press(&mut self, conn: &Conn, x: i64, y: i64) {
            self.handler.on_message(conn.id, ClientMessage::Press { x, y });
        }

        fn start_with_turn(&mut self, index: usize) {
            self.handler.on_message(1, ClientMessage::Start {});
            self.handler.game.force_turn(index);
        }
    }

    #[tokio::test]
    async fn test_connect_sends_snapshot() {
        let mut h = harness(Duration::from_secs(30));
        let mut conn = h.connect();

        let messages = conn.drain();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ServerMessage::ConnectResult { state } => assert!(!state.game_in_progress),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_replies_privately_and_broadcasts() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        let mut watcher = h.connect();
        a.drain();
        watcher.drain();

        h.join(&a, "A");

        let messages = a.drain();
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            ServerMessage::JoinResult {
                success,
                name,
                state,
                ..
            } => {
                assert!(*success);
                assert_eq!(name.as_deref(), Some("A"));
                assert_eq!(state.players, ["A"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(messages[1].name(), "PlayerListUpdate");
        assert_eq!(watcher.names(), ["PlayerListUpdate"]);
        assert_eq!(h.handler.clients().identity(a.id), Some("A"));
    }

    #[tokio::test]
    async fn test_duplicate_join_rejected_privately() {
        let mut h = harness(Duration::from_secs(30));
        let a = h.connect();
        let b = h.connect();
        let mut c = h.connect();
        h.join(&a, "A");
        h.join(&b, "B");
        c.drain();

        h.join(&c, "A");

        let messages = c.drain();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ServerMessage::JoinResult {
                success,
                message,
                state,
                ..
            } => {
                assert!(!*success);
                assert_eq!(message.as_deref(), Some(&*JoinError::DuplicateName.to_string()));
                assert_eq!(state.players, ["A", "B"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(h.handler.clients().identity(c.id), None);
    }

    #[tokio::test]
    async fn test_second_join_from_same_connection_rejected() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        h.join(&a, "A");
        a.drain();

        h.join(&a, "Another");

        match &a.drain()[..] {
            [ServerMessage::JoinResult { success, state, .. }] => {
                assert!(!*success);
                assert_eq!(state.players, ["A"]);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
        assert_eq!(h.handler.clients().identity(a.id), Some("A"));
    }

    #[tokio::test]
    async fn test_join_during_round_rejected() {
        let mut h = harness(Duration::from_secs(30));
        let a = h.connect();
        let mut late = h.connect();
        h.join(&a, "A");
        h.start_with_turn(0);
        late.drain();

        h.join(&late, "Late");

        match &late.drain()[..] {
            [ServerMessage::JoinResult {
                success, message, ..
            }] => {
                assert!(!*success);
                assert_eq!(message.as_deref(), Some("A game is already in progress."));
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        a.drain();

        h.handler.on_text(a.id, r#"{"event":"join","data":{"name":""}}"#);
        h.handler.on_text(a.id, r#"{"event":"join","data":{"name":7}}"#);
        h.handler.on_text(a.id, r#"{"event":"press","data":{"x":1}}"#);
        h.handler.on_text(a.id, "garbage");

        assert!(a.drain().is_empty());
        assert!(h.handler.game().players().is_empty());
    }

    #[tokio::test]
    async fn test_start_broadcasts_and_arms_watchdog() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        let mut watcher = h.connect();
        h.join(&a, "A");
        a.drain();
        watcher.drain();

        h.handler.on_text(watcher.id, r#"{"event":"start"}"#);

        assert_eq!(a.names(), ["GameStart"]);
        assert_eq!(watcher.names(), ["GameStart"]);
        assert!(h.handler.game().game_in_progress());
        assert_eq!(h.handler.watchdog.armed_generation(), Some(1));
    }

    #[tokio::test]
    async fn test_start_rejections_are_silent() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        a.drain();

        // Nobody seated
        h.handler.on_message(a.id, ClientMessage::Start {});
        assert!(a.drain().is_empty());
        assert!(!h.handler.game().game_in_progress());

        h.join(&a, "A");
        h.handler.on_message(a.id, ClientMessage::Start {});
        a.drain();

        h.handler.on_message(a.id, ClientMessage::Start {});
        assert!(a.drain().is_empty());
        assert_eq!(h.handler.game().round(), 1);
    }

    #[tokio::test]
    async fn test_round_to_victory() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        let mut b = h.connect();
        h.join(&a, "A");
        h.join(&b, "B");
        h.start_with_turn(0);
        a.drain();
        b.drain();

        h.press(&a, 1, 1);
        match &b.drain()[..] {
            [ServerMessage::TilePress { state }] => {
                assert_eq!(state.current_id, Some(1));
                assert_eq!(state.board[1][1], TileStatus::Pressed);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
        a.drain();

        h.press(&b, 0, 0);
        let messages = a.drain();
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            ServerMessage::Victory { state } => {
                assert_eq!(state.board[0][0], TileStatus::Winning);
                assert!(state.game_in_progress);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        match &messages[1] {
            ServerMessage::PlayerListUpdate { state } => {
                assert!(!state.game_in_progress);
                assert_eq!(state.current_id, None);
                assert!(state
                    .board
                    .iter()
                    .flatten()
                    .all(|tile| *tile == TileStatus::Unpressed));
                assert_eq!(state.players, ["A", "B"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(b.names(), ["Victory", "PlayerListUpdate"]);
        assert_eq!(h.handler.watchdog.armed_generation(), None);
    }

    #[tokio::test]
    async fn test_rejected_presses_are_silent_and_harmless() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        let mut b = h.connect();
        let mut spectator = h.connect();
        h.join(&a, "A");
        h.join(&b, "B");
        h.start_with_turn(0);
        h.press(&a, 2, 2);
        a.drain();
        b.drain();
        spectator.drain();
        let before = h.handler.game().snapshot();

        h.press(&a, 3, 3); // out of turn
        h.press(&b, 2, 2); // already pressed
        h.press(&b, BOARD_SIZE as i64, 0); // off the board
        h.press(&spectator, 3, 3); // never joined

        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
        assert!(spectator.drain().is_empty());
        assert_eq!(h.handler.game().snapshot(), before);
    }

    #[tokio::test]
    async fn test_disconnect_mid_round_resets() {
        let mut h = harness(Duration::from_secs(30));
        let a = h.connect();
        let mut b = h.connect();
        h.join(&a, "A");
        h.join(&b, "B");
        h.start_with_turn(0);
        b.drain();

        h.handler.on_disconnect(a.id);

        match &b.drain()[..] {
            [ServerMessage::GameReset { state }] => {
                assert!(!state.game_in_progress);
                assert_eq!(state.players, ["B"]);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
        assert_eq!(h.handler.clients().len(), 1);
        assert_eq!(h.handler.watchdog.armed_generation(), None);
    }

    #[tokio::test]
    async fn test_spectator_disconnect_leaves_round_running() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        let spectator = h.connect();
        h.join(&a, "A");
        h.start_with_turn(0);
        a.drain();

        h.handler.on_disconnect(spectator.id);

        match &a.drain()[..] {
            [ServerMessage::PlayerListUpdate { state }] => {
                assert!(state.game_in_progress);
                assert_eq!(state.players, ["A"]);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
        assert!(h.handler.game().game_in_progress());
    }

    #[tokio::test]
    async fn test_disconnect_in_lobby_updates_roster() {
        let mut h = harness(Duration::from_secs(30));
        let a = h.connect();
        let mut b = h.connect();
        h.join(&a, "A");
        h.join(&b, "B");
        b.drain();

        h.handler.on_disconnect(a.id);
        h.handler.on_disconnect(a.id);

        match &b.drain()[..] {
            [ServerMessage::PlayerListUpdate { state }] => assert_eq!(state.players, ["B"]),
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_resets_stalled_round() {
        let mut h = harness(Duration::from_secs(13));
        let mut a = h.connect();
        h.join(&a, "A");
        h.start_with_turn(0);
        a.drain();

        let event = h.events.recv().await.unwrap();
        h.handler.handle_event(event);

        match &a.drain()[..] {
            [ServerMessage::GameReset { state }] => {
                assert!(!state.game_in_progress);
                assert_eq!(state.current_id, None);
                assert_eq!(state.players, ["A"]);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_quiet_after_victory() {
        let mut h = harness(Duration::from_secs(13));
        let mut a = h.connect();
        h.join(&a, "A");
        h.start_with_turn(0);
        h.press(&a, 0, 0);
        a.drain();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(h.events.try_recv().is_err());

        // A firing that slipped through before the disarm is ignored as well
        h.handler.on_watchdog(1);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_stale_watchdog_does_not_touch_new_round() {
        let mut h = harness(Duration::from_secs(60));
        let mut a = h.connect();
        h.join(&a, "A");
        h.start_with_turn(0);
        h.press(&a, 0, 0);
        h.start_with_turn(0);
        a.drain();

        h.handler.on_watchdog(1);

        assert!(a.drain().is_empty());
        assert!(h.handler.game().game_in_progress());
        assert_eq!(h.handler.watchdog.armed_generation(), Some(2));
    }

    #[tokio::test]
    async fn test_connect_refused_when_full() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut handler = ProtocolHandler::new(
            GameState::new(WinningTilePolicy::Random),
            ClientManager::new(1),
            TurnWatchdog::new(Duration::from_secs(30), events_tx),
        );
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let (tx1, _rx1) = mpsc::channel(OUTBOUND_QUEUE);
        let (tx2, _rx2) = mpsc::channel(OUTBOUND_QUEUE);

        assert!(handler.on_connect(addr, tx1).is_some());
        assert!(handler.on_connect(addr, tx2).is_none());
    }

    #[tokio::test]
    async fn test_messages_from_unknown_connection_ignored() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        a.drain();

        h.handler.on_message(
            99,
            ClientMessage::Join {
                name: "Ghost".to_string(),
            },
        );

        assert!(a.drain().is_empty());
        assert!(h.handler.game().players().is_empty());
    }

    #[tokio::test]
    async fn test_slow_connection_cut_off_without_stalling_round() {
        let mut h = harness(Duration::from_secs(30));
        let mut a = h.connect();
        let mut slow = h.connect_with_queue(2);
        h.join(&a, "A");
        h.start_with_turn(0);
        h.press(&a, 1, 1);
        h.press(&a, 2, 2);

        assert!(h.handler.clients().get(slow.id).unwrap().is_lagging());
        assert_eq!(slow.names(), ["ConnectResult", "PlayerListUpdate"]);
        assert_eq!(
            a.names(),
            [
                "ConnectResult",
                "JoinResult",
                "PlayerListUpdate",
                "GameStart",
                "TilePress",
                "TilePress"
            ]
        );
        assert!(h.handler.game().game_in_progress());

        // The writer closing its socket reports the disconnect
        h.handler.on_disconnect(slow.id);
        assert!(h.handler.clients().get(slow.id).is_none());
        assert_eq!(a.names(), ["PlayerListUpdate"]);
    }
}
