//! Round watchdog
//!
//! A single-shot timer armed when a round starts. When it expires it posts a
//! [`ServerEvent::WatchdogFired`] back to the game loop, tagged with the round
//! it was armed for. Rounds that end early disarm it, and a firing whose round
//! no longer matches is ignored by [`TurnWatchdog::fire`], so a late timer can
//! never reset a newer round.

use crate::network::ServerEvent;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct TurnWatchdog {
    timeout: Duration,
    events: mpsc::UnboundedSender<ServerEvent>,
    armed: Option<Armed>,
}

impl TurnWatchdog {
    pub fn new(timeout: Duration, events: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            timeout,
            events,
            armed: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts the timer for `generation`, replacing any pending one.
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, generation: u64) {
        self.disarm();

        let events = self.events.clone();
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(ServerEvent::WatchdogFired { generation });
        });

        debug!("Watchdog armed for round {} ({:?})", generation, timeout);
        self.armed = Some(Armed { generation, handle });
    }

    pub fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.handle.abort();
            debug!("Watchdog for round {} disarmed", armed.generation);
        }
    }

    /// Accepts a firing if it belongs to the currently armed round
    pub fn fire(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn armed_generation(&self) -> Option<u64> {
        self.armed.as_ref().map(|armed| armed.generation)
    }
}

impl Drop for TurnWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
