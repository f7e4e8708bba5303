//! Automatic input: decides which tile this client presses on its turn

use crate::game::ClientGameState;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::ClientMessage;

pub struct InputManager {
    rng: StdRng,
    presses_sent: u32,
}

impl InputManager {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            presses_sent: 0,
        }
    }

    /// Picks a random unpressed tile, or None when it is not our turn
    pub fn next_press(&mut self, game: &ClientGameState) -> Option<ClientMessage> {
        if !game.is_my_turn() {
            return None;
        }

        let tiles = game.state.unpressed_tiles();
        let &(x, y) = tiles.choose(&mut self.rng)?;
        if !game.can_press(x, y) {
            return None;
        }

        self.presses_sent += 1;
        Some(ClientMessage::Press {
            x: x as i64,
            y: y as i64,
        })
    }

    pub fn presses_sent(&self) -> u32 {
        self.presses_sent
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
