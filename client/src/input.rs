//! Headless input source driving the platformer from a client

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::platformer::{Color, PlatformerInput, World, GROUND_Y};
use shared::ConnectionId;

const JUMP_CHANCE: f64 = 0.05;
const MAX_HOLD_FRAMES: u32 = 45;

/// Generates one input per local frame
///
/// Emits `Join` until the local state contains the player, then walks in a
/// direction for a random number of frames with occasional jumps.
pub struct BotInput {
    rng: StdRng,
    color: Color,
    dir: i8,
    hold: u32,
}

impl BotInput {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Reproducible input sequence
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let color = Color {
            r: rng.gen(),
            g: rng.gen(),
            b: rng.gen(),
        };
        Self {
            rng,
            color,
            dir: 0,
            hold: 0,
        }
    }

    pub fn next_input(&mut self, world: &World, me: ConnectionId) -> PlatformerInput {
        if !world.players.contains_key(&me) {
            return PlatformerInput::Join {
                x: self.rng.gen_range(50.0..750.0),
                y: GROUND_Y / 2.0,
                color: self.color,
            };
        }

        if self.hold == 0 {
            self.dir = self.rng.gen_range(-1..=1);
            self.hold = self.rng.gen_range(1..=MAX_HOLD_FRAMES);
        }
        self.hold -= 1;

        PlatformerInput::Move {
            dir: self.dir,
            jump: self.rng.gen_bool(JUMP_CHANCE),
        }
    }
}

impl Default for BotInput {
    fn default() -> Self {
        Self::new()
    }
}
