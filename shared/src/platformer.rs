//! Side-scrolling demo world used by the server and client binaries.

use crate::event::{ConnectionId, Event, EventKind};
use crate::simulation::Simulation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FRAME_DT: f32 = 1.0 / 60.0;
pub const GROUND_Y: f32 = 600.0;
pub const JUMP_VELOCITY: f32 = -500.0;
pub const RUN_ACCELERATION: f32 = 8000.0;
pub const MAX_RUN_SPEED: f32 = 350.0;
pub const STOP_SPEED: f32 = 10.0;
pub const GRAVITY: f32 = 2000.0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    /// -1 left, 0 idle, 1 right
    pub dir: i8,
    pub jump: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub controls: Controls,
    pub color: Color,
    pub grounded: bool,
}

impl Player {
    pub fn new(x: f32, y: f32, color: Color) -> Self {
        Self {
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            controls: Controls::default(),
            color,
            grounded: false,
        }
    }

    fn step(&mut self) {
        if self.controls.jump {
            if self.grounded {
                self.vel_y = JUMP_VELOCITY;
            }
            self.controls.jump = false;
        }

        if self.controls.dir != 0 && self.vel_x.abs() < MAX_RUN_SPEED {
            self.vel_x += FRAME_DT * RUN_ACCELERATION * self.controls.dir as f32;
        } else {
            let decel = self.vel_x.abs().min(FRAME_DT * RUN_ACCELERATION);
            self.vel_x -= decel * self.vel_x.signum();
            if self.vel_x.abs() < STOP_SPEED {
                self.vel_x = 0.0;
            }
        }

        if !self.grounded {
            self.vel_y += FRAME_DT * GRAVITY;
        }

        self.x += self.vel_x * FRAME_DT;
        self.y += self.vel_y * FRAME_DT;

        self.grounded = self.y == GROUND_Y;
        if self.y > GROUND_Y {
            self.y = GROUND_Y;
            self.vel_y = 0.0;
            self.grounded = true;
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct World {
    pub players: BTreeMap<ConnectionId, Player>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PlatformerInput {
    Join { x: f32, y: f32, color: Color },
    Move { dir: i8, jump: bool },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Platformer;

impl Simulation for Platformer {
    type State = World;
    type Input = PlatformerInput;

    fn initial_state(&self) -> World {
        World::default()
    }

    fn update(&self, world: &mut World, events: &[Event<PlatformerInput>]) {
        for event in events {
            match &event.kind {
                EventKind::Input(PlatformerInput::Join { x, y, color }) => {
                    world
                        .players
                        .insert(event.origin, Player::new(*x, *y, *color));
                }
                EventKind::Input(PlatformerInput::Move { dir, jump }) => {
                    if let Some(player) = world.players.get_mut(&event.origin) {
                        player.controls = Controls {
                            dir: (*dir).clamp(-1, 1),
                            jump: *jump,
                        };
                    }
                }
                EventKind::Disconnect => {
                    world.players.remove(&event.origin);
                }
            }
        }

        for player in world.players.values_mut() {
            player.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };

    fn join(id: u32, x: f32, y: f32) -> Event<PlatformerInput> {
        Event::input(ConnectionId(id), PlatformerInput::Join { x, y, color: WHITE })
    }

    fn walk(id: u32, dir: i8, jump: bool) -> Event<PlatformerInput> {
        Event::input(ConnectionId(id), PlatformerInput::Move { dir, jump })
    }

    fn landed_world() -> World {
        let mut world = World::default();
        Platformer.update(&mut world, &[join(1, 100.0, 100.0)]);
        for _ in 0..120 {
            Platformer.update(&mut world, &[]);
        }
        world
    }

    #[test]
    fn test_join_and_first_step() {
        let mut world = World::default();
        Platformer.update(&mut world, &[join(1, 100.0, 100.0), walk(1, 1, false)]);

        let player = &world.players[&ConnectionId(1)];
        assert_approx_eq!(player.vel_x, 8000.0 / 60.0, 0.001);
        assert_approx_eq!(player.vel_y, 2000.0 / 60.0, 0.001);
        assert_approx_eq!(player.x, 100.0 + (8000.0 / 60.0) / 60.0, 0.001);
        assert_approx_eq!(player.y, 100.0 + (2000.0 / 60.0) / 60.0, 0.001);
        assert!(!player.grounded);
    }

    #[test]
    fn test_player_lands_on_ground() {
        let world = landed_world();
        let player = &world.players[&ConnectionId(1)];
        assert_eq!(player.y, GROUND_Y);
        assert_eq!(player.vel_y, 0.0);
        assert!(player.grounded);
    }

    #[test]
    fn test_jump_only_from_ground() {
        let mut world = landed_world();
        Platformer.update(&mut world, &[walk(1, 0, true)]);

        let player = &world.players[&ConnectionId(1)];
        assert_eq!(player.vel_y, JUMP_VELOCITY);
        assert!(player.y < GROUND_Y);
        assert!(!player.grounded);
        assert!(!player.controls.jump);

        // Airborne jump request is consumed without effect
        Platformer.update(&mut world, &[walk(1, 0, true)]);
        let player = &world.players[&ConnectionId(1)];
        assert_approx_eq!(player.vel_y, JUMP_VELOCITY + GRAVITY * FRAME_DT, 0.001);
    }

    #[test]
    fn test_run_speed_is_capped_and_decays() {
        let mut world = landed_world();
        Platformer.update(&mut world, &[walk(1, -1, false)]);
        for _ in 0..30 {
            Platformer.update(&mut world, &[]);
        }
        let speed = world.players[&ConnectionId(1)].vel_x.abs();
        assert!(speed <= MAX_RUN_SPEED + FRAME_DT * RUN_ACCELERATION);

        Platformer.update(&mut world, &[walk(1, 0, false)]);
        for _ in 0..10 {
            Platformer.update(&mut world, &[]);
        }
        assert_eq!(world.players[&ConnectionId(1)].vel_x, 0.0);
    }

    #[test]
    fn test_disconnect_removes_player() {
        let mut world = World::default();
        Platformer.update(&mut world, &[join(1, 0.0, 0.0), join(2, 50.0, 0.0)]);
        Platformer.update(&mut world, &[Event::disconnect(ConnectionId(1))]);

        assert_eq!(world.players.len(), 1);
        assert!(world.players.contains_key(&ConnectionId(2)));
    }

    #[test]
    fn test_move_for_absent_player_is_ignored() {
        let mut world = World::default();
        Platformer.update(&mut world, &[walk(5, 1, true)]);
        assert!(world.players.is_empty());
    }

    #[test]
    fn test_update_is_deterministic() {
        let events = vec![join(1, 10.0, 20.0), join(2, 300.0, 0.0), walk(2, -1, true)];
        let mut a = World::default();
        let mut b = World::default();
        for _ in 0..5 {
            Platformer.update(&mut a, &events);
            Platformer.update(&mut b, &events);
        }
        assert_eq!(a, b);
        assert_eq!(
            Platformer.serialize(&a).unwrap(),
            Platformer.serialize(&b).unwrap()
        );
    }

    #[test]
    fn test_snapshot_roundtrip_with_motion() {
        let mut world = World::default();
        Platformer.update(&mut world, &[join(1, 10.0, 20.0), join(2, 300.0, 0.0)]);
        Platformer.update(&mut world, &[walk(1, 1, false), walk(2, -1, false)]);

        let bytes = Platformer.serialize(&world).unwrap();
        let restored = Platformer.deserialize(&bytes).unwrap();
        assert_eq!(restored, world);
        assert!(restored.players[&ConnectionId(1)].vel_x > 0.0);
    }

    #[test]
    fn test_event_order_matters_for_last_input() {
        let mut a = World::default();
        let mut b = World::default();
        Platformer.update(&mut a, &[join(1, 0.0, 0.0)]);
        Platformer.update(&mut b, &[join(1, 0.0, 0.0)]);

        Platformer.update(&mut a, &[walk(1, 1, false), walk(1, -1, false)]);
        Platformer.update(&mut b, &[walk(1, -1, false), walk(1, 1, false)]);
        assert_ne!(a, b);
    }
}
