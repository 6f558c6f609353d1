use bevy::prelude::*;
use std::collections::HashSet;

/// Marks the player entity
#[derive(Component)]
pub struct Player;

/// Stable per-entity id used in event payloads (entity indices are recycled)
#[derive(Component, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GameId(pub u64);

#[derive(Resource, Default)]
pub struct NextGameId(pub u64);

impl NextGameId {
    pub fn allocate(&mut self) -> GameId {
        let id = GameId(self.0);
        self.0 = self.0.saturating_add(1);
        id
    }
}

/// Sub-tile precision position (world units)
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct GamePosition {
    pub x: f32,
    pub y: f32,
}

impl GamePosition {
    pub fn vec(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Velocity in world units per second
#[derive(Component, Clone, Copy, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// One of the four cardinal directions an entity can face.
#[derive(Component, Clone, Copy, PartialEq, Eq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub enum Facing {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Facing {
    pub fn unit(self) -> Vec2 {
        match self {
            Facing::Up => Vec2::Y,
            Facing::Down => Vec2::NEG_Y,
            Facing::Left => Vec2::NEG_X,
            Facing::Right => Vec2::X,
        }
    }

    pub fn from_vec(v: Vec2) -> Self {
        if v.x.abs() >= v.y.abs() {
            if v.x >= 0.0 {
                Facing::Right
            } else {
                Facing::Left
            }
        } else if v.y >= 0.0 {
            Facing::Up
        } else {
            Facing::Down
        }
    }

    pub const CARDINALS: [Facing; 4] = [Facing::Up, Facing::Down, Facing::Left, Facing::Right];
}

/// Axis-aligned collision box centered on the entity position
#[derive(Component, Clone, Copy)]
pub struct Collider {
    pub width: f32,
    pub height: f32,
}

/// Whether the entity is alive
#[derive(Component, Clone, Copy)]
pub struct Alive(pub bool);

/// Hit points. `current` stays in [0, max].
#[derive(Component, Clone, Copy)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }
}

/// Wall contact flags for the previous integration step, per axis.
#[derive(Component, Clone, Copy, Default)]
pub struct WallContact {
    pub x: bool,
    pub y: bool,
}

impl WallContact {
    pub fn any(self) -> bool {
        self.x || self.y
    }
}

/// Free-form tags for matching in triggers and events
#[derive(Component, Clone, Default)]
pub struct Tags(pub HashSet<String>);

/// Gameplay tuning constants (as a resource so they can be tweaked per level)
#[derive(Resource, Clone, serde::Serialize, serde::Deserialize)]
pub struct GameConfig {
    pub tile_size: f32,
    pub player_speed: f32,
    pub player_max_health: f32,
    /// Seconds for health to regenerate from empty to full
    pub recovery_seconds: f32,
    pub punch_cooldown: f32,
    pub punch_reach: f32,
    /// Distance in front of the player tested by the "use" action
    pub use_distance: f32,
    pub shamble_speed: f32,
    pub charge_speed: f32,
    pub stun_seconds: f32,
    pub attack_damage: f32,
    pub attack_cooldown: f32,
    /// Seconds between direction rethinks while shambling
    pub idea_interval: f32,
    /// Chance a rethink holds still instead of picking a direction
    pub think_chance: f32,
    pub spot_interval: f32,
    pub sight_range: f32,
    /// Half-angle of the spotting cone, radians
    pub sight_half_angle: f32,
    pub boss_base_speed: f32,
    pub boss_speed_per_step: f32,
    pub ritual_step_seconds: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tile_size: 32.0,
            player_speed: 140.0,
            player_max_health: 100.0,
            recovery_seconds: 60.0,
            punch_cooldown: 0.5,
            punch_reach: 28.0,
            use_distance: 24.0,
            shamble_speed: 40.0,
            charge_speed: 110.0,
            stun_seconds: 4.0,
            attack_damage: 10.0,
            attack_cooldown: 0.8,
            idea_interval: 2.0,
            think_chance: 0.2,
            spot_interval: 0.4,
            sight_range: 180.0,
            sight_half_angle: std::f32::consts::FRAC_PI_3,
            boss_base_speed: 50.0,
            boss_speed_per_step: 6.0,
            ritual_step_seconds: 9.0,
        }
    }
}

/// AABB overlap between two centered boxes
pub fn aabb_overlap(ax: f32, ay: f32, aw: f32, ah: f32, bx: f32, by: f32, bw: f32, bh: f32) -> bool {
    ax + aw / 2.0 > bx - bw / 2.0
        && ax - aw / 2.0 < bx + bw / 2.0
        && ay + ah / 2.0 > by - bh / 2.0
        && ay - ah / 2.0 < by + bh / 2.0
}
