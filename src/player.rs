use bevy::prelude::*;

use crate::clock::Clock;
use crate::components::*;
use crate::events::GameEventBus;
use crate::game_runtime::SimSet;
use crate::input::VirtualInput;
use crate::inventory::Inventory;
use crate::messages::MessageQueue;

pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(PendingPunch(false)).add_systems(
            FixedUpdate,
            (
                player_control.in_set(SimSet::Control),
                (player_regen, player_death)
                    .chain()
                    .in_set(SimSet::Behavior),
            )
                .run_if(crate::game_runtime::gameplay_systems_enabled),
        );
    }
}

/// Count of pursuers currently holding the player in an attack.
/// Control is locked while this is non-zero.
#[derive(Component, Default)]
pub struct Seized(pub u32);

/// Punch cooldown deadline against the simulated clock
#[derive(Component, Default)]
pub struct PunchState {
    pub next_punch_at: f64,
}

/// Set by the control step when a punch lands this tick; consumed by the
/// pursuer behavior step in the same tick.
#[derive(Resource)]
pub struct PendingPunch(pub bool);

pub const PLAYER_SIZE: f32 = 22.0;

pub fn spawn_player(
    commands: &mut Commands,
    next_id: &mut NextGameId,
    config: &GameConfig,
    x: f32,
    y: f32,
) -> Entity {
    commands
        .spawn((
            next_id.allocate(),
            Player,
            GamePosition { x, y },
            Velocity::default(),
            Facing::Down,
            Collider {
                width: PLAYER_SIZE,
                height: PLAYER_SIZE,
            },
            WallContact::default(),
            Alive(true),
            Health::new(config.player_max_health),
            Inventory::default(),
            Seized(0),
            PunchState::default(),
            Transform::from_xyz(x, y, 10.0),
        ))
        .id()
}

/// Additive combination of the four held direction flags, renormalized so
/// diagonal input is not faster than cardinal input.
pub fn control_velocity(up: bool, down: bool, left: bool, right: bool, speed: f32) -> Vec2 {
    let mut dir = Vec2::ZERO;
    if up {
        dir.y += 1.0;
    }
    if down {
        dir.y -= 1.0;
    }
    if left {
        dir.x -= 1.0;
    }
    if right {
        dir.x += 1.0;
    }
    if dir.length_squared() > 0.0 {
        dir.normalize() * speed
    } else {
        Vec2::ZERO
    }
}

fn player_control(
    input: Res<VirtualInput>,
    config: Res<GameConfig>,
    clock: Res<Clock>,
    messages: Res<MessageQueue>,
    mut pending_punch: ResMut<PendingPunch>,
    mut query: Query<
        (&Alive, &Seized, &mut Velocity, &mut Facing, &mut PunchState),
        With<Player>,
    >,
) {
    pending_punch.0 = false;
    let Ok((alive, seized, mut vel, mut facing, mut punch)) = query.get_single_mut() else {
        return;
    };

    if !alive.0 || seized.0 > 0 || messages.blocks_player() {
        vel.x = 0.0;
        vel.y = 0.0;
    } else {
        let v = control_velocity(
            input.pressed("up"),
            input.pressed("down"),
            input.pressed("left"),
            input.pressed("right"),
            config.player_speed,
        );
        vel.x = v.x;
        vel.y = v.y;
        if v.length_squared() > 0.0 {
            *facing = Facing::from_vec(v);
        }
    }

    // Punching stays possible while a pursuer has the player pinned; it is
    // the only way out of an attack
    if alive.0
        && !messages.blocks_player()
        && input.just_pressed("punch")
        && clock.now() >= punch.next_punch_at
    {
        punch.next_punch_at = clock.now() + config.punch_cooldown as f64;
        pending_punch.0 = true;
    }
}

/// Linear regeneration toward max while alive. Damage interrupts by lowering
/// `current`; the rate itself never resets.
pub fn regen_step(health: &mut Health, alive: bool, dt: f32, recovery_seconds: f32) {
    if !alive || recovery_seconds <= 0.0 {
        return;
    }
    health.current = (health.current + health.max / recovery_seconds * dt).min(health.max);
}

/// Cosmetic damage overlay strength, fed to the renderer
pub fn ability_rate(health: &Health) -> f32 {
    if health.max <= 0.0 {
        return 0.0;
    }
    (health.current.max(0.0) / health.max).sqrt()
}

fn player_regen(
    time: Res<Time<Fixed>>,
    config: Res<GameConfig>,
    mut query: Query<(&Alive, &mut Health), With<Player>>,
) {
    for (alive, mut health) in query.iter_mut() {
        regen_step(&mut health, alive.0, time.delta_secs(), config.recovery_seconds);
    }
}

fn player_death(
    mut events: ResMut<GameEventBus>,
    mut query: Query<(&GameId, &Health, &mut Alive, &mut Velocity), With<Player>>,
) {
    for (id, health, mut alive, mut vel) in query.iter_mut() {
        if alive.0 && health.current <= 0.0 {
            alive.0 = false;
            vel.x = 0.0;
            vel.y = 0.0;
            events.emit("player_died", serde_json::json!({ "player": id.0 }), Some(id.0));
            events.emit("game_over", serde_json::json!({}), Some(id.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_input_is_not_faster_than_cardinal() {
        let cardinal = control_velocity(false, false, false, true, 140.0);
        let diagonal = control_velocity(true, false, false, true, 140.0);
        assert!((cardinal.length() - 140.0).abs() < 1e-3);
        assert!((diagonal.length() - 140.0).abs() < 1e-3);
        assert!(diagonal.x > 0.0 && diagonal.y > 0.0);
    }

    #[test]
    fn opposing_flags_cancel() {
        let v = control_velocity(true, true, true, false, 140.0);
        assert!((v.length() - 140.0).abs() < 1e-3);
        assert_eq!(v.y, 0.0);
    }

    #[test]
    fn regen_integrates_over_variable_deltas() {
        // 10 ticks of 100ms at recovery-time 60s from half health
        let mut health = Health {
            current: 50.0,
            max: 100.0,
        };
        for _ in 0..10 {
            regen_step(&mut health, true, 0.1, 60.0);
        }
        let expected = 50.0 + 100.0 / 60.0 * 1.0;
        assert!((health.current - expected).abs() < 1e-4);
    }

    #[test]
    fn regen_clamps_at_max_and_stops_when_dead() {
        let mut health = Health {
            current: 99.9,
            max: 100.0,
        };
        for _ in 0..100 {
            regen_step(&mut health, true, 0.1, 60.0);
        }
        assert_eq!(health.current, 100.0);

        let mut dead = Health {
            current: 10.0,
            max: 100.0,
        };
        regen_step(&mut dead, false, 1.0, 60.0);
        assert_eq!(dead.current, 10.0);
    }

    #[test]
    fn ability_rate_follows_square_root_of_health() {
        let health = Health {
            current: 25.0,
            max: 100.0,
        };
        assert!((ability_rate(&health) - 0.5).abs() < 1e-5);
        let empty = Health {
            current: -5.0,
            max: 100.0,
        };
        assert_eq!(ability_rate(&empty), 0.0);
    }
}
