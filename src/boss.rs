use bevy::prelude::*;
use rand::Rng;

use crate::clock::{Clock, ScheduledTask};
use crate::components::*;
use crate::events::GameEventBus;
use crate::game_runtime::SimSet;
use crate::perception::{can_see, SightProfile};
use crate::pursuer::{spawn_pursuer, SimRng};
use crate::tilemap::Tilemap;

pub struct BossPlugin;

impl Plugin for BossPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(RitualCursor::default()).add_systems(
            FixedUpdate,
            (boss_behavior, apply_ritual_steps)
                .chain()
                .in_set(SimSet::Behavior)
                .run_if(crate::game_runtime::gameplay_systems_enabled),
        );
    }
}

#[derive(Component)]
pub struct Boss;

pub const BOSS_SIZE: f32 = 30.0;

/// Dagfin waits at the ritual site until the player breaks line-of-sight
/// cover, then never lets go.
#[derive(Component, Clone, PartialEq, Eq, Debug)]
pub enum BossState {
    Waiting,
    Aggro,
}

/// Monotonic ritual counter. Each step makes the boss faster and spawns
/// another pursuer.
#[derive(Component, Clone, Copy, Default)]
pub struct Ritual {
    pub progress: u32,
}

pub fn chase_speed(config: &GameConfig, progress: u32) -> f32 {
    config.boss_base_speed + progress as f32 * config.boss_speed_per_step
}

/// One tick of boss behavior. Returns the commanded velocity and whether this
/// tick promoted Waiting to Aggro.
pub fn boss_step(
    state: &mut BossState,
    progress: u32,
    pos: Vec2,
    player_pos: Vec2,
    player_alive: bool,
    tilemap: &Tilemap,
    config: &GameConfig,
) -> (Vec2, bool) {
    if !player_alive {
        return (Vec2::ZERO, false);
    }
    match state {
        BossState::Waiting => {
            // Sight regardless of distance or facing: obstruction is the only
            // thing keeping the player hidden
            if can_see(tilemap, pos, Facing::Down, player_pos, SightProfile::unbounded()) {
                *state = BossState::Aggro;
                let dir = (player_pos - pos).normalize_or_zero();
                (dir * chase_speed(config, progress), true)
            } else {
                (Vec2::ZERO, false)
            }
        }
        BossState::Aggro => {
            let dir = (player_pos - pos).normalize_or_zero();
            (dir * chase_speed(config, progress), false)
        }
    }
}

pub fn spawn_boss(commands: &mut Commands, next_id: &mut NextGameId, x: f32, y: f32) -> Entity {
    commands
        .spawn((
            next_id.allocate(),
            Boss,
            GamePosition { x, y },
            Velocity::default(),
            Facing::Down,
            Collider {
                width: BOSS_SIZE,
                height: BOSS_SIZE,
            },
            WallContact::default(),
            Alive(true),
            BossState::Waiting,
            Ritual::default(),
            Transform::from_xyz(x, y, 6.0),
        ))
        .id()
}

fn boss_behavior(
    tilemap: Res<Tilemap>,
    config: Res<GameConfig>,
    mut clock: ResMut<Clock>,
    mut events: ResMut<GameEventBus>,
    player_q: Query<(&GamePosition, &Alive), (With<Player>, Without<Boss>)>,
    mut boss_q: Query<
        (
            Entity,
            &GameId,
            &Alive,
            &GamePosition,
            &Ritual,
            &mut BossState,
            &mut Velocity,
            &mut Facing,
        ),
        With<Boss>,
    >,
) {
    let Ok((player_pos, player_alive)) = player_q.get_single() else {
        return;
    };

    for (entity, id, alive, pos, ritual, mut state, mut vel, mut facing) in boss_q.iter_mut() {
        if !alive.0 {
            continue;
        }
        let (velocity, newly_aggro) = boss_step(
            &mut state,
            ritual.progress,
            pos.vec(),
            player_pos.vec(),
            player_alive.0,
            &tilemap,
            &config,
        );
        vel.x = velocity.x;
        vel.y = velocity.y;
        if velocity.length_squared() > 0.0 {
            *facing = Facing::from_vec(velocity);
        }

        if newly_aggro {
            events.emit("boss_aggro", serde_json::json!({ "boss": id.0 }), Some(id.0));
            // Both timers die with their owner if the boss is ever killed
            clock.every_owned(
                config.ritual_step_seconds,
                entity,
                ScheduledTask::Emit {
                    name: "ritual_step".to_string(),
                    data: serde_json::json!({ "boss": id.0 }),
                },
            );
            clock.after_owned(
                2.0,
                entity,
                ScheduledTask::Emit {
                    name: "boss_howl".to_string(),
                    data: serde_json::json!({ "boss": id.0 }),
                },
            );
        }
    }
}

#[derive(Resource, Default)]
struct RitualCursor {
    last_frame: u64,
    processed_in_frame: usize,
}

/// Consume ritual_step firings from the clock: advance the counter and raise
/// a fresh pursuer next to the boss.
fn apply_ritual_steps(
    mut commands: Commands,
    config: Res<GameConfig>,
    clock: Res<Clock>,
    tilemap: Res<Tilemap>,
    mut cursor: ResMut<RitualCursor>,
    mut next_id: ResMut<NextGameId>,
    mut rng: ResMut<SimRng>,
    mut events: ResMut<GameEventBus>,
    mut boss_q: Query<(&GameId, &Alive, &GamePosition, &mut Ritual), With<Boss>>,
) {
    let mut pending: Vec<u64> = Vec::new();
    let mut count_in_frame = 0usize;
    for ev in events.recent.iter() {
        if ev.frame < cursor.last_frame {
            continue;
        }
        if ev.frame == cursor.last_frame {
            count_in_frame = count_in_frame.saturating_add(1);
            if count_in_frame <= cursor.processed_in_frame {
                continue;
            }
        } else {
            count_in_frame = 1;
        }

        if ev.name == "ritual_step" {
            if let Some(boss) = ev.data.get("boss").and_then(|v| v.as_u64()) {
                pending.push(boss);
            }
        }

        cursor.last_frame = ev.frame;
        cursor.processed_in_frame = count_in_frame;
    }

    for boss_id in pending {
        for (id, alive, pos, mut ritual) in boss_q.iter_mut() {
            if id.0 != boss_id || !alive.0 {
                continue;
            }
            ritual.progress = ritual.progress.saturating_add(1);

            let dir = Facing::CARDINALS[rng.0.gen_range(0..4)].unit();
            let spawn = pos.vec() + dir * tilemap.tile_size * 1.5;
            spawn_pursuer(&mut commands, &mut next_id, &config, &clock, spawn.x, spawn.y);
            events.emit(
                "ritual_advanced",
                serde_json::json!({ "boss": boss_id, "progress": ritual.progress }),
                Some(boss_id),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_boss_activates_only_with_clear_sight() {
        let mut map = Tilemap::walled_room(20, 20, 32.0);
        let config = GameConfig::default();
        let mut state = BossState::Waiting;
        let boss_pos = map.tile_center(2, 2);
        // Far across the room, well outside any normal sight range
        let player_pos = map.tile_center(17, 2);

        // A wall between them keeps the boss waiting
        map.set(10, 2, crate::tilemap::TileType::Solid);
        let (vel, aggro) = boss_step(
            &mut state,
            0,
            boss_pos,
            player_pos,
            true,
            &map,
            &config,
        );
        assert_eq!(state, BossState::Waiting);
        assert_eq!(vel, Vec2::ZERO);
        assert!(!aggro);

        // Clearing the wall activates despite the distance
        map.set(10, 2, crate::tilemap::TileType::Empty);
        let (vel, aggro) = boss_step(
            &mut state,
            0,
            boss_pos,
            player_pos,
            true,
            &map,
            &config,
        );
        assert_eq!(state, BossState::Aggro);
        assert!(aggro);
        assert!(vel.x > 0.0);
    }

    #[test]
    fn aggro_boss_never_waits_again_and_reaims_every_tick() {
        let map = Tilemap::walled_room(20, 20, 32.0);
        let config = GameConfig::default();
        let mut state = BossState::Aggro;
        let boss_pos = map.tile_center(5, 5);

        let (vel_a, aggro) = boss_step(
            &mut state,
            0,
            boss_pos,
            map.tile_center(10, 5),
            true,
            &map,
            &config,
        );
        assert!(!aggro);
        assert!(vel_a.x > 0.0);

        let (vel_b, _) = boss_step(
            &mut state,
            0,
            boss_pos,
            map.tile_center(5, 10),
            true,
            &map,
            &config,
        );
        assert!(vel_b.y > 0.0);
        assert_eq!(state, BossState::Aggro);
    }

    #[test]
    fn ritual_progress_strictly_increases_speed() {
        let config = GameConfig::default();
        let mut last = chase_speed(&config, 0);
        for progress in 1..10 {
            let speed = chase_speed(&config, progress);
            assert!(speed > last);
            last = speed;
        }
        assert_eq!(
            chase_speed(&config, 3),
            config.boss_base_speed + 3.0 * config.boss_speed_per_step
        );
    }
}
