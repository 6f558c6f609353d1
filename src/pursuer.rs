use bevy::prelude::*;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::clock::Clock;
use crate::components::*;
use crate::events::GameEventBus;
use crate::game_runtime::SimSet;
use crate::perception::{can_see, SightProfile};
use crate::player::{PendingPunch, Seized};
use crate::tilemap::Tilemap;

pub struct PursuerPlugin;

impl Plugin for PursuerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            pursuer_behavior
                .in_set(SimSet::Behavior)
                .run_if(crate::game_runtime::gameplay_systems_enabled),
        );
    }
}

/// Shared random stream for the simulation, seeded per level so headless
/// runs are reproducible.
#[derive(Resource)]
pub struct SimRng(pub SmallRng);

#[derive(Component)]
pub struct Pursuer;

pub const PURSUER_SIZE: f32 = 24.0;

/// Exactly one behavior is active at a time; all timed state lives in the
/// variant payloads or in `PursuerTimers` deadlines against the clock.
#[derive(Component, Clone, PartialEq, Debug)]
pub enum PursuerState {
    Normal,
    Charging { dir: Vec2 },
    Attacking { next_damage_at: f64 },
    Stunned { wake_at: f64 },
}

#[derive(Component, Clone, Copy, Default, Debug)]
pub struct PursuerTimers {
    pub next_idea_at: f64,
    pub next_spot_at: f64,
}

/// Per-entity sight parameters; the boss overrides these with an unbounded
/// profile.
#[derive(Component, Clone, Copy)]
pub struct Sight(pub SightProfile);

pub fn state_speed(state: &PursuerState, config: &GameConfig) -> f32 {
    match state {
        PursuerState::Normal => config.shamble_speed,
        PursuerState::Charging { .. } => config.charge_speed,
        PursuerState::Attacking { .. } | PursuerState::Stunned { .. } => 0.0,
    }
}

/// Side effects of one behavior step, applied by the driving system.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum PursuerEvent {
    AggroCue,
    Stunned,
    Woke,
    AttackStarted,
    AttackEnded,
    DamagePlayer(f32),
}

pub struct StepCtx<'a> {
    pub tilemap: &'a Tilemap,
    pub config: &'a GameConfig,
    pub now: f64,
    pub player_pos: Vec2,
    pub player_alive: bool,
    /// Player punched and this pursuer is inside the reach box this tick
    pub punched: bool,
    /// Collision boxes overlap this tick
    pub overlap: bool,
}

pub struct StepOutcome {
    pub velocity: Vec2,
    pub facing: Option<Facing>,
    pub events: Vec<PursuerEvent>,
}

/// One tick of the pursuer state machine. Pure over its inputs apart from the
/// random stream; the caller owns clock, queries, and event emission.
pub fn step(
    state: &mut PursuerState,
    timers: &mut PursuerTimers,
    pos: Vec2,
    facing: Facing,
    current_vel: Vec2,
    wall: WallContact,
    sight: SightProfile,
    ctx: &StepCtx,
    rng: &mut SmallRng,
) -> StepOutcome {
    let mut out = StepOutcome {
        velocity: current_vel,
        facing: None,
        events: Vec::new(),
    };
    let cfg = ctx.config;

    // Global rule: a punch forces Stunned from any non-Stunned state.
    // Re-punching a stunned pursuer is a no-op, not a timer extension.
    if ctx.punched && !matches!(state, PursuerState::Stunned { .. }) {
        if matches!(state, PursuerState::Attacking { .. }) {
            out.events.push(PursuerEvent::AttackEnded);
        }
        *state = PursuerState::Stunned {
            wake_at: ctx.now + cfg.stun_seconds as f64,
        };
        out.events.push(PursuerEvent::Stunned);
        out.velocity = Vec2::ZERO;
        return out;
    }

    match state.clone() {
        PursuerState::Stunned { wake_at } => {
            if ctx.now >= wake_at {
                *state = PursuerState::Normal;
                // Immediate rethink on waking
                timers.next_idea_at = ctx.now;
                timers.next_spot_at = ctx.now + cfg.spot_interval as f64;
                out.events.push(PursuerEvent::Woke);
            }
            out.velocity = Vec2::ZERO;
        }

        PursuerState::Normal => {
            if ctx.overlap && ctx.player_alive {
                *state = PursuerState::Attacking {
                    next_damage_at: ctx.now + cfg.attack_cooldown as f64,
                };
                out.events.push(PursuerEvent::AttackStarted);
                out.events.push(PursuerEvent::DamagePlayer(cfg.attack_damage));
                out.velocity = Vec2::ZERO;
                return out;
            }

            if ctx.now >= timers.next_spot_at {
                timers.next_spot_at = ctx.now + cfg.spot_interval as f64;
                if ctx.player_alive && can_see(ctx.tilemap, pos, facing, ctx.player_pos, sight) {
                    let dir = (ctx.player_pos - pos).normalize_or_zero();
                    if dir != Vec2::ZERO {
                        *state = PursuerState::Charging { dir };
                        out.events.push(PursuerEvent::AggroCue);
                        out.facing = Some(Facing::from_vec(dir));
                        out.velocity = dir * state_speed(state, cfg);
                        return out;
                    }
                }
            }

            // Walking into a wall makes the next rethink come early
            if wall.any() {
                timers.next_idea_at = ctx.now;
            }
            if ctx.now >= timers.next_idea_at {
                timers.next_idea_at = ctx.now + cfg.idea_interval as f64;
                if rng.gen::<f32>() < cfg.think_chance {
                    // Thinking: hold still until the next idea
                    out.velocity = Vec2::ZERO;
                } else {
                    let dir = Facing::CARDINALS[rng.gen_range(0..4)];
                    out.facing = Some(dir);
                    out.velocity = dir.unit() * state_speed(state, cfg);
                }
            }
        }

        PursuerState::Charging { dir } => {
            if ctx.overlap && ctx.player_alive {
                *state = PursuerState::Attacking {
                    next_damage_at: ctx.now + cfg.attack_cooldown as f64,
                };
                out.events.push(PursuerEvent::AttackStarted);
                out.events.push(PursuerEvent::DamagePlayer(cfg.attack_damage));
                out.velocity = Vec2::ZERO;
                return out;
            }

            // The idea timer keeps firing while charging but the fixed
            // pursuit direction is only reconsidered on wall impact.
            if ctx.now >= timers.next_idea_at {
                timers.next_idea_at = ctx.now + cfg.idea_interval as f64;
            }

            if wall.any() {
                if ctx.player_alive && can_see(ctx.tilemap, pos, facing, ctx.player_pos, sight) {
                    let new_dir = (ctx.player_pos - pos).normalize_or_zero();
                    *state = PursuerState::Charging { dir: new_dir };
                    out.facing = Some(Facing::from_vec(new_dir));
                    out.velocity = new_dir * state_speed(state, cfg);
                } else {
                    *state = PursuerState::Normal;
                    timers.next_idea_at = ctx.now;
                    timers.next_spot_at = ctx.now + cfg.spot_interval as f64;
                    out.velocity = Vec2::ZERO;
                }
            } else {
                out.velocity = dir * state_speed(state, cfg);
            }
        }

        PursuerState::Attacking { next_damage_at } => {
            if !ctx.overlap || !ctx.player_alive {
                *state = PursuerState::Normal;
                timers.next_idea_at = ctx.now;
                timers.next_spot_at = ctx.now + cfg.spot_interval as f64;
                out.events.push(PursuerEvent::AttackEnded);
                out.velocity = Vec2::ZERO;
            } else {
                if ctx.now >= next_damage_at {
                    *state = PursuerState::Attacking {
                        next_damage_at: ctx.now + cfg.attack_cooldown as f64,
                    };
                    out.events.push(PursuerEvent::DamagePlayer(cfg.attack_damage));
                }
                out.velocity = Vec2::ZERO;
            }
        }
    }

    out
}

/// True if the pursuer's box overlaps the reach box a punch sweeps in front
/// of the player. The box starts at the player's own position so a pursuer
/// already on top of the player is still hit.
pub fn in_punch_reach(
    player_pos: Vec2,
    player_facing: Facing,
    reach: f32,
    target_pos: Vec2,
    target: Collider,
) -> bool {
    let center = player_pos + player_facing.unit() * (reach * 0.5);
    aabb_overlap(
        center.x,
        center.y,
        reach,
        reach,
        target_pos.x,
        target_pos.y,
        target.width,
        target.height,
    )
}

pub fn spawn_pursuer(
    commands: &mut Commands,
    next_id: &mut NextGameId,
    config: &GameConfig,
    clock: &Clock,
    x: f32,
    y: f32,
) -> Entity {
    commands
        .spawn((
            next_id.allocate(),
            Pursuer,
            GamePosition { x, y },
            Velocity::default(),
            Facing::Down,
            Collider {
                width: PURSUER_SIZE,
                height: PURSUER_SIZE,
            },
            WallContact::default(),
            Alive(true),
            PursuerState::Normal,
            PursuerTimers {
                next_idea_at: clock.now(),
                next_spot_at: clock.now() + config.spot_interval as f64,
            },
            Sight(SightProfile::new(config.sight_range, config.sight_half_angle)),
            Transform::from_xyz(x, y, 5.0),
        ))
        .id()
}

type PursuerQueryItem<'a> = (
    &'a GameId,
    &'a Alive,
    &'a GamePosition,
    &'a Collider,
    &'a WallContact,
    &'a Sight,
    &'a mut PursuerState,
    &'a mut PursuerTimers,
    &'a mut Velocity,
    &'a mut Facing,
);

fn pursuer_behavior(
    tilemap: Res<Tilemap>,
    config: Res<GameConfig>,
    clock: Res<Clock>,
    pending_punch: Res<PendingPunch>,
    mut rng: ResMut<SimRng>,
    mut events: ResMut<GameEventBus>,
    mut player_q: Query<
        (
            &GameId,
            &GamePosition,
            &Facing,
            &Collider,
            &Alive,
            &mut Health,
            &mut Velocity,
            &mut Seized,
        ),
        (With<crate::components::Player>, Without<Pursuer>),
    >,
    mut pursuers: Query<PursuerQueryItem<'_>, With<Pursuer>>,
) {
    let Ok((
        player_id,
        player_pos,
        player_facing,
        player_collider,
        player_alive,
        mut player_health,
        mut player_vel,
        mut seized,
    )) = player_q.get_single_mut()
    else {
        return;
    };
    let player_vec = player_pos.vec();

    for (id, alive, pos, collider, wall, sight, mut state, mut timers, mut vel, mut facing) in
        pursuers.iter_mut()
    {
        if !alive.0 {
            continue;
        }
        let pos_vec = pos.vec();
        let overlap = aabb_overlap(
            pos_vec.x,
            pos_vec.y,
            collider.width,
            collider.height,
            player_vec.x,
            player_vec.y,
            player_collider.width,
            player_collider.height,
        );
        let punched = pending_punch.0
            && player_alive.0
            && in_punch_reach(
                player_vec,
                *player_facing,
                config.punch_reach,
                pos_vec,
                *collider,
            );

        let ctx = StepCtx {
            tilemap: &tilemap,
            config: &config,
            now: clock.now(),
            player_pos: player_vec,
            player_alive: player_alive.0,
            punched,
            overlap,
        };
        let current_vel = Vec2::new(vel.x, vel.y);
        let outcome = step(
            &mut state,
            &mut timers,
            pos_vec,
            *facing,
            current_vel,
            *wall,
            sight.0,
            &ctx,
            &mut rng.0,
        );

        vel.x = outcome.velocity.x;
        vel.y = outcome.velocity.y;
        if let Some(f) = outcome.facing {
            *facing = f;
        }

        for event in outcome.events {
            match event {
                PursuerEvent::AggroCue => {
                    events.emit(
                        "pursuer_aggro",
                        serde_json::json!({ "pursuer": id.0, "target": player_id.0 }),
                        Some(id.0),
                    );
                }
                PursuerEvent::Stunned => {
                    events.emit("pursuer_stunned", serde_json::json!({ "pursuer": id.0 }), Some(id.0));
                }
                PursuerEvent::Woke => {
                    events.emit("pursuer_woke", serde_json::json!({ "pursuer": id.0 }), Some(id.0));
                }
                PursuerEvent::AttackStarted => {
                    seized.0 = seized.0.saturating_add(1);
                    player_vel.x = 0.0;
                    player_vel.y = 0.0;
                    events.emit("pursuer_attack", serde_json::json!({ "pursuer": id.0 }), Some(id.0));
                }
                PursuerEvent::AttackEnded => {
                    seized.0 = seized.0.saturating_sub(1);
                }
                PursuerEvent::DamagePlayer(amount) => {
                    if player_alive.0 {
                        player_health.current -= amount;
                        events.emit(
                            "player_damaged",
                            serde_json::json!({
                                "player": player_id.0,
                                "amount": amount,
                                "health": player_health.current.max(0.0),
                                "ability_rate": crate::player::ability_rate(&player_health),
                            }),
                            Some(id.0),
                        );
                    }
                }
            }
        }
    }
}
