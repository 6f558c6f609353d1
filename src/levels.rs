use bevy::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::boss::spawn_boss;
use crate::clock::Clock;
use crate::components::*;
use crate::events::GameEventBus;
use crate::inventory::Inventory;
use crate::pursuer::{spawn_pursuer, SimRng};
use crate::script::{ScriptAction, ScriptQueue};
use crate::tilemap::{TileType, Tilemap};
use crate::triggers::{ObjectDef, RegionDef, TriggerChannel, TriggerRegistry};

pub struct LevelsPlugin;

impl Plugin for LevelsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(PendingLevel::default())
            .insert_resource(CurrentLevel::default())
            .add_systems(Update, load_pending_level);
    }
}

/// The game's chapters. A closed set: level construction is resolved at
/// compile time, never by name lookup.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelId {
    Manor,
    Crypt,
    RitualChamber,
}

impl LevelId {
    pub fn name(self) -> &'static str {
        match self {
            LevelId::Manor => "manor",
            LevelId::Crypt => "crypt",
            LevelId::RitualChamber => "ritual_chamber",
        }
    }
}

/// Set by the level script; consumed by `load_pending_level` on the next
/// frame boundary.
#[derive(Resource, Default)]
pub struct PendingLevel(pub Option<LevelId>);

#[derive(Resource, Default)]
pub struct CurrentLevel(pub Option<LevelId>);

type Binding = (String, TriggerChannel, Vec<ScriptAction>);

/// Everything a chapter contributes: terrain, spawns, authored trigger
/// geometry, listener wiring, and the actions run on entry.
pub struct LevelData {
    pub tilemap: Tilemap,
    pub player_spawn: Vec2,
    pub pursuer_spawns: Vec<Vec2>,
    pub boss_spawn: Option<Vec2>,
    pub regions: Vec<RegionDef>,
    pub objects: Vec<ObjectDef>,
    pub bindings: Vec<Binding>,
    pub opening: Vec<ScriptAction>,
    pub rng_seed: u64,
}

pub fn build_level(id: LevelId, config: &GameConfig) -> LevelData {
    match id {
        LevelId::Manor => manor(config),
        LevelId::Crypt => crypt(config),
        LevelId::RitualChamber => ritual_chamber(config),
    }
}

fn region(name: &str, tilemap: &Tilemap, tx: i32, ty: i32, tw: i32, th: i32) -> RegionDef {
    let ts = tilemap.tile_size;
    RegionDef {
        name: name.to_string(),
        x: tx as f32 * ts,
        y: ty as f32 * ts,
        w: tw as f32 * ts,
        h: th as f32 * ts,
    }
}

fn object(name: &str, tilemap: &Tilemap, tx: i32, ty: i32) -> ObjectDef {
    let center = tilemap.tile_center(tx, ty);
    ObjectDef {
        name: name.to_string(),
        x: center.x,
        y: center.y,
        w: tilemap.tile_size,
        h: tilemap.tile_size,
        properties: Default::default(),
    }
}

fn door(name: &str, switch: &str, tilemap: &mut Tilemap, tx: i32, ty: i32) -> ObjectDef {
    // Doors start closed: the object is alive and its tile blocks
    tilemap.set(tx, ty, TileType::Solid);
    let mut def = object(name, tilemap, tx, ty);
    def.properties.insert("switch".into(), switch.into());
    def
}

fn msg(text: &str) -> ScriptAction {
    ScriptAction::ShowMessage {
        text: text.to_string(),
        blocks_player: false,
        then: Vec::new(),
    }
}

fn blocking_msg(text: &str) -> ScriptAction {
    ScriptAction::ShowMessage {
        text: text.to_string(),
        blocks_player: true,
        then: Vec::new(),
    }
}

/// Chapter one. Wake up in the manor, find the cellar key, unlock the door
/// down.
fn manor(config: &GameConfig) -> LevelData {
    let mut map = Tilemap::walled_room(20, 14, config.tile_size);
    for y in 1..=12 {
        map.set(10, y, TileType::Solid);
    }
    map.set(10, 7, TileType::Empty);

    let regions = vec![region("cellar_stairs", &map, 17, 6, 2, 2)];
    let objects = vec![
        object("cellar_key", &map, 5, 3),
        door("manor_cellar_door", "manor_door", &mut map, 10, 7),
    ];

    let bindings: Vec<Binding> = vec![
        (
            "cellar_key".into(),
            TriggerChannel::Activate,
            vec![
                ScriptAction::GiveItem {
                    id: "cellar_key".into(),
                },
                ScriptAction::RemoveObject {
                    name: "cellar_key".into(),
                },
                msg("A small iron key. It smells of damp earth."),
            ],
        ),
        (
            "manor_cellar_door".into(),
            TriggerChannel::Activate,
            vec![ScriptAction::IfHasItem {
                id: "cellar_key".into(),
                then: vec![
                    ScriptAction::ToggleDoors {
                        switch: "manor_door".into(),
                    },
                    ScriptAction::TakeItem {
                        id: "cellar_key".into(),
                    },
                    msg("The key turns, then snaps off in the lock."),
                ],
                otherwise: vec![msg("Locked. Something rattles on the other side.")],
            }],
        ),
        (
            "cellar_stairs".into(),
            TriggerChannel::Enter,
            vec![ScriptAction::TransitionLevel {
                to: LevelId::Crypt,
            }],
        ),
    ];

    LevelData {
        player_spawn: map.tile_center(3, 7),
        pursuer_spawns: vec![map.tile_center(15, 10)],
        boss_spawn: None,
        regions,
        objects,
        bindings,
        opening: vec![blocking_msg(
            "You wake on the manor floor. The candles have gone out.",
        )],
        rng_seed: 0x4d414e4f52,
        tilemap: map,
    }
}

/// Chapter two. A crypt in full darkness until the lantern is found; a lever
/// opens the gate to the idol.
fn crypt(config: &GameConfig) -> LevelData {
    let mut map = Tilemap::walled_room(24, 16, config.tile_size);
    for y in 1..=14 {
        map.set(14, y, TileType::Solid);
    }
    map.set(14, 8, TileType::Empty);

    let regions = vec![region("ritual_passage", &map, 21, 13, 2, 2)];
    let objects = vec![
        object("lantern", &map, 4, 12),
        object("crypt_lever", &map, 11, 3),
        object("black_idol", &map, 20, 4),
        door("crypt_gate", "crypt_gate_switch", &mut map, 14, 8),
    ];

    let bindings: Vec<Binding> = vec![
        (
            "lantern".into(),
            TriggerChannel::Activate,
            vec![
                ScriptAction::GiveItem {
                    id: "lantern".into(),
                },
                ScriptAction::RemoveObject {
                    name: "lantern".into(),
                },
                ScriptAction::SetLights { on: true },
                msg("The lantern sputters to life."),
            ],
        ),
        (
            "crypt_lever".into(),
            TriggerChannel::Activate,
            vec![
                ScriptAction::ToggleDoors {
                    switch: "crypt_gate_switch".into(),
                },
                msg("Stone grinds against stone."),
            ],
        ),
        (
            "black_idol".into(),
            TriggerChannel::Activate,
            vec![
                ScriptAction::GiveItem {
                    id: "black_idol".into(),
                },
                ScriptAction::RemoveObject {
                    name: "black_idol".into(),
                },
                msg("The idol is colder than the air around it."),
            ],
        ),
        (
            "ritual_passage".into(),
            TriggerChannel::Enter,
            vec![ScriptAction::TransitionLevel {
                to: LevelId::RitualChamber,
            }],
        ),
    ];

    LevelData {
        player_spawn: map.tile_center(2, 8),
        pursuer_spawns: vec![
            map.tile_center(8, 12),
            map.tile_center(18, 4),
            map.tile_center(20, 11),
        ],
        boss_spawn: None,
        regions,
        objects,
        bindings,
        opening: vec![
            ScriptAction::SetLights { on: false },
            blocking_msg("The stairs end in darkness. You can hear shuffling."),
        ],
        rng_seed: 0x43525950,
        tilemap: map,
    }
}

/// The final chapter. Dagfin waits at the ritual site behind the pillars;
/// stepping into his line of sight starts the chase.
fn ritual_chamber(config: &GameConfig) -> LevelData {
    let mut map = Tilemap::walled_room(24, 18, config.tile_size);
    // Pillar row giving the player cover from the ritual site
    for y in 8..=10 {
        map.set(12, y, TileType::Solid);
    }
    map.set(6, 4, TileType::Solid);
    map.set(6, 13, TileType::Solid);
    map.set(17, 4, TileType::Solid);
    map.set(17, 13, TileType::Solid);

    let regions = vec![region("sanctum_gate", &map, 21, 1, 2, 2)];
    let objects = Vec::new();

    let bindings: Vec<Binding> = vec![(
        "sanctum_gate".into(),
        TriggerChannel::Enter,
        vec![ScriptAction::IfHasItem {
            id: "black_idol".into(),
            then: vec![
                msg("The idol burns your hand as the seal gives way."),
                ScriptAction::EmitEvent {
                    name: "game_won".into(),
                    data: serde_json::Value::Null,
                },
            ],
            otherwise: vec![msg("The seal holds. Something is missing.")],
        }],
    )];

    LevelData {
        player_spawn: map.tile_center(3, 9),
        pursuer_spawns: vec![map.tile_center(8, 4)],
        boss_spawn: Some(map.tile_center(20, 9)),
        regions,
        objects,
        bindings,
        opening: vec![
            blocking_msg("Candle smoke hangs in rings above the ritual circle."),
            ScriptAction::After {
                seconds: 30.0,
                then: vec![msg("The chanting grows louder.")],
            },
        ],
        rng_seed: 0x52495455,
        tilemap: map,
    }
}

type LoadParams<'w> = (
    ResMut<'w, PendingLevel>,
    ResMut<'w, CurrentLevel>,
    ResMut<'w, NextGameId>,
    ResMut<'w, TriggerRegistry>,
    ResMut<'w, SimRng>,
    ResMut<'w, Tilemap>,
    ResMut<'w, ScriptQueue>,
    ResMut<'w, GameEventBus>,
);

fn load_pending_level(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut clock: ResMut<Clock>,
    params: LoadParams,
    existing: Query<Entity, With<GameId>>,
    player_inv: Query<&Inventory, With<Player>>,
) {
    let (
        mut pending,
        mut current,
        mut next_id,
        mut registry,
        mut rng,
        mut tilemap,
        mut queue,
        mut events,
    ) = params;

    let Some(id) = pending.0.take() else {
        return;
    };
    if let Some(prev) = current.0 {
        info!("[Dagfin] Leaving '{}'", prev.name());
    }

    // Inventory survives chapter transitions; everything else is rebuilt
    let carried = player_inv
        .get_single()
        .map(|inv| inv.clone())
        .unwrap_or_default();
    for entity in existing.iter() {
        // Timers owned by unloaded entities must never fire in the next level
        clock.cancel_owned(entity);
        commands.entity(entity).despawn();
    }

    let data = build_level(id, &config);
    *tilemap = data.tilemap;
    registry.load(data.regions, data.objects);
    for (target, channel, actions) in data.bindings {
        registry.bind_or_warn(&target, channel, actions);
    }
    rng.0 = SmallRng::seed_from_u64(data.rng_seed);

    let player = crate::player::spawn_player(
        &mut commands,
        &mut next_id,
        &config,
        data.player_spawn.x,
        data.player_spawn.y,
    );
    commands.entity(player).insert(carried);

    for spawn in data.pursuer_spawns {
        spawn_pursuer(&mut commands, &mut next_id, &config, &clock, spawn.x, spawn.y);
    }
    if let Some(spawn) = data.boss_spawn {
        spawn_boss(&mut commands, &mut next_id, spawn.x, spawn.y);
    }

    queue.enqueue(data.opening);
    current.0 = Some(id);
    info!("[Dagfin] Loaded level '{}'", id.name());
    events.emit(
        "level_loaded",
        serde_json::json!({ "level": id.name() }),
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockPlugin;
    use crate::input::VirtualInput;
    use crate::messages::MessageQueue;
    use crate::player::spawn_player;
    use crate::pursuer::{Pursuer, PursuerState, PursuerTimers};
    use bevy::ecs::system::SystemState;
    use std::time::Duration;

    fn harness() -> App {
        let mut app = App::new();
        app.add_plugins(bevy::state::app::StatesPlugin)
            .insert_resource(GameConfig::default())
            .insert_resource(NextGameId::default())
            .insert_resource(Time::<Fixed>::from_hz(60.0))
            .insert_resource(VirtualInput::default())
            .insert_resource(SimRng(SmallRng::seed_from_u64(1)))
            .insert_resource(Tilemap::walled_room(20, 20, 32.0))
            .add_plugins(crate::game_runtime::RuntimeStatePlugin)
            .add_plugins(crate::events::GameEventsPlugin)
            .add_plugins(ClockPlugin)
            .add_plugins(crate::physics::PhysicsPlugin)
            .add_plugins(crate::player::PlayerPlugin)
            .add_plugins(crate::pursuer::PursuerPlugin)
            .add_plugins(crate::boss::BossPlugin)
            .add_plugins(crate::triggers::TriggersPlugin)
            .add_plugins(crate::messages::MessagesPlugin)
            .add_plugins(crate::script::ScriptPlugin)
            .add_plugins(LevelsPlugin);
        app
    }

    /// Advance one fixed simulation tick by hand.
    fn tick(app: &mut App, dt: f32) {
        app.world_mut()
            .resource_mut::<Time<Fixed>>()
            .advance_by(Duration::from_secs_f32(dt));
        app.world_mut().run_schedule(FixedUpdate);
    }

    fn spawn_test_player(app: &mut App, pos: Vec2) -> Entity {
        let world = app.world_mut();
        let mut state: SystemState<(Commands, ResMut<NextGameId>, Res<GameConfig>)> =
            SystemState::new(world);
        let (mut commands, mut next_id, config) = state.get_mut(world);
        let entity = spawn_player(&mut commands, &mut next_id, &config, pos.x, pos.y);
        state.apply(world);
        entity
    }

    fn spawn_test_pursuer(app: &mut App, pos: Vec2, timers: PursuerTimers) -> Entity {
        let world = app.world_mut();
        let mut state: SystemState<(Commands, ResMut<NextGameId>, Res<GameConfig>, Res<Clock>)> =
            SystemState::new(world);
        let (mut commands, mut next_id, config, clock) = state.get_mut(world);
        let entity = spawn_pursuer(&mut commands, &mut next_id, &config, &clock, pos.x, pos.y);
        state.apply(world);
        app.world_mut().entity_mut(entity).insert(timers);
        entity
    }

    fn event_count(app: &App, name: &str) -> usize {
        app.world().resource::<GameEventBus>().count(name)
    }

    #[test]
    fn every_level_builds_and_binds_cleanly() {
        let config = GameConfig::default();
        for id in [LevelId::Manor, LevelId::Crypt, LevelId::RitualChamber] {
            let data = build_level(id, &config);
            let mut registry = TriggerRegistry::default();
            registry.load(data.regions, data.objects);
            for (target, channel, actions) in data.bindings {
                registry
                    .bind(&target, channel, actions)
                    .unwrap_or_else(|e| panic!("{}: {}", id.name(), e));
            }
            assert!(
                !data.tilemap.is_solid(
                    (data.player_spawn.x / config.tile_size) as i32,
                    (data.player_spawn.y / config.tile_size) as i32
                ),
                "{}: player spawns inside a wall",
                id.name()
            );
        }
    }

    #[test]
    fn pursuer_spots_player_and_charges_within_one_interval() {
        let mut app = harness();
        let map = app.world().resource::<Tilemap>().clone();
        let player_pos = map.tile_center(5, 10);
        let pursuer_pos = map.tile_center(9, 10);
        spawn_test_player(&mut app, player_pos);
        let pursuer = spawn_test_pursuer(
            &mut app,
            pursuer_pos,
            // Idea deadline pushed out so the shamble never wanders the
            // pursuer out of its own sight line
            PursuerTimers {
                next_idea_at: 1e9,
                next_spot_at: 0.0,
            },
        );
        app.world_mut().entity_mut(pursuer).insert(Facing::Left);

        let config = app.world().resource::<GameConfig>().clone();
        let mut charged_at = None;
        let dt = 1.0 / 60.0;
        for i in 0..60 {
            tick(&mut app, dt);
            let state = app.world().entity(pursuer).get::<PursuerState>().unwrap();
            if matches!(state, PursuerState::Charging { .. }) {
                charged_at = Some(i as f32 * dt);
                break;
            }
        }
        let charged_at = charged_at.expect("pursuer never charged");
        assert!(charged_at <= config.spot_interval + dt);

        let vel = app.world().entity(pursuer).get::<Velocity>().unwrap();
        assert!(vel.x < 0.0, "charge should head toward the player");
        assert_eq!(event_count(&app, "pursuer_aggro"), 1);

        // Sight stays true; the promotion must not re-fire the cue
        for _ in 0..30 {
            tick(&mut app, dt);
        }
        assert_eq!(event_count(&app, "pursuer_aggro"), 1);
    }

    #[test]
    fn punch_stuns_then_pursuer_wakes_back_to_normal() {
        let mut app = harness();
        let map = app.world().resource::<Tilemap>().clone();
        let pos = map.tile_center(5, 5);
        spawn_test_player(&mut app, pos);
        let pursuer = spawn_test_pursuer(
            &mut app,
            pos,
            PursuerTimers {
                next_idea_at: 1e9,
                next_spot_at: 1e9,
            },
        );

        app.world_mut()
            .resource_mut::<VirtualInput>()
            .press("punch");
        tick(&mut app, 1.0 / 60.0);
        {
            let mut input = app.world_mut().resource_mut::<VirtualInput>();
            input.release("punch");
            input.clear_frame();
        }

        let state = app.world().entity(pursuer).get::<PursuerState>().unwrap();
        let PursuerState::Stunned { wake_at } = state.clone() else {
            panic!("expected stun, got {:?}", state);
        };
        let vel = app.world().entity(pursuer).get::<Velocity>().unwrap();
        assert_eq!((vel.x, vel.y), (0.0, 0.0));
        assert_eq!(event_count(&app, "pursuer_stunned"), 1);

        let mut woke = false;
        for _ in 0..60 {
            tick(&mut app, 0.1);
            let state = app.world().entity(pursuer).get::<PursuerState>().unwrap();
            if !matches!(state, PursuerState::Stunned { .. }) {
                woke = true;
                break;
            }
        }
        assert!(woke, "pursuer never woke");
        assert_eq!(event_count(&app, "pursuer_woke"), 1);
        let clock_now = app.world().resource::<Clock>().now();
        assert!(clock_now >= wake_at);
        let timers = app.world().entity(pursuer).get::<PursuerTimers>().unwrap();
        assert!(timers.next_idea_at >= wake_at, "idea deadline must be fresh");
    }

    #[test]
    fn use_on_switch_toggles_every_tagged_door_exactly_once() {
        let mut app = harness();
        let config = app.world().resource::<GameConfig>().clone();
        let mut map = Tilemap::walled_room(12, 12, config.tile_size);

        let lever = RegionDef {
            name: "gate_lever".into(),
            x: 6.0 * 32.0,
            y: 5.0 * 32.0,
            w: 32.0,
            h: 32.0,
        };
        let door_a = door("door_a", "gate", &mut map, 9, 3);
        let door_b = door("door_b", "gate", &mut map, 9, 7);
        app.insert_resource(map);
        {
            let mut registry = app.world_mut().resource_mut::<TriggerRegistry>();
            registry.load(vec![lever], vec![door_a, door_b]);
            registry.bind_or_warn(
                "gate_lever",
                TriggerChannel::Activate,
                vec![ScriptAction::ToggleDoors {
                    switch: "gate".into(),
                }],
            );
        }

        // Stand left of the lever facing right: the use point lands inside it
        let player = spawn_test_player(&mut app, Vec2::new(6.0 * 32.0 - 8.0, 5.5 * 32.0));
        app.world_mut().entity_mut(player).insert(Facing::Right);

        app.world_mut().resource_mut::<VirtualInput>().press("use");
        tick(&mut app, 1.0 / 60.0);
        {
            let mut input = app.world_mut().resource_mut::<VirtualInput>();
            input.release("use");
            input.clear_frame();
        }

        let registry = app.world().resource::<TriggerRegistry>();
        assert_eq!(registry.object_alive("door_a"), Some(false));
        assert_eq!(registry.object_alive("door_b"), Some(false));
        let map = app.world().resource::<Tilemap>();
        assert!(!map.is_solid(9, 3));
        assert!(!map.is_solid(9, 7));
        assert_eq!(event_count(&app, "doors_toggled"), 1);

        // No further presses: nothing re-fires
        for _ in 0..10 {
            tick(&mut app, 1.0 / 60.0);
        }
        assert_eq!(event_count(&app, "doors_toggled"), 1);
    }

    #[test]
    fn level_transition_rebuilds_the_world_and_keeps_inventory() {
        let mut app = harness();
        app.world_mut().resource_mut::<PendingLevel>().0 = Some(LevelId::Manor);
        app.update();

        assert_eq!(
            app.world().resource::<CurrentLevel>().0,
            Some(LevelId::Manor)
        );
        assert_eq!(event_count(&app, "level_loaded"), 1);
        let manor_height = build_level(LevelId::Manor, &GameConfig::default())
            .tilemap
            .height;
        assert_eq!(app.world().resource::<Tilemap>().height, manor_height);

        // Opening message reaches the queue on the first simulated tick
        tick(&mut app, 1.0 / 60.0);
        assert!(app.world().resource::<MessageQueue>().is_open());

        // Pick something up, then walk down the stairs
        {
            let mut query = app.world_mut().query_filtered::<&mut Inventory, With<Player>>();
            let mut inv = query.single_mut(app.world_mut());
            inv.add("cellar_key");
        }
        app.world_mut()
            .resource_mut::<ScriptQueue>()
            .enqueue(vec![ScriptAction::TransitionLevel {
                to: LevelId::Crypt,
            }]);
        tick(&mut app, 1.0 / 60.0);
        app.update();

        assert_eq!(
            app.world().resource::<CurrentLevel>().0,
            Some(LevelId::Crypt)
        );
        let mut query = app.world_mut().query_filtered::<&Inventory, With<Player>>();
        let inv = query.single(app.world());
        assert!(inv.has("cellar_key"), "inventory must survive transitions");

        let mut pursuers = app.world_mut().query::<&Pursuer>();
        assert_eq!(pursuers.iter(app.world()).count(), 3);
    }
}
