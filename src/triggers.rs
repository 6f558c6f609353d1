use bevy::prelude::*;
use std::collections::HashMap;

use crate::components::{Alive, Facing, GameConfig, GamePosition, Player};
use crate::events::GameEventBus;
use crate::game_runtime::SimSet;
use crate::input::VirtualInput;
use crate::messages::MessageQueue;
use crate::script::{ScriptAction, ScriptQueue};
use crate::tilemap::{TileType, Tilemap};

pub struct TriggersPlugin;

impl Plugin for TriggersPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(TriggerRegistry::default()).add_systems(
            FixedUpdate,
            evaluate_triggers
                .in_set(SimSet::Triggers)
                .run_if(crate::game_runtime::gameplay_systems_enabled),
        );
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerChannel {
    Enter,
    Leave,
    Activate,
}

/// Level-authored named rectangle `{name, x, y, w, h}` (min corner + size)
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct RegionDef {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl RegionDef {
    fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }
}

/// Level-authored interactive object: a placed sprite with a hit-test box and
/// free-form properties (`switch` marks a door bound to a switch name).
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl ObjectDef {
    fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x - self.w / 2.0
            && p.x < self.x + self.w / 2.0
            && p.y >= self.y - self.h / 2.0
            && p.y < self.y + self.h / 2.0
    }
}

struct Region {
    def: RegionDef,
    inside: bool,
}

struct ObjectState {
    def: ObjectDef,
    alive: bool,
    inside: bool,
}

struct Listener {
    target: String,
    channel: TriggerChannel,
    actions: Vec<ScriptAction>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TriggerEvent {
    pub target: String,
    pub channel: TriggerChannel,
}

/// All named regions and interactive objects of the current level, plus the
/// listener table wiring them to script actions. Events accumulate in an
/// explicit queue and are drained exactly once per tick.
#[derive(Resource, Default)]
pub struct TriggerRegistry {
    regions: Vec<Region>,
    objects: Vec<ObjectState>,
    listeners: Vec<Listener>,
    queue: Vec<TriggerEvent>,
}

impl TriggerRegistry {
    /// Replace all content for a freshly loaded level. Regions rearm,
    /// listeners reset.
    pub fn load(&mut self, regions: Vec<RegionDef>, objects: Vec<ObjectDef>) {
        self.regions = regions
            .into_iter()
            .map(|def| Region { def, inside: false })
            .collect();
        self.objects = objects
            .into_iter()
            .map(|def| ObjectState {
                def,
                alive: true,
                inside: false,
            })
            .collect();
        self.listeners.clear();
        self.queue.clear();
    }

    /// Wire a channel of a named region/object to a list of actions.
    /// Unknown names are a level-authoring error, reported to the caller.
    pub fn bind(
        &mut self,
        target: &str,
        channel: TriggerChannel,
        actions: Vec<ScriptAction>,
    ) -> Result<(), String> {
        let known = self.regions.iter().any(|r| r.def.name == target)
            || self.objects.iter().any(|o| o.def.name == target);
        if !known {
            return Err(format!("no trigger region or object named '{}'", target));
        }
        self.listeners.push(Listener {
            target: target.to_string(),
            channel,
            actions,
        });
        Ok(())
    }

    pub fn bind_or_warn(&mut self, target: &str, channel: TriggerChannel, actions: Vec<ScriptAction>) {
        if let Err(e) = self.bind(target, channel, actions) {
            warn!("[Dagfin triggers] Skipping binding: {}", e);
        }
    }

    /// Re-evaluate containment and activation against the player's
    /// post-movement position. `use_point` is only consulted when `used`.
    pub fn evaluate(&mut self, player_pos: Vec2, used: bool, use_point: Vec2) {
        for region in self.regions.iter_mut() {
            let now_inside = region.def.contains(player_pos);
            if now_inside != region.inside {
                region.inside = now_inside;
                self.queue.push(TriggerEvent {
                    target: region.def.name.clone(),
                    channel: if now_inside {
                        TriggerChannel::Enter
                    } else {
                        TriggerChannel::Leave
                    },
                });
            }
            if used && region.def.contains(use_point) {
                self.queue.push(TriggerEvent {
                    target: region.def.name.clone(),
                    channel: TriggerChannel::Activate,
                });
            }
        }

        for object in self.objects.iter_mut() {
            if !object.alive {
                // Dead objects fire nothing and do not block others
                object.inside = false;
                continue;
            }
            let now_inside = object.def.contains(player_pos);
            if now_inside != object.inside {
                object.inside = now_inside;
                self.queue.push(TriggerEvent {
                    target: object.def.name.clone(),
                    channel: if now_inside {
                        TriggerChannel::Enter
                    } else {
                        TriggerChannel::Leave
                    },
                });
            }
            if used && object.def.contains(use_point) {
                self.queue.push(TriggerEvent {
                    target: object.def.name.clone(),
                    channel: TriggerChannel::Activate,
                });
            }
        }
    }

    pub fn drain(&mut self) -> Vec<TriggerEvent> {
        std::mem::take(&mut self.queue)
    }

    /// All listener action lists for one event, in registration order.
    pub fn actions_for(&self, event: &TriggerEvent) -> Vec<Vec<ScriptAction>> {
        self.listeners
            .iter()
            .filter(|l| l.target == event.target && l.channel == event.channel)
            .map(|l| l.actions.clone())
            .collect()
    }

    /// Permanently remove a looted/used-up object. Idempotent; unknown names
    /// are silently ignored.
    pub fn kill_object(&mut self, name: &str) {
        for object in self.objects.iter_mut() {
            if object.def.name == name {
                object.alive = false;
            }
        }
    }

    pub fn object_alive(&self, name: &str) -> Option<bool> {
        self.objects
            .iter()
            .find(|o| o.def.name == name)
            .map(|o| o.alive)
    }

    /// Flip every door object tagged with `switch`, updating the blocking
    /// tile under each. Returns how many doors toggled.
    pub fn toggle_doors(&mut self, switch: &str, tilemap: &mut Tilemap) -> usize {
        let mut toggled = 0;
        for object in self.objects.iter_mut() {
            if object.def.properties.get("switch").map(String::as_str) != Some(switch) {
                continue;
            }
            object.alive = !object.alive;
            let tx = (object.def.x / tilemap.tile_size).floor() as i32;
            let ty = (object.def.y / tilemap.tile_size).floor() as i32;
            tilemap.set(
                tx,
                ty,
                if object.alive {
                    TileType::Solid
                } else {
                    TileType::Empty
                },
            );
            toggled += 1;
        }
        toggled
    }
}

fn evaluate_triggers(
    config: Res<GameConfig>,
    input: Res<VirtualInput>,
    messages: Res<MessageQueue>,
    mut registry: ResMut<TriggerRegistry>,
    mut events: ResMut<GameEventBus>,
    mut queue: ResMut<ScriptQueue>,
    player_q: Query<(&GamePosition, &Facing, &Alive), With<Player>>,
) {
    let Ok((pos, facing, alive)) = player_q.get_single() else {
        return;
    };
    if !alive.0 {
        return;
    }

    // While a message is up the "use" press acknowledges it instead
    let used = input.just_pressed("use") && !messages.is_open();
    let player_pos = pos.vec();
    let use_point = player_pos + facing.unit() * config.use_distance;

    registry.evaluate(player_pos, used, use_point);
    for event in registry.drain() {
        let channel_name = match event.channel {
            TriggerChannel::Enter => "trigger_enter",
            TriggerChannel::Leave => "trigger_leave",
            TriggerChannel::Activate => "trigger_activate",
        };
        events.emit(
            channel_name,
            serde_json::json!({ "target": event.target }),
            None,
        );
        for actions in registry.actions_for(&event) {
            queue.enqueue(actions);
        }
    }
}
