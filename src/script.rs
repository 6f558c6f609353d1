use bevy::prelude::*;
use std::collections::VecDeque;

use crate::clock::{Clock, ScheduledTask};
use crate::components::{GameConfig, NextGameId, Player};
use crate::events::GameEventBus;
use crate::game_runtime::SimSet;
use crate::inventory::Inventory;
use crate::levels::{LevelId, PendingLevel};
use crate::messages::{ChoiceOption, MessageQueue};
use crate::pursuer::spawn_pursuer;
use crate::tilemap::Tilemap;
use crate::triggers::TriggerRegistry;

pub struct ScriptPlugin;

impl Plugin for ScriptPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ScriptQueue::default())
            .insert_resource(LightsOn(true))
            .add_systems(
                FixedUpdate,
                apply_script_actions
                    .in_set(SimSet::Script)
                    .run_if(crate::game_runtime::gameplay_systems_enabled),
            );
    }
}

/// Level-wide light switch. Compositing the actual darkness overlay is the
/// renderer's job; the simulation only owns the flag.
#[derive(Resource)]
pub struct LightsOn(pub bool);

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct ChoiceDef {
    pub label: String,
    #[serde(default)]
    pub then: Vec<ScriptAction>,
}

/// Everything a level script can do, as plain data. Continuations are nested
/// action lists, so nothing in the narrative layer captures entities or
/// closures.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptAction {
    ShowMessage {
        text: String,
        #[serde(default)]
        blocks_player: bool,
        #[serde(default)]
        then: Vec<ScriptAction>,
    },
    ShowChoice {
        prompt: String,
        options: Vec<ChoiceDef>,
    },
    ToggleDoors {
        switch: String,
    },
    SetLights {
        on: bool,
    },
    GiveItem {
        id: String,
    },
    TakeItem {
        id: String,
    },
    IfHasItem {
        id: String,
        then: Vec<ScriptAction>,
        #[serde(default)]
        otherwise: Vec<ScriptAction>,
    },
    RemoveObject {
        name: String,
    },
    SpawnPursuer {
        x: f32,
        y: f32,
    },
    After {
        seconds: f32,
        then: Vec<ScriptAction>,
    },
    TransitionLevel {
        to: LevelId,
    },
    EmitEvent {
        name: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

/// Actions waiting to run, drained once per tick in enqueue order.
#[derive(Resource, Default)]
pub struct ScriptQueue {
    pending: VecDeque<ScriptAction>,
}

impl ScriptQueue {
    pub fn enqueue(&mut self, actions: Vec<ScriptAction>) {
        self.pending.extend(actions);
    }

    pub fn pop(&mut self) -> Option<ScriptAction> {
        self.pending.pop_front()
    }
}

type ScriptParams<'w, 's> = (
    Commands<'w, 's>,
    ResMut<'w, ScriptQueue>,
    ResMut<'w, MessageQueue>,
    ResMut<'w, Clock>,
    ResMut<'w, GameEventBus>,
    ResMut<'w, TriggerRegistry>,
    ResMut<'w, Tilemap>,
    ResMut<'w, LightsOn>,
    ResMut<'w, PendingLevel>,
    ResMut<'w, NextGameId>,
    Res<'w, GameConfig>,
);

pub fn apply_script_actions(
    params: ScriptParams,
    mut player_q: Query<&mut Inventory, With<Player>>,
) {
    let (
        mut commands,
        mut queue,
        mut messages,
        mut clock,
        mut events,
        mut registry,
        mut tilemap,
        mut lights,
        mut pending_level,
        mut next_id,
        config,
    ) = params;

    while let Some(action) = queue.pop() {
        match action {
            ScriptAction::ShowMessage {
                text,
                blocks_player,
                then,
            } => {
                messages.show_message(text, blocks_player, then);
            }
            ScriptAction::ShowChoice { prompt, options } => {
                let options = options
                    .into_iter()
                    .map(|o| ChoiceOption {
                        label: o.label,
                        actions: o.then,
                    })
                    .collect();
                messages.show_choice(prompt, options);
            }
            ScriptAction::ToggleDoors { switch } => {
                let toggled = registry.toggle_doors(&switch, &mut tilemap);
                if toggled == 0 {
                    warn!("[Dagfin script] No doors tagged for switch '{}'", switch);
                } else {
                    events.emit(
                        "doors_toggled",
                        serde_json::json!({ "switch": switch, "count": toggled }),
                        None,
                    );
                }
            }
            ScriptAction::SetLights { on } => {
                lights.0 = on;
                events.emit("lights_changed", serde_json::json!({ "on": on }), None);
            }
            ScriptAction::GiveItem { id } => {
                if let Ok(mut inventory) = player_q.get_single_mut() {
                    if inventory.add(&id) {
                        events.emit("item_collected", serde_json::json!({ "item": id }), None);
                    }
                }
            }
            ScriptAction::TakeItem { id } => {
                if let Ok(mut inventory) = player_q.get_single_mut() {
                    if inventory.remove(&id) {
                        events.emit("item_removed", serde_json::json!({ "item": id }), None);
                    }
                }
            }
            ScriptAction::IfHasItem { id, then, otherwise } => {
                let has = player_q
                    .get_single()
                    .map(|inv| inv.has(&id))
                    .unwrap_or(false);
                queue.enqueue(if has { then } else { otherwise });
            }
            ScriptAction::RemoveObject { name } => {
                // Removing an already-dead object stays silent
                let was_alive = registry.object_alive(&name).unwrap_or(false);
                registry.kill_object(&name);
                if was_alive {
                    events.emit("object_removed", serde_json::json!({ "name": name }), None);
                }
            }
            ScriptAction::SpawnPursuer { x, y } => {
                spawn_pursuer(&mut commands, &mut next_id, &config, &clock, x, y);
                events.emit(
                    "pursuer_spawned",
                    serde_json::json!({ "x": x, "y": y }),
                    None,
                );
            }
            ScriptAction::After { seconds, then } => {
                clock.after(seconds, ScheduledTask::Actions(then));
            }
            ScriptAction::TransitionLevel { to } => {
                pending_level.0 = Some(to);
                events.emit(
                    "level_transition",
                    serde_json::json!({ "to": to.name() }),
                    None,
                );
            }
            ScriptAction::EmitEvent { name, data } => {
                events.emit(name, data, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_in_enqueue_order() {
        let mut queue = ScriptQueue::default();
        queue.enqueue(vec![
            ScriptAction::SetLights { on: false },
            ScriptAction::EmitEvent {
                name: "a".into(),
                data: serde_json::Value::Null,
            },
        ]);
        queue.enqueue(vec![ScriptAction::EmitEvent {
            name: "b".into(),
            data: serde_json::Value::Null,
        }]);
        assert!(matches!(queue.pop(), Some(ScriptAction::SetLights { .. })));
        assert!(matches!(
            queue.pop(),
            Some(ScriptAction::EmitEvent { name, .. }) if name == "a"
        ));
        assert!(matches!(
            queue.pop(),
            Some(ScriptAction::EmitEvent { name, .. }) if name == "b"
        ));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn actions_round_trip_through_serde() {
        let action = ScriptAction::ShowMessage {
            text: "The door creaks open.".into(),
            blocks_player: true,
            then: vec![ScriptAction::ToggleDoors {
                switch: "crypt_door".into(),
            }],
        };
        let json = serde_json::to_string(&action).unwrap();
        let back: ScriptAction = serde_json::from_str(&json).unwrap();
        let ScriptAction::ShowMessage { then, .. } = back else {
            panic!("wrong variant");
        };
        assert_eq!(then.len(), 1);
    }
}
