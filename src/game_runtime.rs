use bevy::prelude::*;
use serde::Serialize;

use crate::clock::Clock;
use crate::events::GameEventBus;

#[derive(States, Default, Clone, Copy, Eq, PartialEq, Debug, Hash, Serialize)]
pub enum FlowState {
    #[default]
    Playing,
    Paused,
    GameOver,
    LevelTransition,
}

/// Fixed ordering of one simulated tick. Triggers must observe post-movement
/// positions, so behavior runs after integration and triggers after behavior.
#[derive(SystemSet, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum SimSet {
    Clock,
    Control,
    Integrate,
    Behavior,
    Triggers,
    Script,
}

pub fn gameplay_systems_enabled(state: Option<Res<State<FlowState>>>) -> bool {
    state.map(|s| *s.get() == FlowState::Playing).unwrap_or(false)
}

#[derive(Resource, Default)]
struct RuntimeEventCursor {
    last_frame: u64,
    processed_in_frame: usize,
}

fn apply_runtime_events(
    bus: Res<GameEventBus>,
    mut cursor: ResMut<RuntimeEventCursor>,
    mut next_state: ResMut<NextState<FlowState>>,
    mut clock: ResMut<Clock>,
) {
    let mut count_in_frame = 0usize;
    for ev in bus.recent.iter() {
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

        match ev.name.as_str() {
            "game_pause" => {
                next_state.set(FlowState::Paused);
                clock.paused = true;
            }
            "game_resume" => {
                next_state.set(FlowState::Playing);
                clock.paused = false;
            }
            "game_over" => {
                next_state.set(FlowState::GameOver);
            }
            "level_transition" => {
                next_state.set(FlowState::LevelTransition);
            }
            "level_loaded" => {
                next_state.set(FlowState::Playing);
            }
            _ => {}
        }

        cursor.last_frame = ev.frame;
        cursor.processed_in_frame = count_in_frame;
    }
}

pub struct RuntimeStatePlugin;

impl Plugin for RuntimeStatePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(RuntimeEventCursor::default())
            .init_state::<FlowState>()
            .configure_sets(
                FixedUpdate,
                (
                    SimSet::Clock,
                    SimSet::Control,
                    SimSet::Integrate,
                    SimSet::Behavior,
                    SimSet::Triggers,
                    SimSet::Script,
                )
                    .chain(),
            )
            .add_systems(Update, apply_runtime_events);
    }
}
