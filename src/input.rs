use bevy::prelude::*;
use std::collections::HashSet;

/// Abstraction layer between raw input and game systems.
/// Keyboard (windowed) and tests (headless) both write to this.
#[derive(Resource, Default, Clone)]
pub struct VirtualInput {
    pub active: HashSet<String>,
    pub just_pressed: HashSet<String>,
}

impl VirtualInput {
    pub fn pressed(&self, action: &str) -> bool {
        self.active.contains(action)
    }

    pub fn just_pressed(&self, action: &str) -> bool {
        self.just_pressed.contains(action)
    }

    /// Used by headless drivers and tests in place of the keyboard
    #[allow(dead_code)]
    pub fn press(&mut self, action: &str) {
        if self.active.insert(action.to_string()) {
            self.just_pressed.insert(action.to_string());
        }
    }

    #[allow(dead_code)]
    pub fn release(&mut self, action: &str) {
        self.active.remove(action);
    }

    #[allow(dead_code)]
    pub fn clear_frame(&mut self) {
        self.just_pressed.clear();
    }
}

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(VirtualInput::default())
            .add_systems(
                PreUpdate,
                keyboard_to_virtual.run_if(resource_exists::<ButtonInput<KeyCode>>),
            )
            .add_systems(Last, clear_virtual_input);
    }
}

/// Translate keyboard input to VirtualInput action names
fn keyboard_to_virtual(keyboard: Res<ButtonInput<KeyCode>>, mut vinput: ResMut<VirtualInput>) {
    vinput.active.clear();
    vinput.just_pressed.clear();

    let held = [
        ("up", [KeyCode::KeyW, KeyCode::ArrowUp]),
        ("down", [KeyCode::KeyS, KeyCode::ArrowDown]),
        ("left", [KeyCode::KeyA, KeyCode::ArrowLeft]),
        ("right", [KeyCode::KeyD, KeyCode::ArrowRight]),
    ];
    for (action, keys) in held {
        if keys.iter().any(|k| keyboard.pressed(*k)) {
            vinput.active.insert(action.into());
        }
        if keys.iter().any(|k| keyboard.just_pressed(*k)) {
            vinput.just_pressed.insert(action.into());
        }
    }

    // Use / acknowledge
    if keyboard.pressed(KeyCode::KeyE) || keyboard.pressed(KeyCode::Enter) {
        vinput.active.insert("use".into());
    }
    if keyboard.just_pressed(KeyCode::KeyE) || keyboard.just_pressed(KeyCode::Enter) {
        vinput.just_pressed.insert("use".into());
    }

    // Punch
    if keyboard.pressed(KeyCode::Space) {
        vinput.active.insert("punch".into());
    }
    if keyboard.just_pressed(KeyCode::Space) {
        vinput.just_pressed.insert("punch".into());
    }
}

fn clear_virtual_input(mut vinput: ResMut<VirtualInput>) {
    vinput.just_pressed.clear();
}
