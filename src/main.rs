mod boss;
mod clock;
mod components;
mod events;
mod game_runtime;
mod input;
mod inventory;
mod levels;
mod messages;
mod perception;
mod physics;
mod player;
mod pursuer;
mod render;
mod script;
mod tilemap;
mod triggers;

use bevy::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use components::{GameConfig, NextGameId};
use levels::{LevelId, PendingLevel};
use pursuer::SimRng;

#[derive(serde::Deserialize, Default)]
struct StartupConfig {
    window_title: Option<String>,
    window_width: Option<f32>,
    window_height: Option<f32>,
    game: Option<GameConfig>,
}

fn load_startup_config() -> StartupConfig {
    let path = std::env::var("DAGFIN_GAME_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "dagfin.json".to_string());
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<StartupConfig>(&contents) {
            Ok(cfg) => {
                println!("[Dagfin] Loaded startup config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Dagfin] Failed to parse {}: {}", path, e);
                StartupConfig::default()
            }
        },
        Err(_) => StartupConfig::default(),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let headless = args.iter().any(|a| a == "--headless");

    let startup_config = load_startup_config();
    let mut app = App::new();

    if headless {
        // Headless mode: no window, no rendering, just the simulation
        app.add_plugins(MinimalPlugins);
        app.add_plugins(bevy::state::app::StatesPlugin);
        println!("[Dagfin] Starting in HEADLESS mode");
    } else {
        let window_title = startup_config
            .window_title
            .unwrap_or_else(|| "Dagfin".to_string());
        let window_width = startup_config.window_width.unwrap_or(960.0);
        let window_height = startup_config.window_height.unwrap_or(600.0);

        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: window_title,
                resolution: (window_width, window_height).into(),
                present_mode: bevy::window::PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }));
        app.insert_resource(ClearColor(Color::srgb(0.05, 0.04, 0.07)));
        app.add_plugins(render::RenderPlugin);
    }

    app.insert_resource(startup_config.game.unwrap_or_default())
        .insert_resource(NextGameId::default())
        .insert_resource(Time::<Fixed>::from_hz(60.0))
        .insert_resource(SimRng(SmallRng::seed_from_u64(0)))
        .insert_resource(tilemap::Tilemap::default())
        .add_plugins(input::InputPlugin)
        .add_plugins(game_runtime::RuntimeStatePlugin)
        .add_plugins(events::GameEventsPlugin)
        .add_plugins(clock::ClockPlugin)
        .add_plugins(physics::PhysicsPlugin)
        .add_plugins(player::PlayerPlugin)
        .add_plugins(pursuer::PursuerPlugin)
        .add_plugins(boss::BossPlugin)
        .add_plugins(triggers::TriggersPlugin)
        .add_plugins(messages::MessagesPlugin)
        .add_plugins(script::ScriptPlugin)
        .add_plugins(levels::LevelsPlugin)
        .insert_resource(PendingLevel(Some(LevelId::Manor)));

    app.run();
}
