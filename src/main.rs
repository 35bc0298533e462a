mod camera;
mod components;
mod engine2d;
mod engine3d;
#[cfg(not(target_arch = "wasm32"))]
mod file_watcher;
mod input;
mod physics;
mod scripting;
mod store;

use std::path::{Path, PathBuf};

use bevy::prelude::*;
use components::{EngineConfig, HeadlessMode, WorkspaceMode};

#[derive(serde::Deserialize, Default)]
struct StartupConfig {
    mode: Option<String>,
    window_title: Option<String>,
    window_width: Option<f32>,
    window_height: Option<f32>,
    background_color: Option<[f32; 3]>,
    script: Option<String>,
}

fn load_startup_config() -> StartupConfig {
    let path = std::env::var("PLAYFORGE_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "playforge.json".to_string());
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<StartupConfig>(&contents) {
            Ok(cfg) => {
                println!("[Playforge] Loaded startup config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Playforge] Failed to parse {}: {}", path, e);
                StartupConfig::default()
            }
        },
        Err(_) => StartupConfig::default(),
    }
}

fn load_engine_config(path: &Path) -> EngineConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            println!("[Playforge] Loading engine config from {}", path.display());
            EngineConfig::from_json_or_default(&contents)
        }
        Err(_) => EngineConfig::default(),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let headless = args.iter().any(|a| a == "--headless");

    let startup_config = load_startup_config();

    // Env vars override playforge.json values.
    let mode = std::env::var("PLAYFORGE_MODE")
        .ok()
        .filter(|s| !s.is_empty())
        .or(startup_config.mode)
        .map(|m| WorkspaceMode::from_name(&m))
        .unwrap_or(WorkspaceMode::Sprite2d);

    let script_path = std::env::var("PLAYFORGE_SCRIPT")
        .ok()
        .filter(|s| !s.is_empty())
        .or(startup_config.script)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("game.rhai"));

    let engine_config_path = std::env::var("PLAYFORGE_ENGINE_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("engine.json"));

    let mut app = App::new();

    app.insert_resource(HeadlessMode(headless));
    app.insert_resource(mode);
    app.insert_resource(load_engine_config(&engine_config_path));

    if headless {
        // Headless mode: no window, no rendering, just the frame loop.
        app.add_plugins(MinimalPlugins);
        println!("[Playforge] Starting in HEADLESS mode");
    } else {
        let window_title = startup_config
            .window_title
            .unwrap_or_else(|| "Playforge".to_string());
        let window_width = startup_config.window_width.unwrap_or(960.0);
        let window_height = startup_config.window_height.unwrap_or(540.0);

        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: window_title,
                resolution: (window_width, window_height).into(),
                present_mode: bevy::window::PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }));
        let bg = startup_config.background_color.unwrap_or([0.0, 0.0, 0.0]);
        app.insert_resource(ClearColor(Color::srgb(bg[0], bg[1], bg[2])));
        println!("[Playforge] Starting in WINDOWED mode");
    }

    match mode {
        WorkspaceMode::Sprite2d => {
            app.add_plugins(engine2d::Engine2dPlugin);
            println!("[Playforge] Workspace mode: 2D");
        }
        WorkspaceMode::Scene3d => {
            app.add_plugins(engine3d::Engine3dPlugin);
            println!("[Playforge] Workspace mode: 3D");
        }
    }

    match std::fs::read_to_string(&script_path) {
        Ok(source) => {
            let name = script_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("game")
                .to_string();
            let mut script = app
                .world_mut()
                .resource_mut::<scripting::vm::GameScript>();
            match script.load(name.clone(), source) {
                Ok(()) => println!("[Playforge] Loaded game script '{}'", name),
                Err(e) => eprintln!("[Playforge] Game script '{}' rejected: {}", name, e),
            }
        }
        Err(_) => println!(
            "[Playforge] No game script at {} yet; waiting for one",
            script_path.display()
        ),
    }

    #[cfg(not(target_arch = "wasm32"))]
    app.add_plugins(file_watcher::FileWatcherPlugin {
        script: script_path,
        config: engine_config_path,
    });

    app.run();
}
