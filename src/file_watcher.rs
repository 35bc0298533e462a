use bevy::prelude::*;
use crossbeam_channel::Receiver;
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

use crate::components::EngineConfig;
use crate::scripting::vm::GameScript;

/// Watches the game script and engine config files so the generator can
/// rewrite them while the game runs.
pub struct FileWatcherPlugin {
    pub script: PathBuf,
    pub config: PathBuf,
}

pub enum FileWatchEvent {
    ScriptChanged { name: String, source: String },
    ConfigChanged(String),
}

#[derive(Resource)]
pub struct FileWatcherReceiver(pub Receiver<FileWatchEvent>);

impl Plugin for FileWatcherPlugin {
    fn build(&self, app: &mut App) {
        let (tx, rx) = crossbeam_channel::unbounded::<FileWatchEvent>();
        app.insert_resource(FileWatcherReceiver(rx));

        let script = self.script.clone();
        let config = self.config.clone();
        std::thread::spawn(move || {
            run_watcher(tx, script, config);
        });

        app.add_systems(Update, process_file_watch_events);
    }
}

fn run_watcher(tx: crossbeam_channel::Sender<FileWatchEvent>, script: PathBuf, config: PathBuf) {
    let tx_clone = tx.clone();
    let script_clone = script.clone();
    let config_clone = config.clone();

    let mut watcher: RecommendedWatcher =
        match notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                handle_fs_event(event, &tx_clone, &script_clone, &config_clone);
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("[Playforge watcher] Failed to create watcher: {e}");
                return;
            }
        };

    // notify needs a directory for single files, so watch the parents.
    for path in [&script, &config] {
        let Some(parent) = path.parent().filter(|p| p.exists()) else {
            continue;
        };
        if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
            eprintln!("[Playforge watcher] Failed to watch {}: {e}", path.display());
        } else {
            println!("[Playforge watcher] Watching: {}", path.display());
        }
    }

    // Keep thread alive — watcher is dropped when the thread exits.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
    }
}

fn handle_fs_event(
    event: NotifyEvent,
    tx: &crossbeam_channel::Sender<FileWatchEvent>,
    script: &Path,
    config: &Path,
) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }

    for path in &event.paths {
        if path_matches(path, script) {
            if let Ok(source) = std::fs::read_to_string(path) {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("game")
                    .to_string();
                let _ = tx.send(FileWatchEvent::ScriptChanged { name, source });
            }
        } else if path_matches(path, config) {
            if let Ok(content) = std::fs::read_to_string(path) {
                let _ = tx.send(FileWatchEvent::ConfigChanged(content));
            }
        }
    }
}

fn path_matches(a: &Path, b: &Path) -> bool {
    let ca = std::fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let cb = std::fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    ca == cb
}

fn process_file_watch_events(
    watcher: Option<Res<FileWatcherReceiver>>,
    mut script: ResMut<GameScript>,
    mut config: ResMut<EngineConfig>,
) {
    let Some(watcher) = watcher else { return };

    for event in watcher.0.try_iter().take(16) {
        match event {
            FileWatchEvent::ScriptChanged { name, source } => {
                println!("[Playforge watcher] Reloading script: {name}");
                if let Err(e) = script.load(name.clone(), source) {
                    eprintln!("[Playforge watcher] Script reload failed for '{name}': {e}");
                }
            }
            FileWatchEvent::ConfigChanged(content) => {
                println!("[Playforge watcher] Reloading engine config...");
                // Keep the running config when the new payload is malformed.
                match serde_json::from_str::<EngineConfig>(&content) {
                    Ok(new_config) => {
                        *config = new_config;
                    }
                    Err(e) => {
                        eprintln!("[Playforge watcher] Config parse error: {e}");
                    }
                }
            }
        }
    }
}
