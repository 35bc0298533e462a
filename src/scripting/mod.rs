pub mod vm;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

pub const MAX_SCRIPT_ERRORS: usize = 100;
/// Consecutive failing frames before the script is disabled instead of
/// logging the same error sixty times a second.
pub const MAX_SCRIPT_ERROR_STREAK: u32 = 8;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ScriptError {
    pub script_name: String,
    pub error_message: String,
    pub frame: u64,
}

/// Bounded error buffer; oldest entries drop first.
#[derive(Resource, Default)]
pub struct ScriptErrors {
    pub entries: Vec<ScriptError>,
}

impl ScriptErrors {
    pub fn push(&mut self, entry: ScriptError) {
        self.entries.push(entry);
        if self.entries.len() > MAX_SCRIPT_ERRORS {
            let excess = self.entries.len() - MAX_SCRIPT_ERRORS;
            self.entries.drain(0..excess);
        }
    }
}

#[derive(Resource, Default)]
pub struct ScriptFrame {
    pub frame: u64,
}

pub struct ScriptingPlugin;

impl Plugin for ScriptingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<vm::GameScript>()
            .init_resource::<ScriptErrors>()
            .init_resource::<ScriptFrame>();
    }
}
