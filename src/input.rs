use bevy::prelude::*;
use std::collections::HashSet;

/// Abstraction layer between raw keyboard input and game code.
/// The capture system (windowed) and tests (headless) both write to this.
///
/// Keys are stored as lowercased key-code names (`"keya"`, `"space"`,
/// `"arrowleft"`). Lookups normalize case and whitespace and run a small
/// alias table; anything unmapped is looked up verbatim.
#[derive(Resource, Clone)]
pub struct KeyState {
    pub held: HashSet<String>,
    wasd_aliases: bool,
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl KeyState {
    pub fn new(wasd_aliases: bool) -> Self {
        Self {
            held: HashSet::new(),
            wasd_aliases,
        }
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.held.contains(&canonical(key, self.wasd_aliases))
    }

    pub fn press(&mut self, key: &str) {
        self.held.insert(canonical(key, self.wasd_aliases));
    }

    pub fn release(&mut self, key: &str) {
        self.held.remove(&canonical(key, self.wasd_aliases));
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Map a user-facing key name to the canonical held-set entry.
fn canonical(key: &str, wasd_aliases: bool) -> String {
    let k = normalize(key);
    let mapped = match k.as_str() {
        "space" => "space",
        "left" | "arrowleft" => "arrowleft",
        "right" | "arrowright" => "arrowright",
        "up" | "arrowup" => "arrowup",
        "down" | "arrowdown" => "arrowdown",
        "w" if wasd_aliases => "keyw",
        "a" if wasd_aliases => "keya",
        "s" if wasd_aliases => "keys",
        "d" if wasd_aliases => "keyd",
        _ => return k,
    };
    mapped.to_string()
}

pub struct InputPlugin {
    pub wasd_aliases: bool,
}

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(KeyState::new(self.wasd_aliases))
            .add_systems(
                PreUpdate,
                keyboard_capture.run_if(resource_exists::<ButtonInput<KeyCode>>),
            );
    }
}

/// Rebuild the held-key set from the raw keyboard state each frame.
/// `KeyCode`'s debug name lowercased matches the canonical entries
/// (`KeyCode::ArrowLeft` -> `"arrowleft"`).
fn keyboard_capture(keyboard: Res<ButtonInput<KeyCode>>, mut keys: ResMut<KeyState>) {
    keys.held.clear();
    for code in keyboard.get_pressed() {
        keys.held.insert(format!("{code:?}").to_ascii_lowercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_and_space_insensitive() {
        let mut keys = KeyState::new(false);
        keys.held.insert("space".to_string());
        assert!(keys.is_pressed("Space"));
        assert!(keys.is_pressed("space"));
        assert!(keys.is_pressed(" SPACE "));
    }

    #[test]
    fn arrow_aliases_map_to_key_codes() {
        let mut keys = KeyState::new(false);
        keys.held.insert("arrowleft".to_string());
        assert!(keys.is_pressed("left"));
        assert!(keys.is_pressed("ArrowLeft"));
        assert!(!keys.is_pressed("right"));
    }

    #[test]
    fn wasd_aliases_only_when_enabled() {
        let mut flat = KeyState::new(false);
        flat.held.insert("keyw".to_string());
        assert!(!flat.is_pressed("w"));
        assert!(flat.is_pressed("KeyW"));

        let mut wasd = KeyState::new(true);
        wasd.held.insert("keyw".to_string());
        assert!(wasd.is_pressed("w"));
        assert!(wasd.is_pressed("W"));
    }

    #[test]
    fn unmapped_keys_are_looked_up_verbatim() {
        let mut keys = KeyState::new(false);
        keys.held.insert("keyq".to_string());
        assert!(keys.is_pressed("KeyQ"));
        assert!(!keys.is_pressed("q"));
        assert!(!keys.is_pressed("escape"));
    }

    #[test]
    fn capture_rebuilds_held_set_from_keyboard() {
        let mut app = App::new();
        app.insert_resource(KeyState::new(false))
            .insert_resource(ButtonInput::<KeyCode>::default())
            .add_systems(Update, keyboard_capture);

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::Space);
        app.update();
        assert!(app.world().resource::<KeyState>().is_pressed("space"));

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .release(KeyCode::Space);
        app.update();
        assert!(!app.world().resource::<KeyState>().is_pressed("space"));
    }
}
