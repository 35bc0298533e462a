use bevy::prelude::*;

/// Which engine variant the workspace runs. Chosen once at startup; the two
/// engines never coexist in one app.
#[derive(Resource, Clone, Copy, PartialEq, Eq, Debug)]
pub enum WorkspaceMode {
    Sprite2d,
    Scene3d,
}

impl WorkspaceMode {
    pub fn from_name(v: &str) -> Self {
        match v.trim().to_ascii_lowercase().as_str() {
            "3d" | "scene3d" => WorkspaceMode::Scene3d,
            _ => WorkspaceMode::Sprite2d,
        }
    }
}

#[derive(Resource, Clone, Copy)]
pub struct HeadlessMode(pub bool);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct SpriteId(pub u64);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct MeshId(pub u64);

/// Lights get their own id type on purpose: the destroy path disposes
/// geometry/material and therefore only accepts `MeshId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct LightId(pub u64);

/// Visual tag for 2D sprites; picks the fill color.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum SpriteKind {
    Player,
    Enemy,
    Platform,
    Coin,
    Other,
}

impl SpriteKind {
    pub fn from_name(v: &str) -> Self {
        match v.trim().to_ascii_lowercase().as_str() {
            "player" => SpriteKind::Player,
            "enemy" => SpriteKind::Enemy,
            "platform" => SpriteKind::Platform,
            "coin" => SpriteKind::Coin,
            _ => SpriteKind::Other,
        }
    }

    pub fn color(self) -> Color {
        match self {
            SpriteKind::Player => Color::srgb_u8(135, 206, 235),
            SpriteKind::Enemy => Color::srgb_u8(255, 99, 71),
            SpriteKind::Platform => Color::srgb_u8(144, 238, 144),
            SpriteKind::Coin => Color::srgb_u8(255, 215, 0),
            SpriteKind::Other => Color::WHITE,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum GeometryKind {
    Box,
    Sphere,
    Capsule,
}

impl GeometryKind {
    pub fn from_name(v: &str) -> Self {
        match v.trim().to_ascii_lowercase().as_str() {
            "sphere" => GeometryKind::Sphere,
            "capsule" => GeometryKind::Capsule,
            _ => GeometryKind::Box,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum MaterialKind {
    Normal,
    Phong,
    Lambert,
}

impl MaterialKind {
    pub fn from_name(v: &str) -> Self {
        match v.trim().to_ascii_lowercase().as_str() {
            "phong" => MaterialKind::Phong,
            "lambert" => MaterialKind::Lambert,
            _ => MaterialKind::Normal,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
}

impl LightKind {
    pub fn from_name(v: &str) -> Self {
        match v.trim().to_ascii_lowercase().as_str() {
            "directional" => LightKind::Directional,
            "point" => LightKind::Point,
            _ => LightKind::Ambient,
        }
    }
}

/// A 2D sprite record. `x`/`y` is the min corner of the box; the property
/// map holds whatever game code attaches (velocity, score value, ...).
#[derive(Clone, Debug)]
pub struct GameSprite {
    pub id: SpriteId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub kind: SpriteKind,
    pub props: serde_json::Map<String, serde_json::Value>,
}

/// A 3D mesh record, mirrored into the render world by the scene sync pass.
#[derive(Clone, Debug)]
pub struct GameMesh {
    pub id: MeshId,
    pub geometry: GeometryKind,
    pub material: MaterialKind,
    pub position: Vec3,
    pub props: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug)]
pub struct GameLight {
    pub id: LightId,
    pub kind: LightKind,
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
}

/// Engine tuning (as a resource so it can be reloaded at runtime).
///
/// `physics_step` and `camera_lerp` are fixed per-call values: gravity and
/// camera follow ignore real frame delta while the update hook receives it.
/// That mismatch is load-bearing for existing game scripts; keep it.
#[derive(Resource, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_gravity: f32,
    pub physics_step: f32,
    pub camera_lerp: f32,
    pub default_sprite_size: f32,
    pub default_follow_offset: [f32; 3],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_gravity: 980.0,
            physics_step: 1.0 / 60.0,
            camera_lerp: 0.1,
            default_sprite_size: 20.0,
            default_follow_offset: [0.0, 5.0, 10.0],
        }
    }
}

impl EngineConfig {
    /// Parses config JSON; a malformed payload degrades to defaults so a bad
    /// `engine.json` never prevents startup.
    pub fn from_json_or_default(contents: &str) -> Self {
        serde_json::from_str(contents).unwrap_or_else(|e| {
            eprintln!("[Playforge] Engine config parse error, using defaults: {e}");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing_falls_back_to_defaults() {
        assert_eq!(SpriteKind::from_name("enemy"), SpriteKind::Enemy);
        assert_eq!(SpriteKind::from_name("boss"), SpriteKind::Other);
        assert_eq!(GeometryKind::from_name("sphere"), GeometryKind::Sphere);
        assert_eq!(GeometryKind::from_name("torus"), GeometryKind::Box);
        assert_eq!(MaterialKind::from_name("toon"), MaterialKind::Normal);
        assert_eq!(LightKind::from_name("spot"), LightKind::Ambient);
        assert_eq!(WorkspaceMode::from_name("3D"), WorkspaceMode::Scene3d);
        assert_eq!(WorkspaceMode::from_name("anything"), WorkspaceMode::Sprite2d);
    }

    #[test]
    fn palette_matches_kinds() {
        assert_eq!(SpriteKind::Player.color(), Color::srgb_u8(135, 206, 235));
        assert_eq!(SpriteKind::Enemy.color(), Color::srgb_u8(255, 99, 71));
        assert_eq!(SpriteKind::Platform.color(), Color::srgb_u8(144, 238, 144));
        assert_eq!(SpriteKind::Coin.color(), Color::srgb_u8(255, 215, 0));
        assert_eq!(SpriteKind::from_name("??").color(), Color::WHITE);
    }

    #[test]
    fn engine_config_round_trips_through_json() {
        let config = EngineConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.default_gravity, 980.0);
        assert_eq!(back.default_follow_offset, [0.0, 5.0, 10.0]);
    }

    #[test]
    fn partial_engine_config_uses_defaults() {
        let back: EngineConfig = serde_json::from_str(r#"{"camera_lerp": 0.25}"#).unwrap();
        assert_eq!(back.camera_lerp, 0.25);
        assert_eq!(back.default_sprite_size, 20.0);
    }

    #[test]
    fn malformed_engine_config_falls_back_to_defaults() {
        let cfg = EngineConfig::from_json_or_default("not json");
        let defaults = EngineConfig::default();
        assert_eq!(cfg.default_gravity, defaults.default_gravity);
        assert_eq!(cfg.physics_step, defaults.physics_step);
        assert_eq!(cfg.camera_lerp, defaults.camera_lerp);

        let cfg = EngineConfig::from_json_or_default(r#"{"default_gravity": "lots"}"#);
        assert_eq!(cfg.default_gravity, defaults.default_gravity);
    }
}
