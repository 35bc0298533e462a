use bevy::prelude::*;
use std::collections::HashSet;

use crate::camera;
use crate::components::{EngineConfig, GameSprite, SpriteId, SpriteKind};
use crate::input::{InputPlugin, KeyState};
use crate::physics::{self, Aabb};
use crate::scripting::{self, vm};
use crate::store::ScratchStore;

/// Request for a new sprite. Missing size falls back to the configured
/// default (20x20); unrecognized kinds draw white.
#[derive(Clone, Default)]
pub struct SpriteSpec {
    pub x: f32,
    pub y: f32,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub kind: String,
    pub props: serde_json::Map<String, serde_json::Value>,
}

/// Insertion-ordered live sprite collection. Removal is by id, so it stays
/// stable under additions made in the same frame.
#[derive(Resource, Default, Clone)]
pub struct SpriteStore {
    sprites: Vec<GameSprite>,
    next_id: u64,
}

impl SpriteStore {
    pub fn spawn(&mut self, spec: SpriteSpec, default_size: f32) -> SpriteId {
        self.next_id += 1;
        let id = SpriteId(self.next_id);
        self.sprites.push(GameSprite {
            id,
            x: spec.x,
            y: spec.y,
            width: spec.width.unwrap_or(default_size),
            height: spec.height.unwrap_or(default_size),
            kind: SpriteKind::from_name(&spec.kind),
            props: spec.props,
        });
        id
    }

    /// No-op if the id is already gone.
    pub fn remove(&mut self, id: SpriteId) {
        self.sprites.retain(|s| s.id != id);
    }

    pub fn get(&self, id: SpriteId) -> Option<&GameSprite> {
        self.sprites.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: SpriteId) -> Option<&mut GameSprite> {
        self.sprites.iter_mut().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameSprite> {
        self.sprites.iter()
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }
}

/// The 2D engine surface handed to game code each frame. Everything game
/// code may touch goes through here; the render mirror and window stay
/// private to the engine.
pub struct Engine2d<'a> {
    pub sprites: &'a mut SpriteStore,
    pub keys: &'a KeyState,
    pub data: &'a mut ScratchStore,
    pub config: &'a EngineConfig,
}

impl Engine2d<'_> {
    pub fn create_sprite(&mut self, spec: SpriteSpec) -> SpriteId {
        self.sprites.spawn(spec, self.config.default_sprite_size)
    }

    pub fn destroy(&mut self, id: SpriteId) {
        self.sprites.remove(id);
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.keys.is_pressed(key)
    }

    /// Fixed-step vertical integration; see `physics::apply_gravity`.
    pub fn apply_gravity(&mut self, id: SpriteId, force: Option<f32>) {
        let force = force.unwrap_or(self.config.default_gravity);
        let step = self.config.physics_step;
        if let Some(sprite) = self.sprites.get_mut(id) {
            physics::apply_gravity(sprite, force, step);
        }
    }

    /// False if either sprite is gone.
    pub fn check_collision(&self, a: SpriteId, b: SpriteId) -> bool {
        match (self.sprites.get(a), self.sprites.get(b)) {
            (Some(a), Some(b)) => Aabb::of(a).overlaps(&Aabb::of(b)),
            _ => false,
        }
    }

    /// Every other live sprite overlapping `id`; never contains `id` itself.
    pub fn collisions_of(&self, id: SpriteId) -> Vec<SpriteId> {
        let Some(sprite) = self.sprites.get(id) else {
            return Vec::new();
        };
        let aabb = Aabb::of(sprite);
        self.sprites
            .iter()
            .filter(|other| other.id != id && aabb.overlaps(&Aabb::of(other)))
            .map(|other| other.id)
            .collect()
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.set(key, value);
    }

    pub fn get_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

pub type UpdateFn2d = Box<dyn FnMut(&mut Engine2d, f32) + Send + Sync>;

/// Single-slot per-frame callback. Setting it replaces whatever was there.
#[derive(Resource, Default)]
pub struct UpdateHook2d(pub Option<UpdateFn2d>);

impl UpdateHook2d {
    pub fn set(&mut self, f: impl FnMut(&mut Engine2d, f32) + Send + Sync + 'static) {
        self.0 = Some(Box::new(f));
    }
}

fn run_update_hook(
    mut hook: ResMut<UpdateHook2d>,
    mut sprites: ResMut<SpriteStore>,
    keys: Res<KeyState>,
    mut data: ResMut<ScratchStore>,
    config: Res<EngineConfig>,
    time: Res<Time>,
) {
    let Some(mut f) = hook.0.take() else {
        return;
    };
    {
        let mut engine = Engine2d {
            sprites: &mut sprites,
            keys: &keys,
            data: &mut data,
            config: &config,
        };
        f(&mut engine, time.delta_secs());
    }
    hook.0 = Some(f);
}

#[derive(Component)]
pub struct SpriteMirror(pub SpriteId);

/// Mirror the sprite records into renderable entities: spawn for new ids,
/// sync position/size/color for survivors, despawn the rest. Insertion
/// order maps to z so later sprites draw on top.
pub fn sync_sprite_mirrors(
    mut commands: Commands,
    store: Res<SpriteStore>,
    mut mirrors: Query<(Entity, &SpriteMirror, &mut Sprite, &mut Transform)>,
) {
    let order: std::collections::HashMap<SpriteId, usize> = store
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i))
        .collect();

    let mut seen = HashSet::new();
    for (entity, mirror, mut sprite, mut transform) in mirrors.iter_mut() {
        match store.get(mirror.0) {
            Some(rec) => {
                seen.insert(rec.id);
                sprite.color = rec.kind.color();
                sprite.custom_size = Some(Vec2::new(rec.width, rec.height));
                let z = order.get(&rec.id).copied().unwrap_or(0) as f32 * 0.01;
                transform.translation =
                    Vec3::new(rec.x + rec.width / 2.0, rec.y + rec.height / 2.0, z);
            }
            None => commands.entity(entity).despawn(),
        }
    }

    for rec in store.iter() {
        if seen.contains(&rec.id) {
            continue;
        }
        let z = order.get(&rec.id).copied().unwrap_or(0) as f32 * 0.01;
        commands.spawn((
            SpriteMirror(rec.id),
            Sprite::from_color(rec.kind.color(), Vec2::new(rec.width, rec.height)),
            Transform::from_xyz(rec.x + rec.width / 2.0, rec.y + rec.height / 2.0, z),
        ));
    }
}

pub struct Engine2dPlugin;

impl Plugin for Engine2dPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SpriteStore::default())
            .insert_resource(ScratchStore::default())
            .insert_resource(UpdateHook2d::default())
            .add_plugins(InputPlugin {
                wasd_aliases: false,
            })
            .add_plugins(scripting::ScriptingPlugin)
            .add_systems(Startup, camera::spawn_camera_2d)
            .add_systems(
                Update,
                (vm::run_game_script_2d, run_update_hook, sync_sprite_mirrors).chain(),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_parts() -> (SpriteStore, KeyState, ScratchStore, EngineConfig) {
        (
            SpriteStore::default(),
            KeyState::new(false),
            ScratchStore::default(),
            EngineConfig::default(),
        )
    }

    fn spec(x: f32, y: f32, kind: &str) -> SpriteSpec {
        SpriteSpec {
            x,
            y,
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_applies_default_size_and_kind() {
        let (mut sprites, keys, mut data, config) = engine_parts();
        let mut engine = Engine2d {
            sprites: &mut sprites,
            keys: &keys,
            data: &mut data,
            config: &config,
        };
        let id = engine.create_sprite(spec(5.0, 6.0, "coin"));
        let rec = engine.sprites.get(id).unwrap();
        assert_eq!(rec.width, 20.0);
        assert_eq!(rec.height, 20.0);
        assert_eq!(rec.kind, SpriteKind::Coin);
    }

    #[test]
    fn destroy_is_idempotent() {
        let (mut sprites, keys, mut data, config) = engine_parts();
        let mut engine = Engine2d {
            sprites: &mut sprites,
            keys: &keys,
            data: &mut data,
            config: &config,
        };
        let a = engine.create_sprite(spec(0.0, 0.0, "player"));
        let b = engine.create_sprite(spec(50.0, 0.0, "enemy"));
        engine.destroy(a);
        assert_eq!(engine.sprites.len(), 1);
        engine.destroy(a);
        assert_eq!(engine.sprites.len(), 1);
        assert!(engine.sprites.get(b).is_some());
    }

    #[test]
    fn collision_example_from_contract() {
        let (mut sprites, keys, mut data, config) = engine_parts();
        let mut engine = Engine2d {
            sprites: &mut sprites,
            keys: &keys,
            data: &mut data,
            config: &config,
        };
        let a = engine.create_sprite(spec(0.0, 0.0, "player"));
        let b = engine.create_sprite(spec(10.0, 10.0, "enemy"));
        assert!(engine.check_collision(a, b));
        assert!(engine.check_collision(b, a));

        if let Some(rec) = engine.sprites.get_mut(b) {
            rec.x = 30.0;
            rec.y = 30.0;
        }
        assert!(!engine.check_collision(a, b));
    }

    #[test]
    fn collision_with_missing_sprite_is_false() {
        let (mut sprites, keys, mut data, config) = engine_parts();
        let mut engine = Engine2d {
            sprites: &mut sprites,
            keys: &keys,
            data: &mut data,
            config: &config,
        };
        let a = engine.create_sprite(spec(0.0, 0.0, "player"));
        let b = engine.create_sprite(spec(0.0, 0.0, "enemy"));
        engine.destroy(b);
        assert!(!engine.check_collision(a, b));
        assert!(!engine.check_collision(b, a));
    }

    #[test]
    fn collisions_of_excludes_self_and_matches_pairwise_checks() {
        let (mut sprites, keys, mut data, config) = engine_parts();
        let mut engine = Engine2d {
            sprites: &mut sprites,
            keys: &keys,
            data: &mut data,
            config: &config,
        };
        let a = engine.create_sprite(spec(0.0, 0.0, "player"));
        let b = engine.create_sprite(spec(10.0, 10.0, "enemy"));
        let c = engine.create_sprite(spec(15.0, 15.0, "coin"));
        let far = engine.create_sprite(spec(200.0, 200.0, "platform"));

        let hits = engine.collisions_of(a);
        assert!(!hits.contains(&a));
        for id in [b, c, far] {
            assert_eq!(hits.contains(&id), engine.check_collision(a, id));
        }
        assert!(engine.collisions_of(far).is_empty());

        engine.destroy(a);
        assert!(engine.collisions_of(a).is_empty());
    }

    #[test]
    fn hook_receives_delta_and_survives_frames() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(SpriteStore::default())
            .insert_resource(ScratchStore::default())
            .insert_resource(KeyState::new(false))
            .insert_resource(EngineConfig::default())
            .insert_resource(UpdateHook2d::default())
            .add_systems(Update, run_update_hook);

        app.world_mut()
            .resource_mut::<UpdateHook2d>()
            .set(|engine, dt| {
                let frames = engine
                    .get_data("frames")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                engine.set_data("frames", serde_json::json!(frames + 1));
                engine.set_data("last_dt", serde_json::json!(dt));
                if engine.sprites.is_empty() {
                    engine.create_sprite(SpriteSpec {
                        kind: "player".to_string(),
                        ..Default::default()
                    });
                }
            });

        app.update();
        app.update();

        let data = app.world().resource::<ScratchStore>();
        assert_eq!(data.get("frames"), Some(&serde_json::json!(2)));
        // First frame reported 0.0 elapsed.
        assert!(data.get("last_dt").and_then(|v| v.as_f64()).is_some());
        assert_eq!(app.world().resource::<SpriteStore>().len(), 1);
    }

    #[test]
    fn mirror_tracks_store_contents() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(SpriteStore::default())
            .add_systems(Update, sync_sprite_mirrors);

        let id = app
            .world_mut()
            .resource_mut::<SpriteStore>()
            .spawn(spec(0.0, 0.0, "enemy"), 20.0);
        app.update();

        let count = |app: &mut App| {
            app.world_mut()
                .query::<&SpriteMirror>()
                .iter(app.world())
                .count()
        };
        assert_eq!(count(&mut app), 1);

        app.world_mut().resource_mut::<SpriteStore>().remove(id);
        app.update();
        // Despawn commands apply at the end of the frame.
        assert_eq!(count(&mut app), 0);
    }
}
