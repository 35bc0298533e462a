use bevy::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::camera::{self, CameraRig};
use crate::components::{
    EngineConfig, GameLight, GameMesh, GeometryKind, LightId, LightKind, MaterialKind, MeshId,
};
use crate::input::{InputPlugin, KeyState};
use crate::scripting::{self, vm};
use crate::store::ScratchStore;

/// Brightness scales from the unit-ish intensities game code passes to the
/// physical units the renderer expects.
const AMBIENT_BRIGHTNESS_SCALE: f32 = 500.0;
const DIRECTIONAL_ILLUMINANCE_SCALE: f32 = 10_000.0;
const POINT_INTENSITY_SCALE: f32 = 100_000.0;

#[derive(Clone)]
pub struct MeshSpec {
    pub geometry: String,
    pub material: String,
    pub position: Vec3,
    pub props: serde_json::Map<String, serde_json::Value>,
}

impl Default for MeshSpec {
    fn default() -> Self {
        Self {
            geometry: String::new(),
            material: String::new(),
            position: Vec3::ZERO,
            props: serde_json::Map::new(),
        }
    }
}

#[derive(Clone)]
pub struct LightSpec {
    pub light_type: String,
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
}

impl Default for LightSpec {
    fn default() -> Self {
        Self {
            light_type: String::new(),
            color: Color::WHITE,
            intensity: 1.0,
            position: Vec3::ZERO,
        }
    }
}

/// Insertion-ordered live mesh collection; the scene mirror keeps renderable
/// entities in sync with it.
#[derive(Resource, Default, Clone)]
pub struct MeshStore {
    meshes: Vec<GameMesh>,
    next_id: u64,
}

impl MeshStore {
    pub fn spawn(&mut self, spec: MeshSpec) -> MeshId {
        self.next_id += 1;
        let id = MeshId(self.next_id);
        self.meshes.push(GameMesh {
            id,
            geometry: GeometryKind::from_name(&spec.geometry),
            material: MaterialKind::from_name(&spec.material),
            position: spec.position,
            props: spec.props,
        });
        id
    }

    /// No-op if the id is already gone.
    pub fn remove(&mut self, id: MeshId) {
        self.meshes.retain(|m| m.id != id);
    }

    pub fn get(&self, id: MeshId) -> Option<&GameMesh> {
        self.meshes.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut GameMesh> {
        self.meshes.iter_mut().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameMesh> {
        self.meshes.iter()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Light ids live in a range disjoint from mesh ids so that the raw
/// numeric ids crossing the script boundary never alias a mesh.
pub const LIGHT_ID_BASE: u64 = 1 << 32;

/// Lights are append-only: there is no engine-level destroy for them, and
/// `destroy` cannot be handed a light id (separate id type).
#[derive(Resource, Clone)]
pub struct LightStore {
    lights: Vec<GameLight>,
    next_id: u64,
}

impl Default for LightStore {
    fn default() -> Self {
        Self {
            lights: Vec::new(),
            next_id: LIGHT_ID_BASE,
        }
    }
}

impl LightStore {
    pub fn spawn(&mut self, spec: LightSpec) -> LightId {
        self.next_id += 1;
        let id = LightId(self.next_id);
        self.lights.push(GameLight {
            id,
            kind: LightKind::from_name(&spec.light_type),
            color: spec.color,
            intensity: spec.intensity,
            position: spec.position,
        });
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameLight> {
        self.lights.iter()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }
}

/// The 3D engine surface handed to game code each frame.
pub struct Engine3d<'a> {
    pub meshes: &'a mut MeshStore,
    pub lights: &'a mut LightStore,
    pub camera: &'a mut CameraRig,
    pub keys: &'a KeyState,
    pub data: &'a mut ScratchStore,
    pub config: &'a EngineConfig,
}

impl Engine3d<'_> {
    pub fn create_mesh(&mut self, spec: MeshSpec) -> MeshId {
        self.meshes.spawn(spec)
    }

    pub fn create_light(&mut self, spec: LightSpec) -> LightId {
        self.lights.spawn(spec)
    }

    pub fn destroy(&mut self, id: MeshId) {
        if self.camera.follow == Some(id) {
            self.camera.follow = None;
        }
        self.meshes.remove(id);
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.keys.is_pressed(key)
    }

    pub fn camera_follow(&mut self, target: MeshId, offset: Option<Vec3>) {
        let offset = offset.unwrap_or_else(|| Vec3::from_array(self.config.default_follow_offset));
        self.camera.follow(target, offset);
    }

    pub fn camera_look_at(&mut self, point: Vec3) {
        self.camera.look_at(point);
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.set(key, value);
    }

    pub fn get_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

pub type UpdateFn3d = Box<dyn FnMut(&mut Engine3d, f32) + Send + Sync>;

/// Single-slot per-frame callback, same replacement semantics as 2D.
#[derive(Resource, Default)]
pub struct UpdateHook3d(pub Option<UpdateFn3d>);

impl UpdateHook3d {
    pub fn set(&mut self, f: impl FnMut(&mut Engine3d, f32) + Send + Sync + 'static) {
        self.0 = Some(Box::new(f));
    }
}

fn run_update_hook(
    mut hook: ResMut<UpdateHook3d>,
    mut meshes: ResMut<MeshStore>,
    mut lights: ResMut<LightStore>,
    mut rig: ResMut<CameraRig>,
    keys: Res<KeyState>,
    mut data: ResMut<ScratchStore>,
    config: Res<EngineConfig>,
    time: Res<Time>,
) {
    let Some(mut f) = hook.0.take() else {
        return;
    };
    {
        let mut engine = Engine3d {
            meshes: &mut meshes,
            lights: &mut lights,
            camera: &mut rig,
            keys: &keys,
            data: &mut data,
            config: &config,
        };
        f(&mut engine, time.delta_secs());
    }
    hook.0 = Some(f);
}

#[derive(Component)]
pub struct MeshMirror(pub MeshId);

#[derive(Component)]
pub struct LightMirror(pub LightId);

struct MirrorEntry {
    entity: Entity,
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

/// Render-side handles per mesh id, so destroy can release the assets.
#[derive(Resource, Default)]
pub struct SceneMirrorIndex {
    meshes: HashMap<MeshId, MirrorEntry>,
    lights: HashSet<LightId>,
}

impl SceneMirrorIndex {
    pub fn contains_mesh(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }
}

fn build_geometry(kind: GeometryKind) -> Mesh {
    match kind {
        GeometryKind::Box => Mesh::from(Cuboid::new(1.0, 1.0, 1.0)),
        GeometryKind::Sphere => Mesh::from(Sphere::new(0.5)),
        GeometryKind::Capsule => Mesh::from(Capsule3d::new(0.5, 1.0)),
    }
}

fn build_material(kind: MaterialKind) -> StandardMaterial {
    match kind {
        // Stand-in for a normal-visualizing material: flat, unlit.
        MaterialKind::Normal => StandardMaterial {
            base_color: Color::srgb(0.65, 0.65, 0.9),
            unlit: true,
            ..default()
        },
        MaterialKind::Phong => StandardMaterial {
            base_color: Color::WHITE,
            perceptual_roughness: 0.2,
            metallic: 0.1,
            ..default()
        },
        MaterialKind::Lambert => StandardMaterial {
            base_color: Color::WHITE,
            perceptual_roughness: 1.0,
            metallic: 0.0,
            ..default()
        },
    }
}

/// Mirror mesh records into the scene: spawn new ids, sync transforms,
/// despawn removed ids and release their mesh/material assets.
pub fn sync_mesh_mirrors(
    mut commands: Commands,
    store: Res<MeshStore>,
    mut index: ResMut<SceneMirrorIndex>,
    mut mesh_assets: ResMut<Assets<Mesh>>,
    mut material_assets: ResMut<Assets<StandardMaterial>>,
    mut transforms: Query<&mut Transform, With<MeshMirror>>,
) {
    let live: HashSet<MeshId> = store.iter().map(|m| m.id).collect();

    let gone: Vec<MeshId> = index
        .meshes
        .keys()
        .filter(|id| !live.contains(id))
        .copied()
        .collect();
    for id in gone {
        if let Some(entry) = index.meshes.remove(&id) {
            commands.entity(entry.entity).despawn();
            mesh_assets.remove(&entry.mesh);
            material_assets.remove(&entry.material);
        }
    }

    for rec in store.iter() {
        match index.meshes.get(&rec.id) {
            Some(entry) => {
                if let Ok(mut transform) = transforms.get_mut(entry.entity) {
                    transform.translation = rec.position;
                }
            }
            None => {
                let mesh = mesh_assets.add(build_geometry(rec.geometry));
                let material = material_assets.add(build_material(rec.material));
                let entity = commands
                    .spawn((
                        MeshMirror(rec.id),
                        Mesh3d(mesh.clone()),
                        MeshMaterial3d(material.clone()),
                        Transform::from_translation(rec.position),
                    ))
                    .id();
                index.meshes.insert(
                    rec.id,
                    MirrorEntry {
                        entity,
                        mesh,
                        material,
                    },
                );
            }
        }
    }
}

/// Spawn render-side lights for new records. Ambient adjusts the global
/// ambient level instead of spawning a node.
pub fn sync_light_mirrors(
    mut commands: Commands,
    store: Res<LightStore>,
    mut index: ResMut<SceneMirrorIndex>,
    mut ambient: ResMut<AmbientLight>,
) {
    for rec in store.iter() {
        if index.lights.contains(&rec.id) {
            continue;
        }
        index.lights.insert(rec.id);
        match rec.kind {
            LightKind::Ambient => {
                ambient.color = rec.color;
                ambient.brightness = rec.intensity * AMBIENT_BRIGHTNESS_SCALE;
            }
            LightKind::Directional => {
                commands.spawn((
                    LightMirror(rec.id),
                    DirectionalLight {
                        color: rec.color,
                        illuminance: rec.intensity * DIRECTIONAL_ILLUMINANCE_SCALE,
                        ..default()
                    },
                    Transform::from_translation(rec.position).looking_at(Vec3::ZERO, Vec3::Y),
                ));
            }
            LightKind::Point => {
                commands.spawn((
                    LightMirror(rec.id),
                    PointLight {
                        color: rec.color,
                        intensity: rec.intensity * POINT_INTENSITY_SCALE,
                        ..default()
                    },
                    Transform::from_translation(rec.position),
                ));
            }
        }
    }
}

pub struct Engine3dPlugin;

impl Plugin for Engine3dPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(MeshStore::default())
            .insert_resource(LightStore::default())
            .insert_resource(ScratchStore::default())
            .insert_resource(CameraRig::default())
            .insert_resource(SceneMirrorIndex::default())
            .insert_resource(UpdateHook3d::default())
            .add_plugins(InputPlugin { wasd_aliases: true })
            .add_plugins(scripting::ScriptingPlugin)
            .add_systems(Startup, camera::spawn_camera_3d)
            .add_systems(
                Update,
                (
                    vm::run_game_script_3d,
                    run_update_hook,
                    sync_mesh_mirrors.run_if(resource_exists::<Assets<Mesh>>),
                    sync_light_mirrors.run_if(resource_exists::<AmbientLight>),
                    camera::camera_follow,
                )
                    .chain(),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_parts() -> (
        MeshStore,
        LightStore,
        CameraRig,
        KeyState,
        ScratchStore,
        EngineConfig,
    ) {
        (
            MeshStore::default(),
            LightStore::default(),
            CameraRig::default(),
            KeyState::new(true),
            ScratchStore::default(),
            EngineConfig::default(),
        )
    }

    macro_rules! engine {
        ($parts:expr) => {
            Engine3d {
                meshes: &mut $parts.0,
                lights: &mut $parts.1,
                camera: &mut $parts.2,
                keys: &$parts.3,
                data: &mut $parts.4,
                config: &$parts.5,
            }
        };
    }

    #[test]
    fn mesh_factory_applies_defaults() {
        let mut parts = engine_parts();
        let mut engine = engine!(parts);
        let id = engine.create_mesh(MeshSpec::default());
        let rec = engine.meshes.get(id).unwrap();
        assert_eq!(rec.geometry, GeometryKind::Box);
        assert_eq!(rec.material, MaterialKind::Normal);
        assert_eq!(rec.position, Vec3::ZERO);

        let id = engine.create_mesh(MeshSpec {
            geometry: "sphere".to_string(),
            material: "lambert".to_string(),
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Default::default()
        });
        let rec = engine.meshes.get(id).unwrap();
        assert_eq!(rec.geometry, GeometryKind::Sphere);
        assert_eq!(rec.material, MaterialKind::Lambert);
        assert_eq!(rec.position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn destroy_is_idempotent_and_restores_count() {
        let mut parts = engine_parts();
        let mut engine = engine!(parts);
        let before = engine.meshes.len();
        let id = engine.create_mesh(MeshSpec {
            geometry: "sphere".to_string(),
            ..Default::default()
        });
        engine.destroy(id);
        assert_eq!(engine.meshes.len(), before);
        engine.destroy(id);
        assert_eq!(engine.meshes.len(), before);
    }

    #[test]
    fn destroying_follow_target_clears_rig() {
        let mut parts = engine_parts();
        let mut engine = engine!(parts);
        let id = engine.create_mesh(MeshSpec::default());
        engine.camera_follow(id, None);
        assert_eq!(engine.camera.follow, Some(id));
        assert_eq!(engine.camera.offset, Vec3::new(0.0, 5.0, 10.0));
        engine.destroy(id);
        assert_eq!(engine.camera.follow, None);
    }

    #[test]
    fn light_factory_closed_set_with_default() {
        let mut parts = engine_parts();
        let mut engine = engine!(parts);
        engine.create_light(LightSpec {
            light_type: "directional".to_string(),
            ..Default::default()
        });
        engine.create_light(LightSpec {
            light_type: "spotlight".to_string(),
            ..Default::default()
        });
        let kinds: Vec<LightKind> = engine.lights.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![LightKind::Directional, LightKind::Ambient]);
    }

    #[test]
    fn mesh_mirror_spawns_and_disposes() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(MeshStore::default())
            .insert_resource(SceneMirrorIndex::default())
            .insert_resource(Assets::<Mesh>::default())
            .insert_resource(Assets::<StandardMaterial>::default())
            .add_systems(Update, sync_mesh_mirrors);

        let id = app.world_mut().resource_mut::<MeshStore>().spawn(MeshSpec {
            geometry: "sphere".to_string(),
            ..Default::default()
        });
        app.update();

        assert!(app.world().resource::<SceneMirrorIndex>().contains_mesh(id));
        assert_eq!(app.world().resource::<Assets<Mesh>>().len(), 1);
        assert_eq!(app.world().resource::<Assets<StandardMaterial>>().len(), 1);

        app.world_mut().resource_mut::<MeshStore>().remove(id);
        app.update();

        // Entity gone from the scene, assets released.
        assert!(!app.world().resource::<SceneMirrorIndex>().contains_mesh(id));
        assert_eq!(app.world().resource::<Assets<Mesh>>().len(), 0);
        assert_eq!(app.world().resource::<Assets<StandardMaterial>>().len(), 0);
        assert_eq!(
            app.world_mut()
                .query::<&MeshMirror>()
                .iter(app.world())
                .count(),
            0
        );
    }

    #[test]
    fn mirror_moves_existing_entities() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(MeshStore::default())
            .insert_resource(SceneMirrorIndex::default())
            .insert_resource(Assets::<Mesh>::default())
            .insert_resource(Assets::<StandardMaterial>::default())
            .add_systems(Update, sync_mesh_mirrors);

        let id = app
            .world_mut()
            .resource_mut::<MeshStore>()
            .spawn(MeshSpec::default());
        app.update();

        if let Some(rec) = app.world_mut().resource_mut::<MeshStore>().get_mut(id) {
            rec.position = Vec3::new(4.0, 0.0, -2.0);
        }
        app.update();

        let transform = *app
            .world_mut()
            .query_filtered::<&Transform, With<MeshMirror>>()
            .single(app.world());
        assert_eq!(transform.translation, Vec3::new(4.0, 0.0, -2.0));
    }

    #[test]
    fn ambient_light_sets_global_level() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(LightStore::default())
            .insert_resource(SceneMirrorIndex::default())
            .insert_resource(AmbientLight::default())
            .add_systems(Update, sync_light_mirrors);

        app.world_mut().resource_mut::<LightStore>().spawn(LightSpec {
            light_type: "ambient".to_string(),
            intensity: 0.4,
            ..Default::default()
        });
        app.update();

        let ambient = app.world().resource::<AmbientLight>();
        assert!((ambient.brightness - 0.4 * AMBIENT_BRIGHTNESS_SCALE).abs() < 1e-3);
    }
}
