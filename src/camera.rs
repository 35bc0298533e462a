use bevy::prelude::*;

use crate::components::{EngineConfig, HeadlessMode, MeshId};
use crate::engine3d::MeshStore;

#[derive(Component)]
pub struct MainCamera;

/// The 3D camera rig. At most one follow target at a time; `look_at` is a
/// one-shot orientation request that clears the target.
#[derive(Resource, Clone)]
pub struct CameraRig {
    pub follow: Option<MeshId>,
    pub offset: Vec3,
    pub look_at: Option<Vec3>,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            follow: None,
            offset: Vec3::new(0.0, 5.0, 10.0),
            look_at: None,
        }
    }
}

impl CameraRig {
    pub fn follow(&mut self, target: MeshId, offset: Vec3) {
        self.follow = Some(target);
        self.offset = offset;
        self.look_at = None;
    }

    pub fn look_at(&mut self, point: Vec3) {
        self.follow = None;
        self.look_at = Some(point);
    }
}

pub fn spawn_camera_2d(mut commands: Commands, headless: Res<HeadlessMode>) {
    if headless.0 {
        return;
    }
    commands.spawn((MainCamera, Camera2d, Transform::from_xyz(0.0, 0.0, 100.0)));
}

pub fn spawn_camera_3d(mut commands: Commands, headless: Res<HeadlessMode>) {
    if headless.0 {
        return;
    }
    commands.spawn((
        MainCamera,
        Camera3d::default(),
        Transform::from_xyz(0.0, 5.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// Move the camera toward `target.position + offset` by a fixed per-frame
/// factor. Deliberately not scaled by delta time; the smoothing speed is a
/// function of frame count, matching the gravity helper's fixed step.
pub fn camera_follow(
    config: Res<EngineConfig>,
    mut rig: ResMut<CameraRig>,
    meshes: Res<MeshStore>,
    mut cameras: Query<&mut Transform, With<MainCamera>>,
) {
    let Ok(mut transform) = cameras.get_single_mut() else {
        return;
    };

    if let Some(point) = rig.look_at.take() {
        transform.look_at(point, Vec3::Y);
        return;
    }

    let Some(target) = rig.follow else {
        return;
    };
    let Some(mesh) = meshes.get(target) else {
        return;
    };

    let desired = mesh.position + rig.offset;
    let alpha = config.camera_lerp.clamp(0.0, 1.0);
    transform.translation = transform.translation.lerp(desired, alpha);
    transform.look_at(mesh.position, Vec3::Y);
}
