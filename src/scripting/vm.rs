use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use rhai::{Dynamic, ImmutableString, AST};

use super::{ScriptError, ScriptErrors, ScriptFrame, MAX_SCRIPT_ERROR_STREAK};
use crate::camera::CameraRig;
use crate::components::{EngineConfig, MeshId, SpriteId};
use crate::engine2d::{Engine2d, SpriteSpec, SpriteStore};
use crate::engine3d::{Engine3d, LightSpec, LightStore, MeshSpec, MeshStore};
use crate::input::KeyState;
use crate::store::ScratchStore;

const RHAI_MAX_OPERATIONS: u64 = 500_000;
const RHAI_MAX_CALL_LEVELS: usize = 64;
const RHAI_MAX_EXPR_DEPTH: usize = 64;

/// The single active game script. The generator rewrites it wholesale, so
/// there is exactly one, and loading replaces everything.
#[derive(Resource, Default)]
pub struct GameScript {
    pub name: String,
    pub source: String,
    ast: Option<AST>,
    pub enabled: bool,
    pub error_streak: u32,
    pub disabled_reason: Option<String>,
}

impl GameScript {
    /// Validate and swap in new source. On failure the previous script (if
    /// any) stays active.
    pub fn load(&mut self, name: String, source: String) -> Result<(), String> {
        let ast = compile_and_validate(&source)?;
        self.name = name;
        self.source = source;
        self.ast = Some(ast);
        self.enabled = true;
        self.error_streak = 0;
        self.disabled_reason = None;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.ast.is_some()
    }
}

fn compile_and_validate(source: &str) -> Result<AST, String> {
    let engine = rhai::Engine::new();
    let ast = engine.compile(source).map_err(|e| e.to_string())?;
    if !ast.iter_functions().any(|f| f.name == "update") {
        return Err("script must define an `update` function".to_string());
    }
    Ok(ast)
}

fn base_engine() -> rhai::Engine {
    let mut engine = rhai::Engine::new();
    engine.set_max_operations(RHAI_MAX_OPERATIONS);
    engine.set_max_call_levels(RHAI_MAX_CALL_LEVELS);
    engine.set_max_expr_depths(RHAI_MAX_EXPR_DEPTH, RHAI_MAX_EXPR_DEPTH);
    engine
}

fn num(map: &rhai::Map, key: &str) -> Option<f32> {
    let v = map.get(key)?;
    if let Ok(f) = v.as_float() {
        return Some(f as f32);
    }
    if let Ok(i) = v.as_int() {
        return Some(i as f32);
    }
    None
}

// Script code freely mixes `10` and `10.0`; rhai will not coerce ints for
// native fn params, so scalar args come in as Dynamic and are widened here.
fn scalar(v: &Dynamic) -> f32 {
    v.as_float()
        .ok()
        .or_else(|| v.as_int().ok().map(|i| i as f64))
        .unwrap_or(0.0) as f32
}

fn text(map: &rhai::Map, key: &str) -> String {
    map.get(key)
        .and_then(|v| v.clone().into_string().ok())
        .unwrap_or_default()
}

fn json_props(map: &rhai::Map, key: &str) -> serde_json::Map<String, serde_json::Value> {
    map.get(key)
        .and_then(|v| rhai::serde::from_dynamic::<serde_json::Value>(v).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

fn vec3_of(arr: &rhai::Array) -> Option<Vec3> {
    let component = |v: &Dynamic| {
        v.as_float()
            .ok()
            .or_else(|| v.as_int().ok().map(|i| i as f64))
            .map(|f| f as f32)
    };
    match arr.as_slice() {
        [x, y, z] => Some(Vec3::new(component(x)?, component(y)?, component(z)?)),
        _ => None,
    }
}

fn vec3_field(map: &rhai::Map, key: &str) -> Option<Vec3> {
    map.get(key)
        .and_then(|v| v.clone().into_array().ok())
        .and_then(|arr| vec3_of(&arr))
}

fn color_field(map: &rhai::Map, key: &str) -> Option<Color> {
    map.get(key)
        .and_then(|v| v.clone().into_array().ok())
        .and_then(|arr| vec3_of(&arr))
        .map(|v| Color::srgb(v.x, v.y, v.z))
}

fn to_json(v: &Dynamic) -> serde_json::Value {
    rhai::serde::from_dynamic::<serde_json::Value>(v).unwrap_or(serde_json::Value::Null)
}

fn to_dynamic(v: serde_json::Value) -> Dynamic {
    rhai::serde::to_dynamic(v).unwrap_or(Dynamic::UNIT)
}

// -------------------------------------------------------------------------
// 2D binding
// -------------------------------------------------------------------------

#[derive(Default, Clone)]
struct Shared2d {
    sprites: SpriteStore,
    keys: KeyState,
    data: ScratchStore,
    config: EngineConfig,
}

fn with_engine_2d<R>(
    shared: &Arc<Mutex<Shared2d>>,
    fallback: R,
    f: impl FnOnce(&mut Engine2d) -> R,
) -> R {
    let Ok(mut guard) = shared.lock() else {
        return fallback;
    };
    let state = &mut *guard;
    let mut engine = Engine2d {
        sprites: &mut state.sprites,
        keys: &state.keys,
        data: &mut state.data,
        config: &state.config,
    };
    f(&mut engine)
}

/// Register the whole 2D engine surface as script functions.
fn build_engine_2d(shared: Arc<Mutex<Shared2d>>) -> rhai::Engine {
    let mut engine = base_engine();

    let s = shared.clone();
    engine.register_fn("create_sprite", move |spec: rhai::Map| -> i64 {
        with_engine_2d(&s, 0, |e| {
            e.create_sprite(SpriteSpec {
                x: num(&spec, "x").unwrap_or(0.0),
                y: num(&spec, "y").unwrap_or(0.0),
                width: num(&spec, "width"),
                height: num(&spec, "height"),
                kind: text(&spec, "kind"),
                props: json_props(&spec, "props"),
            })
            .0 as i64
        })
    });

    let s = shared.clone();
    engine.register_fn("destroy", move |id: i64| {
        with_engine_2d(&s, (), |e| e.destroy(SpriteId(id as u64)));
    });

    let s = shared.clone();
    engine.register_fn("is_pressed", move |key: ImmutableString| -> bool {
        with_engine_2d(&s, false, |e| e.is_pressed(key.as_str()))
    });

    let s = shared.clone();
    engine.register_fn("apply_gravity", move |id: i64| {
        with_engine_2d(&s, (), |e| e.apply_gravity(SpriteId(id as u64), None));
    });
    let s = shared.clone();
    engine.register_fn("apply_gravity", move |id: i64, force: Dynamic| {
        with_engine_2d(&s, (), |e| {
            e.apply_gravity(SpriteId(id as u64), Some(scalar(&force)))
        });
    });

    let s = shared.clone();
    engine.register_fn("check_collision", move |a: i64, b: i64| -> bool {
        with_engine_2d(&s, false, |e| {
            e.check_collision(SpriteId(a as u64), SpriteId(b as u64))
        })
    });

    let s = shared.clone();
    engine.register_fn("get_collisions", move |id: i64| -> rhai::Array {
        with_engine_2d(&s, rhai::Array::new(), |e| {
            e.collisions_of(SpriteId(id as u64))
                .into_iter()
                .map(|hit| Dynamic::from(hit.0 as i64))
                .collect()
        })
    });

    let s = shared.clone();
    engine.register_fn("sprite_x", move |id: i64| -> f64 {
        with_engine_2d(&s, 0.0, |e| {
            e.sprites
                .get(SpriteId(id as u64))
                .map(|r| r.x as f64)
                .unwrap_or(0.0)
        })
    });
    let s = shared.clone();
    engine.register_fn("sprite_y", move |id: i64| -> f64 {
        with_engine_2d(&s, 0.0, |e| {
            e.sprites
                .get(SpriteId(id as u64))
                .map(|r| r.y as f64)
                .unwrap_or(0.0)
        })
    });
    let s = shared.clone();
    engine.register_fn("set_sprite_pos", move |id: i64, x: Dynamic, y: Dynamic| {
        with_engine_2d(&s, (), |e| {
            if let Some(rec) = e.sprites.get_mut(SpriteId(id as u64)) {
                rec.x = scalar(&x);
                rec.y = scalar(&y);
            }
        });
    });
    let s = shared.clone();
    engine.register_fn("sprite_exists", move |id: i64| -> bool {
        with_engine_2d(&s, false, |e| e.sprites.get(SpriteId(id as u64)).is_some())
    });

    let s = shared.clone();
    engine.register_fn("get_prop", move |id: i64, key: ImmutableString| -> Dynamic {
        with_engine_2d(&s, Dynamic::UNIT, |e| {
            e.sprites
                .get(SpriteId(id as u64))
                .and_then(|r| r.props.get(key.as_str()).cloned())
                .map(to_dynamic)
                .unwrap_or(Dynamic::UNIT)
        })
    });
    let s = shared.clone();
    engine.register_fn(
        "set_prop",
        move |id: i64, key: ImmutableString, value: Dynamic| {
            with_engine_2d(&s, (), |e| {
                if let Some(rec) = e.sprites.get_mut(SpriteId(id as u64)) {
                    rec.props.insert(key.to_string(), to_json(&value));
                }
            });
        },
    );

    let s = shared.clone();
    engine.register_fn("set_data", move |key: ImmutableString, value: Dynamic| {
        with_engine_2d(&s, (), |e| e.set_data(key.to_string(), to_json(&value)));
    });
    let s = shared;
    engine.register_fn("get_data", move |key: ImmutableString| -> Dynamic {
        with_engine_2d(&s, Dynamic::UNIT, |e| {
            e.get_data(key.as_str()).cloned().map(to_dynamic).unwrap_or(Dynamic::UNIT)
        })
    });

    engine
}

// -------------------------------------------------------------------------
// 3D binding
// -------------------------------------------------------------------------

#[derive(Default, Clone)]
struct Shared3d {
    meshes: MeshStore,
    lights: LightStore,
    camera: CameraRig,
    keys: KeyState,
    data: ScratchStore,
    config: EngineConfig,
}

fn with_engine_3d<R>(
    shared: &Arc<Mutex<Shared3d>>,
    fallback: R,
    f: impl FnOnce(&mut Engine3d) -> R,
) -> R {
    let Ok(mut guard) = shared.lock() else {
        return fallback;
    };
    let state = &mut *guard;
    let mut engine = Engine3d {
        meshes: &mut state.meshes,
        lights: &mut state.lights,
        camera: &mut state.camera,
        keys: &state.keys,
        data: &mut state.data,
        config: &state.config,
    };
    f(&mut engine)
}

fn build_engine_3d(shared: Arc<Mutex<Shared3d>>) -> rhai::Engine {
    let mut engine = base_engine();

    let s = shared.clone();
    engine.register_fn("create_mesh", move |spec: rhai::Map| -> i64 {
        with_engine_3d(&s, 0, |e| {
            e.create_mesh(MeshSpec {
                geometry: text(&spec, "geometry"),
                material: text(&spec, "material"),
                position: vec3_field(&spec, "position").unwrap_or(Vec3::ZERO),
                props: json_props(&spec, "props"),
            })
            .0 as i64
        })
    });

    let s = shared.clone();
    engine.register_fn("create_light", move |spec: rhai::Map| -> i64 {
        with_engine_3d(&s, 0, |e| {
            e.create_light(LightSpec {
                light_type: text(&spec, "type"),
                color: color_field(&spec, "color").unwrap_or(Color::WHITE),
                intensity: num(&spec, "intensity").unwrap_or(1.0),
                position: vec3_field(&spec, "position").unwrap_or(Vec3::ZERO),
            })
            .0 as i64
        })
    });

    let s = shared.clone();
    engine.register_fn("destroy", move |id: i64| {
        with_engine_3d(&s, (), |e| e.destroy(MeshId(id as u64)));
    });

    let s = shared.clone();
    engine.register_fn("is_pressed", move |key: ImmutableString| -> bool {
        with_engine_3d(&s, false, |e| e.is_pressed(key.as_str()))
    });

    let s = shared.clone();
    engine.register_fn("mesh_x", move |id: i64| -> f64 {
        with_engine_3d(&s, 0.0, |e| {
            e.meshes
                .get(MeshId(id as u64))
                .map(|r| r.position.x as f64)
                .unwrap_or(0.0)
        })
    });
    let s = shared.clone();
    engine.register_fn("mesh_y", move |id: i64| -> f64 {
        with_engine_3d(&s, 0.0, |e| {
            e.meshes
                .get(MeshId(id as u64))
                .map(|r| r.position.y as f64)
                .unwrap_or(0.0)
        })
    });
    let s = shared.clone();
    engine.register_fn("mesh_z", move |id: i64| -> f64 {
        with_engine_3d(&s, 0.0, |e| {
            e.meshes
                .get(MeshId(id as u64))
                .map(|r| r.position.z as f64)
                .unwrap_or(0.0)
        })
    });
    let s = shared.clone();
    engine.register_fn(
        "set_mesh_position",
        move |id: i64, x: Dynamic, y: Dynamic, z: Dynamic| {
            with_engine_3d(&s, (), |e| {
                if let Some(rec) = e.meshes.get_mut(MeshId(id as u64)) {
                    rec.position = Vec3::new(scalar(&x), scalar(&y), scalar(&z));
                }
            });
        },
    );
    let s = shared.clone();
    engine.register_fn(
        "move_mesh",
        move |id: i64, dx: Dynamic, dy: Dynamic, dz: Dynamic| {
            with_engine_3d(&s, (), |e| {
                if let Some(rec) = e.meshes.get_mut(MeshId(id as u64)) {
                    rec.position += Vec3::new(scalar(&dx), scalar(&dy), scalar(&dz));
                }
            });
        },
    );
    let s = shared.clone();
    engine.register_fn("mesh_exists", move |id: i64| -> bool {
        with_engine_3d(&s, false, |e| e.meshes.get(MeshId(id as u64)).is_some())
    });

    let s = shared.clone();
    engine.register_fn("camera_follow", move |id: i64| {
        with_engine_3d(&s, (), |e| e.camera_follow(MeshId(id as u64), None));
    });
    let s = shared.clone();
    engine.register_fn("camera_follow", move |id: i64, offset: rhai::Array| {
        with_engine_3d(&s, (), |e| {
            e.camera_follow(MeshId(id as u64), vec3_of(&offset))
        });
    });
    let s = shared.clone();
    engine.register_fn("camera_look_at", move |x: Dynamic, y: Dynamic, z: Dynamic| {
        with_engine_3d(&s, (), |e| {
            e.camera_look_at(Vec3::new(scalar(&x), scalar(&y), scalar(&z)))
        });
    });

    let s = shared.clone();
    engine.register_fn("get_prop", move |id: i64, key: ImmutableString| -> Dynamic {
        with_engine_3d(&s, Dynamic::UNIT, |e| {
            e.meshes
                .get(MeshId(id as u64))
                .and_then(|r| r.props.get(key.as_str()).cloned())
                .map(to_dynamic)
                .unwrap_or(Dynamic::UNIT)
        })
    });
    let s = shared.clone();
    engine.register_fn(
        "set_prop",
        move |id: i64, key: ImmutableString, value: Dynamic| {
            with_engine_3d(&s, (), |e| {
                if let Some(rec) = e.meshes.get_mut(MeshId(id as u64)) {
                    rec.props.insert(key.to_string(), to_json(&value));
                }
            });
        },
    );

    let s = shared.clone();
    engine.register_fn("set_data", move |key: ImmutableString, value: Dynamic| {
        with_engine_3d(&s, (), |e| e.set_data(key.to_string(), to_json(&value)));
    });
    let s = shared;
    engine.register_fn("get_data", move |key: ImmutableString| -> Dynamic {
        with_engine_3d(&s, Dynamic::UNIT, |e| {
            e.get_data(key.as_str()).cloned().map(to_dynamic).unwrap_or(Dynamic::UNIT)
        })
    });

    engine
}

// -------------------------------------------------------------------------
// Frame drivers
// -------------------------------------------------------------------------

fn record_result(
    result: Result<Dynamic, Box<rhai::EvalAltResult>>,
    script: &mut GameScript,
    errors: &mut ScriptErrors,
    frame: u64,
) {
    match result {
        Ok(_) => script.error_streak = 0,
        Err(e) => {
            errors.push(ScriptError {
                script_name: script.name.clone(),
                error_message: e.to_string(),
                frame,
            });
            script.error_streak += 1;
            if script.error_streak >= MAX_SCRIPT_ERROR_STREAK {
                script.enabled = false;
                let reason = format!(
                    "disabled after {} consecutive errors (last: {e})",
                    script.error_streak
                );
                warn!("[Playforge scripts] '{}' {}", script.name, reason);
                script.disabled_reason = Some(reason);
            }
        }
    }
}

pub fn run_game_script_2d(
    mut script: ResMut<GameScript>,
    mut errors: ResMut<ScriptErrors>,
    mut frame: ResMut<ScriptFrame>,
    mut sprites: ResMut<SpriteStore>,
    keys: Res<KeyState>,
    mut data: ResMut<ScratchStore>,
    config: Res<EngineConfig>,
    time: Res<Time>,
) {
    frame.frame += 1;
    if !script.enabled {
        return;
    }
    let Some(ast) = script.ast.clone() else {
        return;
    };

    let shared = Arc::new(Mutex::new(Shared2d {
        sprites: std::mem::take(&mut *sprites),
        keys: keys.clone(),
        data: std::mem::take(&mut *data),
        config: config.clone(),
    }));
    let engine = build_engine_2d(shared.clone());
    let result = engine.call_fn::<Dynamic>(
        &mut rhai::Scope::new(),
        &ast,
        "update",
        (time.delta_secs() as f64,),
    );
    drop(engine);

    let state = match Arc::try_unwrap(shared) {
        Ok(cell) => cell.into_inner().unwrap_or_else(|p| p.into_inner()),
        Err(arc) => arc.lock().map(|g| g.clone()).unwrap_or_default(),
    };
    *sprites = state.sprites;
    *data = state.data;

    record_result(result, &mut script, &mut errors, frame.frame);
}

pub fn run_game_script_3d(
    mut script: ResMut<GameScript>,
    mut errors: ResMut<ScriptErrors>,
    mut frame: ResMut<ScriptFrame>,
    mut meshes: ResMut<MeshStore>,
    mut lights: ResMut<LightStore>,
    mut rig: ResMut<CameraRig>,
    keys: Res<KeyState>,
    mut data: ResMut<ScratchStore>,
    config: Res<EngineConfig>,
    time: Res<Time>,
) {
    frame.frame += 1;
    if !script.enabled {
        return;
    }
    let Some(ast) = script.ast.clone() else {
        return;
    };

    let shared = Arc::new(Mutex::new(Shared3d {
        meshes: std::mem::take(&mut *meshes),
        lights: std::mem::take(&mut *lights),
        camera: rig.clone(),
        keys: keys.clone(),
        data: std::mem::take(&mut *data),
        config: config.clone(),
    }));
    let engine = build_engine_3d(shared.clone());
    let result = engine.call_fn::<Dynamic>(
        &mut rhai::Scope::new(),
        &ast,
        "update",
        (time.delta_secs() as f64,),
    );
    drop(engine);

    let state = match Arc::try_unwrap(shared) {
        Ok(cell) => cell.into_inner().unwrap_or_else(|p| p.into_inner()),
        Err(arc) => arc.lock().map(|g| g.clone()).unwrap_or_default(),
    };
    *meshes = state.meshes;
    *lights = state.lights;
    *rig = state.camera;
    *data = state.data;

    record_result(result, &mut script, &mut errors, frame.frame);
}
