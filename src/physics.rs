use crate::components::GameSprite;

/// Sprite AABB in world space (min-corner convention).
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Aabb {
    pub fn of(sprite: &GameSprite) -> Self {
        Self {
            min_x: sprite.x,
            min_y: sprite.y,
            max_x: sprite.x + sprite.width,
            max_y: sprite.y + sprite.height,
        }
    }

    /// Strict overlap: touching edges do not collide.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }
}

/// Integrate a sprite's vertical velocity with a fixed step, regardless of
/// real frame delta. Call count, not wall time, determines the result —
/// existing game scripts depend on that, so do not feed a measured delta in.
///
/// Velocity lives in the sprite's property map under `"vy"` (absent reads
/// as 0). Y is up, so gravity subtracts.
pub fn apply_gravity(sprite: &mut GameSprite, force: f32, step: f32) {
    let vy = sprite
        .props
        .get("vy")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as f32;
    let vy = vy - force * step;
    sprite.y += vy * step;
    sprite
        .props
        .insert("vy".to_string(), serde_json::json!(vy));
}
