use bevy::prelude::*;

use crate::components::{Collider, GamePosition, Velocity, WallContact};
use crate::game_runtime::SimSet;
use crate::tilemap::Tilemap;

pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            (integrate_movement, sync_transforms)
                .chain()
                .in_set(SimSet::Integrate)
                .run_if(crate::game_runtime::gameplay_systems_enabled),
        );
    }
}

fn integrate_movement(
    time: Res<Time<Fixed>>,
    tilemap: Res<Tilemap>,
    mut query: Query<(&mut GamePosition, &mut Velocity, &Collider, &mut WallContact)>,
) {
    let dt = time.delta_secs();
    for (mut pos, mut vel, collider, mut contact) in query.iter_mut() {
        let (x, y, hit_x, hit_y) = step_entity(
            &tilemap,
            pos.x,
            pos.y,
            vel.x * dt,
            vel.y * dt,
            collider.width,
            collider.height,
        );
        pos.x = x;
        pos.y = y;
        if hit_x {
            vel.x = 0.0;
        }
        if hit_y {
            vel.y = 0.0;
        }
        contact.x = hit_x;
        contact.y = hit_y;
    }
}

/// Move a centered box by (dx, dy) with per-axis tile collision.
/// Returns the resolved position and which axes hit a wall.
pub fn step_entity(
    tilemap: &Tilemap,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    w: f32,
    h: f32,
) -> (f32, f32, bool, bool) {
    let ts = tilemap.tile_size;
    let mut out_x = x;
    let mut out_y = y;
    let mut hit_x = false;
    let mut hit_y = false;

    let new_x = out_x + dx;
    if !collides_solid(tilemap, new_x, out_y, w, h) {
        out_x = new_x;
    } else {
        if dx > 0.0 {
            let tile_x = ((new_x + w / 2.0) / ts).floor() as i32;
            out_x = tile_x as f32 * ts - w / 2.0 - 0.01;
        } else if dx < 0.0 {
            let tile_x = ((new_x - w / 2.0) / ts).floor() as i32;
            out_x = (tile_x + 1) as f32 * ts + w / 2.0 + 0.01;
        }
        hit_x = dx != 0.0;
    }

    let new_y = out_y + dy;
    if !collides_solid(tilemap, out_x, new_y, w, h) {
        out_y = new_y;
    } else {
        if dy > 0.0 {
            let tile_y = ((new_y + h / 2.0) / ts).floor() as i32;
            out_y = tile_y as f32 * ts - h / 2.0 - 0.01;
        } else if dy < 0.0 {
            let tile_y = ((new_y - h / 2.0) / ts).floor() as i32;
            out_y = (tile_y + 1) as f32 * ts + h / 2.0 + 0.01;
        }
        hit_y = dy != 0.0;
    }

    (out_x, out_y, hit_x, hit_y)
}

pub fn collides_solid(tilemap: &Tilemap, cx: f32, cy: f32, w: f32, h: f32) -> bool {
    let ts = tilemap.tile_size;
    let hw = w / 2.0;
    let hh = h / 2.0;
    let min_tx = ((cx - hw) / ts).floor() as i32;
    let max_tx = ((cx + hw - 0.01) / ts).floor() as i32;
    let min_ty = ((cy - hh) / ts).floor() as i32;
    let max_ty = ((cy + hh - 0.01) / ts).floor() as i32;

    for ty in min_ty..=max_ty {
        for tx in min_tx..=max_tx {
            if tilemap.is_solid(tx, ty) {
                return true;
            }
        }
    }
    false
}

fn sync_transforms(mut query: Query<(&GamePosition, &mut Transform)>) {
    for (pos, mut transform) in query.iter_mut() {
        transform.translation.x = pos.x;
        transform.translation.y = pos.y;
    }
}
