use bevy::prelude::*;

use crate::boss::Boss;
use crate::components::{Collider, GameId, GamePosition, Player};
use crate::pursuer::Pursuer;
use crate::tilemap::Tilemap;

/// Debug-grade presentation: colored rectangles for entities and tiles, and a
/// camera glued to the player. Real sprite work lives outside the simulation.
pub struct RenderPlugin;

impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_camera)
            .add_systems(Update, (attach_entity_sprites, rebuild_tile_sprites, follow_player));
    }
}

/// Marker for tile visual entities (so we can despawn them when the map
/// changes)
#[derive(Component)]
struct TileSprite;

fn spawn_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}

fn attach_entity_sprites(
    mut commands: Commands,
    query: Query<
        (Entity, &Collider, Option<&Player>, Option<&Pursuer>, Option<&Boss>),
        Added<GameId>,
    >,
) {
    for (entity, collider, player, pursuer, boss) in query.iter() {
        let color = if player.is_some() {
            Color::srgb(0.85, 0.8, 0.55)
        } else if boss.is_some() {
            Color::srgb(0.55, 0.1, 0.2)
        } else if pursuer.is_some() {
            Color::srgb(0.3, 0.5, 0.25)
        } else {
            Color::srgb(0.6, 0.6, 0.6)
        };
        commands.entity(entity).insert(Sprite::from_color(
            color,
            Vec2::new(collider.width, collider.height),
        ));
    }
}

fn rebuild_tile_sprites(
    mut commands: Commands,
    tilemap: Res<Tilemap>,
    existing: Query<Entity, With<TileSprite>>,
) {
    if !tilemap.is_changed() {
        return;
    }
    for entity in existing.iter() {
        commands.entity(entity).despawn();
    }
    let ts = tilemap.tile_size;
    for y in 0..tilemap.height as i32 {
        for x in 0..tilemap.width as i32 {
            if !tilemap.is_solid(x, y) {
                continue;
            }
            let center = tilemap.tile_center(x, y);
            commands.spawn((
                TileSprite,
                Sprite::from_color(Color::srgb(0.25, 0.22, 0.28), Vec2::new(ts, ts)),
                Transform::from_xyz(center.x, center.y, 0.0),
            ));
        }
    }
}

fn follow_player(
    player: Query<&GamePosition, With<Player>>,
    mut cameras: Query<&mut Transform, (With<Camera2d>, Without<Player>)>,
) {
    let Ok(pos) = player.get_single() else {
        return;
    };
    for mut transform in cameras.iter_mut() {
        transform.translation.x = pos.x;
        transform.translation.y = pos.y;
    }
}
