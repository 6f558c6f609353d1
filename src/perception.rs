use bevy::prelude::Vec2;

use crate::components::Facing;
use crate::tilemap::Tilemap;

/// How an observer senses. A zero (or negative) `range` or `half_angle`
/// disables that sub-check, matching level-authored "line of sight regardless
/// of distance" observers.
#[derive(Clone, Copy, Debug)]
pub struct SightProfile {
    pub range: f32,
    pub half_angle: f32,
    pub through_walls: bool,
}

impl SightProfile {
    pub fn new(range: f32, half_angle: f32) -> Self {
        Self {
            range,
            half_angle,
            through_walls: false,
        }
    }

    /// Obstruction only: no range or cone limit
    pub fn unbounded() -> Self {
        Self {
            range: 0.0,
            half_angle: 0.0,
            through_walls: false,
        }
    }
}

pub fn in_range(observer: Vec2, target: Vec2, range: f32) -> bool {
    if range <= 0.0 {
        return true;
    }
    observer.distance(target) < range
}

pub fn obstructed(tilemap: &Tilemap, observer: Vec2, target: Vec2) -> bool {
    tilemap.segment_blocked(observer, target)
}

pub fn in_front_cone(observer: Vec2, facing: Facing, target: Vec2, half_angle: f32) -> bool {
    if half_angle <= 0.0 {
        return true;
    }
    let offset = target - observer;
    let len = offset.length();
    if len <= 0.001 {
        // Coincident positions count as in front
        return true;
    }
    (offset / len).dot(facing.unit()) > half_angle.cos()
}

/// The single predicate behind every spotting decision. Instantaneous and
/// stateless: losing any sub-check next tick loses the target next tick.
pub fn can_see(
    tilemap: &Tilemap,
    observer: Vec2,
    facing: Facing,
    target: Vec2,
    profile: SightProfile,
) -> bool {
    if !in_range(observer, target, profile.range) {
        return false;
    }
    if !in_front_cone(observer, facing, target, profile.half_angle) {
        return false;
    }
    profile.through_walls || !obstructed(tilemap, observer, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tilemap::TileType;
    use std::f32::consts::{FRAC_PI_3, FRAC_PI_4};

    fn open_map() -> Tilemap {
        Tilemap::new(10, 10, 32.0)
    }

    #[test]
    fn range_check_is_strict_and_zero_disables() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(100.0, 0.0);
        assert!(in_range(a, b, 101.0));
        assert!(!in_range(a, b, 100.0));
        assert!(in_range(a, b, 0.0));
    }

    #[test]
    fn cone_check_follows_facing() {
        let o = Vec2::new(0.0, 0.0);
        assert!(in_front_cone(o, Facing::Right, Vec2::new(10.0, 1.0), FRAC_PI_4));
        assert!(!in_front_cone(o, Facing::Left, Vec2::new(10.0, 1.0), FRAC_PI_4));
        // 45 degrees off-axis is outside a 45-degree half-angle cone (strict)
        assert!(!in_front_cone(o, Facing::Right, Vec2::new(10.0, 10.0), FRAC_PI_4));
        assert!(in_front_cone(o, Facing::Up, Vec2::new(1.0, 10.0), FRAC_PI_4));
        // Zero half-angle disables the check entirely
        assert!(in_front_cone(o, Facing::Left, Vec2::new(10.0, 0.0), 0.0));
    }

    #[test]
    fn obstruction_is_the_only_discriminator_with_wide_profile() {
        let mut map = open_map();
        let observer = map.tile_center(1, 5);
        let target = map.tile_center(8, 5);
        let profile = SightProfile::new(1000.0, std::f32::consts::PI);

        assert!(can_see(&map, observer, Facing::Right, target, profile));
        map.set(4, 5, TileType::Solid);
        assert!(!can_see(&map, observer, Facing::Right, target, profile));
        map.set(4, 5, TileType::Empty);
        assert!(can_see(&map, observer, Facing::Right, target, profile));
    }

    #[test]
    fn through_walls_skips_the_obstruction_check() {
        let mut map = open_map();
        map.set(4, 5, TileType::Solid);
        let observer = map.tile_center(1, 5);
        let target = map.tile_center(8, 5);
        let mut profile = SightProfile::new(1000.0, FRAC_PI_3);
        profile.through_walls = true;
        assert!(can_see(&map, observer, Facing::Right, target, profile));
    }

    #[test]
    fn unbounded_profile_only_tests_obstruction() {
        let map = open_map();
        let observer = map.tile_center(1, 1);
        let target = map.tile_center(8, 8);
        // Facing away, far off: still seen because range and cone are disabled
        assert!(can_see(
            &map,
            observer,
            Facing::Down,
            target,
            SightProfile::unbounded()
        ));
    }
}
