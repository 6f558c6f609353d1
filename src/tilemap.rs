use bevy::prelude::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum TileType {
    Empty = 0,
    Solid = 1,
}

impl TileType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => TileType::Solid,
            _ => TileType::Empty,
        }
    }

    pub fn is_solid(self) -> bool {
        self == TileType::Solid
    }
}

/// The current level's tile grid. Impassable terrain for both collision and
/// sight obstruction queries.
#[derive(Resource, Clone, serde::Serialize, serde::Deserialize, Default)]
pub struct Tilemap {
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<u8>,
    pub tile_size: f32,
}

impl Tilemap {
    pub fn new(width: usize, height: usize, tile_size: f32) -> Self {
        Self {
            width,
            height,
            tiles: vec![0u8; width * height],
            tile_size,
        }
    }

    pub fn get_tile(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            // Out-of-bounds reads as solid so nothing walks off the map
            return TileType::Solid as u8;
        }
        self.tiles[y as usize * self.width + x as usize]
    }

    pub fn get(&self, x: i32, y: i32) -> TileType {
        TileType::from_u8(self.get_tile(x, y))
    }

    pub fn set(&mut self, x: i32, y: i32, tile: TileType) {
        if x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32 {
            self.tiles[y as usize * self.width + x as usize] = tile as u8;
        }
    }

    pub fn is_solid(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_solid()
    }

    pub fn is_solid_at(&self, p: Vec2) -> bool {
        let tx = (p.x / self.tile_size).floor() as i32;
        let ty = (p.y / self.tile_size).floor() as i32;
        self.is_solid(tx, ty)
    }

    /// True if the straight segment between `from` and `to` crosses any solid
    /// tile. Sampled march at quarter-tile steps, endpoints included.
    pub fn segment_blocked(&self, from: Vec2, to: Vec2) -> bool {
        let delta = to - from;
        let dist = delta.length();
        if dist <= 0.001 {
            return self.is_solid_at(from);
        }
        let dir = delta / dist;
        let step = (self.tile_size * 0.25).clamp(0.25, 8.0);
        let mut d = 0.0f32;
        while d <= dist {
            if self.is_solid_at(from + dir * d) {
                return true;
            }
            d += step;
        }
        self.is_solid_at(to)
    }

    /// Center of a tile in world units
    pub fn tile_center(&self, x: i32, y: i32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) * self.tile_size,
            (y as f32 + 0.5) * self.tile_size,
        )
    }

    /// A bordered empty room for development and tests
    pub fn walled_room(width: usize, height: usize, tile_size: f32) -> Self {
        let mut map = Self::new(width, height, tile_size);
        for x in 0..width as i32 {
            map.set(x, 0, TileType::Solid);
            map.set(x, height as i32 - 1, TileType::Solid);
        }
        for y in 0..height as i32 {
            map.set(0, y, TileType::Solid);
            map.set(width as i32 - 1, y, TileType::Solid);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_is_solid() {
        let map = Tilemap::new(4, 4, 32.0);
        assert!(map.is_solid(-1, 0));
        assert!(map.is_solid(0, 4));
        assert!(!map.is_solid(1, 1));
    }

    #[test]
    fn segment_blocked_by_wall_between_points() {
        let mut map = Tilemap::new(8, 3, 32.0);
        map.set(4, 1, TileType::Solid);
        let from = map.tile_center(1, 1);
        let to = map.tile_center(6, 1);
        assert!(map.segment_blocked(from, to));
        map.set(4, 1, TileType::Empty);
        assert!(!map.segment_blocked(from, to));
    }

    #[test]
    fn walled_room_interior_is_open() {
        let map = Tilemap::walled_room(6, 6, 32.0);
        assert!(map.is_solid(0, 3));
        assert!(map.is_solid(5, 3));
        assert!(!map.segment_blocked(map.tile_center(1, 1), map.tile_center(4, 4)));
    }
}
