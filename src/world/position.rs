use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Position of a chunk on the terrain grid (chunk coordinates on the XZ plane)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world position.
    ///
    /// Rounds toward negative infinity on both axes, so (-250, _, 250) with a
    /// chunk size of 100 lies in chunk (-3, 2), not (-2, 2). Returns `None`
    /// when either axis is not finite or its chunk index does not fit in `i32`.
    pub fn from_world_pos(position: Vec3, chunk_size: f32) -> Option<Self> {
        Some(Self::new(
            chunk_index(position.x, chunk_size)?,
            chunk_index(position.z, chunk_size)?,
        ))
    }

    /// World-space origin of this chunk
    pub fn to_world_pos(&self, chunk_size: f32) -> Vec3 {
        Vec3::new(self.x as f32 * chunk_size, 0.0, self.z as f32 * chunk_size)
    }

    /// Create a new chunk position offset by the given amounts, clamped to the grid edge
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.z.saturating_add(dz))
    }

    /// Largest per-axis distance to another chunk position
    pub fn chebyshev_distance(&self, other: ChunkPos) -> u32 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }

    /// All positions within `radius` on both axes, row by row.
    ///
    /// Cells past the edge of the `i32` grid are left out.
    pub fn neighbourhood(self, radius: u32) -> impl Iterator<Item = ChunkPos> {
        let radius = i32::try_from(radius).unwrap_or(i32::MAX);
        let xs = self.x.saturating_sub(radius)..=self.x.saturating_add(radius);
        let zs = self.z.saturating_sub(radius)..=self.z.saturating_add(radius);
        xs.flat_map(move |x| zs.clone().map(move |z| ChunkPos::new(x, z)))
    }
}

fn chunk_index(coordinate: f32, chunk_size: f32) -> Option<i32> {
    let index = (f64::from(coordinate) / f64::from(chunk_size)).floor();
    if index.is_finite() && index >= f64::from(i32::MIN) && index <= f64::from(i32::MAX) {
        Some(index as i32)
    } else {
        None
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_rounding() {
        assert_eq!(
            ChunkPos::from_world_pos(Vec3::new(250.0, 0.0, 250.0), 100.0),
            Some(ChunkPos::new(2, 2))
        );
        assert_eq!(
            ChunkPos::from_world_pos(Vec3::new(-250.0, 0.0, 250.0), 100.0),
            Some(ChunkPos::new(-3, 2))
        );
        assert_eq!(
            ChunkPos::from_world_pos(Vec3::new(-0.5, 40.0, 99.9), 100.0),
            Some(ChunkPos::new(-1, 0))
        );
        assert_eq!(
            ChunkPos::from_world_pos(Vec3::new(-100.0, 0.0, 100.0), 100.0),
            Some(ChunkPos::new(-1, 1))
        );
    }

    #[test]
    fn test_unrepresentable_world_positions() {
        assert_eq!(ChunkPos::from_world_pos(Vec3::new(3e11, 0.0, 0.0), 100.0), None);
        assert_eq!(ChunkPos::from_world_pos(Vec3::new(0.0, 0.0, -3e11), 100.0), None);
        assert_eq!(ChunkPos::from_world_pos(Vec3::new(f32::NAN, 0.0, 0.0), 100.0), None);
        assert_eq!(ChunkPos::from_world_pos(Vec3::new(0.0, 0.0, f32::INFINITY), 100.0), None);
        // y is ignored
        assert!(ChunkPos::from_world_pos(Vec3::new(0.0, f32::NAN, 0.0), 100.0).is_some());
    }

    #[test]
    fn test_offset_and_distance_at_grid_edge() {
        let edge = ChunkPos::new(i32::MAX, i32::MIN);
        assert_eq!(edge.offset(1, -1), edge);
        assert_eq!(edge.offset(-1, 1), ChunkPos::new(i32::MAX - 1, i32::MIN + 1));
        assert_eq!(edge.chebyshev_distance(ChunkPos::new(i32::MIN, i32::MIN)), u32::MAX);
    }

    #[test]
    fn test_neighbourhood_clipped_at_grid_edge() {
        let corner = ChunkPos::new(i32::MAX, i32::MAX);
        let cells: Vec<_> = corner.neighbourhood(1).collect();
        assert_eq!(cells.len(), 4);
        assert!(cells.contains(&ChunkPos::new(i32::MAX - 1, i32::MAX - 1)));
        assert!(cells.iter().all(|c| c.chebyshev_distance(corner) <= 1));
    }

    #[test]
    fn test_neighbourhood() {
        let centre = ChunkPos::new(-3, 2);
        let cells: Vec<_> = centre.neighbourhood(1).collect();
        assert_eq!(cells.len(), 9);
        assert!(cells.iter().all(|c| c.chebyshev_distance(centre) <= 1));
        assert!(cells.contains(&ChunkPos::new(-4, 1)));
        assert!(cells.contains(&ChunkPos::new(-2, 3)));
        assert_eq!(centre.neighbourhood(0).collect::<Vec<_>>(), vec![centre]);
    }

    #[test]
    fn test_world_origin() {
        assert_eq!(
            ChunkPos::new(-2, 3).to_world_pos(100.0),
            Vec3::new(-200.0, 0.0, 300.0)
        );
    }
}
