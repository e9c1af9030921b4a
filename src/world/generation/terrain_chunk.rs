use glam::Vec3;
use log::trace;

use super::{NoiseField, TerrainParams};
use crate::renderer::{MeshData, Vertex};

/// Builds chunk meshes from a regular grid displaced by fractal noise
#[derive(Debug, Clone)]
pub struct TerrainChunkGenerator {
    params: TerrainParams,
    noise: NoiseField,
}

impl TerrainChunkGenerator {
    pub fn new(params: TerrainParams) -> Self {
        let noise = NoiseField::new(params.seed, params.noise);
        Self { params, noise }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Generate the chunk whose grid starts at `origin` using the configured size and spacing
    pub fn generate(&self, origin: Vec3) -> MeshData {
        self.generate_with(origin, self.params.chunk_size, self.params.spacing)
    }

    /// Generate a `(size + 1)^2` vertex grid with `size * size * 2` triangles.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or `spacing` is not a positive finite number.
    pub fn generate_with(&self, origin: Vec3, size: u32, spacing: f32) -> MeshData {
        assert!(size > 0, "chunk size must be positive");
        assert!(
            spacing.is_finite() && spacing > 0.0,
            "vertex spacing must be positive, got {}",
            spacing
        );

        let mut mesh = build_grid(size, spacing);
        self.displace(&mut mesh.vertices, origin);
        compute_normals(&mut mesh);

        for vertex in &mut mesh.vertices {
            vertex.position = (vertex.position() + origin).to_array();
        }

        trace!(
            "[TerrainChunkGenerator] Generated chunk at {:?}: {} vertices, {} triangles",
            origin,
            mesh.vertex_count(),
            mesh.triangle_count()
        );

        mesh
    }

    /// Height of the terrain surface at a world-space XZ position
    pub fn height_at(&self, world_x: f32, world_z: f32) -> f32 {
        self.noise.fractal_sample(
            Vec3::new(world_x, 0.0, world_z),
            self.params.octaves,
            self.params.frequency,
        ) * self.params.amplitude
    }

    // Noise is sampled at the world position so chunks sharing an edge agree on its heights.
    fn displace(&self, vertices: &mut [Vertex], origin: Vec3) {
        for vertex in vertices {
            let world = vertex.position() + origin;
            let elevation = self.noise.fractal_sample(
                world,
                self.params.octaves,
                self.params.frequency,
            ) * self.params.amplitude;
            vertex.position[1] += elevation;
        }
    }
}

/// Flat grid in the local XZ plane, row-major, two triangles per cell
fn build_grid(size: u32, spacing: f32) -> MeshData {
    let stride = size + 1;
    let vertex_count = (stride * stride) as usize;
    let index_count = (size * size * 6) as usize;
    let mut mesh = MeshData::with_capacity(vertex_count, index_count);

    for row in 0..stride {
        for col in 0..stride {
            mesh.vertices.push(Vertex::new(
                [col as f32 * spacing, 0.0, row as f32 * spacing],
                [0.0; 3],
            ));
        }
    }

    for row in 0..size {
        for col in 0..size {
            let top_left = row * stride + col;
            let top_right = top_left + 1;
            let bottom_left = (row + 1) * stride + col;
            let bottom_right = bottom_left + 1;

            mesh.add_triangle(top_left, bottom_left, top_right);
            mesh.add_triangle(top_right, bottom_left, bottom_right);
        }
    }

    mesh
}

/// Smooth per-vertex normals from area-weighted face normals
fn compute_normals(mesh: &mut MeshData) {
    let mut accumulated = vec![Vec3::ZERO; mesh.vertices.len()];

    for [a, b, c] in mesh.triangles() {
        let (a, b, c) = (a as usize, b as usize, c as usize);
        let p0 = mesh.vertices[a].position();
        let p1 = mesh.vertices[b].position();
        let p2 = mesh.vertices[c].position();
        let face = (p1 - p0).cross(p2 - p0);

        accumulated[a] += face;
        accumulated[b] += face;
        accumulated[c] += face;
    }

    for (vertex, normal) in mesh.vertices.iter_mut().zip(accumulated) {
        vertex.normal = normal.normalize_or_zero().to_array();
    }
}
