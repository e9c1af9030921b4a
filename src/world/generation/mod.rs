//! Procedural terrain generation
//!
//! `NoiseField` provides the height function and `TerrainChunkGenerator`
//! turns it into chunk meshes.

use serde::{Deserialize, Serialize};

use crate::constants::terrain::*;
use crate::error::{EngineError, EngineResult};

mod noise_field;
mod terrain_chunk;


pub use noise_field::{NoiseField, NoiseKind};
pub use terrain_chunk::TerrainChunkGenerator;

/// Terrain generation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    /// Grid cells per chunk edge, also the distance between chunk origins
    pub chunk_size: u32,
    pub spacing: f32,
    pub frequency: f32,
    pub octaves: u32,
    pub amplitude: f32,
    pub seed: u32,
    pub noise: NoiseKind,
}

impl TerrainParams {
    /// World-space distance between neighbouring chunk origins
    pub fn chunk_pitch(&self) -> f32 {
        self.chunk_size as f32
    }

    pub fn vertices_per_chunk(&self) -> usize {
        let stride = self.chunk_size as usize + 1;
        stride * stride
    }

    pub fn triangles_per_chunk(&self) -> usize {
        let size = self.chunk_size as usize;
        size * size * 2
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::invalid_config("terrain.chunk_size must be > 0"));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(EngineError::invalid_config(format!(
                "terrain.spacing must be a positive number, got {}",
                self.spacing
            )));
        }
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(EngineError::invalid_config(format!(
                "terrain.frequency must be a positive number, got {}",
                self.frequency
            )));
        }
        if self.octaves == 0 {
            return Err(EngineError::invalid_config("terrain.octaves must be > 0"));
        }
        if !self.amplitude.is_finite() {
            return Err(EngineError::invalid_config("terrain.amplitude must be finite"));
        }
        Ok(())
    }
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            spacing: VERTEX_SPACING,
            frequency: NOISE_FREQUENCY,
            octaves: NOISE_OCTAVES,
            amplitude: HEIGHT_AMPLITUDE,
            seed: DEFAULT_SEED,
            noise: NoiseKind::Perlin,
        }
    }
}
