// Terrain Stream Constants - SINGLE SOURCE OF TRUTH
//
// Terrain values are a reproducibility contract: generated geometry for a
// given seed and noise kind only matches across builds if these are unchanged.

/// Terrain generation constants
pub mod terrain {
    /// Grid cells per chunk edge, also the world-space pitch between chunk origins
    pub const CHUNK_SIZE: u32 = 100;
    /// Distance between neighbouring grid vertices
    pub const VERTEX_SPACING: f32 = 5.0;
    /// Base frequency of the fractal noise
    pub const NOISE_FREQUENCY: f32 = 0.35;
    pub const NOISE_OCTAVES: u32 = 6;
    /// Fractal noise output is scaled by this to get a height
    pub const HEIGHT_AMPLITUDE: f32 = 100.0;
    pub const DEFAULT_SEED: u32 = 1337;
    /// Scale applied to every noise lookup before frequency
    pub const NOISE_LATTICE_SCALE: f64 = 0.01;
}

/// Streaming constants
pub mod streaming {
    /// Chebyshev radius of the live neighbourhood (1 = 3x3 chunks)
    pub const VIEW_RADIUS: u32 = 1;
}

/// Frame pipeline constants
pub mod frame {
    /// Frames the CPU may run ahead of the GPU
    pub const FRAME_RESOURCE_COUNT: usize = 3;
    /// Worker count used when hardware concurrency cannot be detected
    pub const FALLBACK_WORKER_COUNT: usize = 8;
    pub const MAX_OBJECTS: usize = 64;
    pub const MAX_MATERIALS: usize = 8;
    /// Per-frame constants are written once per frame
    pub const FRAME_CONSTANT_COUNT: usize = 1;
    /// Upper bound of a single fence wait before the shutdown flag is checked again
    pub const FENCE_POLL_MS: u64 = 16;
}

/// Offscreen GPU rendering
pub mod gpu {
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;
    /// Camera position relative to the viewer
    pub const CAMERA_OFFSET: [f32; 3] = [0.0, 180.0, 260.0];
    pub const FOV_Y_DEGREES: f32 = 60.0;
    pub const Z_NEAR: f32 = 1.0;
    pub const Z_FAR: f32 = 4000.0;
    pub const CLEAR_COLOR: [f64; 4] = [0.5, 0.8, 1.0, 1.0];
    /// Sleep between device polls while waiting on a fence
    pub const FENCE_SPIN_MICROS: u64 = 500;
}
