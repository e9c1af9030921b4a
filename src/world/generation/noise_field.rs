//! Deterministic 3D fractal noise
//!
//! A thin wrapper over the `noise` crate generators that fixes the lattice
//! scale and implements fractal Brownian motion accumulation.

use glam::Vec3;
use noise::{NoiseFn, OpenSimplex, Perlin, SuperSimplex, Value};
use serde::{Deserialize, Serialize};

use crate::constants::terrain::{DEFAULT_SEED, NOISE_LATTICE_SCALE};

/// Base noise function used by a [`NoiseField`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseKind {
    #[default]
    Perlin,
    OpenSimplex,
    SuperSimplex,
    Value,
}

#[derive(Clone)]
enum Source {
    Perlin(Perlin),
    OpenSimplex(OpenSimplex),
    SuperSimplex(SuperSimplex),
    Value(Value),
}

impl Source {
    fn get(&self, point: [f64; 3]) -> f64 {
        match self {
            Source::Perlin(n) => n.get(point),
            Source::OpenSimplex(n) => n.get(point),
            Source::SuperSimplex(n) => n.get(point),
            Source::Value(n) => n.get(point),
        }
    }
}

/// Seeded noise field, pure and cheap to clone
#[derive(Clone)]
pub struct NoiseField {
    source: Source,
    seed: u32,
    kind: NoiseKind,
}

impl NoiseField {
    pub fn new(seed: u32, kind: NoiseKind) -> Self {
        let source = match kind {
            NoiseKind::Perlin => Source::Perlin(Perlin::new(seed)),
            NoiseKind::OpenSimplex => Source::OpenSimplex(OpenSimplex::new(seed)),
            NoiseKind::SuperSimplex => Source::SuperSimplex(SuperSimplex::new(seed)),
            NoiseKind::Value => Source::Value(Value::new(seed)),
        };

        Self { source, seed, kind }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn kind(&self) -> NoiseKind {
        self.kind
    }

    /// Single noise sample, roughly in [-1, 1]
    pub fn sample(&self, position: Vec3) -> f32 {
        self.sample_f64(position.as_dvec3().to_array()) as f32
    }

    fn sample_f64(&self, [x, y, z]: [f64; 3]) -> f64 {
        self.source.get([
            x * NOISE_LATTICE_SCALE,
            y * NOISE_LATTICE_SCALE,
            z * NOISE_LATTICE_SCALE,
        ])
    }

    /// Fractal Brownian motion over `octaves` samples.
    ///
    /// Each octave doubles the frequency and halves the amplitude. The sum is
    /// divided by the total amplitude so the result stays in the range of a
    /// single sample regardless of the octave count.
    pub fn fractal_sample(&self, position: Vec3, octaves: u32, base_frequency: f32) -> f32 {
        let p = position.as_dvec3();
        let mut frequency = base_frequency as f64;
        let mut amplitude = 1.0f64;
        let mut total = 0.0f64;
        let mut weight = 0.0f64;

        for _ in 0..octaves {
            total += self.sample_f64((p * frequency).to_array()) * amplitude;
            weight += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        if weight == 0.0 {
            0.0
        } else {
            (total / weight) as f32
        }
    }
}

impl Default for NoiseField {
    fn default() -> Self {
        Self::new(DEFAULT_SEED, NoiseKind::Perlin)
    }
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField")
            .field("seed", &self.seed)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_is_deterministic() {
        let a = NoiseField::new(42, NoiseKind::Perlin);
        let b = NoiseField::new(42, NoiseKind::Perlin);
        let p = Vec3::new(123.5, 0.0, -87.25);

        assert_eq!(a.sample(p), b.sample(p));
        assert_eq!(a.fractal_sample(p, 6, 0.35), b.fractal_sample(p, 6, 0.35));
    }

    #[test]
    fn test_fractal_stays_in_sample_range() {
        for kind in [
            NoiseKind::Perlin,
            NoiseKind::OpenSimplex,
            NoiseKind::SuperSimplex,
            NoiseKind::Value,
        ] {
            let field = NoiseField::new(7, kind);
            for i in 0..200 {
                let p = Vec3::new(i as f32 * 37.0 - 3000.0, 0.0, i as f32 * 11.0);
                let value = field.fractal_sample(p, 6, 0.35);
                assert!(value.is_finite());
                assert!(value.abs() <= 1.5, "{:?} produced {}", kind, value);
            }
        }
    }

    #[test]
    fn test_single_octave_matches_scaled_sample() {
        let field = NoiseField::default();
        let p = Vec3::new(310.0, 0.0, 45.0);
        let direct = field.sample(p * 0.5);
        let fractal = field.fractal_sample(p, 1, 0.5);
        assert!((direct - fractal).abs() < 1e-6);
    }

    #[test]
    fn test_zero_octaves_is_flat() {
        let field = NoiseField::default();
        assert_eq!(field.fractal_sample(Vec3::new(1.0, 2.0, 3.0), 0, 0.35), 0.0);
    }
}
