//! Engine configuration loaded from TOML
//!
//! Every field has a default, so a config file only needs the values it
//! changes. `[terrain]` maps onto [`TerrainParams`] directly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{frame, gpu, streaming};
use crate::error::{EngineError, EngineResult};
use crate::renderer::{FrameResourceLayout, HeadlessConfig, WgpuConfig};
use crate::thread_pool::default_worker_count;
use crate::world::TerrainParams;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub terrain: TerrainParams,
    pub streaming: StreamingConfig,
    pub renderer: RendererConfig,
    pub headless: HeadlessSettings,
    pub gpu: GpuSettings,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Chebyshev radius of the resident neighbourhood, in chunks
    pub view_radius: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            view_radius: streaming::VIEW_RADIUS,
        }
    }
}

/// Device the frames are submitted to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Simulated GPU thread, configured by `[headless]`
    #[default]
    Headless,
    /// Offscreen rendering on a real adapter, configured by `[gpu]`
    Wgpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub backend: BackendKind,
    pub frame_resources: usize,
    /// Defaults to the hardware thread count
    pub worker_threads: Option<usize>,
    pub max_objects: usize,
    pub max_materials: usize,
    pub fence_poll_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Headless,
            frame_resources: frame::FRAME_RESOURCE_COUNT,
            worker_threads: None,
            max_objects: frame::MAX_OBJECTS,
            max_materials: frame::MAX_MATERIALS,
            fence_poll_ms: frame::FENCE_POLL_MS,
        }
    }
}

impl RendererConfig {
    pub fn worker_count(&self) -> usize {
        self.worker_threads.unwrap_or_else(default_worker_count)
    }

    pub fn layout(&self) -> FrameResourceLayout {
        FrameResourceLayout {
            objects: self.max_objects,
            materials: self.max_materials,
        }
    }

    pub fn fence_poll(&self) -> Duration {
        Duration::from_millis(self.fence_poll_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessSettings {
    pub gpu_latency_ms: u64,
    pub memory_budget_mb: Option<u64>,
}

impl HeadlessSettings {
    pub fn backend_config(&self) -> HeadlessConfig {
        HeadlessConfig {
            gpu_latency: Duration::from_millis(self.gpu_latency_ms),
            memory_budget_bytes: self.memory_budget_mb.map(|mb| mb * 1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    pub width: u32,
    pub height: u32,
    /// Prefer an integrated adapter over a discrete one
    pub low_power: bool,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            width: gpu::DEFAULT_WIDTH,
            height: gpu::DEFAULT_HEIGHT,
            low_power: false,
        }
    }
}

impl GpuSettings {
    pub fn backend_config(&self) -> WgpuConfig {
        WgpuConfig {
            width: self.width,
            height: self.height,
            power_preference: if self.low_power {
                wgpu::PowerPreference::LowPower
            } else {
                wgpu::PowerPreference::HighPerformance
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub frames: u64,
    pub frame_time_ms: u64,
    /// Path walked by the viewer, looping back to the first point
    pub waypoints: Vec<[f32; 3]>,
    /// World units per second
    pub viewer_speed: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            frame_time_ms: 16,
            waypoints: vec![
                [250.0, 0.0, 250.0],
                [-250.0, 0.0, 250.0],
                [-250.0, 0.0, -250.0],
                [250.0, 0.0, -250.0],
            ],
            viewer_speed: 150.0,
        }
    }
}

impl RunConfig {
    pub fn frame_time(&self) -> Duration {
        Duration::from_millis(self.frame_time_ms)
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        log::info!("[EngineConfig] Loaded {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string(self).map_err(|e| EngineError::invalid_config(e.to_string()))
    }

    /// Chunks kept resident for the configured view radius
    pub fn neighbourhood_size(&self) -> usize {
        let side = 2 * self.streaming.view_radius as usize + 1;
        side * side
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.terrain.validate()?;

        let renderer = &self.renderer;
        if renderer.frame_resources == 0 {
            return Err(EngineError::invalid_config(
                "renderer.frame_resources must be > 0",
            ));
        }
        if renderer.worker_threads == Some(0) {
            return Err(EngineError::invalid_config(
                "renderer.worker_threads must be > 0",
            ));
        }
        if renderer.max_objects < self.neighbourhood_size() {
            return Err(EngineError::invalid_config(format!(
                "renderer.max_objects ({}) cannot hold the {} chunks of view radius {}",
                renderer.max_objects,
                self.neighbourhood_size(),
                self.streaming.view_radius
            )));
        }
        if renderer.max_materials == 0 {
            return Err(EngineError::invalid_config(
                "renderer.max_materials must be > 0",
            ));
        }
        if renderer.fence_poll_ms == 0 {
            return Err(EngineError::invalid_config(
                "renderer.fence_poll_ms must be > 0",
            ));
        }

        if self.gpu.width == 0 || self.gpu.height == 0 {
            return Err(EngineError::invalid_config(format!(
                "gpu target must be at least 1x1, got {}x{}",
                self.gpu.width, self.gpu.height
            )));
        }

        let run = &self.run;
        if !(run.viewer_speed.is_finite() && run.viewer_speed >= 0.0) {
            return Err(EngineError::invalid_config(format!(
                "run.viewer_speed must be a non-negative number, got {}",
                run.viewer_speed
            )));
        }
        if run.waypoints.iter().flatten().any(|c| !c.is_finite()) {
            return Err(EngineError::invalid_config(
                "run.waypoints must contain finite coordinates",
            ));
        }
        Ok(())
    }
}
