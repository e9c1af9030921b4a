//! Streamed procedural terrain rendered through a multi-buffered frame pipeline
//!
//! - [`world`]: noise terrain generation and chunk streaming around the viewer
//! - [`renderer`]: mesh layout, the frame resource ring, the backend seams and
//!   the headless and wgpu backends
//! - [`thread_pool`]: render workers recording command lists in parallel
//! - [`app`]: the coordinator driving one frame after another

pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod renderer;
pub mod thread_pool;
pub mod world;

pub use app::{
    FrameStats, RenderContext, RunSummary, ScriptedPath, StaticViewer, TerrainApp, ViewerSource,
};
pub use config::{BackendKind, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use renderer::{
    HeadlessBackend, HeadlessConfig, MeshData, RenderBackend, Vertex, WgpuBackend, WgpuConfig,
};
pub use thread_pool::ShutdownSignal;
pub use world::{ChunkPos, ChunkStreamer, TerrainChunkGenerator, TerrainParams};
