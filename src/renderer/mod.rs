//! GPU-facing side of the engine: mesh layout, per-frame constants and the
//! backend seams, plus two backends: an in-process simulation used by tests
//! and an offscreen wgpu renderer.

pub mod backend;
pub mod frame_resource;
pub mod headless;
mod mesh;
pub mod upload_buffer;
mod vertex;
pub mod wgpu_backend;

pub use backend::{CommandQueue, CommandRecorder, MeshSink, RenderBackend, RenderItem};
pub use frame_resource::{FrameResourceLayout, FrameResourceRing, FrameResources, SlotState};
pub use headless::{
    DrawCall, HeadlessBackend, HeadlessCommandList, HeadlessConfig, HeadlessMesh,
    HeadlessRecorder, HeadlessStats,
};
pub use mesh::MeshData;
pub use upload_buffer::{FrameConstants, MaterialConstants, ObjectConstants, UploadBuffer};
pub use vertex::Vertex;
pub use wgpu_backend::{
    SceneUniform, WgpuBackend, WgpuCommandList, WgpuConfig, WgpuMesh, WgpuRecorder, WgpuStats,
};
