//! Seams between the engine core and the GPU
//!
//! The core never sees device buffers. It uploads meshes through a
//! [`MeshSink`], records draws through a thread-private [`CommandRecorder`]
//! and drives completion through a fenced [`CommandQueue`].

use std::time::Duration;

use crate::error::EngineResult;
use crate::renderer::frame_resource::FrameResources;
use crate::renderer::MeshData;
use crate::thread_pool::WorkItem;

/// Accepts CPU geometry and returns an opaque drawable handle
pub trait MeshSink {
    /// Handles are cheap to clone. Clones keep the device buffers alive, so
    /// in-flight work can still draw a mesh after its chunk was evicted.
    type Handle: Clone + Send + Sync + 'static;

    fn upload_mesh(&self, mesh: &MeshData) -> EngineResult<Self::Handle>;
}

/// Submission queue with a monotonically increasing completion fence
pub trait CommandQueue {
    type CommandList: Send + 'static;

    fn submit(&self, lists: Vec<Self::CommandList>) -> EngineResult<()>;

    /// Fence `value` is reached once everything submitted before this call has executed
    fn signal(&self, value: u64) -> EngineResult<()>;

    /// Highest fence value the device has reached
    fn completed_fence(&self) -> EngineResult<u64>;

    /// Block until `value` is reached or `timeout` elapses, returning the completed value
    fn wait_for_fence(&self, value: u64, timeout: Duration) -> EngineResult<u64>;
}

/// One renderable entry of a frame
#[derive(Debug, Clone)]
pub struct RenderItem<H> {
    pub mesh: H,
    /// Index into the per-object constants of the frame slot
    pub object_index: u32,
    pub index_count: u32,
}

/// A recording context owned by exactly one worker thread
pub trait CommandRecorder: Send + 'static {
    type Handle: Send + Sync + 'static;
    type CommandList: Send + 'static;

    /// Record draws for `items`, which is the `work` range of the frame's item list
    fn record(
        &mut self,
        frame: &FrameResources,
        work: WorkItem,
        items: &[RenderItem<Self::Handle>],
    ) -> EngineResult<Self::CommandList>;
}

/// A device able to upload meshes, hand out recorders and execute their output
pub trait RenderBackend: MeshSink + CommandQueue + Send + Sync + 'static {
    type Recorder: CommandRecorder<
        Handle = <Self as MeshSink>::Handle,
        CommandList = <Self as CommandQueue>::CommandList,
    >;

    fn create_recorder(&self, worker: usize) -> EngineResult<Self::Recorder>;
}
