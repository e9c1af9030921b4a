//! Everything the coordinator needs to put a frame on the GPU

use std::sync::Arc;

use glam::Vec3;

use crate::config::RendererConfig;
use crate::error::{EngineError, EngineResult};
use crate::renderer::{
    FrameConstants, FrameResourceRing, MaterialConstants, MeshSink, ObjectConstants,
    RenderBackend, RenderItem,
};
use crate::thread_pool::{ShutdownSignal, WorkerPool};

/// Per-frame values written into the frame constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub frame_index: u64,
    pub eye_position: Vec3,
    pub total_time: f32,
    pub delta_time: f32,
}

/// Outcome of one submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSubmission {
    pub slot: usize,
    pub fence: u64,
    pub draws: usize,
    pub command_lists: usize,
    /// Frames still executing after this one was submitted
    pub in_flight: usize,
    pub completed_fence: u64,
}

pub struct RenderContext<B: RenderBackend> {
    backend: Arc<B>,
    ring: FrameResourceRing,
    workers: WorkerPool<B::Recorder>,
    shutdown: ShutdownSignal,
}

impl<B: RenderBackend> RenderContext<B> {
    pub fn new(
        backend: Arc<B>,
        config: &RendererConfig,
        shutdown: ShutdownSignal,
    ) -> EngineResult<Self> {
        let recorders = (0..config.worker_count())
            .map(|worker| backend.create_recorder(worker))
            .collect::<EngineResult<Vec<_>>>()?;
        let workers = WorkerPool::new(recorders)?;
        let ring = FrameResourceRing::new(config.frame_resources, config.layout())
            .with_poll_interval(config.fence_poll());

        log::info!(
            "[RenderContext] {} frame resources, {} workers, {} object slots",
            ring.slot_count(),
            workers.worker_count(),
            config.max_objects
        );

        Ok(Self {
            backend,
            ring,
            workers,
            shutdown,
        })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn ring(&self) -> &FrameResourceRing {
        &self.ring
    }

    pub fn workers(&self) -> &WorkerPool<B::Recorder> {
        &self.workers
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// True once `shutdown` has joined the workers
    pub fn is_shut_down(&self) -> bool {
        self.workers.is_shut_down()
    }

    /// Record and submit one frame drawing `items`.
    ///
    /// Blocks first until the next frame slot has been retired by the GPU.
    /// Fails with `ShutdownRequested` after `shutdown` without touching the ring.
    pub fn render_frame(
        &mut self,
        items: Vec<RenderItem<<B as MeshSink>::Handle>>,
        input: FrameInput,
    ) -> EngineResult<FrameSubmission> {
        if self.is_shut_down() {
            return Err(EngineError::ShutdownRequested);
        }

        let slot = self.ring.acquire(&*self.backend, &self.shutdown)?;

        {
            let resources = self.ring.resources_mut(slot)?;
            for item in &items {
                resources
                    .objects
                    .copy(item.object_index as usize, ObjectConstants::default())?;
            }
            resources.materials.copy(0, MaterialConstants::default())?;
            resources.frame.copy(
                0,
                FrameConstants {
                    eye_position: input.eye_position.extend(1.0).to_array(),
                    total_time: input.total_time,
                    delta_time: input.delta_time,
                    frame_index: input.frame_index as u32,
                    object_count: items.len() as u32,
                },
            )?;
        }

        let draws = items.len();
        let resources = self.ring.shared_resources(slot)?;
        let lists = self.workers.dispatch(items.into(), resources)?;
        let command_lists = lists.len();

        self.backend.submit(lists)?;
        let fence = self.ring.next_fence_value();
        self.backend.signal(fence)?;
        self.ring.release(slot, fence)?;
        self.ring.observe_completion(self.backend.completed_fence()?);

        log::trace!(
            "[RenderContext] Frame {} in slot {} signals fence {}",
            input.frame_index,
            slot,
            fence
        );

        Ok(FrameSubmission {
            slot,
            fence,
            draws,
            command_lists,
            in_flight: self.ring.in_flight(),
            completed_fence: self.ring.completed_fence(),
        })
    }

    /// Wait for the GPU to go idle, then stop the workers
    pub fn shutdown(&mut self) -> EngineResult<()> {
        let drained = match self.ring.drain(&*self.backend, &self.shutdown) {
            Err(EngineError::ShutdownRequested) => {
                log::warn!("[RenderContext] Skipping GPU drain, shutdown already requested");
                Ok(())
            }
            other => other,
        };
        if let Err(e) = &drained {
            log::error!("[RenderContext] Drain failed: {}", e);
        }

        let joined = self.workers.shutdown();
        drained.and(joined)
    }
}
