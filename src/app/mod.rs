//! Frame loop coordinator
//!
//! Each frame: stream chunks around the viewer, wait for a free frame slot,
//! write its constants, let the workers record, submit and signal the fence.

mod render_context;
mod viewer;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use render_context::{FrameInput, FrameSubmission, RenderContext};
pub use viewer::{ScriptedPath, StaticViewer, ViewerSource};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::renderer::{MeshSink, RenderBackend};
use crate::thread_pool::ShutdownSignal;
use crate::world::{ChunkPos, ChunkStreamer, StreamUpdate};

/// Frames between periodic progress logs
const STATS_LOG_INTERVAL: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub stream: StreamUpdate,
    pub resident_chunks: usize,
    pub submission: FrameSubmission,
}

impl FrameStats {
    pub fn reference(&self) -> ChunkPos {
        self.stream.reference
    }
}

/// Totals over a [`TerrainApp::run`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub chunks_generated: usize,
    pub chunks_evicted: usize,
    pub upload_failures: usize,
    pub draws: usize,
    pub max_in_flight: usize,
    pub last_fence: u64,
}

impl RunSummary {
    fn record(&mut self, stats: &FrameStats) {
        self.frames += 1;
        self.chunks_generated += stats.stream.generated.len();
        self.chunks_evicted += stats.stream.evicted.len();
        self.upload_failures += stats.stream.failed.len();
        self.draws += stats.submission.draws;
        self.max_in_flight = self.max_in_flight.max(stats.submission.in_flight);
        self.last_fence = stats.submission.fence;
    }
}

pub struct TerrainApp<B: RenderBackend, V> {
    context: RenderContext<B>,
    streamer: ChunkStreamer<<B as MeshSink>::Handle>,
    viewer: V,
    frame_time: Duration,
    frame_index: u64,
    total_time: f32,
}

impl<B: RenderBackend, V: ViewerSource> TerrainApp<B, V> {
    pub fn new(backend: Arc<B>, config: &EngineConfig, viewer: V) -> EngineResult<Self> {
        Self::with_shutdown(backend, config, viewer, ShutdownSignal::new())
    }

    pub fn with_shutdown(
        backend: Arc<B>,
        config: &EngineConfig,
        viewer: V,
        shutdown: ShutdownSignal,
    ) -> EngineResult<Self> {
        config.validate()?;

        let context = RenderContext::new(backend, &config.renderer, shutdown)?;
        let streamer = ChunkStreamer::new(config.terrain, config.streaming.view_radius);

        Ok(Self {
            context,
            streamer,
            viewer,
            frame_time: config.run.frame_time(),
            frame_index: 0,
            total_time: 0.0,
        })
    }

    pub fn context(&self) -> &RenderContext<B> {
        &self.context
    }

    pub fn streamer(&self) -> &ChunkStreamer<<B as MeshSink>::Handle> {
        &self.streamer
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        self.context.shutdown_signal()
    }

    /// Run one frame with a time step of `dt` seconds.
    ///
    /// After [`TerrainApp::shutdown`] this fails with `ShutdownRequested`
    /// before any chunk is streamed.
    pub fn run_frame(&mut self, dt: f32) -> EngineResult<FrameStats> {
        if self.context.is_shut_down() {
            return Err(EngineError::ShutdownRequested);
        }

        let frame_index = self.frame_index;
        let eye_position = self.viewer.position(frame_index, dt);

        let stream = self
            .streamer
            .update(self.context.backend().as_ref(), eye_position)?;
        let items = self.streamer.render_items(0);

        self.total_time += dt;
        let submission = self.context.render_frame(
            items,
            FrameInput {
                frame_index,
                eye_position,
                total_time: self.total_time,
                delta_time: dt,
            },
        )?;

        self.frame_index += 1;
        Ok(FrameStats {
            frame_index,
            stream,
            resident_chunks: self.streamer.len(),
            submission,
        })
    }

    /// Run up to `frames` frames at the configured frame time.
    ///
    /// Stops early without error once shutdown is requested.
    pub fn run(&mut self, frames: u64) -> EngineResult<RunSummary> {
        let dt = self.frame_time.as_secs_f32();
        let started = Instant::now();
        let mut summary = RunSummary::default();

        log::info!("[TerrainApp] Running {} frames", frames);
        for _ in 0..frames {
            if self.shutdown_signal().is_requested() {
                break;
            }

            let stats = match self.run_frame(dt) {
                Ok(stats) => stats,
                Err(EngineError::ShutdownRequested) => break,
                Err(e) => {
                    log::error!("[TerrainApp] Frame {} failed: {}", self.frame_index, e);
                    return Err(e);
                }
            };
            summary.record(&stats);

            if stats.frame_index % STATS_LOG_INTERVAL == 0 {
                log::info!(
                    "[TerrainApp] Frame {}: chunk {}, {} chunks, {} in flight, fence {}/{}",
                    stats.frame_index,
                    stats.reference(),
                    stats.resident_chunks,
                    stats.submission.in_flight,
                    stats.submission.completed_fence,
                    stats.submission.fence
                );
            }
        }

        let elapsed = started.elapsed();
        log::info!(
            "[TerrainApp] {} frames in {:.2?} ({} chunks generated, {} evicted, {} upload failures)",
            summary.frames,
            elapsed,
            summary.chunks_generated,
            summary.chunks_evicted,
            summary.upload_failures
        );
        Ok(summary)
    }

    /// Drain the GPU, stop the workers and drop every chunk
    pub fn shutdown(&mut self) -> EngineResult<()> {
        log::info!("[TerrainApp] Shutting down after {} frames", self.frame_index);
        let result = self.context.shutdown();
        self.streamer.clear();
        result
    }
}
