//! Runs only where an adapter exists; prints a note and passes otherwise.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use terrain_stream::app::{FrameInput, RenderContext};
use terrain_stream::renderer::{CommandQueue, MeshSink, WgpuMesh};
use terrain_stream::{
    ChunkStreamer, EngineConfig, EngineError, ShutdownSignal, StaticViewer, TerrainApp,
    TerrainChunkGenerator, WgpuBackend, WgpuConfig,
};

const SIZE: u32 = 64;

fn open_device() -> Option<Arc<WgpuBackend>> {
    match WgpuBackend::new(WgpuConfig {
        width: SIZE,
        height: SIZE,
        ..Default::default()
    }) {
        Ok(backend) => Some(Arc::new(backend)),
        Err(EngineError::DeviceUnavailable { reason }) => {
            eprintln!("skipping: {}", reason);
            None
        }
        Err(e) => panic!("unexpected error opening device: {e}"),
    }
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.terrain.chunk_size = 16;
    config.terrain.spacing = 1.0;
    config.renderer.worker_threads = Some(3);
    config.renderer.frame_resources = 2;
    config.renderer.fence_poll_ms = 2;
    config
}

#[test]
fn test_frames_draw_terrain_offscreen() {
    let Some(backend) = open_device() else { return };
    let config = test_config();
    let eye = Vec3::new(8.0, 0.0, 8.0);
    let input = |frame_index: u64| FrameInput {
        frame_index,
        eye_position: eye,
        total_time: frame_index as f32 * 0.016,
        delta_time: 0.016,
    };

    let mut context =
        RenderContext::new(Arc::clone(&backend), &config.renderer, ShutdownSignal::new())
            .unwrap();
    context.render_frame(Vec::new(), input(0)).unwrap();
    let cleared = backend.read_color().unwrap();
    assert_eq!(cleared.len(), (SIZE * SIZE * 4) as usize);
    assert!(cleared.chunks_exact(4).all(|p| p == &cleared[..4]));

    let mut streamer = ChunkStreamer::<WgpuMesh>::new(config.terrain, 1);
    streamer.update(backend.as_ref(), eye).unwrap();
    for frame_index in 1..=4 {
        let submission = context
            .render_frame(streamer.render_items(0), input(frame_index))
            .unwrap();
        assert_eq!(submission.draws, 9);
        assert!(submission.in_flight <= 2);
    }
    context.shutdown().unwrap();

    let drawn = backend.read_color().unwrap();
    assert_ne!(drawn, cleared, "terrain should cover part of the target");

    let stats = backend.stats();
    assert_eq!(stats.meshes_uploaded, 9);
    assert_eq!(stats.draws_submitted, 4 * 9);
    assert_eq!(stats.command_lists_submitted, 5 * 3);
    assert_eq!(stats.completed_fence, 5);
}

#[test]
fn test_terrain_app_runs_on_device() {
    let Some(backend) = open_device() else { return };
    let config = test_config();

    let mut app =
        TerrainApp::new(Arc::clone(&backend), &config, StaticViewer::default()).unwrap();
    let summary = app.run(6).unwrap();
    app.shutdown().unwrap();

    assert_eq!(summary.frames, 6);
    assert_eq!(summary.chunks_generated, 9);
    assert_eq!(summary.draws, 6 * 9);
    assert!(summary.max_in_flight <= 2);
    assert_eq!(backend.stats().completed_fence, 6);
    assert!(!backend.is_lost());
}

#[test]
fn test_fences_and_mesh_memory() {
    let Some(backend) = open_device() else { return };

    let mesh = TerrainChunkGenerator::new(test_config().terrain).generate(Vec3::ZERO);
    let handle = backend.upload_mesh(&mesh).unwrap();
    assert_eq!(handle.index_count(), 16 * 16 * 6);
    assert_eq!(backend.resident_bytes(), mesh.byte_size());

    backend.submit(Vec::new()).unwrap();
    backend.signal(1).unwrap();
    let completed = backend.wait_for_fence(1, Duration::from_secs(10)).unwrap();
    assert_eq!(completed, 1);
    assert!(matches!(
        backend.signal(1),
        Err(EngineError::FenceNotMonotonic { previous: 1, value: 1 })
    ));

    let clone = handle.clone();
    drop(handle);
    assert_eq!(backend.resident_bytes(), mesh.byte_size());
    drop(clone);
    assert_eq!(backend.resident_bytes(), 0);
}
