use glam::Vec3;
use terrain_stream::renderer::{HeadlessBackend, HeadlessConfig};
use terrain_stream::{ChunkPos, ChunkStreamer, EngineError, TerrainChunkGenerator, TerrainParams};

fn small_params() -> TerrainParams {
    TerrainParams {
        chunk_size: 8,
        spacing: 1.0,
        ..Default::default()
    }
}

fn chunk_bytes(params: TerrainParams) -> u64 {
    TerrainChunkGenerator::new(params)
        .generate(Vec3::ZERO)
        .byte_size()
}

fn square(x: i32, z: i32) -> Vec<ChunkPos> {
    let mut coords: Vec<_> = ChunkPos::new(x, z).neighbourhood(1).collect();
    coords.sort_unstable();
    coords
}

#[test]
fn test_viewer_scenario_with_default_terrain() {
    let backend = HeadlessBackend::new(HeadlessConfig::default()).unwrap();
    let mut streamer = ChunkStreamer::new(TerrainParams::default(), 1);

    let first = streamer
        .update(&backend, Vec3::new(250.0, 0.0, 250.0))
        .unwrap();
    assert_eq!(first.reference, ChunkPos::new(2, 2));
    assert_eq!(streamer.coords(), square(2, 2));
    for chunk in streamer.chunks() {
        assert_eq!(chunk.mesh().vertex_count(), 10201);
        assert_eq!(chunk.mesh().triangle_count(), 20000);
        assert_eq!(chunk.handle().index_count(), 60000);
    }

    let second = streamer
        .update(&backend, Vec3::new(-250.0, 0.0, 250.0))
        .unwrap();
    assert_eq!(second.reference, ChunkPos::new(-3, 2));
    assert_eq!(streamer.coords(), square(-3, 2));
    assert_eq!(second.evicted, square(2, 2));

    let stats = backend.stats();
    assert_eq!(stats.meshes_uploaded, 18);
    assert_eq!(stats.resident_bytes, 9 * chunk_bytes(TerrainParams::default()));
}

#[test]
fn test_eviction_frees_memory_before_new_uploads() {
    let params = small_params();
    let backend = HeadlessBackend::new(HeadlessConfig {
        memory_budget_bytes: Some(9 * chunk_bytes(params)),
        ..Default::default()
    })
    .unwrap();
    let mut streamer = ChunkStreamer::new(params, 1);

    streamer.update(&backend, Vec3::new(4.0, 0.0, 4.0)).unwrap();
    let step = streamer.update(&backend, Vec3::new(12.0, 0.0, 4.0)).unwrap();
    assert_eq!(step.evicted.len(), 3);
    assert_eq!(step.generated.len(), 3);
    assert!(step.failed.is_empty());

    let jump = streamer.update(&backend, Vec3::new(-400.0, 0.0, 900.0)).unwrap();
    assert_eq!(jump.evicted.len(), 9);
    assert_eq!(jump.generated.len(), 9);
    assert_eq!(streamer.len(), 9);
    assert_eq!(backend.resident_bytes(), 9 * chunk_bytes(params));
}

#[test]
fn test_budget_exhaustion_leaves_gaps_and_retries() {
    let params = small_params();
    let backend = HeadlessBackend::new(HeadlessConfig {
        memory_budget_bytes: Some(7 * chunk_bytes(params)),
        ..Default::default()
    })
    .unwrap();
    let mut streamer = ChunkStreamer::new(params, 1);

    let first = streamer.update(&backend, Vec3::ZERO).unwrap();
    assert_eq!(first.generated.len(), 7);
    assert_eq!(first.failed.len(), 2);
    for pos in &first.failed {
        assert!(!streamer.contains(*pos));
    }

    // Same position: the gaps are attempted again and still do not fit.
    let retry = streamer.update(&backend, Vec3::ZERO).unwrap();
    assert!(retry.generated.is_empty());
    assert_eq!(retry.failed, first.failed);
    assert_eq!(streamer.len(), 7);
}

#[test]
fn test_device_loss_is_fatal_for_streaming() {
    let backend = HeadlessBackend::new(HeadlessConfig::default()).unwrap();
    let mut streamer = ChunkStreamer::new(small_params(), 1);
    streamer.update(&backend, Vec3::ZERO).unwrap();

    backend.inject_device_loss("removed");
    let err = streamer
        .update(&backend, Vec3::new(100.0, 0.0, 0.0))
        .unwrap_err();
    assert!(matches!(err, EngineError::DeviceLost { .. }));
    assert!(err.is_fatal());
    assert!(!streamer.contains(ChunkPos::new(12, 0)));
}

#[test]
fn test_evicted_handles_stay_valid_while_referenced() {
    let backend = HeadlessBackend::new(HeadlessConfig::default()).unwrap();
    let mut streamer = ChunkStreamer::new(small_params(), 1);
    streamer.update(&backend, Vec3::ZERO).unwrap();

    let in_flight = streamer.render_items(0);
    streamer.update(&backend, Vec3::new(800.0, 0.0, 0.0)).unwrap();

    assert_eq!(backend.resident_bytes(), 18 * chunk_bytes(small_params()));
    for item in &in_flight {
        assert_eq!(item.mesh.ref_count(), 1);
    }
    drop(in_flight);
    assert_eq!(backend.resident_bytes(), 9 * chunk_bytes(small_params()));
}

#[test]
fn test_regenerated_chunk_is_identical() {
    let backend = HeadlessBackend::new(HeadlessConfig::default()).unwrap();
    let params = small_params();
    let mut streamer = ChunkStreamer::new(params, 1);

    streamer.update(&backend, Vec3::ZERO).unwrap();
    let before = streamer.get(ChunkPos::new(1, 1)).unwrap().mesh().clone();

    streamer.update(&backend, Vec3::new(1000.0, 0.0, 0.0)).unwrap();
    streamer.update(&backend, Vec3::ZERO).unwrap();
    let after = streamer.get(ChunkPos::new(1, 1)).unwrap().mesh();

    assert_eq!(before.vertices, after.vertices);
    assert_eq!(before.indices, after.indices);
}
