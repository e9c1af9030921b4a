//! Terrain streaming run
//!
//! Usage: `terrain-stream [config.toml]`. Without a path the built-in
//! defaults are used. `[renderer] backend` picks the simulated GPU or an
//! offscreen wgpu device. Set `RUST_LOG` to change verbosity.

use std::sync::Arc;

use anyhow::{Context, Result};
use terrain_stream::app::RunSummary;
use terrain_stream::{
    BackendKind, EngineConfig, HeadlessBackend, RenderBackend, ScriptedPath, TerrainApp,
    WgpuBackend,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => {
            log::info!("No config file given, using defaults");
            EngineConfig::default()
        }
    };

    match config.renderer.backend {
        BackendKind::Headless => {
            let backend = Arc::new(
                HeadlessBackend::new(config.headless.backend_config())
                    .context("Failed to start headless backend")?,
            );
            let summary = run_app(Arc::clone(&backend), &config)?;

            let stats = backend.stats();
            log::info!(
                "Done: {} frames, {} draws executed, {} meshes uploaded, peak {} frames in flight",
                summary.frames,
                stats.draws_executed,
                stats.meshes_uploaded,
                summary.max_in_flight
            );
        }
        BackendKind::Wgpu => {
            let backend = Arc::new(
                WgpuBackend::new(config.gpu.backend_config())
                    .context("Failed to open GPU device")?,
            );
            let summary = run_app(Arc::clone(&backend), &config)?;

            let stats = backend.stats();
            let pixels = backend.read_color().context("Failed to read back the last frame")?;
            log::info!(
                "Done on {}: {} frames, {} draws submitted, {} meshes uploaded, {} bytes read back",
                backend.adapter_info().name,
                summary.frames,
                stats.draws_submitted,
                stats.meshes_uploaded,
                pixels.len()
            );
        }
    }
    Ok(())
}

fn run_app<B: RenderBackend>(backend: Arc<B>, config: &EngineConfig) -> Result<RunSummary> {
    let viewer = ScriptedPath::from_config(&config.run);
    let mut app =
        TerrainApp::new(backend, config, viewer).context("Failed to create terrain app")?;

    let run = app.run(config.run.frames);
    let shutdown = app.shutdown();

    let summary = run.context("Frame loop failed")?;
    shutdown.context("Shutdown failed")?;
    Ok(summary)
}
