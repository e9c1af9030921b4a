//! Keeps the chunks around the viewer resident
//!
//! Every update recomputes the viewer's chunk coordinate, drops chunks that
//! left the square neighbourhood and builds the ones that entered it. Meshes
//! are generated in parallel; uploads run on the calling thread.

use glam::Vec3;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{EngineError, EngineResult};
use crate::renderer::{MeshData, MeshSink, RenderItem};
use crate::world::chunk::Chunk;
use crate::world::generation::{TerrainChunkGenerator, TerrainParams};
use crate::world::position::ChunkPos;

/// What one update changed. Coordinate lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamUpdate {
    pub reference: ChunkPos,
    pub generated: Vec<ChunkPos>,
    pub evicted: Vec<ChunkPos>,
    /// Coordinates whose upload failed without being fatal; retried next update
    pub failed: Vec<ChunkPos>,
}

impl StreamUpdate {
    pub fn is_unchanged(&self) -> bool {
        self.generated.is_empty() && self.evicted.is_empty() && self.failed.is_empty()
    }
}

pub struct ChunkStreamer<H> {
    generator: TerrainChunkGenerator,
    view_radius: u32,
    chunks: FxHashMap<ChunkPos, Chunk<H>>,
    reference: Option<ChunkPos>,
}

impl<H: Clone> ChunkStreamer<H> {
    pub fn new(params: TerrainParams, view_radius: u32) -> Self {
        Self::with_generator(TerrainChunkGenerator::new(params), view_radius)
    }

    pub fn with_generator(generator: TerrainChunkGenerator, view_radius: u32) -> Self {
        let side = 2 * view_radius as usize + 1;
        Self {
            generator,
            view_radius,
            chunks: FxHashMap::with_capacity_and_hasher(side * side, Default::default()),
            reference: None,
        }
    }

    pub fn generator(&self) -> &TerrainChunkGenerator {
        &self.generator
    }

    pub fn view_radius(&self) -> u32 {
        self.view_radius
    }

    /// Number of chunks kept resident around the reference coordinate
    pub fn neighbourhood_size(&self) -> usize {
        let side = 2 * self.view_radius as usize + 1;
        side * side
    }

    /// Bring the resident set in line with the viewer at `reference`.
    ///
    /// Non-fatal upload errors leave the coordinate absent and are reported in
    /// [`StreamUpdate::failed`]. A fatal error is returned immediately. A
    /// viewer position outside the chunk grid is rejected before anything
    /// resident changes.
    pub fn update<S>(&mut self, sink: &S, reference: Vec3) -> EngineResult<StreamUpdate>
    where
        S: MeshSink<Handle = H> + ?Sized,
    {
        let params = *self.generator.params();
        let radius = self.view_radius;
        let center = ChunkPos::from_world_pos(reference, params.chunk_pitch()).ok_or(
            EngineError::ViewerOutOfRange {
                x: reference.x,
                z: reference.z,
            },
        )?;

        if self.reference != Some(center) {
            log::debug!(
                "[ChunkStreamer] Reference chunk {} (viewer at {:.1}, {:.1})",
                center,
                reference.x,
                reference.z
            );
        }
        self.reference = Some(center);

        let mut update = StreamUpdate {
            reference: center,
            ..Default::default()
        };

        update.evicted = self
            .chunks
            .keys()
            .filter(|pos| pos.chebyshev_distance(center) > radius)
            .copied()
            .collect();
        update.evicted.sort_unstable();
        for pos in &update.evicted {
            self.chunks.remove(pos);
        }

        let mut missing: Vec<ChunkPos> = center
            .neighbourhood(radius)
            .filter(|pos| !self.chunks.contains_key(pos))
            .collect();
        missing.sort_unstable();

        let generator = &self.generator;
        let meshes: Vec<(ChunkPos, MeshData)> = missing
            .par_iter()
            .map(|&pos| (pos, generator.generate(pos.to_world_pos(params.chunk_pitch()))))
            .collect();

        for (pos, mesh) in meshes {
            match sink.upload_mesh(&mesh) {
                Ok(handle) => {
                    self.chunks.insert(pos, Chunk::new(pos, mesh, handle, params));
                    update.generated.push(pos);
                }
                Err(e) if !e.is_fatal() => {
                    log::warn!(
                        "[ChunkStreamer] Upload of chunk {} failed, retrying next update: {}",
                        pos,
                        e
                    );
                    update.failed.push(pos);
                }
                Err(e) => {
                    log::error!("[ChunkStreamer] Upload of chunk {} failed: {}", pos, e);
                    return Err(e);
                }
            }
        }

        if !update.generated.is_empty() || !update.evicted.is_empty() {
            log::debug!(
                "[ChunkStreamer] Generated {}, evicted {}, resident {}",
                update.generated.len(),
                update.evicted.len(),
                self.chunks.len()
            );
        }
        Ok(update)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    pub fn get(&self, pos: ChunkPos) -> Option<&Chunk<H>> {
        self.chunks.get(&pos)
    }

    /// Resident coordinates in sorted order
    pub fn coords(&self) -> Vec<ChunkPos> {
        let mut coords: Vec<_> = self.chunks.keys().copied().collect();
        coords.sort_unstable();
        coords
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk<H>> {
        self.chunks.values()
    }

    /// Drawables for the resident chunks, sorted by coordinate. Object
    /// constants are numbered consecutively from `first_object_index`.
    pub fn render_items(&self, first_object_index: u32) -> Vec<RenderItem<H>> {
        self.coords()
            .into_iter()
            .zip(first_object_index..)
            .filter_map(|(pos, object_index)| {
                self.chunks.get(&pos).map(|chunk| RenderItem {
                    mesh: chunk.handle().clone(),
                    object_index,
                    index_count: chunk.index_count(),
                })
            })
            .collect()
    }

    /// Chunk coordinate of the last update, if any
    pub fn reference(&self) -> Option<ChunkPos> {
        self.reference
    }

    /// Drop every chunk
    pub fn clear(&mut self) {
        if !self.chunks.is_empty() {
            log::debug!("[ChunkStreamer] Clearing {} chunks", self.chunks.len());
        }
        self.chunks.clear();
        self.reference = None;
    }
}
