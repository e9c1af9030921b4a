use glam::Vec3;

use crate::renderer::MeshData;
use crate::world::generation::TerrainParams;
use crate::world::position::ChunkPos;

/// One live terrain chunk: its CPU mesh and the device handle drawing it
#[derive(Debug)]
pub struct Chunk<H> {
    pos: ChunkPos,
    origin: Vec3,
    mesh: MeshData,
    handle: H,
    params: TerrainParams,
}

impl<H> Chunk<H> {
    pub fn new(pos: ChunkPos, mesh: MeshData, handle: H, params: TerrainParams) -> Self {
        Self {
            pos,
            origin: pos.to_world_pos(params.chunk_pitch()),
            mesh,
            handle,
            params,
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn mesh(&self) -> &MeshData {
        &self.mesh
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn index_count(&self) -> u32 {
        self.mesh.indices.len() as u32
    }
}
