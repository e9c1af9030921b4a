//! Streamed procedural terrain
//!
//! - **generation**: noise field and chunk mesh generator
//! - **position**: chunk grid coordinates
//! - **chunk_streamer**: keeps the neighbourhood around the viewer resident

pub mod chunk;
pub mod chunk_streamer;
pub mod generation;
pub mod position;

pub use chunk::Chunk;
pub use chunk_streamer::{ChunkStreamer, StreamUpdate};
pub use generation::{NoiseField, NoiseKind, TerrainChunkGenerator, TerrainParams};
pub use position::ChunkPos;
