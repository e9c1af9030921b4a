use bytemuck::{Pod, Zeroable};

use crate::error::{EngineError, EngineResult};

/// Fixed-capacity array of GPU-visible constants
#[derive(Debug, Clone)]
pub struct UploadBuffer<T: Pod> {
    name: &'static str,
    elements: Vec<T>,
}

impl<T: Pod> UploadBuffer<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            elements: vec![T::zeroed(); capacity],
        }
    }

    /// Overwrite the element at `index`
    pub fn copy(&mut self, index: usize, value: T) -> EngineResult<()> {
        let capacity = self.elements.len();
        let slot = self
            .elements
            .get_mut(index)
            .ok_or(EngineError::BufferOverflow {
                buffer: self.name,
                index,
                capacity,
            })?;
        *slot = value;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.elements.get(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.elements)
    }

    pub fn capacity(&self) -> usize {
        self.elements.len()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// World transform of one renderable object
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: [[f32; 4]; 4],
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: glam::Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

/// Values shared by every draw of a frame
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    pub eye_position: [f32; 4],
    pub total_time: f32,
    pub delta_time: f32,
    pub frame_index: u32,
    pub object_count: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: [f32; 4],
    pub fresnel_r0: [f32; 3],
    pub roughness: f32,
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            diffuse_albedo: [0.36, 0.42, 0.24, 1.0],
            fresnel_r0: [0.02, 0.02, 0.02],
            roughness: 0.9,
        }
    }
}
