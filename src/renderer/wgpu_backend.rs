//! Render backend on a real GPU through wgpu
//!
//! Frames are drawn into an offscreen colour target, so no window or surface
//! is needed. Every worker owns its own uniform buffers and records into its
//! own command encoder. The first worker's pass clears the target, the rest
//! load it, and lists are submitted in worker order. Fences are emulated with
//! `on_submitted_work_done` callbacks that run when the device is polled.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use crate::constants::gpu::*;
use crate::error::{EngineError, EngineResult};
use crate::renderer::backend::{CommandQueue, CommandRecorder, MeshSink, RenderBackend, RenderItem};
use crate::renderer::frame_resource::FrameResources;
use crate::renderer::upload_buffer::{MaterialConstants, ObjectConstants};
use crate::renderer::{MeshData, Vertex};
use crate::thread_pool::WorkItem;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const BYTES_PER_PIXEL: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuConfig {
    /// Size of the offscreen target in pixels
    pub width: u32,
    pub height: u32,
    /// Tried first; the other preference and a software adapter are tried after it
    pub power_preference: wgpu::PowerPreference,
}

impl Default for WgpuConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Camera and material shared by every draw of a frame
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub albedo: [f32; 4],
}

impl SceneUniform {
    /// Camera hovering at a fixed offset from `eye`, looking at it
    pub fn new(eye: Vec3, aspect: f32, material: &MaterialConstants) -> Self {
        let camera = eye + Vec3::from_array(CAMERA_OFFSET);
        let view = Mat4::look_at_rh(camera, eye, Vec3::Y);
        let proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);

        Self {
            view_proj: (proj * view).to_cols_array_2d(),
            eye: camera.extend(1.0).to_array(),
            albedo: material.diffuse_albedo,
        }
    }
}

/// Rows of a texture copy must start on a 256 byte boundary
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Fence progress and the sticky device-lost flag
#[derive(Default)]
struct DeviceStatus {
    completed: AtomicU64,
    lost: Mutex<Option<String>>,
}

impl DeviceStatus {
    fn check(&self) -> EngineResult<()> {
        match &*self.lost.lock() {
            Some(reason) => Err(EngineError::device_lost(reason)),
            None => Ok(()),
        }
    }

    fn mark_lost(&self, reason: String) {
        let mut lost = self.lost.lock();
        if lost.is_none() {
            log::error!("[WgpuBackend] Device lost: {}", reason);
            *lost = Some(reason);
        }
    }
}

/// Offscreen colour and depth attachments
struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Terrain Color Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Terrain Depth Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            width,
            height,
        }
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Pipeline state and target shared by every recorder
struct TerrainPipeline {
    pipeline: wgpu::RenderPipeline,
    scene_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    object_stride: u64,
    target: RenderTarget,
}

impl TerrainPipeline {
    fn new(device: &wgpu::Device, config: &WgpuConfig) -> Self {
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(
                        std::mem::size_of::<ObjectConstants>() as u64
                    ),
                },
                count: None,
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Terrain Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/terrain.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Terrain Pipeline Layout"),
            bind_group_layouts: &[&scene_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Terrain Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let object_stride = align_to(
            std::mem::size_of::<ObjectConstants>() as u64,
            u64::from(device.limits().min_uniform_buffer_offset_alignment),
        );

        Self {
            pipeline,
            scene_layout,
            object_layout,
            object_stride,
            target: RenderTarget::new(device, config.width, config.height),
        }
    }
}

/// Device vertex and index buffers of one chunk. Clones share the buffers.
#[derive(Clone)]
pub struct WgpuMesh {
    buffers: Arc<MeshBuffers>,
}

struct MeshBuffers {
    id: u64,
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    bytes: u64,
    resident: Arc<AtomicU64>,
}

impl Drop for MeshBuffers {
    fn drop(&mut self) {
        self.resident.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

impl WgpuMesh {
    pub fn id(&self) -> u64 {
        self.buffers.id
    }

    pub fn index_count(&self) -> u32 {
        self.buffers.index_count
    }

    pub fn byte_size(&self) -> u64 {
        self.buffers.bytes
    }
}

impl fmt::Debug for WgpuMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuMesh")
            .field("id", &self.buffers.id)
            .field("index_count", &self.buffers.index_count)
            .field("bytes", &self.buffers.bytes)
            .finish()
    }
}

/// One worker's encoded draws for one frame
pub struct WgpuCommandList {
    pub worker: usize,
    pub draws: usize,
    commands: wgpu::CommandBuffer,
}

struct ObjectBuffer {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

pub struct WgpuRecorder {
    worker: usize,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: Arc<TerrainPipeline>,
    status: Arc<DeviceStatus>,
    scene_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    objects: Option<Arc<ObjectBuffer>>,
}

impl WgpuRecorder {
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Per-object uniform buffer holding at least `capacity` entries
    fn object_buffer(&mut self, capacity: usize) -> Arc<ObjectBuffer> {
        if let Some(objects) = self.objects.as_ref().filter(|o| o.capacity >= capacity) {
            return Arc::clone(objects);
        }

        let stride = self.pipeline.object_stride;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Object Uniform Buffer"),
            size: stride * capacity.max(1) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object_bind_group"),
            layout: &self.pipeline.object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<ObjectConstants>() as u64),
                }),
            }],
        });
        log::debug!(
            "[WgpuRecorder] Worker {} object buffer sized for {} objects",
            self.worker,
            capacity
        );

        let objects = Arc::new(ObjectBuffer {
            buffer,
            bind_group,
            capacity,
        });
        self.objects = Some(Arc::clone(&objects));
        objects
    }
}

impl CommandRecorder for WgpuRecorder {
    type Handle = WgpuMesh;
    type CommandList = WgpuCommandList;

    fn record(
        &mut self,
        frame: &FrameResources,
        work: WorkItem,
        items: &[RenderItem<WgpuMesh>],
    ) -> EngineResult<WgpuCommandList> {
        self.status.check()?;

        let constants = frame.frame_constants();
        let eye = Vec3::new(
            constants.eye_position[0],
            constants.eye_position[1],
            constants.eye_position[2],
        );
        let material = frame.materials.get(0).copied().unwrap_or_default();
        let scene = SceneUniform::new(eye, self.pipeline.target.aspect(), &material);
        self.queue
            .write_buffer(&self.scene_buffer, 0, bytemuck::bytes_of(&scene));

        let stride = self.pipeline.object_stride;
        let objects = self.object_buffer(frame.objects.capacity());
        for item in items {
            let index = item.object_index as usize;
            let object = frame
                .objects
                .get(index)
                .ok_or_else(|| EngineError::BufferOverflow {
                    buffer: frame.objects.name(),
                    index,
                    capacity: frame.objects.capacity(),
                })?;
            self.queue.write_buffer(
                &objects.buffer,
                index as u64 * stride,
                bytemuck::bytes_of(object),
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Terrain Worker Encoder"),
            });

        // The first list of a frame starts from a cleared target
        let (color_load, depth_load) = if work.worker == 0 {
            let [r, g, b, a] = CLEAR_COLOR;
            (
                wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                wgpu::LoadOp::Clear(1.0),
            )
        } else {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        };

        {
            let target = &self.pipeline.target;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Terrain Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            pass.set_pipeline(&self.pipeline.pipeline);
            pass.set_bind_group(0, &self.scene_bind_group, &[]);
            for item in items {
                let offset = u64::from(item.object_index) * stride;
                pass.set_bind_group(1, &objects.bind_group, &[offset as u32]);
                pass.set_vertex_buffer(0, item.mesh.buffers.vertex.slice(..));
                pass.set_index_buffer(
                    item.mesh.buffers.index.slice(..),
                    wgpu::IndexFormat::Uint32,
                );
                pass.draw_indexed(0..item.index_count, 0, 0..1);
            }
        }

        Ok(WgpuCommandList {
            worker: work.worker,
            draws: items.len(),
            commands: encoder.finish(),
        })
    }
}

/// Snapshot of backend counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WgpuStats {
    pub meshes_uploaded: u64,
    pub resident_bytes: u64,
    pub submissions: u64,
    pub command_lists_submitted: u64,
    pub draws_submitted: u64,
    pub completed_fence: u64,
}

pub struct WgpuBackend {
    config: WgpuConfig,
    adapter_info: wgpu::AdapterInfo,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: Arc<TerrainPipeline>,
    status: Arc<DeviceStatus>,
    resident_bytes: Arc<AtomicU64>,
    next_mesh_id: AtomicU64,
    meshes_uploaded: AtomicU64,
    submissions: AtomicU64,
    lists_submitted: AtomicU64,
    draws_submitted: AtomicU64,
    last_signalled: Mutex<u64>,
}

impl WgpuBackend {
    /// Open a device and build the terrain pipeline.
    ///
    /// Fails with `DeviceUnavailable` when no adapter or device can be obtained.
    pub fn new(config: WgpuConfig) -> EngineResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(EngineError::invalid_config(format!(
                "offscreen target must be at least 1x1, got {}x{}",
                config.width, config.height
            )));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = request_adapter(&instance, config.power_preference)?;
        let adapter_info = adapter.get_info();
        log::info!(
            "[WgpuBackend] Adapter: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Terrain Stream Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| EngineError::DeviceUnavailable {
            reason: format!("device request failed: {}", e),
        })?;

        let status = Arc::new(DeviceStatus::default());
        let error_status = Arc::clone(&status);
        device.on_uncaptured_error(Box::new(move |error| {
            error_status.mark_lost(format!("uncaptured device error: {}", error));
        }));

        let pipeline = TerrainPipeline::new(&device, &config);
        log::info!(
            "[WgpuBackend] Offscreen target {}x{}, object stride {} bytes",
            config.width,
            config.height,
            pipeline.object_stride
        );

        Ok(Self {
            config,
            adapter_info,
            device: Arc::new(device),
            queue: Arc::new(queue),
            pipeline: Arc::new(pipeline),
            status,
            resident_bytes: Arc::new(AtomicU64::new(0)),
            next_mesh_id: AtomicU64::new(0),
            meshes_uploaded: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            lists_submitted: AtomicU64::new(0),
            draws_submitted: AtomicU64::new(0),
            last_signalled: Mutex::new(0),
        })
    }

    pub fn config(&self) -> &WgpuConfig {
        &self.config
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn is_lost(&self) -> bool {
        self.status.lost.lock().is_some()
    }

    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> WgpuStats {
        WgpuStats {
            meshes_uploaded: self.meshes_uploaded.load(Ordering::SeqCst),
            resident_bytes: self.resident_bytes(),
            submissions: self.submissions.load(Ordering::SeqCst),
            command_lists_submitted: self.lists_submitted.load(Ordering::SeqCst),
            draws_submitted: self.draws_submitted.load(Ordering::SeqCst),
            completed_fence: self.status.completed.load(Ordering::SeqCst),
        }
    }

    /// Copy the colour target back to the CPU as tightly packed RGBA8 rows.
    ///
    /// Waits for everything submitted so far.
    pub fn read_color(&self) -> EngineResult<Vec<u8>> {
        self.status.check()?;

        let target = &self.pipeline.target;
        let unpadded = (target.width * BYTES_PER_PIXEL) as usize;
        let padded = padded_bytes_per_row(target.width);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Color Readback Buffer"),
            size: u64::from(padded) * u64::from(target.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Color Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(target.height),
                },
            },
            target.extent(),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| EngineError::device_lost("readback callback was dropped"))?
            .map_err(|e| EngineError::device_lost(format!("readback mapping failed: {}", e)))?;

        let pixels = {
            let data = slice.get_mapped_range();
            data.chunks_exact(padded as usize)
                .flat_map(|row| row[..unpadded].iter().copied())
                .collect()
        };
        staging.unmap();
        self.status.check()?;
        Ok(pixels)
    }

    fn poll(&self) -> EngineResult<u64> {
        self.device.poll(wgpu::Maintain::Poll);
        self.status.check()?;
        Ok(self.status.completed.load(Ordering::SeqCst))
    }
}

fn request_adapter(
    instance: &wgpu::Instance,
    preferred: wgpu::PowerPreference,
) -> EngineResult<wgpu::Adapter> {
    let fallback = match preferred {
        wgpu::PowerPreference::LowPower => wgpu::PowerPreference::HighPerformance,
        _ => wgpu::PowerPreference::LowPower,
    };
    let attempts = [(preferred, false), (fallback, false), (preferred, true)];

    for (power_preference, force_fallback_adapter) in attempts {
        let options = wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter,
        };
        if let Some(adapter) = pollster::block_on(instance.request_adapter(&options)) {
            return Ok(adapter);
        }
        log::warn!(
            "[WgpuBackend] No adapter for {:?} (software fallback: {})",
            power_preference,
            force_fallback_adapter
        );
    }

    Err(EngineError::DeviceUnavailable {
        reason: "no compatible GPU adapter found".to_string(),
    })
}

impl MeshSink for WgpuBackend {
    type Handle = WgpuMesh;

    fn upload_mesh(&self, mesh: &MeshData) -> EngineResult<WgpuMesh> {
        self.status.check()?;
        if mesh.is_empty() || mesh.indices.is_empty() {
            return Err(EngineError::invalid_config("cannot upload an empty mesh"));
        }

        let bytes = mesh.byte_size();
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let vertex = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Terrain Vertex Buffer"),
                contents: mesh.vertex_bytes(),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Terrain Index Buffer"),
                contents: mesh.index_bytes(),
                usage: wgpu::BufferUsages::INDEX,
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::warn!("[WgpuBackend] Mesh allocation failed: {}", error);
            return Err(EngineError::AllocationFailed {
                requested_bytes: bytes,
                resident_bytes: self.resident_bytes(),
                budget_bytes: u64::MAX,
            });
        }

        let id = self.next_mesh_id.fetch_add(1, Ordering::SeqCst);
        self.meshes_uploaded.fetch_add(1, Ordering::SeqCst);
        self.resident_bytes.fetch_add(bytes, Ordering::SeqCst);
        log::trace!("[WgpuBackend] Uploaded mesh {} ({} bytes)", id, bytes);

        Ok(WgpuMesh {
            buffers: Arc::new(MeshBuffers {
                id,
                vertex,
                index,
                index_count: mesh.indices.len() as u32,
                bytes,
                resident: Arc::clone(&self.resident_bytes),
            }),
        })
    }
}

impl CommandQueue for WgpuBackend {
    type CommandList = WgpuCommandList;

    fn submit(&self, lists: Vec<WgpuCommandList>) -> EngineResult<()> {
        self.status.check()?;
        let draws: usize = lists.iter().map(|list| list.draws).sum();
        self.lists_submitted
            .fetch_add(lists.len() as u64, Ordering::SeqCst);
        self.draws_submitted.fetch_add(draws as u64, Ordering::SeqCst);
        self.submissions.fetch_add(1, Ordering::SeqCst);

        self.queue
            .submit(lists.into_iter().map(|list| list.commands));
        self.status.check()
    }

    fn signal(&self, value: u64) -> EngineResult<()> {
        self.status.check()?;
        let mut last = self.last_signalled.lock();
        if value <= *last {
            return Err(EngineError::FenceNotMonotonic {
                previous: *last,
                value,
            });
        }
        *last = value;

        let status = Arc::clone(&self.status);
        self.queue.on_submitted_work_done(move || {
            status.completed.fetch_max(value, Ordering::SeqCst);
        });
        Ok(())
    }

    fn completed_fence(&self) -> EngineResult<u64> {
        self.poll()
    }

    fn wait_for_fence(&self, value: u64, timeout: Duration) -> EngineResult<u64> {
        let deadline = Instant::now() + timeout;
        loop {
            let completed = self.poll()?;
            if completed >= value || Instant::now() >= deadline {
                return Ok(completed);
            }
            thread::sleep(Duration::from_micros(FENCE_SPIN_MICROS));
        }
    }
}

impl RenderBackend for WgpuBackend {
    type Recorder = WgpuRecorder;

    fn create_recorder(&self, worker: usize) -> EngineResult<WgpuRecorder> {
        self.status.check()?;

        let scene_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniform Buffer"),
            size: std::mem::size_of::<SceneUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let scene_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_bind_group"),
            layout: &self.pipeline.scene_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene_buffer.as_entire_binding(),
            }],
        });

        Ok(WgpuRecorder {
            worker,
            device: Arc::clone(&self.device),
            queue: Arc::clone(&self.queue),
            pipeline: Arc::clone(&self.pipeline),
            status: Arc::clone(&self.status),
            scene_buffer,
            scene_bind_group,
            objects: None,
        })
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        self.device.poll(wgpu::Maintain::Wait);
        log::debug!("[WgpuBackend] Stopped");
    }
}
