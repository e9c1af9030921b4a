//! In-process render backend
//!
//! Stands in for a real device: meshes are copied into reference-counted
//! byte buffers, submissions travel over a channel to a simulated GPU thread
//! that "executes" them in order and then publishes the completed fence.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::{EngineError, EngineResult};
use crate::renderer::backend::{CommandQueue, CommandRecorder, MeshSink, RenderBackend, RenderItem};
use crate::renderer::frame_resource::FrameResources;
use crate::renderer::MeshData;
use crate::thread_pool::WorkItem;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessConfig {
    /// Simulated execution time of each command list
    pub gpu_latency: Duration,
    /// Upper bound on resident mesh memory, unlimited when `None`
    pub memory_budget_bytes: Option<u64>,
}

/// Device-side mesh buffers. Clones share the allocation.
#[derive(Clone)]
pub struct HeadlessMesh {
    buffer: Arc<MeshBuffer>,
}

struct MeshBuffer {
    id: u64,
    vertex_bytes: Vec<u8>,
    index_bytes: Vec<u8>,
    index_count: u32,
    resident: Arc<AtomicU64>,
}

impl Drop for MeshBuffer {
    fn drop(&mut self) {
        let bytes = (self.vertex_bytes.len() + self.index_bytes.len()) as u64;
        self.resident.fetch_sub(bytes, Ordering::SeqCst);
    }
}

impl HeadlessMesh {
    pub fn id(&self) -> u64 {
        self.buffer.id
    }

    pub fn index_count(&self) -> u32 {
        self.buffer.index_count
    }

    pub fn byte_size(&self) -> u64 {
        (self.buffer.vertex_bytes.len() + self.buffer.index_bytes.len()) as u64
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        &self.buffer.vertex_bytes
    }

    pub fn index_bytes(&self) -> &[u8] {
        &self.buffer.index_bytes
    }

    /// Number of live handles to this allocation
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.buffer)
    }
}

impl fmt::Debug for HeadlessMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessMesh")
            .field("id", &self.buffer.id)
            .field("index_count", &self.buffer.index_count)
            .field("bytes", &self.byte_size())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DrawCall {
    pub mesh: HeadlessMesh,
    pub object_index: u32,
    pub index_count: u32,
}

/// Draws recorded by one worker for one frame
#[derive(Debug)]
pub struct HeadlessCommandList {
    pub worker: usize,
    pub frame_index: u32,
    pub range: Range<usize>,
    pub draws: Vec<DrawCall>,
}

pub struct HeadlessRecorder {
    worker: usize,
    lists_recorded: u64,
}

impl HeadlessRecorder {
    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn lists_recorded(&self) -> u64 {
        self.lists_recorded
    }
}

impl CommandRecorder for HeadlessRecorder {
    type Handle = HeadlessMesh;
    type CommandList = HeadlessCommandList;

    fn record(
        &mut self,
        frame: &FrameResources,
        work: WorkItem,
        items: &[RenderItem<HeadlessMesh>],
    ) -> EngineResult<HeadlessCommandList> {
        let mut draws = Vec::with_capacity(items.len());
        for item in items {
            let index = item.object_index as usize;
            if frame.objects.get(index).is_none() {
                return Err(EngineError::BufferOverflow {
                    buffer: frame.objects.name(),
                    index,
                    capacity: frame.objects.capacity(),
                });
            }
            draws.push(DrawCall {
                mesh: item.mesh.clone(),
                object_index: item.object_index,
                index_count: item.index_count,
            });
        }

        self.lists_recorded += 1;
        Ok(HeadlessCommandList {
            worker: self.worker,
            frame_index: frame.frame_constants().frame_index,
            range: work.range(),
            draws,
        })
    }
}

/// Snapshot of backend counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub meshes_uploaded: u64,
    pub resident_bytes: u64,
    pub submissions: u64,
    pub command_lists_executed: u64,
    pub draws_executed: u64,
    pub triangles_executed: u64,
    pub completed_fence: u64,
}

enum GpuCommand {
    Execute(Vec<HeadlessCommandList>),
    Signal(u64),
    Shutdown,
}

#[derive(Default)]
struct GpuStatus {
    completed: u64,
    lost: Option<String>,
}

#[derive(Default)]
struct GpuShared {
    status: Mutex<GpuStatus>,
    fence_reached: Condvar,
    resident_bytes: Arc<AtomicU64>,
    lists_executed: AtomicU64,
    draws_executed: AtomicU64,
    triangles_executed: AtomicU64,
}

impl GpuShared {
    fn check_device(&self) -> EngineResult<()> {
        match &self.status.lock().lost {
            Some(reason) => Err(EngineError::device_lost(reason)),
            None => Ok(()),
        }
    }
}

pub struct HeadlessBackend {
    config: HeadlessConfig,
    shared: Arc<GpuShared>,
    commands: Sender<GpuCommand>,
    gpu_thread: Option<JoinHandle<()>>,
    next_mesh_id: AtomicU64,
    meshes_uploaded: AtomicU64,
    submissions: AtomicU64,
    last_signalled: Mutex<u64>,
}

impl HeadlessBackend {
    pub fn new(config: HeadlessConfig) -> EngineResult<Self> {
        let shared = Arc::new(GpuShared::default());
        let (commands, receiver) = unbounded();

        let thread_shared = Arc::clone(&shared);
        let latency = config.gpu_latency;
        let gpu_thread = thread::Builder::new()
            .name("headless-gpu".to_string())
            .spawn(move || gpu_loop(receiver, thread_shared, latency))
            .map_err(|e| EngineError::device_lost(format!("failed to start GPU thread: {}", e)))?;

        log::info!(
            "[HeadlessBackend] Started (latency {:?}, budget {})",
            config.gpu_latency,
            config
                .memory_budget_bytes
                .map_or_else(|| "unlimited".to_string(), |b| format!("{} bytes", b))
        );

        Ok(Self {
            config,
            shared,
            commands,
            gpu_thread: Some(gpu_thread),
            next_mesh_id: AtomicU64::new(0),
            meshes_uploaded: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            last_signalled: Mutex::new(0),
        })
    }

    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    /// Put the device into the lost state. Every later call fails.
    pub fn inject_device_loss(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!("[HeadlessBackend] Device lost: {}", reason);
        self.shared.status.lock().lost = Some(reason);
        self.shared.fence_reached.notify_all();
    }

    pub fn is_lost(&self) -> bool {
        self.shared.status.lock().lost.is_some()
    }

    pub fn resident_bytes(&self) -> u64 {
        self.shared.resident_bytes.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> HeadlessStats {
        HeadlessStats {
            meshes_uploaded: self.meshes_uploaded.load(Ordering::SeqCst),
            resident_bytes: self.resident_bytes(),
            submissions: self.submissions.load(Ordering::SeqCst),
            command_lists_executed: self.shared.lists_executed.load(Ordering::SeqCst),
            draws_executed: self.shared.draws_executed.load(Ordering::SeqCst),
            triangles_executed: self.shared.triangles_executed.load(Ordering::SeqCst),
            completed_fence: self.shared.status.lock().completed,
        }
    }

    fn send(&self, command: GpuCommand) -> EngineResult<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::device_lost("GPU thread is gone"))
    }

    fn reserve(&self, bytes: u64) -> EngineResult<()> {
        let budget = self.config.memory_budget_bytes;
        self.shared
            .resident_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |resident| match budget {
                Some(budget) if resident + bytes > budget => None,
                _ => Some(resident + bytes),
            })
            .map(|_| ())
            .map_err(|resident| EngineError::AllocationFailed {
                requested_bytes: bytes,
                resident_bytes: resident,
                budget_bytes: budget.unwrap_or(u64::MAX),
            })
    }
}

impl MeshSink for HeadlessBackend {
    type Handle = HeadlessMesh;

    fn upload_mesh(&self, mesh: &MeshData) -> EngineResult<HeadlessMesh> {
        self.shared.check_device()?;
        self.reserve(mesh.byte_size())?;

        let id = self.next_mesh_id.fetch_add(1, Ordering::SeqCst);
        self.meshes_uploaded.fetch_add(1, Ordering::SeqCst);
        log::trace!(
            "[HeadlessBackend] Uploaded mesh {} ({} bytes)",
            id,
            mesh.byte_size()
        );

        Ok(HeadlessMesh {
            buffer: Arc::new(MeshBuffer {
                id,
                vertex_bytes: mesh.vertex_bytes().to_vec(),
                index_bytes: mesh.index_bytes().to_vec(),
                index_count: mesh.indices.len() as u32,
                resident: Arc::clone(&self.shared.resident_bytes),
            }),
        })
    }
}

impl CommandQueue for HeadlessBackend {
    type CommandList = HeadlessCommandList;

    fn submit(&self, lists: Vec<HeadlessCommandList>) -> EngineResult<()> {
        self.shared.check_device()?;
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.send(GpuCommand::Execute(lists))
    }

    fn signal(&self, value: u64) -> EngineResult<()> {
        self.shared.check_device()?;
        let mut last = self.last_signalled.lock();
        if value <= *last {
            return Err(EngineError::FenceNotMonotonic {
                previous: *last,
                value,
            });
        }
        *last = value;
        self.send(GpuCommand::Signal(value))
    }

    fn completed_fence(&self) -> EngineResult<u64> {
        let status = self.shared.status.lock();
        match &status.lost {
            Some(reason) => Err(EngineError::device_lost(reason)),
            None => Ok(status.completed),
        }
    }

    fn wait_for_fence(&self, value: u64, timeout: Duration) -> EngineResult<u64> {
        let deadline = Instant::now() + timeout;
        let mut status = self.shared.status.lock();
        loop {
            if let Some(reason) = &status.lost {
                return Err(EngineError::device_lost(reason));
            }
            if status.completed >= value {
                return Ok(status.completed);
            }
            if self
                .shared
                .fence_reached
                .wait_until(&mut status, deadline)
                .timed_out()
            {
                return match &status.lost {
                    Some(reason) => Err(EngineError::device_lost(reason)),
                    None => Ok(status.completed),
                };
            }
        }
    }
}

impl RenderBackend for HeadlessBackend {
    type Recorder = HeadlessRecorder;

    fn create_recorder(&self, worker: usize) -> EngineResult<HeadlessRecorder> {
        self.shared.check_device()?;
        Ok(HeadlessRecorder {
            worker,
            lists_recorded: 0,
        })
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        let _ = self.commands.send(GpuCommand::Shutdown);
        if let Some(handle) = self.gpu_thread.take() {
            if handle.join().is_err() {
                log::error!("[HeadlessBackend] GPU thread panicked");
            }
        }
        log::debug!("[HeadlessBackend] Stopped");
    }
}

fn gpu_loop(commands: Receiver<GpuCommand>, shared: Arc<GpuShared>, latency: Duration) {
    for command in commands.iter() {
        match command {
            GpuCommand::Execute(lists) => {
                if shared.status.lock().lost.is_some() {
                    continue;
                }
                for list in lists {
                    if !latency.is_zero() {
                        thread::sleep(latency);
                    }
                    let triangles: u64 = list
                        .draws
                        .iter()
                        .map(|draw| u64::from(draw.index_count / 3))
                        .sum();
                    shared.lists_executed.fetch_add(1, Ordering::SeqCst);
                    shared
                        .draws_executed
                        .fetch_add(list.draws.len() as u64, Ordering::SeqCst);
                    shared
                        .triangles_executed
                        .fetch_add(triangles, Ordering::SeqCst);
                }
            }
            GpuCommand::Signal(value) => {
                {
                    let mut status = shared.status.lock();
                    if status.lost.is_some() {
                        continue;
                    }
                    status.completed = status.completed.max(value);
                }
                shared.fence_reached.notify_all();
            }
            GpuCommand::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{FrameResourceLayout, Vertex};

    fn triangle_mesh() -> MeshData {
        let mut mesh = MeshData::new();
        mesh.vertices.push(Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]));
        mesh.vertices.push(Vertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0]));
        mesh.vertices.push(Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]));
        mesh.add_triangle(0, 1, 2);
        mesh
    }

    fn backend() -> HeadlessBackend {
        HeadlessBackend::new(HeadlessConfig::default()).expect("backend should start")
    }

    #[test]
    fn test_upload_tracks_resident_bytes() {
        let backend = backend();
        let mesh = triangle_mesh();

        let handle = backend.upload_mesh(&mesh).unwrap();
        assert_eq!(handle.byte_size(), mesh.byte_size());
        assert_eq!(handle.vertex_bytes(), mesh.vertex_bytes());
        assert_eq!(handle.index_count(), 3);
        assert_eq!(backend.resident_bytes(), mesh.byte_size());

        let clone = handle.clone();
        drop(handle);
        assert_eq!(backend.resident_bytes(), mesh.byte_size());
        drop(clone);
        assert_eq!(backend.resident_bytes(), 0);
    }

    #[test]
    fn test_memory_budget_rejects_upload() {
        let mesh = triangle_mesh();
        let backend = HeadlessBackend::new(HeadlessConfig {
            gpu_latency: Duration::ZERO,
            memory_budget_bytes: Some(mesh.byte_size() + 1),
        })
        .unwrap();

        let first = backend.upload_mesh(&mesh).unwrap();
        let err = backend.upload_mesh(&mesh).unwrap_err();
        assert!(matches!(err, EngineError::AllocationFailed { .. }));
        assert!(!err.is_fatal());

        drop(first);
        assert!(backend.upload_mesh(&mesh).is_ok());
    }

    #[test]
    fn test_signal_completes_after_submitted_work() {
        let backend = HeadlessBackend::new(HeadlessConfig {
            gpu_latency: Duration::from_millis(5),
            memory_budget_bytes: None,
        })
        .unwrap();
        let mesh = backend.upload_mesh(&triangle_mesh()).unwrap();
        let list = HeadlessCommandList {
            worker: 0,
            frame_index: 0,
            range: 0..1,
            draws: vec![DrawCall {
                mesh,
                object_index: 0,
                index_count: 3,
            }],
        };

        backend.submit(vec![list]).unwrap();
        backend.signal(1).unwrap();
        let completed = backend.wait_for_fence(1, Duration::from_secs(5)).unwrap();
        assert_eq!(completed, 1);

        let stats = backend.stats();
        assert_eq!(stats.command_lists_executed, 1);
        assert_eq!(stats.draws_executed, 1);
        assert_eq!(stats.triangles_executed, 1);
        assert_eq!(stats.completed_fence, 1);
    }

    #[test]
    fn test_wait_times_out_without_signal() {
        let backend = backend();
        let completed = backend
            .wait_for_fence(3, Duration::from_millis(10))
            .unwrap();
        assert_eq!(completed, 0);
    }

    #[test]
    fn test_signal_must_increase() {
        let backend = backend();
        backend.signal(2).unwrap();
        assert!(matches!(
            backend.signal(2),
            Err(EngineError::FenceNotMonotonic { previous: 2, value: 2 })
        ));
    }

    #[test]
    fn test_device_loss_fails_every_call() {
        let backend = backend();
        backend.inject_device_loss("test");

        assert!(backend.is_lost());
        assert!(matches!(
            backend.upload_mesh(&triangle_mesh()),
            Err(EngineError::DeviceLost { .. })
        ));
        assert!(backend.submit(Vec::new()).is_err());
        assert!(backend.signal(1).is_err());
        assert!(backend.completed_fence().is_err());
        assert!(backend
            .wait_for_fence(1, Duration::from_millis(1))
            .unwrap_err()
            .is_fatal());
    }

    #[test]
    fn test_recorder_checks_object_capacity() {
        let backend = backend();
        let mesh = backend.upload_mesh(&triangle_mesh()).unwrap();
        let frame = FrameResources::new(FrameResourceLayout {
            objects: 1,
            materials: 1,
        });
        let mut recorder = backend.create_recorder(2).unwrap();
        let work = WorkItem {
            worker: 2,
            start: 0,
            end: 1,
        };

        let ok = [RenderItem {
            mesh: mesh.clone(),
            object_index: 0,
            index_count: 3,
        }];
        let list = recorder.record(&frame, work, &ok).unwrap();
        assert_eq!(list.worker, 2);
        assert_eq!(list.draws.len(), 1);

        let overflow = [RenderItem {
            mesh,
            object_index: 4,
            index_count: 3,
        }];
        assert!(matches!(
            recorder.record(&frame, work, &overflow),
            Err(EngineError::BufferOverflow { index: 4, .. })
        ));
        assert_eq!(recorder.lists_recorded(), 1);
    }
}
