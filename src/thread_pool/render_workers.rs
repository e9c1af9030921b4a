//! Fixed pool of render workers
//!
//! Each worker owns one recording context for the lifetime of the pool. Per
//! frame the coordinator hands every worker exactly one contiguous slice of
//! the renderable items, wakes it, and blocks until all of them report back.
//! Workers only read the frame slot; all writes to it happen on the
//! coordinator before the first worker is woken.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::work_item::{partition, WorkItem};
use crate::error::{EngineError, EngineResult};
use crate::renderer::{CommandRecorder, FrameResources, RenderItem};

/// Lifecycle of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Waiting for the next frame
    Idle,
    /// Signalled, recording its range
    Recording,
    /// Finished, output not yet collected
    Done,
    /// Thread has exited
    Stopped,
}

struct FrameJob<H> {
    work: WorkItem,
    items: Arc<[RenderItem<H>]>,
    resources: Arc<FrameResources>,
}

struct WorkerState<H, L> {
    phase: WorkerPhase,
    stop: bool,
    job: Option<FrameJob<H>>,
    output: Option<EngineResult<L>>,
}

struct WorkerShared<H, L> {
    state: Mutex<WorkerState<H, L>>,
    work_ready: Condvar,
    work_done: Condvar,
}

struct Worker<H, L> {
    shared: Arc<WorkerShared<H, L>>,
    handle: Option<JoinHandle<()>>,
}

/// Long-lived worker threads recording command lists in parallel partitions
pub struct WorkerPool<R: CommandRecorder> {
    workers: Vec<Worker<R::Handle, R::CommandList>>,
    frames_dispatched: u64,
}

impl<R: CommandRecorder> WorkerPool<R> {
    /// Spawn one thread per recorder. The recorder moves into its thread and
    /// is never touched by any other thread.
    pub fn new(recorders: Vec<R>) -> EngineResult<Self> {
        if recorders.is_empty() {
            return Err(EngineError::invalid_config(
                "worker pool needs at least one recorder",
            ));
        }

        let mut pool = Self {
            workers: Vec::with_capacity(recorders.len()),
            frames_dispatched: 0,
        };

        for (index, recorder) in recorders.into_iter().enumerate() {
            let shared = Arc::new(WorkerShared {
                state: Mutex::new(WorkerState {
                    phase: WorkerPhase::Idle,
                    stop: false,
                    job: None,
                    output: None,
                }),
                work_ready: Condvar::new(),
                work_done: Condvar::new(),
            });

            let thread_shared = Arc::clone(&shared);
            // On error the partially built pool drops here and joins what was spawned.
            let handle = thread::Builder::new()
                .name(format!("render-worker-{}", index))
                .spawn(move || worker_loop(index, recorder, thread_shared))
                .map_err(|e| EngineError::WorkerSpawn {
                    worker: index,
                    error: e.to_string(),
                })?;

            pool.workers.push(Worker {
                shared,
                handle: Some(handle),
            });
        }

        log::info!("[WorkerPool] Started {} render workers", pool.workers.len());
        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn frames_dispatched(&self) -> u64 {
        self.frames_dispatched
    }

    pub fn phases(&self) -> Vec<WorkerPhase> {
        self.workers
            .iter()
            .map(|worker| worker.shared.state.lock().phase)
            .collect()
    }

    /// Record one frame.
    ///
    /// Every worker is signalled exactly once with its partition of `items`.
    /// Returns the command lists in worker order once all workers are idle
    /// again. If any worker failed, the first failure is returned instead.
    /// A pool that has been shut down refuses new frames.
    pub fn dispatch(
        &mut self,
        items: Arc<[RenderItem<R::Handle>]>,
        resources: Arc<FrameResources>,
    ) -> EngineResult<Vec<R::CommandList>> {
        if self.is_shut_down() {
            return Err(EngineError::ShutdownRequested);
        }

        let work_items = partition(items.len(), self.workers.len());
        log::trace!(
            "[WorkerPool] Frame {}: {} items across {} workers",
            self.frames_dispatched,
            items.len(),
            self.workers.len()
        );

        for (worker, work) in self.workers.iter().zip(work_items) {
            {
                let mut state = worker.shared.state.lock();
                debug_assert_eq!(state.phase, WorkerPhase::Idle);
                state.job = Some(FrameJob {
                    work,
                    items: Arc::clone(&items),
                    resources: Arc::clone(&resources),
                });
                state.phase = WorkerPhase::Recording;
            }
            worker.shared.work_ready.notify_one();
        }
        drop(items);
        drop(resources);

        let mut lists = Vec::with_capacity(self.workers.len());
        let mut first_error = None;

        for (index, worker) in self.workers.iter().enumerate() {
            let output = {
                let mut state = worker.shared.state.lock();
                while state.output.is_none() && state.phase != WorkerPhase::Stopped {
                    worker.shared.work_done.wait(&mut state);
                }
                match state.output.take() {
                    Some(output) => {
                        state.phase = WorkerPhase::Idle;
                        output
                    }
                    None => Err(EngineError::WorkerPanicked {
                        worker: index,
                        message: "worker exited before finishing its range".to_string(),
                    }),
                }
            };

            match output {
                Ok(list) => lists.push(list),
                Err(e) => {
                    log::error!("[WorkerPool] Worker {} failed: {}", index, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.frames_dispatched += 1;
        match first_error {
            Some(e) => Err(e),
            None => Ok(lists),
        }
    }

    /// Stop every worker and join its thread
    pub fn shutdown(&mut self) -> EngineResult<()> {
        for worker in &self.workers {
            worker.shared.state.lock().stop = true;
            worker.shared.work_ready.notify_one();
        }

        let mut result = Ok(());
        for (index, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                if let Err(payload) = handle.join() {
                    let message = panic_message(payload.as_ref());
                    log::error!("[WorkerPool] Worker {} terminated abnormally: {}", index, message);
                    if result.is_ok() {
                        result = Err(EngineError::WorkerPanicked {
                            worker: index,
                            message,
                        });
                    }
                }
            }
        }

        if !self.workers.is_empty() {
            log::info!("[WorkerPool] Joined {} render workers", self.workers.len());
        }
        self.workers.clear();
        result
    }
}

impl<R: CommandRecorder> Drop for WorkerPool<R> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("[WorkerPool] Shutdown error: {}", e);
        }
    }
}

fn worker_loop<R: CommandRecorder>(
    index: usize,
    mut recorder: R,
    shared: Arc<WorkerShared<R::Handle, R::CommandList>>,
) {
    log::debug!("[WorkerPool] Worker {} started", index);

    loop {
        let job = {
            let mut state = shared.state.lock();
            while state.job.is_none() && !state.stop {
                shared.work_ready.wait(&mut state);
            }
            if state.stop {
                state.phase = WorkerPhase::Stopped;
                break;
            }
            state.job.take()
        };
        let Some(job) = job else { continue };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let items = &job.items[job.work.range()];
            recorder.record(&job.resources, job.work, items)
        }))
        .unwrap_or_else(|payload| {
            Err(EngineError::WorkerPanicked {
                worker: index,
                message: panic_message(payload.as_ref()),
            })
        });

        // The slot must be unshared again by the time the coordinator sees completion.
        drop(job);

        {
            let mut state = shared.state.lock();
            state.output = Some(result);
            state.phase = WorkerPhase::Done;
        }
        shared.work_done.notify_one();
    }

    shared.work_done.notify_all();
    log::debug!("[WorkerPool] Worker {} stopped", index);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::FrameResourceLayout;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the item values of its range, optionally panicking on one frame
    struct ListRecorder {
        worker: usize,
        panic_on_frame: Option<u32>,
        dropped: Arc<AtomicUsize>,
    }

    impl Drop for ListRecorder {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CommandRecorder for ListRecorder {
        type Handle = u32;
        type CommandList = (usize, Vec<u32>);

        fn record(
            &mut self,
            frame: &FrameResources,
            work: WorkItem,
            items: &[RenderItem<u32>],
        ) -> EngineResult<(usize, Vec<u32>)> {
            assert_eq!(work.worker, self.worker);
            assert_eq!(items.len(), work.len());
            if self.panic_on_frame == Some(frame.frame_constants().frame_index) {
                panic!("recorder {} exploded", self.worker);
            }
            Ok((self.worker, items.iter().map(|item| item.mesh).collect()))
        }
    }

    fn pool(workers: usize, panic_worker: Option<(usize, u32)>) -> (WorkerPool<ListRecorder>, Arc<AtomicUsize>) {
        let dropped = Arc::new(AtomicUsize::new(0));
        let recorders = (0..workers)
            .map(|worker| ListRecorder {
                worker,
                panic_on_frame: panic_worker
                    .filter(|(w, _)| *w == worker)
                    .map(|(_, frame)| frame),
                dropped: Arc::clone(&dropped),
            })
            .collect();
        (WorkerPool::new(recorders).expect("pool should start"), dropped)
    }

    fn items(count: u32) -> Arc<[RenderItem<u32>]> {
        (0..count)
            .map(|i| RenderItem {
                mesh: i,
                object_index: i,
                index_count: 3,
            })
            .collect()
    }

    fn frame(index: u32) -> Arc<FrameResources> {
        let mut resources = FrameResources::new(FrameResourceLayout::default());
        let mut constants = resources.frame_constants();
        constants.frame_index = index;
        resources.frame.copy(0, constants).unwrap();
        Arc::new(resources)
    }

    #[test]
    fn test_dispatch_covers_every_item_once() {
        let (mut pool, _) = pool(4, None);
        let lists = pool.dispatch(items(10), frame(0)).unwrap();

        assert_eq!(lists.len(), 4);
        let workers: Vec<_> = lists.iter().map(|(w, _)| *w).collect();
        assert_eq!(workers, vec![0, 1, 2, 3]);
        let recorded: Vec<u32> = lists.into_iter().flat_map(|(_, items)| items).collect();
        assert_eq!(recorded, (0..10).collect::<Vec<_>>());
        assert!(pool.phases().iter().all(|p| *p == WorkerPhase::Idle));
    }

    #[test]
    fn test_dispatch_with_fewer_items_than_workers() {
        let (mut pool, _) = pool(3, None);
        let lists = pool.dispatch(items(2), frame(0)).unwrap();

        assert_eq!(lists.len(), 3);
        assert_eq!(lists[0].1, vec![0]);
        assert_eq!(lists[1].1, vec![1]);
        assert!(lists[2].1.is_empty());
    }

    #[test]
    fn test_repeated_frames() {
        let (mut pool, _) = pool(2, None);
        for index in 0..20 {
            let lists = pool.dispatch(items(index), frame(index)).unwrap();
            let total: usize = lists.iter().map(|(_, items)| items.len()).sum();
            assert_eq!(total, index as usize);
        }
        assert_eq!(pool.frames_dispatched(), 20);
    }

    #[test]
    fn test_workers_release_frame_before_completion() {
        let (mut pool, _) = pool(3, None);
        let resources = frame(0);
        let items = items(6);
        pool.dispatch(Arc::clone(&items), Arc::clone(&resources))
            .unwrap();

        assert_eq!(Arc::strong_count(&resources), 1);
        assert_eq!(Arc::strong_count(&items), 1);
    }

    #[test]
    fn test_recorder_panic_is_reported() {
        let (mut pool, _) = pool(3, Some((1, 2)));
        assert!(pool.dispatch(items(6), frame(1)).is_ok());

        let err = pool.dispatch(items(6), frame(2)).unwrap_err();
        match err {
            EngineError::WorkerPanicked { worker, message } => {
                assert_eq!(worker, 1);
                assert!(message.contains("exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(pool.phases().iter().all(|p| *p == WorkerPhase::Idle));
    }

    #[test]
    fn test_shutdown_joins_workers() {
        let (mut pool, dropped) = pool(4, None);
        pool.dispatch(items(8), frame(0)).unwrap();

        pool.shutdown().unwrap();
        assert_eq!(pool.worker_count(), 0);
        assert_eq!(dropped.load(Ordering::SeqCst), 4);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_dispatch_after_shutdown_is_refused() {
        let (mut pool, _) = pool(3, None);
        pool.shutdown().unwrap();
        assert!(pool.is_shut_down());

        let result = pool.dispatch(items(4), frame(0));
        assert!(matches!(result, Err(EngineError::ShutdownRequested)));
        assert_eq!(pool.frames_dispatched(), 0);
    }

    #[test]
    fn test_drop_joins_workers() {
        let (pool, dropped) = pool(2, None);
        drop(pool);
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let result = WorkerPool::<ListRecorder>::new(Vec::new());
        assert!(matches!(result, Err(EngineError::InvalidConfig { .. })));
    }
}
