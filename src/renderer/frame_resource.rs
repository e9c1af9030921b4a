//! Ring of per-frame resources gated by a fence counter
//!
//! The CPU writes frame N+1 into one slot while the GPU may still read
//! earlier slots. A slot is only handed out again once the completion fence
//! observed from the device has reached the value assigned at its release,
//! which bounds how far the CPU can run ahead to the ring size.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::frame::{FENCE_POLL_MS, FRAME_CONSTANT_COUNT, MAX_MATERIALS, MAX_OBJECTS};
use crate::error::{EngineError, EngineResult};
use crate::renderer::backend::CommandQueue;
use crate::renderer::upload_buffer::{
    FrameConstants, MaterialConstants, ObjectConstants, UploadBuffer,
};
use crate::thread_pool::ShutdownSignal;

/// Buffer capacities of each slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResourceLayout {
    pub objects: usize,
    pub materials: usize,
}

impl Default for FrameResourceLayout {
    fn default() -> Self {
        Self {
            objects: MAX_OBJECTS,
            materials: MAX_MATERIALS,
        }
    }
}

/// Constants read by one frame's draws
#[derive(Debug, Clone)]
pub struct FrameResources {
    pub objects: UploadBuffer<ObjectConstants>,
    pub frame: UploadBuffer<FrameConstants>,
    pub materials: UploadBuffer<MaterialConstants>,
}

impl FrameResources {
    pub fn new(layout: FrameResourceLayout) -> Self {
        Self {
            objects: UploadBuffer::new("object", layout.objects),
            frame: UploadBuffer::new("frame", FRAME_CONSTANT_COUNT),
            materials: UploadBuffer::new("material", layout.materials),
        }
    }

    /// Constants of the frame this slot was last written for
    pub fn frame_constants(&self) -> FrameConstants {
        self.frame.get(0).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence reached, safe to reuse
    Free,
    /// Held by the coordinator for the frame being built
    InUse,
    /// Submitted, waiting for its fence
    Pending,
}

impl SlotState {
    fn name(self) -> &'static str {
        match self {
            SlotState::Free => "free",
            SlotState::InUse => "in use",
            SlotState::Pending => "pending",
        }
    }
}

#[derive(Debug)]
struct FrameSlot {
    fence: u64,
    state: SlotState,
    resources: Arc<FrameResources>,
}

/// Fixed ring of frame slots
#[derive(Debug)]
pub struct FrameResourceRing {
    slots: Vec<FrameSlot>,
    cursor: Option<usize>,
    last_fence: u64,
    last_released: u64,
    completed: u64,
    poll_interval: Duration,
    stalls: u64,
}

impl FrameResourceRing {
    /// # Panics
    ///
    /// Panics if `slot_count` is zero.
    pub fn new(slot_count: usize, layout: FrameResourceLayout) -> Self {
        assert!(slot_count > 0, "frame resource ring needs at least one slot");

        let slots = (0..slot_count)
            .map(|_| FrameSlot {
                fence: 0,
                state: SlotState::Free,
                resources: Arc::new(FrameResources::new(layout)),
            })
            .collect();

        Self {
            slots,
            cursor: None,
            last_fence: 0,
            last_released: 0,
            completed: 0,
            poll_interval: Duration::from_millis(FENCE_POLL_MS),
            stalls: 0,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    /// Fence value assigned at the slot's last release
    pub fn fence(&self, slot: usize) -> Option<u64> {
        self.slots.get(slot).map(|s| s.fence)
    }

    /// Most recently observed completed fence value
    pub fn completed_fence(&self) -> u64 {
        self.completed
    }

    /// Last fence value handed out by [`Self::next_fence_value`]
    pub fn last_fence(&self) -> u64 {
        self.last_fence
    }

    /// Slots submitted but not yet known to be finished
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Pending)
            .count()
    }

    /// Number of acquires that had to wait for the GPU
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Advance to the next slot, blocking until the GPU has finished with it.
    ///
    /// Waits in bounded steps so a shutdown request ends the stall. Device
    /// loss is returned as is and never retried.
    pub fn acquire<Q>(&mut self, queue: &Q, shutdown: &ShutdownSignal) -> EngineResult<usize>
    where
        Q: CommandQueue + ?Sized,
    {
        let index = self.cursor.map_or(0, |c| (c + 1) % self.slots.len());

        match self.slots[index].state {
            SlotState::InUse => return Err(EngineError::SlotInUse { slot: index }),
            SlotState::Pending => {
                let fence = self.slots[index].fence;
                if fence > self.completed {
                    self.stalls += 1;
                    log::debug!(
                        "[FrameResourceRing] Slot {} waits for fence {} (completed {})",
                        index,
                        fence,
                        self.completed
                    );
                    self.wait_for(queue, fence, shutdown)?;
                }
            }
            SlotState::Free => {}
        }

        let slot = &mut self.slots[index];
        debug_assert!(slot.fence <= self.completed);
        slot.state = SlotState::InUse;
        self.cursor = Some(index);
        Ok(index)
    }

    /// Exclusive write access to a slot held by the coordinator
    pub fn resources_mut(&mut self, slot: usize) -> EngineResult<&mut FrameResources> {
        let entry = self.slot_mut(slot, SlotState::InUse)?;
        Arc::get_mut(&mut entry.resources).ok_or(EngineError::SlotStillShared { slot })
    }

    /// Read-only view of a slot for the workers recording this frame
    pub fn shared_resources(&self, slot: usize) -> EngineResult<Arc<FrameResources>> {
        let entry = self.slots.get(slot).ok_or(EngineError::BufferOverflow {
            buffer: "frame resource",
            index: slot,
            capacity: self.slots.len(),
        })?;
        if entry.state != SlotState::InUse {
            return Err(EngineError::InvalidSlotState {
                slot,
                expected: SlotState::InUse.name(),
                found: entry.state.name(),
            });
        }
        Ok(Arc::clone(&entry.resources))
    }

    /// Next value of the monotonically increasing fence counter
    pub fn next_fence_value(&mut self) -> u64 {
        self.last_fence += 1;
        self.last_fence
    }

    /// Mark a slot as submitted. Call right after its command lists were submitted.
    pub fn release(&mut self, slot: usize, fence_value: u64) -> EngineResult<()> {
        if fence_value <= self.last_released {
            return Err(EngineError::FenceNotMonotonic {
                previous: self.last_released,
                value: fence_value,
            });
        }

        let completed = self.completed;
        let entry = self.slot_mut(slot, SlotState::InUse)?;
        entry.fence = fence_value;
        entry.state = if fence_value <= completed {
            SlotState::Free
        } else {
            SlotState::Pending
        };
        self.last_released = fence_value;
        self.last_fence = self.last_fence.max(fence_value);
        Ok(())
    }

    /// Record the completed fence value reported by the device
    pub fn observe_completion(&mut self, value: u64) {
        self.completed = self.completed.max(value);
        let completed = self.completed;
        for slot in &mut self.slots {
            if slot.state == SlotState::Pending && slot.fence <= completed {
                slot.state = SlotState::Free;
            }
        }
    }

    /// Wait until every released slot has retired
    pub fn drain<Q>(&mut self, queue: &Q, shutdown: &ShutdownSignal) -> EngineResult<()>
    where
        Q: CommandQueue + ?Sized,
    {
        if self.last_released > self.completed {
            log::debug!(
                "[FrameResourceRing] Draining up to fence {}",
                self.last_released
            );
            self.wait_for(queue, self.last_released, shutdown)?;
        }
        Ok(())
    }

    fn wait_for<Q>(&mut self, queue: &Q, fence: u64, shutdown: &ShutdownSignal) -> EngineResult<()>
    where
        Q: CommandQueue + ?Sized,
    {
        while self.completed < fence {
            if shutdown.is_requested() {
                return Err(EngineError::ShutdownRequested);
            }
            let completed = queue.wait_for_fence(fence, self.poll_interval)?;
            self.observe_completion(completed);
        }
        Ok(())
    }

    fn slot_mut(&mut self, slot: usize, expected: SlotState) -> EngineResult<&mut FrameSlot> {
        let capacity = self.slots.len();
        let entry = self.slots.get_mut(slot).ok_or(EngineError::BufferOverflow {
            buffer: "frame resource",
            index: slot,
            capacity,
        })?;
        if entry.state != expected {
            return Err(EngineError::InvalidSlotState {
                slot,
                expected: expected.name(),
                found: entry.state.name(),
            });
        }
        Ok(entry)
    }
}
