//! Frames in flight.
//!
//! [`FrameRing`] owns [`FRAMES_IN_FLIGHT`] slots, each with its own command
//! pool, acquire/render semaphores and an in-flight fence. A slot is reused
//! only after its fence shows the GPU finished the slot's last submission:
//!
//! ```text
//! Idle --begin--> Recording --end--> Submitted --begin (fence wait)--> Recording
//!                     |
//!                     +--abort--> Idle
//! ```
//!
//! The fence is reset immediately before submission rather than at
//! `begin`, so an aborted frame leaves it signaled and the next `begin`
//! on the slot does not block.
//!
//! Every submission also signals the ring's timeline semaphore with a
//! strictly increasing value, recorded per slot.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use lumen_rhi::command::CommandPool;
use lumen_rhi::sync::{Fence, Semaphore};
use lumen_rhi::{Gpu, RhiError, RhiResult, SubmitDesc};

use crate::swapchain::SwapchainManager;

/// Number of frame slots.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Stage at which a submission waits for its presentable image.
const IMAGE_ACQUIRED_WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT.as_raw()
        | vk::PipelineStageFlags::TRANSFER.as_raw(),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence satisfied, safe to record.
    Idle,
    /// The CPU is writing the slot's command buffer.
    Recording,
    /// The GPU owns the slot's last submission.
    Submitted,
}

/// Result of presenting a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the swapchain should be recreated.
    Suboptimal,
    /// Not presented; the swapchain must be recreated.
    OutOfDate,
}

/// Map a present result to an outcome, failing on anything that is not
/// success, suboptimal or out of date.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(RhiError::PresentFailed(e)),
    }
}

/// Per-slot recording and synchronization resources.
pub struct FrameSlot<G: Gpu> {
    cmd: vk::CommandBuffer,
    pool: CommandPool<G>,
    image_acquired: Semaphore<G>,
    render_complete: Semaphore<G>,
    in_flight: Fence<G>,
    timeline_value: u64,
    state: SlotState,
}

impl<G: Gpu> FrameSlot<G> {
    fn new(gpu: &Arc<G>) -> RhiResult<Self> {
        let pool = CommandPool::new(gpu.clone())?;
        let cmd = pool.allocate()?;
        // Signaled so the first wait returns immediately
        let in_flight = Fence::new(gpu.clone(), true)?;

        Ok(Self {
            cmd,
            pool,
            image_acquired: Semaphore::new(gpu.clone())?,
            render_complete: Semaphore::new(gpu.clone())?,
            in_flight,
            timeline_value: 0,
            state: SlotState::Idle,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    #[inline]
    pub fn command_pool(&self) -> vk::CommandPool {
        self.pool.handle()
    }

    #[inline]
    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired.handle()
    }

    #[inline]
    pub fn render_complete(&self) -> vk::Semaphore {
        self.render_complete.handle()
    }

    #[inline]
    pub fn in_flight_fence(&self) -> vk::Fence {
        self.in_flight.handle()
    }

    /// Timeline value signaled by this slot's last submission.
    #[inline]
    pub fn timeline_value(&self) -> u64 {
        self.timeline_value
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// Fixed ring of frame slots.
pub struct FrameRing<G: Gpu> {
    gpu: Arc<G>,
    slots: Vec<FrameSlot<G>>,
    timeline: Semaphore<G>,
    last_timeline_value: u64,
    current: usize,
}

impl<G: Gpu> FrameRing<G> {
    pub fn new(gpu: Arc<G>) -> RhiResult<Self> {
        let slots = (0..FRAMES_IN_FLIGHT)
            .map(|i| {
                let slot = FrameSlot::new(&gpu)?;
                debug!("Created frame slot {}", i);
                Ok(slot)
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let timeline = Semaphore::timeline(gpu.clone(), 0)?;

        info!("Frame ring created with {} frames in flight", FRAMES_IN_FLIGHT);

        Ok(Self {
            gpu,
            slots,
            timeline,
            last_timeline_value: 0,
            current: 0,
        })
    }

    /// Wait for the current slot's previous submission, then reset and
    /// begin its command buffer.
    pub fn begin(&mut self) -> RhiResult<vk::CommandBuffer> {
        debug_assert_eq!(
            self.recording_count(),
            0,
            "begin while another slot is recording"
        );

        let slot = &mut self.slots[self.current];
        slot.in_flight.wait(u64::MAX)?;
        slot.state = SlotState::Idle;

        self.gpu.reset_command_buffer(slot.cmd)?;
        self.gpu
            .begin_command_buffer(slot.cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        slot.state = SlotState::Recording;

        Ok(slot.cmd)
    }

    /// Close the current slot's recording without submitting it. The
    /// fence stays signaled and the ring does not advance.
    pub fn abort(&mut self) -> RhiResult<()> {
        let slot = &mut self.slots[self.current];
        debug_assert_eq!(slot.state, SlotState::Recording);

        self.gpu.end_command_buffer(slot.cmd)?;
        slot.state = SlotState::Idle;
        debug!("Frame slot {} aborted before submission", self.current);
        Ok(())
    }

    /// End recording, submit, advance to the next slot and present
    /// `image_index`.
    ///
    /// The ring advances once the submission is accepted, whatever the
    /// present outcome.
    pub fn end(
        &mut self,
        swapchain: &SwapchainManager<G>,
        image_index: u32,
    ) -> RhiResult<PresentOutcome> {
        let timeline_value = self.last_timeline_value + 1;
        let slot = &mut self.slots[self.current];
        debug_assert_eq!(slot.state, SlotState::Recording);

        self.gpu.end_command_buffer(slot.cmd)?;
        slot.in_flight.reset()?;

        self.gpu
            .submit(&SubmitDesc {
                command_buffer: slot.cmd,
                wait_semaphore: slot.image_acquired.handle(),
                wait_stage: IMAGE_ACQUIRED_WAIT_STAGE,
                signal_semaphore: slot.render_complete.handle(),
                timeline_signal: Some((self.timeline.handle(), timeline_value)),
                fence: slot.in_flight.handle(),
            })
            .map_err(RhiError::SubmitFailed)?;

        slot.state = SlotState::Submitted;
        slot.timeline_value = timeline_value;
        self.last_timeline_value = timeline_value;
        let render_complete = slot.render_complete.handle();
        self.current = (self.current + 1) % FRAMES_IN_FLIGHT;

        let outcome = classify_present(swapchain.present(image_index, render_complete))?;
        if outcome != PresentOutcome::Presented {
            debug!("Present returned {:?}", outcome);
        }
        Ok(outcome)
    }

    /// Replace every slot's semaphores. Only valid while the device is
    /// idle, since a failed present can leave a semaphore signaled.
    pub fn reset_semaphores(&mut self) -> RhiResult<()> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            debug_assert_ne!(slot.state, SlotState::Recording);
            slot.image_acquired = Semaphore::new(self.gpu.clone())?;
            slot.render_complete = Semaphore::new(self.gpu.clone())?;
            debug!("Reset semaphores for frame slot {}", i);
        }
        Ok(())
    }

    /// Latest timeline value the GPU has reached.
    pub fn completed_value(&self) -> RhiResult<u64> {
        self.timeline.counter_value()
    }

    /// Timeline value of the most recent submission.
    #[inline]
    pub fn last_submitted_value(&self) -> u64 {
        self.last_timeline_value
    }

    #[inline]
    pub fn timeline_semaphore(&self) -> vk::Semaphore {
        self.timeline.handle()
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current_slot(&self) -> &FrameSlot<G> {
        &self.slots[self.current]
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot<G>> {
        self.slots.get(index)
    }

    /// Number of slots in the `Recording` state.
    pub fn recording_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Recording)
            .count()
    }
}
