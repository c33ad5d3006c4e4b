//! Synchronization primitives.
//!
//! - [`Semaphore`] orders GPU work against GPU work (acquire → render →
//!   present). It is either binary or a timeline counter.
//! - [`Fence`] lets the CPU wait for a submission to finish.
//!
//! Both release their handle through the [`Gpu`] seam on drop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::{Gpu, RhiResult};
//! use lumen_rhi::sync::{Fence, Semaphore};
//!
//! fn example<G: Gpu>(gpu: Arc<G>) -> RhiResult<()> {
//!     let image_acquired = Semaphore::new(gpu.clone())?;
//!     let in_flight = Fence::new(gpu, true)?;
//!
//!     in_flight.wait(u64::MAX)?;
//!     in_flight.reset()?;
//!     # let _ = image_acquired;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::RhiResult;
use crate::gpu::Gpu;

/// Owned semaphore.
pub struct Semaphore<G: Gpu> {
    gpu: Arc<G>,
    semaphore: vk::Semaphore,
    timeline: bool,
}

impl<G: Gpu> Semaphore<G> {
    /// Create a binary semaphore in the unsignaled state.
    pub fn new(gpu: Arc<G>) -> RhiResult<Self> {
        let semaphore = gpu.create_semaphore()?;
        Ok(Self {
            gpu,
            semaphore,
            timeline: false,
        })
    }

    /// Create a timeline semaphore whose counter starts at `initial_value`.
    pub fn timeline(gpu: Arc<G>, initial_value: u64) -> RhiResult<Self> {
        let semaphore = gpu.create_timeline_semaphore(initial_value)?;
        debug!("Created timeline semaphore (initial value {initial_value})");
        Ok(Self {
            gpu,
            semaphore,
            timeline: true,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    #[inline]
    pub fn is_timeline(&self) -> bool {
        self.timeline
    }

    /// Current counter value of a timeline semaphore.
    pub fn counter_value(&self) -> RhiResult<u64> {
        debug_assert!(self.timeline, "counter_value on a binary semaphore");
        self.gpu.semaphore_counter_value(self.semaphore)
    }
}

impl<G: Gpu> Drop for Semaphore<G> {
    fn drop(&mut self) {
        self.gpu.destroy_semaphore(self.semaphore);
    }
}

/// Owned fence.
pub struct Fence<G: Gpu> {
    gpu: Arc<G>,
    fence: vk::Fence,
}

impl<G: Gpu> Fence<G> {
    /// Create a fence. Frame fences start signaled so the first wait on them
    /// returns immediately.
    pub fn new(gpu: Arc<G>, signaled: bool) -> RhiResult<Self> {
        let fence = gpu.create_fence(signaled)?;
        Ok(Self { gpu, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until signaled or `timeout_ns` elapses.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        self.gpu.wait_for_fence(self.fence, timeout_ns)
    }

    pub fn reset(&self) -> RhiResult<()> {
        self.gpu.reset_fence(self.fence)
    }

    pub fn is_signaled(&self) -> RhiResult<bool> {
        self.gpu.fence_signaled(self.fence)
    }
}

impl<G: Gpu> Drop for Fence<G> {
    fn drop(&mut self) {
        self.gpu.destroy_fence(self.fence);
    }
}
