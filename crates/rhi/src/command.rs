//! Command pool ownership.
//!
//! Command buffers themselves are plain `vk::CommandBuffer` handles; they
//! are freed together with the pool that allocated them.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::RhiResult;
use crate::gpu::Gpu;

/// Owned command pool on the graphics queue family.
///
/// Command pools are externally synchronized: record from one thread per
/// pool.
pub struct CommandPool<G: Gpu> {
    gpu: Arc<G>,
    pool: vk::CommandPool,
}

impl<G: Gpu> CommandPool<G> {
    /// Create a pool whose buffers can be reset individually.
    pub fn new(gpu: Arc<G>) -> RhiResult<Self> {
        Self::with_flags(gpu, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    pub fn with_flags(gpu: Arc<G>, flags: vk::CommandPoolCreateFlags) -> RhiResult<Self> {
        let pool = gpu.create_command_pool(flags)?;
        debug!("Command pool created ({flags:?})");
        Ok(Self { gpu, pool })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate one primary command buffer.
    pub fn allocate(&self) -> RhiResult<vk::CommandBuffer> {
        self.gpu.allocate_command_buffer(self.pool)
    }
}

impl<G: Gpu> Drop for CommandPool<G> {
    fn drop(&mut self) {
        self.gpu.destroy_command_pool(self.pool);
        debug!("Command pool destroyed");
    }
}
