//! Pipeline layout and pipeline cache ownership.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::RhiResult;
use crate::gpu::Gpu;

/// Owned pipeline layout.
pub struct PipelineLayout<G: Gpu> {
    gpu: Arc<G>,
    layout: vk::PipelineLayout,
}

impl<G: Gpu> PipelineLayout<G> {
    pub fn new(
        gpu: Arc<G>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let layout = gpu.create_pipeline_layout(descriptor_set_layouts, push_constant_ranges)?;
        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );
        Ok(Self { gpu, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl<G: Gpu> Drop for PipelineLayout<G> {
    fn drop(&mut self) {
        self.gpu.destroy_pipeline_layout(self.layout);
        debug!("Pipeline layout destroyed");
    }
}

/// Owned, initially empty pipeline cache.
pub struct PipelineCache<G: Gpu> {
    gpu: Arc<G>,
    cache: vk::PipelineCache,
}

impl<G: Gpu> PipelineCache<G> {
    pub fn new(gpu: Arc<G>) -> RhiResult<Self> {
        let cache = gpu.create_pipeline_cache()?;
        debug!("Pipeline cache created");
        Ok(Self { gpu, cache })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineCache {
        self.cache
    }
}

impl<G: Gpu> Drop for PipelineCache<G> {
    fn drop(&mut self) {
        self.gpu.destroy_pipeline_cache(self.cache);
        debug!("Pipeline cache destroyed");
    }
}
