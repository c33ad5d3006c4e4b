//! Descriptor pool and set layout ownership, plus binding helpers for
//! update-after-bind layouts.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::RhiResult;
use crate::gpu::{BindingDesc, DescriptorWrite, Gpu};

/// Owned descriptor set layout.
pub struct DescriptorSetLayout<G: Gpu> {
    gpu: Arc<G>,
    layout: vk::DescriptorSetLayout,
}

impl<G: Gpu> DescriptorSetLayout<G> {
    pub fn new(
        gpu: Arc<G>,
        flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[BindingDesc],
    ) -> RhiResult<Self> {
        let layout = gpu.create_descriptor_set_layout(flags, bindings)?;
        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );
        Ok(Self { gpu, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl<G: Gpu> Drop for DescriptorSetLayout<G> {
    fn drop(&mut self) {
        self.gpu.destroy_descriptor_set_layout(self.layout);
        debug!("Destroyed descriptor set layout");
    }
}

/// Owned descriptor pool. Sets allocated from it are freed with it.
pub struct DescriptorPool<G: Gpu> {
    gpu: Arc<G>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl<G: Gpu> DescriptorPool<G> {
    pub fn new(
        gpu: Arc<G>,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let pool = gpu.create_descriptor_pool(flags, max_sets, pool_sizes)?;
        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );
        Ok(Self {
            gpu,
            pool,
            max_sets,
        })
    }

    /// Allocate one set, sizing the layout's variable-count binding when
    /// `variable_count` is given.
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout<G>,
        variable_count: Option<u32>,
    ) -> RhiResult<vk::DescriptorSet> {
        let set = self
            .gpu
            .allocate_descriptor_set(self.pool, layout.handle(), variable_count)?;
        debug!("Allocated descriptor set (variable count: {variable_count:?})");
        Ok(set)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl<G: Gpu> Drop for DescriptorPool<G> {
    fn drop(&mut self) {
        self.gpu.destroy_descriptor_pool(self.pool);
        debug!("Destroyed descriptor pool");
    }
}

/// Write descriptors, skipping the call entirely for an empty batch.
pub fn update_descriptor_sets<G: Gpu>(gpu: &G, writes: &[DescriptorWrite]) {
    if writes.is_empty() {
        return;
    }
    gpu.update_descriptor_sets(writes);
}

/// Flags every bindless binding carries.
pub const BINDLESS_BINDING_FLAGS: vk::DescriptorBindingFlags = vk::DescriptorBindingFlags::from_raw(
    vk::DescriptorBindingFlags::PARTIALLY_BOUND.as_raw()
        | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND.as_raw(),
);

/// Helpers for building update-after-bind array bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    /// A partially-bound, update-after-bind array binding.
    #[inline]
    pub fn bindless_array(
        binding: u32,
        ty: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> BindingDesc {
        BindingDesc {
            binding,
            ty,
            count,
            stages,
            flags: BINDLESS_BINDING_FLAGS,
        }
    }

    /// Like [`Self::bindless_array`], with the actual length chosen at
    /// allocation time. Only the highest-numbered binding of a layout may
    /// be variable-count.
    #[inline]
    pub fn bindless_variable_array(
        binding: u32,
        ty: vk::DescriptorType,
        max_count: u32,
        stages: vk::ShaderStageFlags,
    ) -> BindingDesc {
        BindingDesc {
            flags: BINDLESS_BINDING_FLAGS
                | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
            ..Self::bindless_array(binding, ty, max_count, stages)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindless_array_flags() {
        let binding = DescriptorBindingBuilder::bindless_array(
            1,
            vk::DescriptorType::STORAGE_BUFFER,
            1024,
            vk::ShaderStageFlags::ALL,
        );
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.count, 1024);
        assert!(binding
            .flags
            .contains(vk::DescriptorBindingFlags::PARTIALLY_BOUND));
        assert!(binding
            .flags
            .contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND));
        assert!(!binding
            .flags
            .contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT));
    }

    #[test]
    fn test_variable_array_adds_variable_count() {
        let binding = DescriptorBindingBuilder::bindless_variable_array(
            4,
            vk::DescriptorType::SAMPLED_IMAGE,
            16384,
            vk::ShaderStageFlags::ALL,
        );
        assert_eq!(binding.ty, vk::DescriptorType::SAMPLED_IMAGE);
        assert!(binding.flags.contains(BINDLESS_BINDING_FLAGS));
        assert!(binding
            .flags
            .contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT));
    }
}
