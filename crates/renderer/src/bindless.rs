//! The global bindless descriptor set.
//!
//! One update-after-bind set holds an unbounded array per resource class.
//! Shaders index these arrays with slot numbers passed in push constants or
//! buffers, so nothing is rebound per draw:
//!
//! | binding | class            | default capacity |
//! |---------|------------------|------------------|
//! | 0       | storage buffers  | 1024             |
//! | 1       | uniform buffers  | 256              |
//! | 2       | samplers         | 128              |
//! | 3       | storage images   | 512              |
//! | 4       | sampled images   | 16384 (variable) |
//!
//! Every binding is partially bound. A shader must never read a slot that
//! has not been written; slot validity is the caller's responsibility.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use lumen_core::config::BindlessCapacities;
use lumen_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, update_descriptor_sets,
};
use lumen_rhi::pipeline::{PipelineCache, PipelineLayout};
use lumen_rhi::{BindingDesc, DescriptorResource, DescriptorWrite, Gpu, RhiResult};

/// Resource classes of the bindless set, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    StorageBuffer,
    UniformBuffer,
    Sampler,
    StorageImage,
    SampledImage,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 5] = [
        ResourceClass::StorageBuffer,
        ResourceClass::UniformBuffer,
        ResourceClass::Sampler,
        ResourceClass::StorageImage,
        ResourceClass::SampledImage,
    ];

    #[inline]
    pub fn binding(self) -> u32 {
        self as u32
    }

    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            ResourceClass::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            ResourceClass::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            ResourceClass::Sampler => vk::DescriptorType::SAMPLER,
            ResourceClass::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            ResourceClass::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        }
    }

    /// Storage images are only written from compute and read in fragment
    /// shaders.
    pub fn stages(self) -> vk::ShaderStageFlags {
        match self {
            ResourceClass::StorageImage => {
                vk::ShaderStageFlags::COMPUTE | vk::ShaderStageFlags::FRAGMENT
            }
            _ => vk::ShaderStageFlags::ALL,
        }
    }

    pub fn capacity(self, capacities: &BindlessCapacities) -> u32 {
        match self {
            ResourceClass::StorageBuffer => capacities.storage_buffers,
            ResourceClass::UniformBuffer => capacities.uniform_buffers,
            ResourceClass::Sampler => capacities.samplers,
            ResourceClass::StorageImage => capacities.storage_images,
            ResourceClass::SampledImage => capacities.sampled_images,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Layout bindings for `capacities`. The sampled-image array is last and
/// variable-count.
pub fn bindings(capacities: &BindlessCapacities) -> Vec<BindingDesc> {
    ResourceClass::ALL
        .iter()
        .map(|&class| {
            let count = class.capacity(capacities);
            if class == ResourceClass::SampledImage {
                DescriptorBindingBuilder::bindless_variable_array(
                    class.binding(),
                    class.descriptor_type(),
                    count,
                    class.stages(),
                )
            } else {
                DescriptorBindingBuilder::bindless_array(
                    class.binding(),
                    class.descriptor_type(),
                    count,
                    class.stages(),
                )
            }
        })
        .collect()
}

pub fn pool_sizes(capacities: &BindlessCapacities) -> Vec<vk::DescriptorPoolSize> {
    ResourceClass::ALL
        .iter()
        .map(|&class| vk::DescriptorPoolSize {
            ty: class.descriptor_type(),
            descriptor_count: class.capacity(capacities),
        })
        .collect()
}

/// Free-list allocator over `0..capacity`.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    capacity: u32,
    next: u32,
    free: Vec<u32>,
}

impl SlotAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            next: 0,
            free: Vec::new(),
        }
    }

    /// Most recently released slot, else the next unused one.
    pub fn allocate(&mut self) -> Option<u32> {
        if let Some(slot) = self.free.pop() {
            return Some(slot);
        }
        if self.next < self.capacity {
            let slot = self.next;
            self.next += 1;
            Some(slot)
        } else {
            None
        }
    }

    pub fn release(&mut self, slot: u32) {
        debug_assert!(slot < self.next, "releasing never-allocated slot {slot}");
        debug_assert!(!self.free.contains(&slot), "slot {slot} released twice");
        self.free.push(slot);
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots currently handed out.
    #[inline]
    pub fn in_use(&self) -> u32 {
        self.next - self.free.len() as u32
    }
}

/// The process-wide descriptor set, its layout and the single pipeline
/// layout every draw and dispatch uses.
pub struct BindlessRegistry<G: Gpu> {
    gpu: Arc<G>,
    pipeline_cache: PipelineCache<G>,
    pipeline_layout: PipelineLayout<G>,
    set: vk::DescriptorSet,
    pool: DescriptorPool<G>,
    set_layout: DescriptorSetLayout<G>,
    push_constant_range: vk::PushConstantRange,
    capacities: BindlessCapacities,
    slots: [SlotAllocator; 5],
}

impl<G: Gpu> BindlessRegistry<G> {
    /// Build the pool, layout, set, pipeline layout and pipeline cache.
    pub fn create(
        gpu: Arc<G>,
        capacities: BindlessCapacities,
        push_constant_size: u32,
    ) -> RhiResult<Self> {
        let pool = DescriptorPool::new(
            gpu.clone(),
            vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
            1,
            &pool_sizes(&capacities),
        )?;
        let set_layout = DescriptorSetLayout::new(
            gpu.clone(),
            vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
            &bindings(&capacities),
        )?;
        let set = pool.allocate(&set_layout, Some(capacities.sampled_images))?;

        let push_constant_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::ALL,
            offset: 0,
            size: push_constant_size,
        };
        let pipeline_layout =
            PipelineLayout::new(gpu.clone(), &[set_layout.handle()], &[push_constant_range])?;
        let pipeline_cache = PipelineCache::new(gpu.clone())?;

        let slots = ResourceClass::ALL.map(|class| SlotAllocator::new(class.capacity(&capacities)));

        info!(
            "Bindless registry created: {} sampled images, {} samplers, {} storage buffers, {} uniform buffers, {} storage images, {} push constant bytes",
            capacities.sampled_images,
            capacities.samplers,
            capacities.storage_buffers,
            capacities.uniform_buffers,
            capacities.storage_images,
            push_constant_size
        );

        Ok(Self {
            gpu,
            pipeline_cache,
            pipeline_layout,
            set,
            pool,
            set_layout,
            push_constant_range,
            capacities,
            slots,
        })
    }

    /// Bind the set at index 0 for `bind_point`.
    pub fn bind(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint) {
        self.gpu
            .cmd_bind_descriptor_set(cmd, bind_point, self.pipeline_layout.handle(), self.set);
    }

    /// Push `data` at offset 0 for every stage.
    pub fn push_constants(&self, cmd: vk::CommandBuffer, data: &[u8]) {
        debug_assert!(
            data.len() as u32 <= self.push_constant_range.size,
            "push constant block of {} bytes exceeds range of {}",
            data.len(),
            self.push_constant_range.size
        );
        self.gpu.cmd_push_constants(
            cmd,
            self.pipeline_layout.handle(),
            self.push_constant_range.stage_flags,
            0,
            data,
        );
    }

    // =========================================================================
    // Slot allocation
    // =========================================================================

    pub fn allocate(&mut self, class: ResourceClass) -> Option<u32> {
        let slot = self.slots[class.index()].allocate();
        if slot.is_none() {
            debug!("Bindless {:?} array is full", class);
        }
        slot
    }

    pub fn release(&mut self, class: ResourceClass, slot: u32) {
        self.slots[class.index()].release(slot);
    }

    pub fn slots_in_use(&self, class: ResourceClass) -> u32 {
        self.slots[class.index()].in_use()
    }

    // =========================================================================
    // Descriptor writes
    // =========================================================================

    /// A sampled image in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn write_sampled_image(&self, index: u32, view: vk::ImageView) {
        self.write(
            ResourceClass::SampledImage,
            index,
            DescriptorResource::Image {
                view,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        );
    }

    pub fn write_sampler(&self, index: u32, sampler: vk::Sampler) {
        self.write(
            ResourceClass::Sampler,
            index,
            DescriptorResource::Sampler(sampler),
        );
    }

    pub fn write_storage_buffer(
        &self,
        index: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) {
        self.write(
            ResourceClass::StorageBuffer,
            index,
            DescriptorResource::Buffer {
                buffer,
                offset,
                range,
            },
        );
    }

    pub fn write_uniform_buffer(
        &self,
        index: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) {
        self.write(
            ResourceClass::UniformBuffer,
            index,
            DescriptorResource::Buffer {
                buffer,
                offset,
                range,
            },
        );
    }

    /// A storage image in `GENERAL`.
    pub fn write_storage_image(&self, index: u32, view: vk::ImageView) {
        self.write(
            ResourceClass::StorageImage,
            index,
            DescriptorResource::Image {
                view,
                layout: vk::ImageLayout::GENERAL,
            },
        );
    }

    fn write(&self, class: ResourceClass, index: u32, resource: DescriptorResource) {
        debug_assert!(
            index < class.capacity(&self.capacities),
            "{:?} slot {} out of range (capacity {})",
            class,
            index,
            class.capacity(&self.capacities)
        );
        update_descriptor_sets(
            self.gpu.as_ref(),
            &[DescriptorWrite {
                set: self.set,
                binding: class.binding(),
                array_element: index,
                ty: class.descriptor_type(),
                resource,
            }],
        );
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.handle()
    }

    #[inline]
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool.handle()
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    #[inline]
    pub fn pipeline_cache(&self) -> vk::PipelineCache {
        self.pipeline_cache.handle()
    }

    #[inline]
    pub fn push_constant_range(&self) -> vk::PushConstantRange {
        self.push_constant_range
    }

    #[inline]
    pub fn capacity(&self, class: ResourceClass) -> u32 {
        class.capacity(&self.capacities)
    }
}
