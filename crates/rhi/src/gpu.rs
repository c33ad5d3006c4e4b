//! The device/queue seam consumed by the frame core.
//!
//! [`Gpu`] is the narrow contract between the frame-execution core and
//! whatever actually talks to the driver. [`crate::device::Device`]
//! implements it on top of `ash` and `gpu-allocator`; tests implement it with
//! a recording double so every frame protocol can be exercised without a GPU.
//!
//! All handles crossing the seam are plain `vk` handles. Ownership of a
//! handle is expressed by the scoped wrappers in [`crate::sync`],
//! [`crate::command`], [`crate::descriptor`], [`crate::pipeline`],
//! [`crate::image`] and [`crate::shader`], which call the matching
//! `destroy_*` method on drop.

use std::ffi::CStr;

use ash::vk;
use gpu_allocator::vulkan::Allocation;

use crate::error::RhiResult;
use crate::rendering::RenderingConfig;

/// What a surface accepts, as reported by the presentation engine.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain can only be built with at least one format and one mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Fully resolved swapchain parameters.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub old_swapchain: vk::SwapchainKHR,
}

/// A successfully acquired presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// The surface no longer matches exactly; the image is still usable.
    pub suboptimal: bool,
}

/// Parameters for a single-mip, single-layer 2D image.
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// Back the image with its own device-local allocation.
    pub dedicated: bool,
}

/// An image together with the memory bound to it.
#[derive(Debug)]
pub struct AllocatedImage {
    pub image: vk::Image,
    pub allocation: Allocation,
}

/// One synchronization2 image layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// A single graphics-queue submission of one primary command buffer.
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    /// Optional timeline semaphore and the value to signal it to.
    pub timeline_signal: Option<(vk::Semaphore, u64)>,
    pub fence: vk::Fence,
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDesc {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
    pub flags: vk::DescriptorBindingFlags,
}

/// The resource written into a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    Image {
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
    Sampler(vk::Sampler),
    Buffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
}

/// A write of one array element of one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub array_element: u32,
    pub ty: vk::DescriptorType,
    pub resource: DescriptorResource,
}

/// Inputs for a standalone shader object.
#[derive(Debug, Clone, Copy)]
pub struct ShaderObjectDesc<'a> {
    pub stage: vk::ShaderStageFlags,
    pub next_stage: vk::ShaderStageFlags,
    pub code: &'a [u32],
    pub entry_point: &'a CStr,
    pub set_layout: vk::DescriptorSetLayout,
    pub push_constant_range: vk::PushConstantRange,
}

/// Device, queue and allocator operations used by the frame core.
///
/// Methods returning `RhiResult` map Vulkan failures to
/// [`crate::RhiError`]. The acquire and present calls return the raw
/// `vk::Result` so callers can tell out-of-date surfaces apart from real
/// failures.
pub trait Gpu: Send + Sync + 'static {
    // =========================================================================
    // Device
    // =========================================================================

    fn wait_idle(&self) -> RhiResult<()>;

    /// Optimal-tiling format properties on the physical device.
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    // =========================================================================
    // Synchronization
    // =========================================================================

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore>;
    fn create_timeline_semaphore(&self, initial_value: u64) -> RhiResult<vk::Semaphore>;
    fn semaphore_counter_value(&self, semaphore: vk::Semaphore) -> RhiResult<u64>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence>;
    /// Block until the fence is signaled or `timeout_ns` elapses.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()>;
    fn fence_signaled(&self, fence: vk::Fence) -> RhiResult<bool>;
    fn destroy_fence(&self, fence: vk::Fence);

    // =========================================================================
    // Command recording contexts
    // =========================================================================

    /// Create a pool on the graphics queue family.
    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags)
    -> RhiResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()>;
    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()>;

    /// Submit to the graphics queue.
    fn submit(&self, desc: &SubmitDesc) -> Result<(), vk::Result>;

    // =========================================================================
    // Commands
    // =========================================================================

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier);
    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, config: &RenderingConfig);
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn cmd_bind_shaders(
        &self,
        cmd: vk::CommandBuffer,
        stages: &[vk::ShaderStageFlags],
        shaders: &[vk::ShaderEXT],
    );
    /// Set every piece of dynamic state shader-object drawing requires,
    /// with the viewport and scissor covering `extent`.
    fn cmd_set_draw_state(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D);
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    /// Full-extent color blit between two single-mip images.
    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
        filter: vk::Filter,
    );
    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    );

    // =========================================================================
    // Surface and swapchain
    // =========================================================================

    fn surface_support(&self, surface: vk::SurfaceKHR) -> RhiResult<SurfaceSupport>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquiredImage, vk::Result>;
    /// Present on the presentation queue. `Ok(true)` means suboptimal.
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result>;

    // =========================================================================
    // Images
    // =========================================================================

    /// Create an image and bind device-local memory from the allocator.
    fn create_image(&self, desc: &ImageDesc) -> RhiResult<AllocatedImage>;
    /// Destroy the image and return its memory to the allocator.
    fn destroy_image(&self, image: AllocatedImage);
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    // =========================================================================
    // Descriptors, layouts and shaders
    // =========================================================================

    fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn create_descriptor_set_layout(
        &self,
        flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[BindingDesc],
    ) -> RhiResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// Allocate one set; `variable_count` sizes the variable-count binding.
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> RhiResult<vk::DescriptorSet>;
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_pipeline_cache(&self) -> RhiResult<vk::PipelineCache>;
    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache);

    fn create_shader(&self, desc: &ShaderObjectDesc<'_>) -> RhiResult<vk::ShaderEXT>;
    fn destroy_shader(&self, shader: vk::ShaderEXT);
}
