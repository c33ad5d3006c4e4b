//! [`Gpu`] implemented on `ash` and `gpu-allocator`.

use std::ptr;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::gpu::{
    AcquiredImage, AllocatedImage, BindingDesc, DescriptorResource, DescriptorWrite, Gpu,
    ImageBarrier, ImageDesc, ShaderObjectDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};
use crate::rendering::RenderingConfig;

fn single_subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

fn allocator_gone() -> RhiError {
    RhiError::AllocatorError(gpu_allocator::AllocationError::Internal(
        "allocator already released".to_string(),
    ))
}

impl Gpu for Device {
    // =========================================================================
    // Device
    // =========================================================================

    fn wait_idle(&self) -> RhiResult<()> {
        let _queues = self.lock_queues();
        unsafe { self.handle().device_wait_idle()? };
        Ok(())
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance()
                .handle()
                .get_physical_device_format_properties(self.physical_device(), format)
        }
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.handle().create_semaphore(&info, None)? })
    }

    fn create_timeline_semaphore(&self, initial_value: u64) -> RhiResult<vk::Semaphore> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        Ok(unsafe { self.handle().create_semaphore(&info, None)? })
    }

    fn semaphore_counter_value(&self, semaphore: vk::Semaphore) -> RhiResult<u64> {
        Ok(unsafe { self.handle().get_semaphore_counter_value(semaphore)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.handle().destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.handle().create_fence(&info, None)? })
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()> {
        unsafe { self.handle().wait_for_fences(&[fence], true, timeout_ns)? };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.handle().reset_fences(&[fence])? };
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> RhiResult<bool> {
        Ok(unsafe { self.handle().get_fence_status(fence)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.handle().destroy_fence(fence, None) };
    }

    // =========================================================================
    // Command recording contexts
    // =========================================================================

    fn create_command_pool(
        &self,
        flags: vk::CommandPoolCreateFlags,
    ) -> RhiResult<vk::CommandPool> {
        let family = self
            .queue_families()
            .graphics_family
            .ok_or_else(|| RhiError::InvalidHandle("No graphics queue family".to_string()))?;
        let info = vk::CommandPoolCreateInfo::default()
            .flags(flags)
            .queue_family_index(family);
        Ok(unsafe { self.handle().create_command_pool(&info, None)? })
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.handle().destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.handle().allocate_command_buffers(&info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("No command buffer allocated".to_string()))
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        unsafe {
            self.handle()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        let info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.handle().begin_command_buffer(cmd, &info)? };
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        unsafe { self.handle().end_command_buffer(cmd)? };
        Ok(())
    }

    fn submit(&self, desc: &SubmitDesc) -> Result<(), vk::Result> {
        let command_buffers = [desc.command_buffer];
        let wait_semaphores = [desc.wait_semaphore];
        let wait_stages = [desc.wait_stage];
        let wait_values = [0u64];

        let mut signal_semaphores = vec![desc.signal_semaphore];
        let mut signal_values = vec![0u64];
        if let Some((timeline, value)) = desc.timeline_signal {
            signal_semaphores.push(timeline);
            signal_values.push(value);
        }

        // Binary semaphore entries ignore their values.
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        let _queues = self.lock_queues();
        unsafe {
            self.handle()
                .queue_submit(self.graphics_queue(), &[submit_info], desc.fence)
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        let image_barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(barrier.src_stage)
            .src_access_mask(barrier.src_access)
            .dst_stage_mask(barrier.dst_stage)
            .dst_access_mask(barrier.dst_access)
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image)
            .subresource_range(single_subresource_range(barrier.aspect));
        let barriers = [image_barrier];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.handle().cmd_pipeline_barrier2(cmd, &dependency) };
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, config: &RenderingConfig) {
        let bundle = config.build();
        unsafe { self.handle().cmd_begin_rendering(cmd, &bundle.info()) };
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.handle().cmd_end_rendering(cmd) };
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.handle()
                .cmd_bind_descriptor_sets(cmd, bind_point, layout, 0, &[set], &[])
        };
    }

    fn cmd_bind_shaders(
        &self,
        cmd: vk::CommandBuffer,
        stages: &[vk::ShaderStageFlags],
        shaders: &[vk::ShaderEXT],
    ) {
        unsafe {
            self.shader_object_loader()
                .cmd_bind_shaders(cmd, stages, shaders)
        };
    }

    fn cmd_set_draw_state(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        let device = self.handle();
        let ext = self.shader_object_loader();

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            device.cmd_set_viewport_with_count(cmd, &[viewport]);
            device.cmd_set_scissor_with_count(cmd, &[scissor]);
            device.cmd_set_rasterizer_discard_enable(cmd, false);
            device.cmd_set_cull_mode(cmd, vk::CullModeFlags::NONE);
            device.cmd_set_front_face(cmd, vk::FrontFace::COUNTER_CLOCKWISE);
            device.cmd_set_primitive_topology(cmd, vk::PrimitiveTopology::TRIANGLE_LIST);
            device.cmd_set_primitive_restart_enable(cmd, false);
            device.cmd_set_depth_test_enable(cmd, false);
            device.cmd_set_depth_write_enable(cmd, false);
            device.cmd_set_depth_compare_op(cmd, vk::CompareOp::LESS_OR_EQUAL);
            device.cmd_set_depth_bounds_test_enable(cmd, false);
            device.cmd_set_depth_bias_enable(cmd, false);
            device.cmd_set_stencil_test_enable(cmd, false);

            ext.cmd_set_polygon_mode(cmd, vk::PolygonMode::FILL);
            ext.cmd_set_rasterization_samples(cmd, vk::SampleCountFlags::TYPE_1);
            ext.cmd_set_sample_mask(cmd, vk::SampleCountFlags::TYPE_1, &[u32::MAX]);
            ext.cmd_set_alpha_to_coverage_enable(cmd, false);
            ext.cmd_set_color_blend_enable(cmd, 0, &[vk::FALSE]);
            ext.cmd_set_color_write_mask(cmd, 0, &[vk::ColorComponentFlags::RGBA]);
            // Fullscreen passes generate vertices from gl_VertexIndex.
            ext.cmd_set_vertex_input(cmd, &[], &[]);
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.handle()
                .cmd_push_constants(cmd, layout, stages, offset, data)
        };
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.handle().cmd_draw(cmd, vertex_count, instance_count, 0, 0) };
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
        filter: vk::Filter,
    ) {
        let layers = vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);
        let corner = |extent: vk::Extent2D| vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        };
        let region = vk::ImageBlit::default()
            .src_subresource(layers)
            .src_offsets([vk::Offset3D::default(), corner(src_extent)])
            .dst_subresource(layers)
            .dst_offsets([vk::Offset3D::default(), corner(dst_extent)]);

        unsafe {
            self.handle().cmd_blit_image(
                cmd,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                filter,
            )
        };
    }

    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    ) {
        let value = vk::ClearColorValue { float32: color };
        unsafe {
            self.handle().cmd_clear_color_image(
                cmd,
                image,
                layout,
                &value,
                &[single_subresource_range(vk::ImageAspectFlags::COLOR)],
            )
        };
    }

    // =========================================================================
    // Surface and swapchain
    // =========================================================================

    fn surface_support(&self, surface: vk::SurfaceKHR) -> RhiResult<SurfaceSupport> {
        let loader = self.surface_loader();
        let physical_device = self.physical_device();
        let query = |e: vk::Result| RhiError::SurfaceError(format!("Surface query failed: {e}"));

        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(query)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(query)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(query)?,
            })
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<vk::SwapchainKHR> {
        let families = self.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::SwapchainError(
                "Queue families not resolved".to_string(),
            ));
        };
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, indices) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);

        unsafe {
            self.swapchain_loader()
                .create_swapchain(&create_info, None)
                .map_err(|e| RhiError::SwapchainError(format!("Swapchain creation failed: {e}")))
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        Ok(unsafe { self.swapchain_loader().get_swapchain_images(swapchain)? })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader().destroy_swapchain(swapchain, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquiredImage, vk::Result> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader().acquire_next_image(
                swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )?
        };
        Ok(AcquiredImage { index, suboptimal })
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let _queues = self.lock_queues();
        unsafe {
            self.swapchain_loader()
                .queue_present(self.present_queue(), &present_info)
        }
    }

    // =========================================================================
    // Images
    // =========================================================================

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<AllocatedImage> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let device = self.handle();
        let image = unsafe { device.create_image(&image_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocation = {
            let mut guard = self.allocator();
            let allocator = guard.as_mut().ok_or_else(allocator_gone);
            allocator.and_then(|allocator| {
                allocator
                    .allocate(&AllocationCreateDesc {
                        name: desc.name,
                        requirements,
                        location: MemoryLocation::GpuOnly,
                        linear: false,
                        allocation_scheme: if desc.dedicated {
                            AllocationScheme::DedicatedImage(image)
                        } else {
                            AllocationScheme::GpuAllocatorManaged
                        },
                    })
                    .map_err(RhiError::from)
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) };
        let allocated = AllocatedImage { image, allocation };
        if let Err(e) = bound {
            self.destroy_image(allocated);
            return Err(e.into());
        }

        Ok(allocated)
    }

    fn destroy_image(&self, image: AllocatedImage) {
        let AllocatedImage { image, allocation } = image;
        if let Some(allocator) = self.allocator().as_mut()
            && let Err(e) = allocator.free(allocation)
        {
            error!("Failed to free image allocation: {e}");
        }
        unsafe { self.handle().destroy_image(image, None) };
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(single_subresource_range(aspect));
        Ok(unsafe { self.handle().create_image_view(&info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.handle().destroy_image_view(view, None) };
    }

    // =========================================================================
    // Descriptors, layouts and shaders
    // =========================================================================

    fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(sizes);
        Ok(unsafe { self.handle().create_descriptor_pool(&info, None)? })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.handle().destroy_descriptor_pool(pool, None) };
    }

    fn create_descriptor_set_layout(
        &self,
        flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[BindingDesc],
    ) -> RhiResult<vk::DescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.ty)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();
        let binding_flags: Vec<vk::DescriptorBindingFlags> =
            bindings.iter().map(|b| b.flags).collect();

        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(flags)
            .bindings(&vk_bindings)
            .push_next(&mut flags_info);

        Ok(unsafe { self.handle().create_descriptor_set_layout(&info, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.handle().destroy_descriptor_set_layout(layout, None) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let counts = [variable_count.unwrap_or(0)];
        let mut variable_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
                .descriptor_counts(&counts);

        let mut info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        if variable_count.is_some() {
            info = info.push_next(&mut variable_info);
        }

        let sets = unsafe { self.handle().allocate_descriptor_sets(&info)? };
        sets.into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("No descriptor set allocated".to_string()))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let image_infos: Vec<vk::DescriptorImageInfo> = writes
            .iter()
            .map(|w| match w.resource {
                DescriptorResource::Image { view, layout } => vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .image_layout(layout),
                DescriptorResource::Sampler(sampler) => {
                    vk::DescriptorImageInfo::default().sampler(sampler)
                }
                DescriptorResource::Buffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect();
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = writes
            .iter()
            .map(|w| match w.resource {
                DescriptorResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(offset)
                    .range(range),
                _ => vk::DescriptorBufferInfo::default(),
            })
            .collect();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(w.set)
                    .dst_binding(w.binding)
                    .dst_array_element(w.array_element)
                    .descriptor_type(w.ty);
                match w.resource {
                    DescriptorResource::Buffer { .. } => {
                        write.buffer_info(std::slice::from_ref(&buffer_infos[i]))
                    }
                    _ => write.image_info(std::slice::from_ref(&image_infos[i])),
                }
            })
            .collect();

        unsafe { self.handle().update_descriptor_sets(&vk_writes, &[]) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        Ok(unsafe { self.handle().create_pipeline_layout(&info, None)? })
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.handle().destroy_pipeline_layout(layout, None) };
    }

    fn create_pipeline_cache(&self) -> RhiResult<vk::PipelineCache> {
        let info = vk::PipelineCacheCreateInfo::default();
        Ok(unsafe { self.handle().create_pipeline_cache(&info, None)? })
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        unsafe { self.handle().destroy_pipeline_cache(cache, None) };
    }

    fn create_shader(&self, desc: &ShaderObjectDesc<'_>) -> RhiResult<vk::ShaderEXT> {
        let set_layouts = [desc.set_layout];
        let push_ranges = [desc.push_constant_range];
        let info = vk::ShaderCreateInfoEXT::default()
            .stage(desc.stage)
            .next_stage(desc.next_stage)
            .code_type(vk::ShaderCodeTypeEXT::SPIRV)
            .code(bytemuck::cast_slice(desc.code))
            .name(desc.entry_point)
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_ranges);

        let loader = self.shader_object_loader();
        let mut shader = vk::ShaderEXT::null();
        unsafe {
            (loader.fp().create_shaders_ext)(loader.device(), 1, &info, ptr::null(), &mut shader)
                .result()
                .map_err(|e| {
                    RhiError::ShaderError(format!(
                        "Shader object creation failed for {:?}: {e}",
                        desc.stage
                    ))
                })?;
        }
        Ok(shader)
    }

    fn destroy_shader(&self, shader: vk::ShaderEXT) {
        unsafe { self.shader_object_loader().destroy_shader(shader, None) };
    }
}
