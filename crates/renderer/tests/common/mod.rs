//! Recording GPU double for frame-protocol tests.
//!
//! `MockGpu` executes every submission instantly: the submission's fence is
//! signaled and its timeline value reached as soon as `submit` returns. It
//! panics on protocol violations a real driver would turn into a hang or a
//! validation error:
//!
//! - waiting on a fence that is neither signaled nor pending
//! - submitting with a fence that is still signaled
//! - submitting a command buffer that is still recording
//! - signaling a binary semaphore that is already signaled, or waiting on
//!   one that is not
//! - destroying a handle twice
//!
//! Creation calls and `submit` can be scripted to fail once with
//! [`MockGpu::fail_after`].

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk::{self, Handle};
use gpu_allocator::vulkan::Allocation;

use lumen_core::RendererConfig;
use lumen_renderer::shaders::{ShaderDesc, ShaderDiagnostic, ShaderFrontEnd};
use lumen_renderer::{Renderer, SurfaceProvider};
use lumen_rhi::rendering::RenderingConfig;
use lumen_rhi::shader::{SPIRV_MAGIC, ShaderObject};
use lumen_rhi::{
    AcquiredImage, AllocatedImage, BindingDesc, DescriptorWrite, Gpu, ImageBarrier, ImageDesc,
    RhiResult, ShaderObjectDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};

pub const SURFACE: u64 = 0x5_0000;

/// Result returned by operations scripted to fail.
pub const INJECTED_FAILURE: vk::Result = vk::Result::ERROR_OUT_OF_DEVICE_MEMORY;

pub fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

/// A recorded GPU call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WaitIdle,
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Submit {
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
        timeline_value: Option<u64>,
    },
    Barrier(ImageBarrier),
    BeginRendering {
        extent: vk::Extent2D,
        color_attachments: usize,
        has_depth: bool,
    },
    EndRendering,
    BindDescriptorSet(vk::DescriptorSet),
    BindShaders(Vec<vk::ShaderEXT>),
    SetDrawState(vk::Extent2D),
    PushConstants(usize),
    Draw(u32),
    Blit {
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
        filter: vk::Filter,
    },
    ClearColor(vk::Image),
    CreateSwapchain(vk::Extent2D),
    DestroySwapchain(vk::SwapchainKHR),
    Acquire(vk::Semaphore),
    Present {
        image_index: u32,
        wait: vk::Semaphore,
    },
    CreateImage(&'static str, vk::Extent2D),
    UpdateDescriptors(Vec<DescriptorWrite>),
}

#[derive(Debug)]
struct State {
    next_handle: u64,
    live: HashMap<u64, &'static str>,
    calls: Vec<Call>,

    fences: HashMap<u64, bool>,
    signaled_semaphores: HashSet<u64>,
    timelines: HashMap<u64, u64>,

    recording: HashSet<u64>,
    max_recording: usize,

    surface: SurfaceSupport,
    swapchains: HashMap<u64, Vec<vk::Image>>,
    next_image: u32,
    acquire_script: VecDeque<Result<AcquiredImage, vk::Result>>,
    present_script: VecDeque<Result<bool, vk::Result>>,

    images: HashMap<u64, ImageDesc>,
    /// Remaining successes before an operation fails once.
    failures: HashMap<&'static str, usize>,
}

impl State {
    fn handle(&mut self, kind: &'static str) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.insert(raw, kind);
        raw
    }

    fn release(&mut self, raw: u64, kind: &str) {
        match self.live.remove(&raw) {
            Some(found) => assert_eq!(found, kind, "destroyed {raw:#x} as the wrong kind"),
            None => panic!("{kind} {raw:#x} destroyed twice or never created"),
        }
    }

    fn check_failure(&mut self, op: &'static str) -> Result<(), vk::Result> {
        let Some(remaining) = self.failures.get(op).copied() else {
            return Ok(());
        };
        if remaining == 0 {
            self.failures.remove(op);
            Err(INJECTED_FAILURE)
        } else {
            self.failures.insert(op, remaining - 1);
            Ok(())
        }
    }

    fn signal(&mut self, semaphore: vk::Semaphore) {
        assert!(
            self.signaled_semaphores.insert(semaphore.as_raw()),
            "semaphore {semaphore:?} signaled while already signaled"
        );
    }

    fn consume(&mut self, semaphore: vk::Semaphore, what: &str) {
        assert!(
            self.signaled_semaphores.remove(&semaphore.as_raw()),
            "{what} waits on unsignaled semaphore {semaphore:?}"
        );
    }
}

/// Recording implementation of [`Gpu`].
#[derive(Debug)]
pub struct MockGpu {
    state: Mutex<State>,
}

impl MockGpu {
    pub fn new(surface_extent: vk::Extent2D) -> Arc<Self> {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: surface_extent,
            min_image_extent: extent(1, 1),
            max_image_extent: extent(8192, 8192),
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            ..Default::default()
        };

        Arc::new(Self {
            state: Mutex::new(State {
                next_handle: 0x1000,
                live: HashMap::new(),
                calls: Vec::new(),
                fences: HashMap::new(),
                signaled_semaphores: HashSet::new(),
                timelines: HashMap::new(),
                recording: HashSet::new(),
                max_recording: 0,
                surface: SurfaceSupport {
                    capabilities,
                    formats: vec![
                        vk::SurfaceFormatKHR {
                            format: vk::Format::R8G8B8A8_UNORM,
                            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                        },
                        vk::SurfaceFormatKHR {
                            format: vk::Format::B8G8R8A8_SRGB,
                            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                        },
                    ],
                    present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                },
                swapchains: HashMap::new(),
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                images: HashMap::new(),
                failures: HashMap::new(),
            }),
        })
    }

    // A failed assertion poisons the lock; teardown still needs it.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    pub fn set_surface_extent(&self, surface_extent: vk::Extent2D) {
        self.state().surface.capabilities.current_extent = surface_extent;
    }

    pub fn set_surface_support(&self, support: SurfaceSupport) {
        self.state().surface = support;
    }

    /// Queue a result for a future acquire, ahead of the default
    /// round-robin behavior.
    pub fn script_acquire(&self, result: Result<AcquiredImage, vk::Result>) {
        self.state().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: Result<bool, vk::Result>) {
        self.state().present_script.push_back(result);
    }

    /// Let `op` succeed `successes` more times, then fail once with
    /// [`INJECTED_FAILURE`]. `op` is the [`Gpu`] method name.
    pub fn fail_after(&self, op: &'static str, successes: usize) {
        self.state().failures.insert(op, successes);
    }

    pub fn fail_next(&self, op: &'static str) {
        self.fail_after(op, 0);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|call| pred(call)).count()
    }

    pub fn submits(&self) -> usize {
        self.count(|call| matches!(call, Call::Submit { .. }))
    }

    pub fn presents(&self) -> usize {
        self.count(|call| matches!(call, Call::Present { .. }))
    }

    pub fn barriers(&self) -> Vec<ImageBarrier> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Barrier(barrier) => Some(*barrier),
                _ => None,
            })
            .collect()
    }

    /// Handles created and not yet destroyed, with their kinds.
    pub fn live_handles(&self) -> Vec<(u64, &'static str)> {
        let mut live: Vec<_> = self.state().live.iter().map(|(&h, &k)| (h, k)).collect();
        live.sort_unstable();
        live
    }

    pub fn live_count(&self, kind: &str) -> usize {
        self.state().live.values().filter(|&&k| k == kind).count()
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state().fences.get(&fence.as_raw()).copied().unwrap_or(false)
    }

    pub fn is_recording(&self, cmd: vk::CommandBuffer) -> bool {
        self.state().recording.contains(&cmd.as_raw())
    }

    /// Largest number of command buffers ever recording at once.
    pub fn max_concurrent_recording(&self) -> usize {
        self.state().max_recording
    }

    pub fn image_desc(&self, image: vk::Image) -> Option<ImageDesc> {
        self.state().images.get(&image.as_raw()).copied()
    }
}

impl Gpu for MockGpu {
    fn wait_idle(&self) -> RhiResult<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn format_properties(&self, _format: vk::Format) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::FormatFeatureFlags::COLOR_ATTACHMENT,
            ..Default::default()
        }
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        let mut state = self.state();
        state.check_failure("create_semaphore")?;
        Ok(vk::Semaphore::from_raw(state.handle("semaphore")))
    }

    fn create_timeline_semaphore(&self, initial_value: u64) -> RhiResult<vk::Semaphore> {
        let mut state = self.state();
        state.check_failure("create_timeline_semaphore")?;
        let raw = state.handle("semaphore");
        state.timelines.insert(raw, initial_value);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn semaphore_counter_value(&self, semaphore: vk::Semaphore) -> RhiResult<u64> {
        Ok(self
            .state()
            .timelines
            .get(&semaphore.as_raw())
            .copied()
            .unwrap_or(0))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state();
        state.release(semaphore.as_raw(), "semaphore");
        state.signaled_semaphores.remove(&semaphore.as_raw());
        state.timelines.remove(&semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let mut state = self.state();
        state.check_failure("create_fence")?;
        let raw = state.handle("fence");
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> RhiResult<()> {
        let mut state = self.state();
        state.calls.push(Call::WaitFence(fence));
        assert!(
            state.fences.get(&fence.as_raw()).copied().unwrap_or(false),
            "waiting on unsignaled fence {fence:?} with no pending submission"
        );
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()> {
        let mut state = self.state();
        state.calls.push(Call::ResetFence(fence));
        state.fences.insert(fence.as_raw(), false);
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> RhiResult<bool> {
        Ok(self.is_fence_signaled(fence))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.release(fence.as_raw(), "fence");
        state.fences.remove(&fence.as_raw());
    }

    fn create_command_pool(
        &self,
        _flags: vk::CommandPoolCreateFlags,
    ) -> RhiResult<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(self.state().handle("command_pool")))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state().release(pool.as_raw(), "command_pool");
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer> {
        let mut state = self.state();
        state.next_handle += 1;
        Ok(vk::CommandBuffer::from_raw(state.next_handle))
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let mut state = self.state();
        assert!(
            !state.recording.contains(&cmd.as_raw()),
            "reset of recording command buffer"
        );
        state.calls.push(Call::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        let mut state = self.state();
        assert!(
            state.recording.insert(cmd.as_raw()),
            "begin on a command buffer already recording"
        );
        state.max_recording = state.max_recording.max(state.recording.len());
        state.calls.push(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let mut state = self.state();
        assert!(
            state.recording.remove(&cmd.as_raw()),
            "end on a command buffer that is not recording"
        );
        state.calls.push(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn submit(&self, desc: &SubmitDesc) -> Result<(), vk::Result> {
        let mut state = self.state();
        state.check_failure("submit")?;
        assert!(
            !state.recording.contains(&desc.command_buffer.as_raw()),
            "submitting a command buffer that is still recording"
        );
        assert_eq!(
            state.fences.get(&desc.fence.as_raw()),
            Some(&false),
            "submit fence must be unsignaled"
        );

        state.consume(desc.wait_semaphore, "submit");
        state.signal(desc.signal_semaphore);
        state.fences.insert(desc.fence.as_raw(), true);
        if let Some((timeline, value)) = desc.timeline_signal {
            let current = state.timelines.entry(timeline.as_raw()).or_insert(0);
            assert!(value > *current, "timeline values must increase");
            *current = value;
        }

        state.calls.push(Call::Submit {
            cmd: desc.command_buffer,
            wait: desc.wait_semaphore,
            signal: desc.signal_semaphore,
            fence: desc.fence,
            timeline_value: desc.timeline_signal.map(|(_, value)| value),
        });
        Ok(())
    }

    fn cmd_image_barrier(&self, _cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.record(Call::Barrier(*barrier));
    }

    fn cmd_begin_rendering(&self, _cmd: vk::CommandBuffer, config: &RenderingConfig) {
        self.record(Call::BeginRendering {
            extent: config.extent(),
            color_attachments: config.color_attachments.len(),
            has_depth: config.depth_attachment.is_some(),
        });
    }

    fn cmd_end_rendering(&self, _cmd: vk::CommandBuffer) {
        self.record(Call::EndRendering);
    }

    fn cmd_bind_descriptor_set(
        &self,
        _cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.record(Call::BindDescriptorSet(set));
    }

    fn cmd_bind_shaders(
        &self,
        _cmd: vk::CommandBuffer,
        stages: &[vk::ShaderStageFlags],
        shaders: &[vk::ShaderEXT],
    ) {
        assert_eq!(stages.len(), shaders.len());
        self.record(Call::BindShaders(shaders.to_vec()));
    }

    fn cmd_set_draw_state(&self, _cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        self.record(Call::SetDrawState(extent));
    }

    fn cmd_push_constants(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        _offset: u32,
        data: &[u8],
    ) {
        self.record(Call::PushConstants(data.len()));
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32, _instance_count: u32) {
        self.record(Call::Draw(vertex_count));
    }

    fn cmd_blit_image(
        &self,
        _cmd: vk::CommandBuffer,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
        filter: vk::Filter,
    ) {
        self.record(Call::Blit {
            src,
            src_extent,
            dst,
            dst_extent,
            filter,
        });
    }

    fn cmd_clear_color_image(
        &self,
        _cmd: vk::CommandBuffer,
        image: vk::Image,
        _layout: vk::ImageLayout,
        _color: [f32; 4],
    ) {
        self.record(Call::ClearColor(image));
    }

    fn surface_support(&self, _surface: vk::SurfaceKHR) -> RhiResult<SurfaceSupport> {
        Ok(self.state().surface.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<vk::SwapchainKHR> {
        let mut state = self.state();
        state.check_failure("create_swapchain")?;
        let raw = state.handle("swapchain");
        let images: Vec<vk::Image> = (0..desc.image_count)
            .map(|_| {
                state.next_handle += 1;
                vk::Image::from_raw(state.next_handle)
            })
            .collect();
        state.swapchains.insert(raw, images);
        state.next_image = 0;
        state.calls.push(Call::CreateSwapchain(desc.extent));
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        Ok(self
            .state()
            .swapchains
            .get(&swapchain.as_raw())
            .cloned()
            .unwrap_or_default())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        state.release(swapchain.as_raw(), "swapchain");
        state.swapchains.remove(&swapchain.as_raw());
        state.calls.push(Call::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquiredImage, vk::Result> {
        let mut state = self.state();
        state.calls.push(Call::Acquire(signal));

        let result = match state.acquire_script.pop_front() {
            Some(scripted) => scripted,
            None => {
                let count = state
                    .swapchains
                    .get(&swapchain.as_raw())
                    .map_or(0, Vec::len) as u32;
                assert!(count > 0, "acquire on a destroyed swapchain");
                let index = state.next_image % count;
                state.next_image = (index + 1) % count;
                Ok(AcquiredImage {
                    index,
                    suboptimal: false,
                })
            }
        };

        if result.is_ok() {
            state.signal(signal);
        }
        result
    }

    fn present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let mut state = self.state();
        state.calls.push(Call::Present { image_index, wait });

        let result = state.present_script.pop_front().unwrap_or(Ok(false));
        if result.is_ok() {
            state.consume(wait, "present");
        }
        result
    }

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<AllocatedImage> {
        let mut state = self.state();
        state.check_failure("create_image")?;
        let raw = state.handle("image");
        state.images.insert(raw, *desc);
        state.calls.push(Call::CreateImage(desc.name, desc.extent));
        Ok(AllocatedImage {
            image: vk::Image::from_raw(raw),
            allocation: Allocation::default(),
        })
    }

    fn destroy_image(&self, image: AllocatedImage) {
        let mut state = self.state();
        state.release(image.image.as_raw(), "image");
        state.images.remove(&image.image.as_raw());
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> RhiResult<vk::ImageView> {
        let mut state = self.state();
        state.check_failure("create_image_view")?;
        Ok(vk::ImageView::from_raw(state.handle("image_view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().release(view.as_raw(), "image_view");
    }

    fn create_descriptor_pool(
        &self,
        _flags: vk::DescriptorPoolCreateFlags,
        _max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<vk::DescriptorPool> {
        let mut state = self.state();
        state.check_failure("create_descriptor_pool")?;
        assert!(
            sizes.iter().all(|size| size.descriptor_count > 0),
            "descriptor pool sized with a zero count"
        );
        Ok(vk::DescriptorPool::from_raw(state.handle("descriptor_pool")))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state().release(pool.as_raw(), "descriptor_pool");
    }

    fn create_descriptor_set_layout(
        &self,
        _flags: vk::DescriptorSetLayoutCreateFlags,
        bindings: &[BindingDesc],
    ) -> RhiResult<vk::DescriptorSetLayout> {
        let variable = bindings
            .iter()
            .filter(|b| {
                b.flags
                    .contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
            })
            .count();
        assert!(variable <= 1, "at most one variable-count binding");
        Ok(vk::DescriptorSetLayout::from_raw(
            self.state().handle("descriptor_set_layout"),
        ))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state().release(layout.as_raw(), "descriptor_set_layout");
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
        _variable_count: Option<u32>,
    ) -> RhiResult<vk::DescriptorSet> {
        let mut state = self.state();
        state.next_handle += 1;
        Ok(vk::DescriptorSet::from_raw(state.next_handle))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        self.record(Call::UpdateDescriptors(writes.to_vec()));
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<vk::PipelineLayout> {
        Ok(vk::PipelineLayout::from_raw(
            self.state().handle("pipeline_layout"),
        ))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state().release(layout.as_raw(), "pipeline_layout");
    }

    fn create_pipeline_cache(&self) -> RhiResult<vk::PipelineCache> {
        Ok(vk::PipelineCache::from_raw(
            self.state().handle("pipeline_cache"),
        ))
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        self.state().release(cache.as_raw(), "pipeline_cache");
    }

    fn create_shader(&self, desc: &ShaderObjectDesc<'_>) -> RhiResult<vk::ShaderEXT> {
        assert_eq!(desc.code.first(), Some(&SPIRV_MAGIC));
        Ok(vk::ShaderEXT::from_raw(self.state().handle("shader")))
    }

    fn destroy_shader(&self, shader: vk::ShaderEXT) {
        self.state().release(shader.as_raw(), "shader");
    }
}

/// Surface whose size is set by the test.
#[derive(Debug)]
pub struct MockSurface {
    extent: Mutex<vk::Extent2D>,
    /// Results handed out by successive blocking waits.
    wakeups: Mutex<VecDeque<Option<vk::Extent2D>>>,
    waits: AtomicUsize,
}

impl MockSurface {
    pub fn new(surface_extent: vk::Extent2D) -> Arc<Self> {
        Arc::new(Self {
            extent: Mutex::new(surface_extent),
            wakeups: Mutex::new(VecDeque::new()),
            waits: AtomicUsize::new(0),
        })
    }

    pub fn set_extent(&self, surface_extent: vk::Extent2D) {
        *self.extent.lock().unwrap() = surface_extent;
    }

    /// The next blocking wait returns `wakeup`, and the surface takes that
    /// size when it is `Some`.
    pub fn push_wakeup(&self, wakeup: Option<vk::Extent2D>) {
        self.wakeups.lock().unwrap().push_back(wakeup);
    }

    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

impl SurfaceProvider for MockSurface {
    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(SURFACE)
    }

    fn current_extent(&self) -> vk::Extent2D {
        *self.extent.lock().unwrap()
    }

    fn wait_for_presentable_extent(&self) -> Option<vk::Extent2D> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        let wakeup = self.wakeups.lock().unwrap().pop_front();
        match wakeup {
            Some(Some(restored)) => {
                self.set_extent(restored);
                Some(restored)
            }
            Some(None) => None,
            None => {
                let current = self.current_extent();
                (current.width > 0 && current.height > 0).then_some(current)
            }
        }
    }
}

/// Front-end that builds shader objects from a stub module, or always fails.
pub struct MockFrontEnd {
    gpu: Arc<MockGpu>,
    fail: bool,
}

impl MockFrontEnd {
    pub fn new(gpu: Arc<MockGpu>) -> Self {
        Self { gpu, fail: false }
    }

    pub fn failing(gpu: Arc<MockGpu>) -> Self {
        Self { gpu, fail: true }
    }
}

impl ShaderFrontEnd<MockGpu> for MockFrontEnd {
    fn create_shader(
        &self,
        desc: &ShaderDesc,
        set_layout: vk::DescriptorSetLayout,
        push_constant_range: vk::PushConstantRange,
    ) -> Result<ShaderObject<MockGpu>, ShaderDiagnostic> {
        if self.fail {
            return Err(ShaderDiagnostic::NotFound {
                file: desc.file.clone(),
                path: format!("shaders/{}.spv", desc.file).into(),
            });
        }
        Ok(ShaderObject::new(
            self.gpu.clone(),
            desc.stage,
            &[SPIRV_MAGIC, 0x0001_0600],
            &desc.entry_point,
            set_layout,
            push_constant_range,
        )?)
    }
}

/// A renderer over the mock GPU and surface.
pub struct Harness {
    pub gpu: Arc<MockGpu>,
    pub surface: Arc<MockSurface>,
    pub renderer: Renderer<MockGpu>,
}

impl Harness {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_config(width, height, &RendererConfig::default())
    }

    pub fn with_config(width: u32, height: u32, config: &RendererConfig) -> Self {
        let gpu = MockGpu::new(extent(width, height));
        let surface = MockSurface::new(extent(width, height));
        let front_end = MockFrontEnd::new(gpu.clone());
        let renderer = Renderer::initialize(gpu.clone(), surface.clone(), config, &front_end)
            .expect("renderer initializes on the mock GPU");
        Self {
            gpu,
            surface,
            renderer,
        }
    }

    /// Change the output size the way a window resize would.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.set_surface_extent(extent(width, height));
        self.surface.set_extent(extent(width, height));
    }
}
