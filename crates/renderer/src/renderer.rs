//! Frame orchestration.
//!
//! [`Renderer`] composes one frame out of the other components:
//!
//! 1. Recreate the swapchain and offscreen targets if they are stale or
//!    the surface changed size, blocking while the window has no area.
//! 2. Pace, then wait for the current frame slot and begin recording.
//! 3. Acquire a presentable image. An out-of-date surface aborts the frame
//!    before anything is submitted.
//! 4. Draw into the HDR and depth targets with dynamic rendering.
//! 5. Blit the HDR target into the presentable image.
//! 6. Submit and present.
//!
//! # Resource Destruction Order
//!
//! Dropping a renderer waits for the device to go idle, then releases
//! fields in declaration order: shader objects and overlay, frame slots,
//! offscreen targets, the swapchain, and finally the bindless registry.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use lumen_core::RendererConfig;
use lumen_core::config::ShaderEntry;
use lumen_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use lumen_rhi::shader::{ShaderObject, ShaderStage};
use lumen_rhi::{AcquiredImage, Gpu, RhiError, RhiResult};

use crate::bindless::BindlessRegistry;
use crate::frame_ring::{FrameRing, PresentOutcome};
use crate::layout::ResourceLayoutTracker;
use crate::overlay::OverlayPass;
use crate::pacer::FramePacer;
use crate::push_constants::FramePushConstants;
use crate::shaders::{ShaderDesc, ShaderFrontEnd};
use crate::surface::{SurfaceProvider, is_presentable};
use crate::swapchain::SwapchainManager;
use crate::targets::OffscreenTargets;

/// Vertices of the fullscreen triangle drawn by the scene shaders.
const FULLSCREEN_TRIANGLE_VERTICES: u32 = 3;

/// Why a frame was not presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Acquire reported an out-of-date surface; nothing was submitted.
    OutOfDate,
}

/// Result of [`Renderer::render_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and handed to present. An out-of-date or
    /// suboptimal present still counts; the swapchain is recreated before
    /// the next frame.
    Presented { slot: usize, image_index: u32 },
    Skipped(SkipReason),
}

impl FrameStatus {
    #[inline]
    pub fn is_presented(&self) -> bool {
        matches!(self, FrameStatus::Presented { .. })
    }
}

struct SceneShaders<G: Gpu> {
    vertex: ShaderObject<G>,
    fragment: ShaderObject<G>,
}

/// The frame-execution core.
pub struct Renderer<G: Gpu> {
    shaders: Option<SceneShaders<G>>,
    overlay: Option<Box<dyn OverlayPass<G>>>,
    frame_ring: FrameRing<G>,
    targets: Option<OffscreenTargets<G>>,
    swapchain: SwapchainManager<G>,
    bindless: BindlessRegistry<G>,
    tracker: ResourceLayoutTracker,
    pacer: FramePacer,
    surface: Arc<dyn SurfaceProvider>,
    clear_color: [f32; 4],
    pending_resize: Option<vk::Extent2D>,
    /// Surface size the current swapchain was built for.
    requested_extent: vk::Extent2D,
    frames_presented: u64,
    idle: bool,
    gpu: Arc<G>,
}

impl<G: Gpu> Renderer<G> {
    /// Build every device-dependent object for `surface`.
    ///
    /// Blocks while the surface has no area. Missing or broken scene
    /// shaders are logged and the renderer falls back to clearing.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidConfig`] before any GPU object is built if
    /// `config` fails validation. Otherwise any failure building the
    /// swapchain, targets, bindless set or frame slots. Objects built
    /// before the failure are released.
    pub fn initialize(
        gpu: Arc<G>,
        surface: Arc<dyn SurfaceProvider>,
        config: &RendererConfig,
        shader_front_end: &dyn ShaderFrontEnd<G>,
    ) -> RhiResult<Self> {
        config
            .validate()
            .map_err(|e| RhiError::InvalidConfig(e.to_string()))?;

        let mut extent = surface.current_extent();
        if !is_presentable(extent) {
            info!("Surface has no area, waiting before initialization");
            extent = surface
                .wait_for_presentable_extent()
                .ok_or(RhiError::SurfaceClosed)?;
        }

        let mut tracker = ResourceLayoutTracker::new();
        let bindless =
            BindlessRegistry::create(gpu.clone(), config.bindless, config.push_constant_size)?;

        let mut swapchain = SwapchainManager::new(gpu.clone());
        swapchain.create(surface.surface(), extent, &mut tracker)?;
        let targets = OffscreenTargets::create(gpu.clone(), swapchain.extent(), &mut tracker)?;
        let frame_ring = FrameRing::new(gpu.clone())?;

        let shaders = load_scene_shaders(
            shader_front_end,
            &config.shaders.vertex,
            &config.shaders.fragment,
            &bindless,
        );

        info!(
            "Renderer initialized: {}x{}, {} swapchain images",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );

        Ok(Self {
            shaders,
            overlay: None,
            frame_ring,
            targets: Some(targets),
            swapchain,
            bindless,
            tracker,
            pacer: FramePacer::new(config.target_fps),
            surface,
            clear_color: config.clear_color,
            pending_resize: None,
            requested_extent: extent,
            frames_presented: 0,
            idle: false,
            gpu,
        })
    }

    /// Wait for the device to finish all work. Resources are released
    /// when `self` drops at the end of this call.
    pub fn shutdown(mut self) -> RhiResult<()> {
        self.gpu.wait_idle()?;
        self.idle = true;
        info!(
            "Renderer shutting down after {} presented frames",
            self.frames_presented
        );
        Ok(())
    }

    pub fn set_overlay(&mut self, overlay: Box<dyn OverlayPass<G>>) {
        self.overlay = Some(overlay);
    }

    pub fn clear_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn set_target_fps(&mut self, target_fps: Option<u32>) {
        self.pacer.set_target_fps(target_fps);
    }

    /// Request recreation at `extent` before the next frame. A zero-sized
    /// extent blocks until the surface has area again.
    pub fn notify_resized(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        let extent = if is_presentable(extent) {
            extent
        } else {
            debug!("Resize to an empty extent, waiting for the surface");
            self.surface
                .wait_for_presentable_extent()
                .ok_or(RhiError::SurfaceClosed)?
        };

        debug!("Resize requested: {}x{}", extent.width, extent.height);
        self.pending_resize = Some(extent);
        self.swapchain.mark_out_of_date();
        Ok(())
    }

    /// Render and present one frame. `time` is handed to the shaders.
    ///
    /// # Errors
    ///
    /// Acquire, submit or present failures other than an out-of-date
    /// surface, and [`RhiError::RecreateFailed`] for any failure rebuilding
    /// the swapchain or targets. These are fatal.
    /// [`RhiError::SurfaceClosed`] if the surface closes while minimized.
    pub fn render_frame(&mut self, time: f32) -> RhiResult<FrameStatus> {
        let surface_extent = self.surface.current_extent();
        if surface_extent != self.requested_extent && self.pending_resize.is_none() {
            debug!(
                "Surface size changed to {}x{} without a resize notification",
                surface_extent.width, surface_extent.height
            );
            self.swapchain.mark_out_of_date();
        }
        if self.swapchain.is_out_of_date() || self.pending_resize.is_some() {
            self.recreate().map_err(|e| match e {
                RhiError::SurfaceClosed => e,
                other => RhiError::RecreateFailed(Box::new(other)),
            })?;
        }

        self.pacer.pace();
        let cmd = self.frame_ring.begin()?;

        let image_acquired = self.frame_ring.current_slot().image_acquired();
        let image_index = match self.swapchain.acquire_next_image(image_acquired) {
            Ok(AcquiredImage { index, suboptimal }) => {
                if suboptimal {
                    debug!("Acquire returned a suboptimal image");
                    self.swapchain.mark_out_of_date();
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire, skipping frame");
                self.frame_ring.abort()?;
                self.swapchain.mark_out_of_date();
                return Ok(FrameStatus::Skipped(SkipReason::OutOfDate));
            }
            Err(e) => {
                if let Err(abort_err) = self.frame_ring.abort() {
                    warn!("Failed to close aborted frame: {abort_err}");
                }
                return Err(RhiError::AcquireFailed(e));
            }
        };

        self.record_scene(cmd, time)?;
        self.record_present_blit(cmd, image_index)?;

        let slot = self.frame_ring.current_index();
        match self.frame_ring.end(&self.swapchain, image_index)? {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                self.swapchain.mark_out_of_date();
            }
        }

        self.frames_presented += 1;
        Ok(FrameStatus::Presented { slot, image_index })
    }

    /// Rebuild the swapchain and offscreen targets for the current surface
    /// size. The device is idle throughout.
    fn recreate(&mut self) -> RhiResult<()> {
        let mut extent = self
            .pending_resize
            .take()
            .unwrap_or_else(|| self.surface.current_extent());
        if !is_presentable(extent) {
            debug!("Surface has no area, waiting before recreation");
            extent = self
                .surface
                .wait_for_presentable_extent()
                .ok_or(RhiError::SurfaceClosed)?;
        }

        self.gpu.wait_idle()?;

        self.requested_extent = extent;
        if let Some(targets) = self.targets.take() {
            targets.destroy(&mut self.tracker);
        }
        self.swapchain
            .recreate(self.surface.surface(), extent, &mut self.tracker)?;
        self.targets = Some(OffscreenTargets::create(
            self.gpu.clone(),
            self.swapchain.extent(),
            &mut self.tracker,
        )?);
        // Only swapchain and offscreen images are tracked
        self.tracker.reset_all();
        self.frame_ring.reset_semaphores()?;

        debug_assert_eq!(
            self.targets.as_ref().map(OffscreenTargets::extent),
            Some(self.swapchain.extent())
        );
        Ok(())
    }

    fn record_scene(&mut self, cmd: vk::CommandBuffer, time: f32) -> RhiResult<()> {
        let targets = self.targets.as_ref().ok_or_else(missing_targets)?;
        let extent = targets.extent();
        let gpu = self.gpu.as_ref();

        self.tracker.transition(
            gpu,
            cmd,
            targets.hdr().image(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        );
        let depth_stage = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
        let depth_access = vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
        let depth_transitioned = self.tracker.transition(
            gpu,
            cmd,
            targets.depth().image(),
            targets.depth_layout(),
            depth_stage,
            depth_access,
        );
        if !depth_transitioned {
            // Both slots clear the same depth image.
            self.tracker.serialize(
                gpu,
                cmd,
                targets.depth().image(),
                depth_stage,
                depth_access,
            );
        }

        let rendering = RenderingConfig::from_extent(extent)
            .with_color_attachment(
                ColorAttachment::new(targets.hdr().view()).with_clear_color(self.clear_color),
            )
            .with_depth_attachment(
                DepthAttachment::new(targets.depth().view()).with_layout(targets.depth_layout()),
            );
        gpu.cmd_begin_rendering(cmd, &rendering);

        if let Some(shaders) = &self.shaders {
            self.bindless.bind(cmd, vk::PipelineBindPoint::GRAPHICS);
            gpu.cmd_bind_shaders(
                cmd,
                &[vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT],
                &[shaders.vertex.handle(), shaders.fragment.handle()],
            );
            gpu.cmd_set_draw_state(cmd, extent);
            self.bindless
                .push_constants(cmd, FramePushConstants::new(time, extent).as_bytes());
            gpu.cmd_draw(cmd, FULLSCREEN_TRIANGLE_VERTICES, 1);
        }

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.record(gpu, cmd, extent);
        }

        gpu.cmd_end_rendering(cmd);
        Ok(())
    }

    fn record_present_blit(&mut self, cmd: vk::CommandBuffer, image_index: u32) -> RhiResult<()> {
        let targets = self.targets.as_ref().ok_or_else(missing_targets)?;
        let image = self.swapchain.image(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("Swapchain image index {image_index} out of range"))
        })?;
        let gpu = self.gpu.as_ref();

        self.tracker.transition(
            gpu,
            cmd,
            targets.hdr().image(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
        );
        self.tracker.transition(
            gpu,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        );

        gpu.cmd_blit_image(
            cmd,
            targets.hdr().image(),
            targets.extent(),
            image,
            self.swapchain.extent(),
            vk::Filter::LINEAR,
        );

        self.tracker.transition(
            gpu,
            cmd,
            image,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::NONE,
        );
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn gpu(&self) -> &Arc<G> {
        &self.gpu
    }

    #[inline]
    pub fn swapchain(&self) -> &SwapchainManager<G> {
        &self.swapchain
    }

    #[inline]
    pub fn targets(&self) -> Option<&OffscreenTargets<G>> {
        self.targets.as_ref()
    }

    #[inline]
    pub fn tracker(&self) -> &ResourceLayoutTracker {
        &self.tracker
    }

    #[inline]
    pub fn bindless(&self) -> &BindlessRegistry<G> {
        &self.bindless
    }

    /// Mutable access for slot allocation; descriptor writes only need
    /// [`Self::bindless`].
    #[inline]
    pub fn bindless_mut(&mut self) -> &mut BindlessRegistry<G> {
        &mut self.bindless
    }

    #[inline]
    pub fn frame_ring(&self) -> &FrameRing<G> {
        &self.frame_ring
    }

    /// Slot the next frame will record into.
    #[inline]
    pub fn current_slot_index(&self) -> usize {
        self.frame_ring.current_index()
    }

    #[inline]
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn has_scene_shaders(&self) -> bool {
        self.shaders.is_some()
    }
}

impl<G: Gpu> Drop for Renderer<G> {
    fn drop(&mut self) {
        if !self.idle
            && let Err(e) = self.gpu.wait_idle()
        {
            error!("Failed to wait for device idle during renderer drop: {e}");
        }
    }
}

fn missing_targets() -> RhiError {
    RhiError::InvalidHandle("Offscreen targets are not available".to_string())
}

fn load_scene_shaders<G: Gpu>(
    front_end: &dyn ShaderFrontEnd<G>,
    vertex: &ShaderEntry,
    fragment: &ShaderEntry,
    bindless: &BindlessRegistry<G>,
) -> Option<SceneShaders<G>> {
    let build = |entry: &ShaderEntry, stage: ShaderStage| {
        front_end.create_shader(
            &ShaderDesc::new(&entry.file, &entry.entry_point, stage),
            bindless.set_layout(),
            bindless.push_constant_range(),
        )
    };

    match (
        build(vertex, ShaderStage::Vertex),
        build(fragment, ShaderStage::Fragment),
    ) {
        (Ok(vertex), Ok(fragment)) => Some(SceneShaders { vertex, fragment }),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Scene shaders unavailable, rendering clear-only: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_status_is_presented() {
        assert!(
            FrameStatus::Presented {
                slot: 0,
                image_index: 2
            }
            .is_presented()
        );
        assert!(!FrameStatus::Skipped(SkipReason::OutOfDate).is_presented());
    }
}
