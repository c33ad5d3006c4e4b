//! Swapchain lifecycle.
//!
//! [`SwapchainManager`] owns the presentable image chain and its views. It
//! registers every image with the [`ResourceLayoutTracker`] as `UNDEFINED`
//! on creation and removes them on destruction, so a recreation always
//! starts a fresh generation of layout records.
//!
//! The out-of-date flag is sticky: it is set by stale or suboptimal
//! acquire/present results and by resize notifications, and only
//! [`SwapchainManager::recreate`] clears it.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use lumen_rhi::image::ImageView;
use lumen_rhi::{AcquiredImage, Gpu, RhiError, RhiResult, SwapchainDesc};

use crate::layout::ResourceLayoutTracker;

/// Usage of every presentable image: rendered to and blitted into.
pub const SWAPCHAIN_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// The presentable image chain of one surface.
pub struct SwapchainManager<G: Gpu> {
    gpu: Arc<G>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<ImageView<G>>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    out_of_date: bool,
    generation: u64,
}

impl<G: Gpu> SwapchainManager<G> {
    /// A manager with no swapchain yet.
    pub fn new(gpu: Arc<G>) -> Self {
        Self {
            gpu,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            out_of_date: false,
            generation: 0,
        }
    }

    /// Build the image chain for `surface`.
    ///
    /// # Errors
    ///
    /// Any failure leaves no swapchain alive.
    pub fn create(
        &mut self,
        surface: vk::SurfaceKHR,
        desired_extent: vk::Extent2D,
        tracker: &mut ResourceLayoutTracker,
    ) -> RhiResult<()> {
        debug_assert!(self.is_destroyed(), "create on a live swapchain");

        let support = self.gpu.surface_support(surface)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }
        let capabilities = &support.capabilities;
        if !capabilities
            .supported_usage_flags
            .contains(SWAPCHAIN_IMAGE_USAGE)
        {
            return Err(RhiError::MissingFeature(format!(
                "Surface does not support image usage {:?}",
                SWAPCHAIN_IMAGE_USAGE
            )));
        }

        let format = choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::SwapchainError("Surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(capabilities, desired_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "Degenerate swapchain extent {}x{}",
                extent.width, extent.height
            )));
        }
        let image_count = determine_image_count(capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            image_count
        );

        let swapchain = self.gpu.create_swapchain(&SwapchainDesc {
            surface,
            image_count,
            format,
            extent,
            usage: SWAPCHAIN_IMAGE_USAGE,
            present_mode,
            pre_transform: capabilities.current_transform,
            old_swapchain: vk::SwapchainKHR::null(),
        })?;
        self.swapchain = swapchain;
        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;

        if let Err(e) = self.create_images() {
            self.destroy(tracker);
            return Err(e);
        }

        for &image in &self.images {
            tracker.track(image, vk::ImageAspectFlags::COLOR);
        }

        info!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    fn create_images(&mut self) -> RhiResult<()> {
        self.images = self.gpu.swapchain_images(self.swapchain)?;
        self.views = self
            .images
            .iter()
            .map(|&image| {
                ImageView::new(
                    self.gpu.clone(),
                    image,
                    self.format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<RhiResult<Vec<_>>>()
            .map_err(|e| RhiError::SwapchainError(format!("Failed to create image view: {e}")))?;
        debug!("Created {} image views", self.views.len());
        Ok(())
    }

    /// Release views, then the chain. A no-op on a never-created manager.
    pub fn destroy(&mut self, tracker: &mut ResourceLayoutTracker) {
        for &image in &self.images {
            tracker.untrack(image);
        }
        self.images.clear();
        self.views.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            self.gpu.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
            debug!("Swapchain destroyed");
        }
    }

    /// Replace the chain with one for the current surface state.
    ///
    /// The GPU must be idle.
    pub fn recreate(
        &mut self,
        surface: vk::SurfaceKHR,
        desired_extent: vk::Extent2D,
        tracker: &mut ResourceLayoutTracker,
    ) -> RhiResult<()> {
        self.destroy(tracker);
        self.create(surface, desired_extent, tracker)?;
        self.out_of_date = false;
        self.generation += 1;
        info!(
            "Swapchain recreated (generation {}): {}x{}",
            self.generation, self.extent.width, self.extent.height
        );
        Ok(())
    }

    #[inline]
    pub fn mark_out_of_date(&mut self) {
        if !self.out_of_date {
            debug!("Swapchain marked out of date");
        }
        self.out_of_date = true;
    }

    #[inline]
    pub fn is_out_of_date(&self) -> bool {
        self.out_of_date
    }

    /// Acquire the next presentable image, signaling `semaphore`.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> Result<AcquiredImage, vk::Result> {
        self.gpu.acquire_next_image(self.swapchain, semaphore)
    }

    /// Present `image_index` once `wait` is signaled. `Ok(true)` means
    /// suboptimal.
    pub fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<bool, vk::Result> {
        self.gpu.present(self.swapchain, image_index, wait)
    }

    /// Clear a presentable image and leave it ready to present.
    pub fn record_clear(
        &self,
        tracker: &mut ResourceLayoutTracker,
        cmd: vk::CommandBuffer,
        image_index: u32,
        color: [f32; 4],
    ) {
        let Some(image) = self.image(image_index) else {
            warn!("record_clear: image index {image_index} out of range");
            return;
        };

        tracker.transition(
            self.gpu.as_ref(),
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        );
        self.gpu
            .cmd_clear_color_image(cmd, image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, color);
        tracker.transition(
            self.gpu.as_ref(),
            cmd,
            image,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::NONE,
        );
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.swapchain == vk::SwapchainKHR::null()
    }

    #[inline]
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    #[inline]
    pub fn view(&self, index: u32) -> Option<vk::ImageView> {
        self.views.get(index as usize).map(ImageView::handle)
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.format.color_space
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of completed recreations.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<G: Gpu> Drop for SwapchainManager<G> {
    fn drop(&mut self) {
        self.views.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            self.gpu.destroy_swapchain(self.swapchain);
            debug!("Swapchain destroyed");
        }
    }
}

/// Prefers B8G8R8A8_SRGB, then B8G8R8A8_UNORM, both in SRGB_NONLINEAR;
/// otherwise the first reported format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    const PREFERRED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

    for wanted in PREFERRED {
        if let Some(&format) = formats.iter().find(|f| {
            f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            debug!("Selected surface format {:?} with SRGB_NONLINEAR", wanted);
            return Some(format);
        }
    }

    let first = formats.first().copied();
    if let Some(format) = first {
        warn!("Using first available surface format: {:?}", format.format);
    }
    first
}

/// Prefers MAILBOX, then IMMEDIATE, then FIFO (always available).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent, or `desired` clamped to the surface limits
/// when the surface leaves the choice to the swapchain.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, clamped to the maximum when there is one.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_unorm_second() {
        let formats = vec![
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_requires_nonlinear_space() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            surface_format(vk::Format::R8G8B8A8_UNORM),
        ];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            selected.color_space,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT
        );
    }

    #[test]
    fn test_choose_surface_format_empty() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_immediate_before_fifo() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn test_choose_present_mode_fallback_to_fifo() {
        let modes = vec![vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };
        let extent = |width, height| choose_extent(&capabilities, vk::Extent2D { width, height });

        assert_eq!(
            extent(3000, 3000),
            vk::Extent2D {
                width: 2000,
                height: 2000
            }
        );
        assert_eq!(
            extent(50, 50),
            vk::Extent2D {
                width: 100,
                height: 100
            }
        );
        assert_eq!(
            extent(800, 600),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn test_determine_image_count() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        // 0 means no limit
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 4);
    }
}
