//! Offscreen attachments rendered into before present.
//!
//! Every frame draws into an HDR color target and a depth buffer, then the
//! HDR target is blitted into the presentable image. Both attachments are
//! recreated together with the swapchain, at the swapchain's extent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::{vk, Gpu, RhiResult};
//! use lumen_renderer::layout::ResourceLayoutTracker;
//! use lumen_renderer::targets::OffscreenTargets;
//!
//! # fn example<G: Gpu>(gpu: Arc<G>) -> RhiResult<()> {
//! let mut tracker = ResourceLayoutTracker::new();
//! let targets = OffscreenTargets::create(
//!     gpu,
//!     vk::Extent2D { width: 1920, height: 1080 },
//!     &mut tracker,
//! )?;
//! assert_eq!(targets.hdr().extent(), targets.depth().extent());
//! targets.destroy(&mut tracker);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{info, warn};

use lumen_rhi::image::{GpuImage, depth_aspect};
use lumen_rhi::{Gpu, ImageDesc, RhiResult};

use crate::layout::ResourceLayoutTracker;

/// Format of the HDR color target.
pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Used when no candidate reports depth attachment support.
pub const FALLBACK_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Usage of the HDR target: drawn to, sampled, written from compute and
/// blitted out of.
pub const HDR_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::SAMPLED.as_raw()
        | vk::ImageUsageFlags::STORAGE.as_raw()
        | vk::ImageUsageFlags::TRANSFER_SRC.as_raw(),
);

/// First candidate whose optimal-tiling features pass `supports`.
pub fn select_depth_format(
    candidates: &[vk::Format],
    supports: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> vk::Format {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            supports(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .unwrap_or_else(|| {
            warn!(
                "No depth format supports optimal-tiling attachment use, falling back to {:?}",
                FALLBACK_DEPTH_FORMAT
            );
            FALLBACK_DEPTH_FORMAT
        })
}

/// Depth format the device can render to.
pub fn find_depth_format<G: Gpu>(gpu: &G) -> vk::Format {
    select_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
        gpu.format_properties(format).optimal_tiling_features
    })
}

/// Attachment layout for a depth format.
pub fn depth_attachment_layout(format: vk::Format) -> vk::ImageLayout {
    if depth_aspect(format).contains(vk::ImageAspectFlags::STENCIL) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
    }
}

/// The depth buffer and HDR color target of one swapchain generation.
pub struct OffscreenTargets<G: Gpu> {
    depth: GpuImage<G>,
    hdr: GpuImage<G>,
    extent: vk::Extent2D,
}

impl<G: Gpu> OffscreenTargets<G> {
    /// Allocate both attachments at `extent` with dedicated memory and
    /// register them with the tracker as `UNDEFINED`.
    pub fn create(
        gpu: Arc<G>,
        extent: vk::Extent2D,
        tracker: &mut ResourceLayoutTracker,
    ) -> RhiResult<Self> {
        let depth_format = find_depth_format(gpu.as_ref());
        let depth = GpuImage::new(
            gpu.clone(),
            &ImageDesc {
                name: "depth_target",
                extent,
                format: depth_format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                dedicated: true,
            },
            depth_aspect(depth_format),
        )?;
        let hdr = GpuImage::new(
            gpu,
            &ImageDesc {
                name: "hdr_target",
                extent,
                format: HDR_FORMAT,
                usage: HDR_USAGE,
                dedicated: true,
            },
            vk::ImageAspectFlags::COLOR,
        )?;

        tracker.track(depth.image(), depth.aspect());
        tracker.track(hdr.image(), hdr.aspect());

        info!(
            "Offscreen targets created: {}x{}, depth {:?}, color {:?}",
            extent.width, extent.height, depth_format, HDR_FORMAT
        );

        Ok(Self { depth, hdr, extent })
    }

    /// Forget both attachments in the tracker and release them.
    pub fn destroy(self, tracker: &mut ResourceLayoutTracker) {
        tracker.untrack(self.depth.image());
        tracker.untrack(self.hdr.image());
    }

    #[inline]
    pub fn depth(&self) -> &GpuImage<G> {
        &self.depth
    }

    #[inline]
    pub fn hdr(&self) -> &GpuImage<G> {
        &self.hdr
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Attachment layout of the depth buffer.
    #[inline]
    pub fn depth_layout(&self) -> vk::ImageLayout {
        depth_attachment_layout(self.depth.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_depth_format_prefers_first_supported() {
        let format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D32_SFLOAT_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            }
        });
        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);

        let format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        });
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_select_depth_format_falls_back() {
        let format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| {
            vk::FormatFeatureFlags::SAMPLED_IMAGE
        });
        assert_eq!(format, FALLBACK_DEPTH_FORMAT);
    }

    #[test]
    fn test_depth_attachment_layout() {
        assert_eq!(
            depth_attachment_layout(vk::Format::D32_SFLOAT),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            depth_attachment_layout(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_hdr_usage_covers_blit_source() {
        assert!(HDR_USAGE.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(HDR_USAGE.contains(vk::ImageUsageFlags::STORAGE));
    }
}
