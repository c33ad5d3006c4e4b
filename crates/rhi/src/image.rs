//! Device-local images and their views.
//!
//! [`GpuImage`] owns an image, the allocation bound to it and one 2D view
//! covering the single mip and layer. Resources are released in reverse
//! order: view, then image and memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::image::GpuImage;
//! use lumen_rhi::{vk, Gpu, ImageDesc, RhiResult};
//!
//! # fn example<G: Gpu>(gpu: Arc<G>) -> RhiResult<()> {
//! let hdr = GpuImage::new(
//!     gpu,
//!     &ImageDesc {
//!         name: "hdr_target",
//!         extent: vk::Extent2D { width: 1920, height: 1080 },
//!         format: vk::Format::R16G16B16A16_SFLOAT,
//!         usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
//!         dedicated: true,
//!     },
//!     vk::ImageAspectFlags::COLOR,
//! )?;
//! let _view = hdr.view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{AllocatedImage, Gpu, ImageDesc};

/// Aspect mask for a depth or depth/stencil format.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// Owned image view.
pub struct ImageView<G: Gpu> {
    gpu: Arc<G>,
    view: vk::ImageView,
}

impl<G: Gpu> ImageView<G> {
    pub fn new(
        gpu: Arc<G>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<Self> {
        let view = gpu.create_image_view(image, format, aspect)?;
        Ok(Self { gpu, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl<G: Gpu> Drop for ImageView<G> {
    fn drop(&mut self) {
        self.gpu.destroy_image_view(self.view);
    }
}

/// A device-local 2D image with a view.
pub struct GpuImage<G: Gpu> {
    gpu: Arc<G>,
    // Option so Drop can hand the allocation back by value.
    image: Option<AllocatedImage>,
    view: Option<ImageView<G>>,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
}

impl<G: Gpu> GpuImage<G> {
    /// Create the image, bind memory and create a view.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is empty or any Vulkan/allocator
    /// call fails. Partially created resources are released.
    pub fn new(gpu: Arc<G>, desc: &ImageDesc, aspect: vk::ImageAspectFlags) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image '{}' dimensions must be greater than 0",
                desc.name
            )));
        }

        let allocated = gpu.create_image(desc)?;
        let view = match ImageView::new(gpu.clone(), allocated.image, desc.format, aspect) {
            Ok(view) => view,
            Err(e) => {
                gpu.destroy_image(allocated);
                return Err(e);
            }
        };

        info!(
            "Created image '{}': {}x{} ({:?})",
            desc.name, desc.extent.width, desc.extent.height, desc.format
        );

        Ok(Self {
            gpu,
            image: Some(allocated),
            view: Some(view),
            format: desc.format,
            extent: desc.extent,
            aspect,
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
            .as_ref()
            .map_or(vk::Image::null(), |allocated| allocated.image)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
            .as_ref()
            .map_or(vk::ImageView::null(), ImageView::handle)
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }
}

impl<G: Gpu> Drop for GpuImage<G> {
    fn drop(&mut self) {
        drop(self.view.take());
        if let Some(allocated) = self.image.take() {
            self.gpu.destroy_image(allocated);
        }
        debug!("Destroyed image ({:?})", self.format);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_aspect() {
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
