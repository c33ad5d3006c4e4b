//! Dynamic rendering descriptions (Vulkan 1.3).
//!
//! A render pass is described by an explicit attachment list instead of a
//! precompiled `VkRenderPass`/`VkFramebuffer` pair. [`RenderingConfig`] is the
//! value handed across the [`crate::Gpu`] seam; [`RenderingInfoBundle`] owns
//! the `vk::RenderingAttachmentInfo` array so the borrowed
//! `vk::RenderingInfo` can be built from it.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use lumen_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//!
//! # fn example(hdr_view: vk::ImageView, depth_view: vk::ImageView) {
//! let config = RenderingConfig::from_extent(vk::Extent2D { width: 1920, height: 1080 })
//!     .with_color_attachment(ColorAttachment::new(hdr_view).with_clear_color([0.0, 0.0, 0.0, 1.0]))
//!     .with_depth_attachment(DepthAttachment::new(depth_view).with_clear_depth(1.0));
//!
//! let bundle = config.build();
//! let _info = bundle.info();
//! # }
//! ```

use ash::vk;

/// A color attachment of a dynamic rendering pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Clear-on-load, store, in `COLOR_ATTACHMENT_OPTIMAL`.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    #[inline]
    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// The depth attachment of a dynamic rendering pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
}

impl DepthAttachment {
    /// Clear-on-load to 1.0, contents discarded after the pass.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_depth: 1.0,
        }
    }

    #[inline]
    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }

    #[inline]
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    #[inline]
    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Everything needed to begin one dynamic rendering pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderingConfig {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub render_area: vk::Rect2D,
}

impl RenderingConfig {
    #[inline]
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_attachment: None,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        }
    }

    #[inline]
    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    #[inline]
    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: self
                .color_attachments
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            depth_attachment: self
                .depth_attachment
                .as_ref()
                .map(DepthAttachment::to_rendering_attachment_info),
            render_area: self.render_area,
        }
    }
}

/// Owned attachment infos backing a `vk::RenderingInfo`.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn test_color_attachment_defaults_to_clear_and_store() {
        let attachment = ColorAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_color_clear_value_reaches_vulkan_struct() {
        let info = ColorAttachment::new(vk::ImageView::null())
            .with_clear_color([0.25, 0.5, 0.75, 1.0])
            .to_rendering_attachment_info();
        let clear = unsafe { info.clear_value.color.float32 };
        assert_eq!(clear, [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
    }

    #[test]
    fn test_depth_attachment_defaults() {
        let attachment = DepthAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(attachment.clear_depth, 1.0);
    }

    #[test]
    fn test_config_covers_full_extent() {
        let config = RenderingConfig::from_extent(EXTENT);
        assert_eq!(config.render_area.offset.x, 0);
        assert_eq!(config.render_area.offset.y, 0);
        assert_eq!(config.extent(), EXTENT);
        assert!(config.color_attachments.is_empty());
        assert!(config.depth_attachment.is_none());
    }

    #[test]
    fn test_bundle_info_counts_attachments() {
        let config = RenderingConfig::from_extent(EXTENT)
            .with_color_attachment(ColorAttachment::new(vk::ImageView::null()))
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()));
        let bundle = config.build();
        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 1);
        assert!(!info.p_depth_attachment.is_null());
        assert_eq!(info.layer_count, 1);
        assert_eq!(info.render_area.extent, EXTENT);
    }
}
