//! Hook for drawing inside the scene pass.

use ash::vk;

use lumen_rhi::Gpu;

/// Work recorded inside the HDR rendering pass, after the scene draw.
///
/// Implementations must not end the rendering pass or change the layout of
/// the attachments. A debug UI is the typical user.
pub trait OverlayPass<G: Gpu>: Send {
    fn record(&mut self, gpu: &G, cmd: vk::CommandBuffer, extent: vk::Extent2D);
}
