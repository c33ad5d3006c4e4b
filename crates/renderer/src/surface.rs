//! Presentation surface contract.

use ash::vk;

/// Supplies the native surface and the current output size.
///
/// Implemented by the windowing layer; the renderer calls it from its own
/// thread.
pub trait SurfaceProvider: Send + Sync {
    fn surface(&self) -> vk::SurfaceKHR;

    /// Current output size. May be zero while minimized.
    fn current_extent(&self) -> vk::Extent2D;

    /// Block until the output has a non-zero size and return it. `None`
    /// means the surface is going away.
    fn wait_for_presentable_extent(&self) -> Option<vk::Extent2D>;
}

/// Whether a swapchain can be built for `extent`.
#[inline]
pub fn is_presentable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}
