//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the GPU layer and the frame core built on it.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error outside the per-frame path
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A device feature or extension the renderer depends on is missing
    #[error("Missing device feature: {0}")]
    MissingFeature(String),

    /// Shader loading or shader object creation error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain creation error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Swapchain image acquisition failed with a non-recoverable result
    #[error("Failed to acquire swapchain image: {0}")]
    AcquireFailed(vk::Result),

    /// Queue submission failed
    #[error("Queue submit failed: {0}")]
    SubmitFailed(vk::Result),

    /// Presentation failed with a non-recoverable result
    #[error("Present failed: {0}")]
    PresentFailed(vk::Result),

    /// Rebuilding the swapchain or offscreen targets failed mid-run
    #[error("Swapchain recreation failed: {0}")]
    RecreateFailed(#[source] Box<RhiError>),

    /// The presentation surface went away while waiting for a usable size
    #[error("Presentation surface closed")]
    SurfaceClosed,

    /// Renderer configuration rejected before any GPU object was built
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl RhiError {
    /// Whether this error happened on the per-frame path and requires the
    /// renderer to shut down.
    pub fn is_fatal_at_runtime(&self) -> bool {
        matches!(
            self,
            RhiError::AcquireFailed(_)
                | RhiError::SubmitFailed(_)
                | RhiError::PresentFailed(_)
                | RhiError::RecreateFailed(_)
                | RhiError::SurfaceClosed
                | RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_path_errors_are_fatal() {
        assert!(RhiError::AcquireFailed(vk::Result::ERROR_SURFACE_LOST_KHR).is_fatal_at_runtime());
        assert!(RhiError::SubmitFailed(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).is_fatal_at_runtime());
        assert!(RhiError::PresentFailed(vk::Result::ERROR_SURFACE_LOST_KHR).is_fatal_at_runtime());
        assert!(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST).is_fatal_at_runtime());
        assert!(
            RhiError::RecreateFailed(Box::new(RhiError::SwapchainError("views".into())))
                .is_fatal_at_runtime()
        );
    }

    #[test]
    fn test_init_errors_are_not_runtime_fatal() {
        assert!(!RhiError::NoSuitableGpu.is_fatal_at_runtime());
        assert!(!RhiError::ShaderError("missing".into()).is_fatal_at_runtime());
        assert!(!RhiError::InvalidConfig("push_constant_size".into()).is_fatal_at_runtime());
    }

    #[test]
    fn test_display_names_the_failed_operation() {
        let err = RhiError::PresentFailed(vk::Result::ERROR_SURFACE_LOST_KHR);
        assert!(err.to_string().starts_with("Present failed"));
    }
}
