//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides:
//! - The [`Gpu`] seam the frame core is written against
//! - Instance, physical device and logical device bootstrap on `ash`
//! - Scoped wrappers that release Vulkan objects through [`Gpu`] on drop
//! - Dynamic rendering descriptions

mod error;
mod gpu;
mod vulkan;

pub mod command;
pub mod descriptor;
pub mod device;
pub mod diagnostics;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod shader;
pub mod sync;

pub use error::{RhiError, RhiResult};
pub use gpu::{
    AcquiredImage, AllocatedImage, BindingDesc, DescriptorResource, DescriptorWrite, Gpu,
    ImageBarrier, ImageDesc, ShaderObjectDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};

// Re-export ash types that users might need
pub use ash::vk;
