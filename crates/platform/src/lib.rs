//! Platform abstraction layer for the Vulkan renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Vulkan surface creation from raw window handles
//! - The window extent signal the render thread blocks on while minimized

mod extent;
mod window;

pub use extent::ExtentSignal;
pub use window::{Surface, Window, WindowSurface};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
