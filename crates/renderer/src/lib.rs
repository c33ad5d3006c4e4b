//! Frame-execution core.
//!
//! This crate turns "render one frame" requests into ordered, synchronized
//! GPU submissions:
//! - Per-image layout tracking and barrier derivation
//! - Swapchain lifecycle and out-of-date recovery
//! - Offscreen HDR and depth targets
//! - The global bindless descriptor set
//! - A ring of frames in flight
//! - Frame orchestration and pacing

pub mod bindless;
pub mod frame_ring;
pub mod layout;
pub mod overlay;
pub mod pacer;
pub mod push_constants;
mod renderer;
pub mod shaders;
pub mod surface;
pub mod swapchain;
pub mod targets;

pub use frame_ring::{FRAMES_IN_FLIGHT, FrameRing};
pub use renderer::{FrameStatus, Renderer, SkipReason};
pub use surface::SurfaceProvider;
