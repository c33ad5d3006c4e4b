//! Core utilities shared by every lumen crate.
//!
//! This crate provides:
//! - The workspace-level error type
//! - Logging bootstrap on top of `tracing`
//! - Renderer configuration loaded from TOML
//! - A frame clock for driving the render loop

mod clock;
pub mod config;
mod error;
mod logging;

pub use clock::{FrameClock, FrameTime};
pub use config::RendererConfig;
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with};
