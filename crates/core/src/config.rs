//! Renderer configuration.
//!
//! Configuration is a flat set of serde structs with defaults for every
//! field, so a TOML file only needs to name what it overrides:
//!
//! ```toml
//! app_name = "lumen"
//! target_fps = 144
//! clear_color = [0.02, 0.02, 0.03, 1.0]
//!
//! [bindless]
//! sampled_images = 8192
//!
//! [shaders]
//! directory = "shaders"
//! ```
//!
//! Values are checked by [`RendererConfig::validate`] before any GPU object
//! is built; `load` and `from_toml_str` validate automatically.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound accepted for the shared push-constant range.
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 256;

/// Smallest range that still holds the per-frame block (time + resolution).
pub const MIN_PUSH_CONSTANT_SIZE: u32 = 16;

/// Per-class descriptor capacities of the global bindless set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindlessCapacities {
    pub sampled_images: u32,
    pub samplers: u32,
    pub storage_buffers: u32,
    pub uniform_buffers: u32,
    pub storage_images: u32,
}

impl Default for BindlessCapacities {
    fn default() -> Self {
        Self {
            sampled_images: 16384,
            samplers: 128,
            storage_buffers: 1024,
            uniform_buffers: 256,
            storage_images: 512,
        }
    }
}

/// A single shader stage source: file stem relative to the shader directory
/// plus its entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderEntry {
    pub file: String,
    pub entry_point: String,
}

impl ShaderEntry {
    pub fn new(file: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            entry_point: entry_point.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Directory searched for compiled shaders. Relative paths are probed
    /// from the working directory upward.
    pub directory: PathBuf,
    pub vertex: ShaderEntry,
    pub fragment: ShaderEntry,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("shaders"),
            vertex: ShaderEntry::new("fullscreen.vert", "main"),
            fragment: ShaderEntry::new("gradient.frag", "main"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Top-level configuration consumed by the renderer and the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub app_name: String,
    pub enable_validation: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    /// Frame-rate cap; `None` renders as fast as the present mode allows.
    pub target_fps: Option<u32>,
    /// Clear color of the HDR target.
    pub clear_color: [f32; 4],
    /// Size in bytes of the single push-constant range shared by all draws.
    pub push_constant_size: u32,
    pub bindless: BindlessCapacities,
    pub shaders: ShaderConfig,
    pub window: WindowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "lumen".to_string(),
            enable_validation: cfg!(debug_assertions),
            log_filter: None,
            target_fps: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            push_constant_size: 128,
            bindless: BindlessCapacities::default(),
            shaders: ShaderConfig::default(),
            window: WindowConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded renderer configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field that would otherwise fail deep inside GPU setup.
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("app_name must not be empty".into()));
        }
        if self.target_fps == Some(0) {
            return Err(Error::Config(
                "target_fps must be positive; omit it to disable pacing".into(),
            ));
        }
        if !self.push_constant_size.is_multiple_of(4)
            || !(MIN_PUSH_CONSTANT_SIZE..=MAX_PUSH_CONSTANT_SIZE).contains(&self.push_constant_size)
        {
            return Err(Error::Config(format!(
                "push_constant_size must be a multiple of 4 in {}..={}, got {}",
                MIN_PUSH_CONSTANT_SIZE, MAX_PUSH_CONSTANT_SIZE, self.push_constant_size
            )));
        }

        let caps = &self.bindless;
        for (name, value) in [
            ("sampled_images", caps.sampled_images),
            ("samplers", caps.samplers),
            ("storage_buffers", caps.storage_buffers),
            ("uniform_buffers", caps.uniform_buffers),
            ("storage_images", caps.storage_images),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("bindless.{name} must be non-zero")));
            }
        }

        for (stage, entry) in [
            ("vertex", &self.shaders.vertex),
            ("fragment", &self.shaders.fragment),
        ] {
            if entry.file.is_empty() || entry.entry_point.is_empty() {
                return Err(Error::Config(format!(
                    "shaders.{stage} needs both a file and an entry point"
                )));
            }
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        Ok(())
    }

    pub fn with_target_fps(mut self, fps: Option<u32>) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    pub fn with_bindless(mut self, capacities: BindlessCapacities) -> Self {
        self.bindless = capacities;
        self
    }

    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    pub fn with_push_constant_size(mut self, size: u32) -> Self {
        self.push_constant_size = size;
        self
    }

    /// Frame interval implied by `target_fps`.
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| std::time::Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}
