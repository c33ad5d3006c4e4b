//! Shader objects (`VK_EXT_shader_object`).
//!
//! Shaders are created as standalone objects linked against the bindless
//! descriptor set layout and the global push constant range, so no
//! graphics pipeline is ever built.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::shader::{spirv_words, ShaderObject, ShaderStage};
//! use lumen_rhi::{vk, Gpu, RhiResult};
//!
//! # fn example<G: Gpu>(
//! #     gpu: Arc<G>,
//! #     bytes: &[u8],
//! #     set_layout: vk::DescriptorSetLayout,
//! #     push_range: vk::PushConstantRange,
//! # ) -> RhiResult<()> {
//! let code = spirv_words(bytes)?;
//! let vertex = ShaderObject::new(gpu, ShaderStage::Vertex, &code, "main", set_layout, push_range)?;
//! let _ = vertex.handle();
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{Gpu, ShaderObjectDesc};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    /// Stage that may follow this one when linking shader objects.
    pub fn next_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Fragment | ShaderStage::Compute => vk::ShaderStageFlags::empty(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reinterpret a SPIR-V binary as little-endian code words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the length is not a multiple of 4
/// or the module does not start with the SPIR-V magic number.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    let code: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match code.first() {
        Some(&SPIRV_MAGIC) => Ok(code),
        Some(word) => Err(RhiError::ShaderError(format!(
            "Not a SPIR-V module (magic {word:#010x})"
        ))),
        None => Err(RhiError::ShaderError("Empty SPIR-V module".to_string())),
    }
}

/// Owned shader object.
pub struct ShaderObject<G: Gpu> {
    gpu: Arc<G>,
    shader: vk::ShaderEXT,
    stage: ShaderStage,
}

impl<G: Gpu> ShaderObject<G> {
    /// Create a shader object linked against `set_layout` and
    /// `push_constant_range`.
    pub fn new(
        gpu: Arc<G>,
        stage: ShaderStage,
        code: &[u32],
        entry_point: &str,
        set_layout: vk::DescriptorSetLayout,
        push_constant_range: vk::PushConstantRange,
    ) -> RhiResult<Self> {
        let entry = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {e}")))?;

        let shader = gpu.create_shader(&ShaderObjectDesc {
            stage: stage.to_vk_stage(),
            next_stage: stage.next_stage(),
            code,
            entry_point: &entry,
            set_layout,
            push_constant_range,
        })?;

        info!("Created {stage} shader object with entry point '{entry_point}'");

        Ok(Self { gpu, shader, stage })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderEXT {
        self.shader
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl<G: Gpu> Drop for ShaderObject<G> {
    fn drop(&mut self) {
        self.gpu.destroy_shader(self.shader);
        debug!("Destroyed {} shader object", self.stage);
    }
}
