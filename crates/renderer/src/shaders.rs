//! Shader front-end.
//!
//! The renderer asks a [`ShaderFrontEnd`] for ready-to-bind shader objects
//! linked against the bindless set layout and push-constant range. Failures
//! come back as a [`ShaderDiagnostic`]; the renderer logs them and keeps
//! running without the scene draw.
//!
//! [`SpirvFrontEnd`] loads precompiled `<file>.spv` modules from a shader
//! directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use thiserror::Error;
use tracing::{debug, warn};

use lumen_rhi::shader::{ShaderObject, ShaderStage, spirv_words};
use lumen_rhi::{Gpu, RhiError};

/// How many parent directories are probed for a relative shader directory.
pub const SHADER_DIR_PROBE_DEPTH: usize = 5;

/// One shader stage to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDesc {
    /// File stem relative to the shader directory, e.g. `fullscreen.vert`.
    pub file: String,
    pub entry_point: String,
    pub stage: ShaderStage,
}

impl ShaderDesc {
    pub fn new(file: impl Into<String>, entry_point: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            file: file.into(),
            entry_point: entry_point.into(),
            stage,
        }
    }
}

/// Why a shader could not be built.
#[derive(Error, Debug)]
pub enum ShaderDiagnostic {
    #[error("shader '{file}' not found at {}", path.display())]
    NotFound { file: String, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid SPIR-V in '{file}': {reason}")]
    InvalidModule { file: String, reason: String },

    #[error("shader object creation failed: {0}")]
    Creation(#[from] RhiError),
}

/// Produces shader objects compatible with the bindless pipeline layout.
pub trait ShaderFrontEnd<G: Gpu> {
    fn create_shader(
        &self,
        desc: &ShaderDesc,
        set_layout: vk::DescriptorSetLayout,
        push_constant_range: vk::PushConstantRange,
    ) -> Result<ShaderObject<G>, ShaderDiagnostic>;
}

/// Loads precompiled SPIR-V from a directory.
pub struct SpirvFrontEnd<G: Gpu> {
    gpu: Arc<G>,
    directory: PathBuf,
}

impl<G: Gpu> SpirvFrontEnd<G> {
    /// Resolve `directory` against the working directory and its parents.
    /// An unresolved directory is kept as given and reported when a shader
    /// is requested.
    pub fn new(gpu: Arc<G>, directory: impl AsRef<Path>) -> Self {
        let directory = directory.as_ref();
        let resolved = std::env::current_dir()
            .ok()
            .and_then(|cwd| locate_dir(&cwd, directory));

        let directory = match resolved {
            Some(found) => {
                debug!("Shader directory: {}", found.display());
                found
            }
            None => {
                warn!(
                    "Shader directory '{}' not found from the working directory or its parents",
                    directory.display()
                );
                directory.to_path_buf()
            }
        };

        Self { gpu, directory }
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the compiled module for `file`.
    pub fn module_path(&self, file: &str) -> PathBuf {
        self.directory.join(format!("{file}.spv"))
    }

    fn load_words(&self, file: &str) -> Result<Vec<u32>, ShaderDiagnostic> {
        let path = self.module_path(file);
        if !path.is_file() {
            return Err(ShaderDiagnostic::NotFound {
                file: file.to_string(),
                path,
            });
        }

        let bytes = std::fs::read(&path).map_err(|source| ShaderDiagnostic::Io {
            path: path.clone(),
            source,
        })?;
        spirv_words(&bytes).map_err(|e| ShaderDiagnostic::InvalidModule {
            file: file.to_string(),
            reason: e.to_string(),
        })
    }
}

impl<G: Gpu> ShaderFrontEnd<G> for SpirvFrontEnd<G> {
    fn create_shader(
        &self,
        desc: &ShaderDesc,
        set_layout: vk::DescriptorSetLayout,
        push_constant_range: vk::PushConstantRange,
    ) -> Result<ShaderObject<G>, ShaderDiagnostic> {
        let code = self.load_words(&desc.file)?;
        let shader = ShaderObject::new(
            self.gpu.clone(),
            desc.stage,
            &code,
            &desc.entry_point,
            set_layout,
            push_constant_range,
        )?;
        Ok(shader)
    }
}

/// Find `relative` under `start` or one of its first
/// [`SHADER_DIR_PROBE_DEPTH`] parents. Absolute paths are only checked
/// as-is.
pub fn locate_dir(start: &Path, relative: &Path) -> Option<PathBuf> {
    if relative.is_absolute() {
        return relative.is_dir().then(|| relative.to_path_buf());
    }

    start
        .ancestors()
        .take(SHADER_DIR_PROBE_DEPTH + 1)
        .map(|base| base.join(relative))
        .find(|candidate| candidate.is_dir())
}
