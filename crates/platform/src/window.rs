//! Window management using winit.
//!
//! This module provides window creation and Vulkan surface creation functionality.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use lumen_core::config::WindowConfig;
use lumen_core::{Error, Result};
use lumen_renderer::SurfaceProvider;
use lumen_rhi::RhiError;
use lumen_rhi::instance::Instance;

use crate::extent::ExtentSignal;

/// RAII wrapper for a Vulkan surface.
///
/// Holds the instance it was created from, so the instance is destroyed
/// only after the surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    instance: Arc<Instance>,
}

impl Surface {
    /// The returned handle is valid only as long as this `Surface` exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by ash_window::create_surface on
        // `instance`, which is still alive. Nothing else destroys it.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A Vulkan surface paired with the window's extent signal.
///
/// This is what the renderer sees of the window.
pub struct WindowSurface {
    surface: Surface,
    extent: Arc<ExtentSignal>,
}

impl WindowSurface {
    pub fn new(surface: Surface, extent: Arc<ExtentSignal>) -> Self {
        Self { surface, extent }
    }

    #[inline]
    pub fn vulkan_surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn extent_signal(&self) -> &Arc<ExtentSignal> {
        &self.extent
    }
}

impl SurfaceProvider for WindowSurface {
    fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    fn current_extent(&self) -> vk::Extent2D {
        self.extent.current()
    }

    fn wait_for_presentable_extent(&self) -> Option<vk::Extent2D> {
        self.extent.wait_presentable()
    }
}

/// A window wrapper that provides access to the underlying winit window
/// and raw handles for Vulkan surface creation.
pub struct Window {
    window: Arc<WinitWindow>,
    extent: Arc<ExtentSignal>,
}

impl Window {
    /// Create a resizable window from `config`.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        let size = window.inner_size();
        tracing::info!("Window created: {}x{}", size.width, size.height);

        Ok(Self {
            window: Arc::new(window),
            extent: Arc::new(ExtentSignal::new(size.width, size.height)),
        })
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    pub fn extent_signal(&self) -> &Arc<ExtentSignal> {
        &self.extent
    }

    /// Forward a resize event to the render thread.
    pub fn resize(&self, width: u32, height: u32) {
        tracing::debug!("Window resized: {}x{}", width, height);
        self.extent.resize(width, height);
    }

    /// Tell the render thread the window is going away.
    pub fn close(&self) {
        self.extent.close();
    }

    /// Instance extensions needed to present to this window.
    pub fn required_extensions(&self) -> Result<&'static [*const c_char]> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| {
                Error::Window(format!("Failed to enumerate required extensions: {}", e))
            })?;

        tracing::debug!(
            "Required Vulkan extensions for surface: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns valid, null-terminated static
                // strings.
                .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions)
    }

    /// Create a Vulkan surface for this window on `instance`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The window or display handle is unavailable
    /// - Vulkan surface creation fails
    pub fn create_surface(
        &self,
        instance: Arc<Instance>,
    ) -> std::result::Result<WindowSurface, RhiError> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: The entry and instance are alive for the duration of the
        // call and the handles come from a live winit window. The surface is
        // destroyed in Surface::drop, before the instance it holds.
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                RhiError::SurfaceError(format!("Failed to create Vulkan surface: {}", e))
            })?
        };

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        tracing::info!("Vulkan surface created successfully");

        Ok(WindowSurface::new(
            Surface {
                handle,
                surface_loader,
                instance,
            },
            self.extent.clone(),
        ))
    }
}
