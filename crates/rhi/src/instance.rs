//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and the debug
//! messenger. Messenger output goes to the [`DiagnosticSink`] supplied at
//! creation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::diagnostics::TracingSink;
//! use lumen_rhi::instance::{Instance, InstanceDesc};
//!
//! # fn example(surface_extensions: &[*const std::ffi::c_char]) -> lumen_rhi::RhiResult<()> {
//! let instance = Instance::new(
//!     &InstanceDesc {
//!         app_name: "lumen",
//!         enable_validation: cfg!(debug_assertions),
//!         surface_extensions,
//!     },
//!     Arc::new(TracingSink),
//! )?;
//! let _vk_instance = instance.handle();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::Arc;

use ash::{Entry, vk};
use tracing::{info, warn};

use crate::diagnostics::{DiagnosticSink, Severity};
use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

const ENGINE_NAME: &CStr = c"lumen";

/// Instance creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct InstanceDesc<'a> {
    pub app_name: &'a str,
    pub enable_validation: bool,
    /// Surface extensions the display requires, as reported by
    /// `ash_window::enumerate_required_extensions`.
    pub surface_extensions: &'a [*const c_char],
}

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    // Boxed so the messenger's user-data pointer stays stable.
    sink: Box<Arc<dyn DiagnosticSink>>,
}

impl Instance {
    /// Creates a new Vulkan 1.3 instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Required extensions are not available
    /// - Instance creation fails
    /// - Debug messenger setup fails (when validation is enabled)
    pub fn new(desc: &InstanceDesc<'_>, sink: Arc<dyn DiagnosticSink>) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            desc.enable_validation && Self::is_validation_layer_available(&entry)?;
        if desc.enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_name = CString::new(desc.app_name).unwrap_or_else(|_| ENGINE_NAME.to_owned());
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = Self::required_extensions(desc.surface_extensions);
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(RhiError::from)?
        };

        info!("Vulkan instance created successfully (API version 1.3)");

        let sink = Box::new(sink);
        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let user_data = &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void;
            match Self::setup_debug_messenger(&debug_utils, user_data) {
                Ok(messenger) => {
                    info!("Validation layers enabled");
                    (Some(debug_utils), Some(messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
            sink,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// The sink driver messages are routed to.
    #[inline]
    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    /// The base surface extension plus whatever the display needs,
    /// without duplicates.
    fn required_extensions(surface_extensions: &[*const c_char]) -> Vec<*const c_char> {
        let mut extensions = vec![ash::khr::surface::NAME.as_ptr()];
        for &ext in surface_extensions {
            let name = unsafe { CStr::from_ptr(ext) };
            if name != ash::khr::surface::NAME {
                extensions.push(ext);
            }
        }
        extensions
    }

    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let found = available_layers.iter().any(|layer| {
            let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            layer_name == VALIDATION_LAYER_NAME
        });

        Ok(found)
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
        user_data: *mut c_void,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(user_data);

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(RhiError::from)?
        };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            // Destroy debug messenger before instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

fn severity_from_vk(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Severity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Severity::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

/// Debug messenger callback.
///
/// # Safety
///
/// `user_data` must point at the `Arc<dyn DiagnosticSink>` owned by the
/// [`Instance`] that created the messenger.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    let sink = unsafe { &*(user_data as *const Arc<dyn DiagnosticSink>) };
    sink.report(
        severity_from_vk(message_severity),
        &format!("[{type_str}] {message}"),
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
            Severity::Error
        );
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING),
            Severity::Warning
        );
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::INFO),
            Severity::Info
        );
        assert_eq!(
            severity_from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            Severity::Verbose
        );
    }

    #[test]
    fn test_required_extensions_deduplicates_surface() {
        let display = [
            ash::khr::surface::NAME.as_ptr(),
            ash::khr::xlib_surface::NAME.as_ptr(),
        ];
        let extensions = Instance::required_extensions(&display);
        assert_eq!(extensions.len(), 2);
        let names: Vec<&CStr> = extensions
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect();
        assert_eq!(names[0], ash::khr::surface::NAME);
        assert_eq!(names[1], ash::khr::xlib_surface::NAME);
    }

    #[test]
    fn test_instance_creation_without_validation() {
        // Requires a Vulkan loader
        let desc = InstanceDesc {
            app_name: "lumen-test",
            enable_validation: false,
            surface_extensions: &[],
        };
        match Instance::new(&desc, Arc::new(crate::diagnostics::TracingSink)) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
