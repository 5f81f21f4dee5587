//! Vulkan context management
//!
//! Error taxonomy for the backend, loader probing and instance creation with
//! optional validation layers.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, CStr, CString};
use thiserror::Error;

use crate::core::config::VulkanRendererConfig;
use crate::render::vulkan::debug::{self, DebugMessenger};
use crate::render::vulkan::shader::ShaderError;
use crate::render::vulkan::window::WindowError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A bring-up phase could not complete
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Device enumeration finished without a suitable GPU
    #[error("No suitable GPU found ({examined} device(s) examined)")]
    NoSuitableDevice {
        /// Number of physical devices that were checked
        examined: usize,
    },

    /// The surface reports no formats at all
    #[error("Surface reports no supported formats")]
    NoSurfaceFormats,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Shader binary could not be loaded
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Convert configured names into owned C strings
pub(crate) fn to_cstrings<S: AsRef<str>>(names: &[S]) -> VulkanResult<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_ref()).map_err(|_| {
                VulkanError::InitializationFailed(format!("Invalid name {:?}", name.as_ref()))
            })
        })
        .collect()
}

/// Load the Vulkan library
pub fn load_entry() -> VulkanResult<Entry> {
    unsafe { Entry::load() }
        .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))
}

/// What the loader offers before any instance exists
#[derive(Debug, Clone, Default)]
pub struct InstanceProbe {
    /// Instance extension names
    pub extensions: Vec<String>,
    /// Instance layer names
    pub layers: Vec<String>,
}

impl InstanceProbe {
    /// Enumerate instance extensions and layers
    pub fn query(entry: &Entry) -> VulkanResult<Self> {
        let extensions = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| {
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let layers = debug::layer_names(
            &entry.enumerate_instance_layer_properties().map_err(VulkanError::Api)?,
        );

        Ok(Self { extensions, layers })
    }
}

/// Instance-level extensions for a given window system list
pub fn required_instance_extensions(window_extensions: &[String], diagnostics: bool) -> Vec<String> {
    let mut extensions = window_extensions.to_vec();
    if diagnostics {
        extensions.push(DebugUtils::name().to_string_lossy().into_owned());
    }
    extensions
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Debug messenger, present only when diagnostics were negotiated
    debug_messenger: Option<DebugMessenger>,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Vulkan entry point
    pub entry: Entry,
}

impl VulkanInstance {
    /// Create a new Vulkan instance
    ///
    /// `window_extensions` is the window system's required list. Validation
    /// layers are enabled only when requested by `config` and every requested
    /// layer is present.
    pub fn new(
        entry: Entry,
        window_extensions: &[String],
        config: &VulkanRendererConfig,
    ) -> VulkanResult<Self> {
        let diagnostics = config.validation_requested()
            && debug::validation_layers_available(&entry, &config.validation_layers);
        if config.validation_requested() && !diagnostics {
            log::warn!("Validation layers requested but not available, continuing without them");
        }

        let app_name = CString::new(config.application_name.as_str()).map_err(|_| {
            VulkanError::InitializationFailed("Application name contains NUL".to_string())
        })?;
        let engine_name = CString::new("none").map_err(|_| {
            VulkanError::InitializationFailed("Engine name contains NUL".to_string())
        })?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 0, 1))
            .api_version(vk::make_api_version(0, config.api_version.0, config.api_version.1, 0));

        let extension_names =
            to_cstrings(&required_instance_extensions(window_extensions, diagnostics))?;
        let extensions: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let layer_names = if diagnostics {
            to_cstrings(&config.validation_layers)?
        } else {
            Vec::new()
        };
        let layers: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        // Chained so instance creation and destruction are covered too
        let mut instance_debug_info = debug::messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if diagnostics {
            create_info = create_info.push_next(&mut instance_debug_info);
        }

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        log::info!(
            "Vulkan instance created ({} extension(s), validation {})",
            extensions.len(),
            if diagnostics { "on" } else { "off" }
        );

        let debug_messenger = if diagnostics {
            DebugMessenger::new(&entry, &instance)
        } else {
            None
        };

        Ok(Self {
            debug_messenger,
            instance,
            entry,
        })
    }

    /// Whether a debug messenger is registered
    pub const fn has_debug_messenger(&self) -> bool {
        self.debug_messenger.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        // Messenger is an instance child
        self.debug_messenger.take();
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_extension_is_appended_only_with_diagnostics() {
        let window = vec!["VK_KHR_surface".to_string(), "VK_KHR_xcb_surface".to_string()];

        let plain = required_instance_extensions(&window, false);
        assert_eq!(plain, window);

        let with_debug = required_instance_extensions(&window, true);
        assert_eq!(with_debug.len(), 3);
        assert_eq!(&with_debug[..2], &window[..]);
        assert_eq!(with_debug[2], "VK_EXT_debug_utils");
    }

    #[test]
    fn test_to_cstrings_rejects_interior_nul() {
        let ok = to_cstrings(&["VK_KHR_swapchain"]).unwrap();
        assert_eq!(ok[0].as_bytes(), b"VK_KHR_swapchain");
        assert!(matches!(
            to_cstrings(&["bad\0name"]),
            Err(VulkanError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = VulkanError::NoSuitableDevice { examined: 2 };
        assert_eq!(err.to_string(), "No suitable GPU found (2 device(s) examined)");
        let err: VulkanError = ShaderError::Empty { path: "a.spv".into() }.into();
        assert!(err.to_string().starts_with("Shader error"));
    }
}
