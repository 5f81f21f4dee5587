//! # Application Configuration
//!
//! Every name and number the bring-up sequence depends on lives here and is
//! passed explicitly into setup: window geometry, instance metadata, the
//! validation layers to request, the device extensions a GPU must expose,
//! shader locations and frame pacing.
//!
//! `AppConfig` can be loaded from TOML or RON through the [`Config`] trait.
//! Missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// Khronos validation layer name
pub const KHRONOS_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Swapchain device extension name
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// Upper bound on frames in flight accepted by validation
pub const MAX_SUPPORTED_FRAMES_IN_FLIGHT: usize = 8;

/// # Shader Configuration
///
/// Locations of the precompiled SPIR-V binaries for the triangle pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the build output directory first, then a few common locations,
    /// so the binaries work from the workspace root or from a crate directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = [
            "target/shaders/",
            "../target/shaders/",
            "../../target/shaders/",
            "shaders/",
            "./",
        ];

        let resolve = |file: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{dir}{file}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{file}"))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Validate the configuration
    ///
    /// Only checks that paths are present; whether the files load is reported
    /// when the pipeline is built.
    pub fn validate(&self) -> Result<(), String> {
        if self.vertex_shader_path.trim().is_empty() {
            return Err("Vertex shader path cannot be empty".to_string());
        }
        if self.fragment_shader_path.trim().is_empty() {
            return Err("Fragment shader path cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("triangle_vert.spv", "triangle_frag.spv")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl WindowConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "Window size must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "jubilant".to_string(),
            width: 400,
            height: 300,
            resizable: true,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Instance metadata, capability requirements and frame pacing for the
/// Vulkan backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Requested Vulkan API version (major, minor)
    pub api_version: (u32, u32),
    /// Whether to request validation layers; `None` follows the build type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_validation: Option<bool>,
    /// Instance layers requested when validation is enabled
    pub validation_layers: Vec<String>,
    /// Device extensions a GPU must expose to be selected
    pub device_extensions: Vec<String>,
    /// Reject integrated, virtual and CPU devices
    pub require_discrete_gpu: bool,
    /// Maximum frames in flight
    pub max_frames_in_flight: usize,
    /// Clear color for the single color attachment (RGBA)
    pub clear_color: [f32; 4],
    /// Shader configuration
    pub shaders: ShaderConfig,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (0, 0, 1),
            api_version: (1, 3),
            enable_validation: None,
            validation_layers: vec![KHRONOS_VALIDATION_LAYER.to_string()],
            device_extensions: vec![SWAPCHAIN_EXTENSION.to_string()],
            require_discrete_gpu: true,
            max_frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderConfig::default(),
        }
    }

    /// Set application version
    #[must_use]
    pub const fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    #[must_use]
    pub const fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Accept any device type that passes the other checks
    #[must_use]
    pub const fn allow_any_gpu(mut self) -> Self {
        self.require_discrete_gpu = false;
        self
    }

    /// Whether validation layers should be requested
    ///
    /// Defaults to on in debug builds and off in release builds.
    pub fn validation_requested(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.max_frames_in_flight > MAX_SUPPORTED_FRAMES_IN_FLIGHT {
            return Err(format!(
                "Max frames in flight should not exceed {MAX_SUPPORTED_FRAMES_IN_FLIGHT}"
            ));
        }

        if self.api_version.0 != 1 {
            return Err(format!(
                "Unsupported Vulkan API version {}.{}",
                self.api_version.0, self.api_version.1
            ));
        }

        let names = self.validation_layers.iter().chain(&self.device_extensions);
        if let Some(bad) = names.into_iter().find(|name| name.is_empty() || name.contains('\0')) {
            return Err(format!("Invalid layer or extension name: {bad:?}"));
        }

        self.shaders.validate()?;

        Ok(())
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("jubilant triangle")
    }
}

/// # Application Configuration
///
/// Top-level configuration loaded by the triangle binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fallback log level when `RUST_LOG` is not set
    pub log_level: String,
    /// Window settings
    pub window: WindowConfig,
    /// Vulkan backend settings
    pub renderer: VulkanRendererConfig,
}

impl AppConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!("Unknown log level: {}", self.log_level)));
        }
        self.window.validate().map_err(ConfigError::Invalid)?;
        self.renderer.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            renderer: VulkanRendererConfig::default(),
        }
    }
}

impl Config for AppConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("jubilant-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_defaults_match_tutorial_values() {
        let config = AppConfig::default();
        assert_eq!(config.window.title, "jubilant");
        assert_eq!((config.window.width, config.window.height), (400, 300));
        assert_eq!(config.renderer.application_name, "jubilant triangle");
        assert_eq!(config.renderer.validation_layers, vec![KHRONOS_VALIDATION_LAYER]);
        assert_eq!(config.renderer.device_extensions, vec![SWAPCHAIN_EXTENSION]);
        assert!(config.renderer.require_discrete_gpu);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_follows_build_type_unless_overridden() {
        let config = VulkanRendererConfig::default();
        assert_eq!(config.validation_requested(), cfg!(debug_assertions));
        assert!(config.clone().with_validation(true).validation_requested());
        assert!(!config.with_validation(false).validation_requested());
    }

    #[test]
    fn test_renderer_validation_rejects_bad_values() {
        let base = VulkanRendererConfig::default();
        assert!(base.clone().with_max_frames_in_flight(0).validate().is_err());
        assert!(base.clone().with_max_frames_in_flight(9).validate().is_err());
        assert!(base.clone().with_max_frames_in_flight(8).validate().is_ok());

        let mut nul_name = base.clone();
        nul_name.device_extensions.push("VK_bad\0name".to_string());
        assert!(nul_name.validate().is_err());

        let mut no_shader = base;
        no_shader.shaders.vertex_shader_path.clear();
        assert!(no_shader.validate().is_err());
    }

    #[test]
    fn test_app_validation_rejects_unknown_log_level() {
        let config = AppConfig { log_level: "loud".to_string(), ..AppConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_round_trip_and_partial_file() {
        let path = temp_path("round-trip.toml");
        let mut config = AppConfig::default();
        config.window.title = "round trip".to_string();
        config.renderer = config.renderer.with_validation(false).with_max_frames_in_flight(3);
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::write(&path, "[window]\nwidth = 800\n").unwrap();
        let partial = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(partial.window.width, 800);
        assert_eq!(partial.window.height, 300);
        assert_eq!(partial.renderer.max_frames_in_flight, 2);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_ron_round_trip() {
        let path = temp_path("round-trip.ron");
        let config = AppConfig::default();
        config.save_to_file(&path).unwrap();
        assert_eq!(AppConfig::load_from_file(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = temp_path("does-not-exist.toml");
        assert_eq!(AppConfig::load_or_default(&path).unwrap(), AppConfig::default());
        assert!(matches!(AppConfig::load_from_file(&path), Err(ConfigError::Io(_))));
    }
}
