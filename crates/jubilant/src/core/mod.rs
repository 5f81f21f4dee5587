//! # Core Module
//!
//! Shared configuration for every bring-up phase.

pub mod config;

pub use config::{
    AppConfig,
    Config,
    ConfigError,
    ShaderConfig,
    VulkanRendererConfig,
    WindowConfig,
};
