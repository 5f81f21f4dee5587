//! # Jubilant
//!
//! Vulkan bring-up that draws one triangle: a GLFW window, an instance with
//! optional validation, GPU selection, a swapchain, a fixed pipeline and a
//! frame loop, all released in reverse creation order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jubilant::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     let config = AppConfig::load_or_default("jubilant.toml")?;
//!     logging::init(&config.log_level);
//!
//!     let mut app = TriangleApp::new(&config)?;
//!     app.run()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

mod application;

pub use application::{AppError, RunSummary, TriangleApp};

/// Common imports for applications
pub mod prelude {
    pub use crate::{
        core::{AppConfig, Config, ConfigError, ShaderConfig, VulkanRendererConfig, WindowConfig},
        foundation::logging,
        render::{FrameStatus, TriangleRenderer, VulkanError, VulkanResult, Window, WindowError},
        AppError, RunSummary, TriangleApp,
    };
}
