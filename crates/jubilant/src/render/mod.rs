//! # Rendering
//!
//! The Vulkan backend that draws the triangle. Everything lives under
//! [`vulkan`]; the common types are re-exported here for applications.

pub mod vulkan;

pub use vulkan::{FrameStatus, TriangleRenderer, VulkanError, VulkanResult, Window, WindowError, WindowEvents};
