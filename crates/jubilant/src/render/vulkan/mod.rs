//! Vulkan rendering backend
//!
//! Bring-up phases in dependency order: window, instance and diagnostics,
//! surface, device selection, logical device, swapchain, render pass and
//! pipeline, framebuffers and commands, frame synchronization.

pub mod commands;
pub mod context;
pub mod debug;
pub mod device;
pub mod framebuffer;
pub mod render_pass;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use commands::{record_triangle, CommandPool, CommandRecorder, TriangleTarget};
pub use context::{load_entry, InstanceProbe, VulkanError, VulkanInstance, VulkanResult};
pub use debug::{DebugMessenger, MessageKinds, Severity};
pub use device::{
    AshDeviceProbe, DeviceProbe, DeviceRequirements, LogicalDevice, PhysicalDeviceInfo, QueueFamilies,
    QueueFamilyIndices, Rejection, Suitability,
};
pub use framebuffer::Framebuffer;
pub use render_pass::RenderPass;
pub use renderer::{FrameStatus, TriangleRenderer};
pub use shader::{GraphicsPipeline, PipelineLayout, ShaderError, ShaderModule};
pub use surface::{Surface, SwapchainSupport};
pub use swapchain::{SharingPlan, Swapchain, SwapchainImage, SwapchainPlan};
pub use sync::{Fence, FrameCounter, FrameSync, Semaphore};
pub use window::{Window, WindowError, WindowEvents, WindowResult};
