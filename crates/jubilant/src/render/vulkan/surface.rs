//! Vulkan surface management
//!
//! Owns the presentation surface and answers the per-device questions the
//! selection and swapchain phases ask about it.

use ash::extensions::khr;
use ash::vk;

use crate::render::vulkan::{VulkanInstance, VulkanResult, VulkanError, Window};

/// Vulkan surface wrapper for presentation
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create a new surface for the window
    pub fn new(instance: &VulkanInstance, window: &mut Window) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_vulkan_surface(instance.instance.handle())?;

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the underlying surface handle
    pub const fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Check if a queue family supports presentation to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Query capabilities, formats and present modes for a physical device
    pub fn swapchain_support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SwapchainSupport> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(VulkanError::Api)?
        };

        Ok(SwapchainSupport {
            capabilities,
            formats,
            present_modes,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Presentation capabilities of a surface on one physical device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}
