//! Vulkan swapchain management
//!
//! Negotiation is split into pure selection functions bundled by
//! [`SwapchainPlan`]; [`Swapchain`] turns a plan into images, views and
//! (once a render pass exists) framebuffers.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::device::QueueFamilies;
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::surface::SwapchainSupport;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Preferred surface format
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the preferred sRGB format, or the first offered
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|sf| sf.format == PREFERRED_FORMAT.format && sf.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| formats.first().copied())
        .ok_or(VulkanError::NoSurfaceFormats)
}

/// MAILBOX when offered, otherwise FIFO (always available)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Resolve the image extent
///
/// A `current_extent` width of `u32::MAX` means the surface lets the
/// swapchain decide; the framebuffer size is then clamped per component.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by a non-zero maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// How swapchain images are shared between queue families
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingPlan {
    /// One family owns the images
    Exclusive,
    /// Graphics and present families share the images
    Concurrent([u32; 2]),
}

impl SharingPlan {
    /// Concurrent only when graphics and present differ
    pub const fn for_families(families: QueueFamilies) -> Self {
        if families.graphics == families.present {
            Self::Exclusive
        } else {
            Self::Concurrent([families.graphics, families.present])
        }
    }

    /// Vulkan sharing mode
    pub const fn mode(&self) -> vk::SharingMode {
        match self {
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
            Self::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    /// Family indices to list in the create info
    pub fn family_indices(&self) -> &[u32] {
        match self {
            Self::Exclusive => &[],
            Self::Concurrent(families) => families,
        }
    }
}

/// Everything negotiated before a swapchain is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainPlan {
    /// Image format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Minimum image count requested
    pub image_count: u32,
    /// Queue family sharing
    pub sharing: SharingPlan,
    /// Surface transform to apply
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    /// Run every selection policy against the queried support
    pub fn negotiate(
        support: &SwapchainSupport,
        framebuffer_size: (u32, u32),
        families: QueueFamilies,
    ) -> VulkanResult<Self> {
        Ok(Self {
            format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, framebuffer_size),
            image_count: choose_image_count(&support.capabilities),
            sharing: SharingPlan::for_families(families),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// Image view wrapper with RAII cleanup
pub struct ImageView {
    device: Device,
    view: vk::ImageView,
}

impl ImageView {
    /// Create a 2D color view of a swapchain image
    pub fn new(device: Device, image: vk::Image, format: vk::Format) -> VulkanResult<Self> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .create_image_view(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, view })
    }

    /// Get the image view handle
    pub const fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

/// One presentable image with the objects built on it
pub struct SwapchainImage {
    /// Framebuffer, dropped before the view
    pub framebuffer: Option<Framebuffer>,
    /// Color view of the image
    pub view: ImageView,
    /// Image handle owned by the swapchain
    pub image: vk::Image,
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    images: Vec<SwapchainImage>,
    plan: SwapchainPlan,
    swapchain: vk::SwapchainKHR,
    swapchain_loader: SwapchainLoader,
}

impl Swapchain {
    /// Create a swapchain from a negotiated plan
    ///
    /// Pass the previous swapchain as `old_swapchain` when recreating.
    pub fn new(
        device: &Device,
        swapchain_loader: SwapchainLoader,
        surface: vk::SurfaceKHR,
        plan: SwapchainPlan,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(plan.sharing.mode())
            .queue_family_indices(plan.sharing.family_indices())
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        // Owned from here so a failure below releases the swapchain
        let mut this = Self {
            images: Vec::new(),
            plan,
            swapchain,
            swapchain_loader,
        };

        let images = unsafe {
            this.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        for image in images {
            let view = ImageView::new(device.clone(), image, this.plan.format.format)?;
            this.images.push(SwapchainImage {
                framebuffer: None,
                view,
                image,
            });
        }

        log::info!(
            "Swapchain created: {:?}/{:?}, {:?}, {}x{}, {} image(s)",
            this.plan.format.format,
            this.plan.format.color_space,
            this.plan.present_mode,
            this.plan.extent.width,
            this.plan.extent.height,
            this.images.len()
        );

        Ok(this)
    }

    /// Build one framebuffer per image for `render_pass`
    pub fn attach_framebuffers(&mut self, device: &Device, render_pass: &RenderPass) -> VulkanResult<()> {
        let extent = self.plan.extent;
        for image in &mut self.images {
            image.framebuffer = Some(Framebuffer::new(
                device.clone(),
                render_pass.handle(),
                &[image.view.handle()],
                extent,
            )?);
        }
        Ok(())
    }

    /// Framebuffer for an acquired image
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<&Framebuffer> {
        self.images
            .get(image_index as usize)
            .and_then(|image| image.framebuffer.as_ref())
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for swapchain image {image_index}"),
            })
    }

    /// Get swapchain extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    /// Get surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.plan.format
    }

    /// Get the plan the swapchain was built from
    pub const fn plan(&self) -> &SwapchainPlan {
        &self.plan
    }

    /// Per-image records
    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    /// Number of images the implementation created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Get swapchain handle
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get swapchain loader
    pub const fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Framebuffers and views first
        self.images.clear();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn test_format_prefers_bgra_srgb() {
        let formats = [format(vk::Format::R8G8B8A8_UNORM), PREFERRED_FORMAT];
        assert_eq!(choose_surface_format(&formats).unwrap(), PREFERRED_FORMAT);
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap(),
            format(vk::Format::R8G8B8A8_UNORM)
        );
    }

    #[test]
    fn test_format_needs_matching_color_space() {
        let wrong_space = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        let formats = [format(vk::Format::R16G16B16A16_SFLOAT), wrong_space];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::R16G16B16A16_SFLOAT
        );
    }

    #[test]
    fn test_format_empty_list_is_an_error() {
        assert!(matches!(choose_surface_format(&[]), Err(VulkanError::NoSurfaceFormats)));
    }

    #[test]
    fn test_present_mode_selection() {
        use vk::PresentModeKHR as M;
        assert_eq!(choose_present_mode(&[M::FIFO, M::MAILBOX]), M::MAILBOX);
        assert_eq!(choose_present_mode(&[M::IMMEDIATE, M::FIFO]), M::FIFO);
        assert_eq!(choose_present_mode(&[M::IMMEDIATE]), M::FIFO);
        assert_eq!(choose_present_mode(&[]), M::FIFO);
    }

    #[test]
    fn test_extent_defined_current_extent_wins() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_extent(&caps, (10, 10)), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_extent_clamps_each_component() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (1000, 800));
        assert_eq!(choose_extent(&caps, (5000, 50)), vk::Extent2D { width: 1000, height: 100 });
        assert_eq!(choose_extent(&caps, (640, 480)), vk::Extent2D { width: 640, height: 480 });
    }

    #[test]
    fn test_image_count_respects_maximum() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_sharing_plan() {
        let shared = SharingPlan::for_families(QueueFamilies { graphics: 2, present: 2 });
        assert_eq!(shared, SharingPlan::Exclusive);
        assert_eq!(shared.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(shared.family_indices().is_empty());

        let split = SharingPlan::for_families(QueueFamilies { graphics: 1, present: 3 });
        assert_eq!(split.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(split.family_indices(), &[1, 3]);
    }

    #[test]
    fn test_negotiate_typical_desktop_surface() {
        let support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D { width: 400, height: 300 },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![format(vk::Format::R8G8B8A8_UNORM), PREFERRED_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let plan = SwapchainPlan::negotiate(&support, (400, 300), QueueFamilies { graphics: 0, present: 0 }).unwrap();

        assert_eq!(plan.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(plan.format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(plan.extent, vk::Extent2D { width: 400, height: 300 });
        assert_eq!(plan.image_count, 3);
        assert_eq!(plan.sharing, SharingPlan::Exclusive);
        assert_eq!(plan.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn test_negotiate_without_formats_fails() {
        let support = SwapchainSupport {
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        };
        let result = SwapchainPlan::negotiate(&support, (1, 1), QueueFamilies { graphics: 0, present: 0 });
        assert!(matches!(result, Err(VulkanError::NoSurfaceFormats)));
    }
}
