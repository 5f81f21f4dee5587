//! Physical device selection and logical device creation
//!
//! Selection is pass/fail: the first device that satisfies every requirement
//! wins. The checks run against the [`DeviceProbe`] trait so they do not need
//! a live GPU; [`AshDeviceProbe`] answers them for real devices.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};
use std::ffi::{c_char, CStr};

use crate::core::config::VulkanRendererConfig;
use crate::render::vulkan::context::to_cstrings;
use crate::render::vulkan::surface::{Surface, SwapchainSupport};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Queue family selection result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family with graphics support
    pub graphics: Option<u32>,
    /// Family that can present to the target surface
    pub present: Option<u32>,
}

/// A complete queue family selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Graphics family index
    pub graphics: u32,
    /// Present family index
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Both a graphics and a present family were found
    pub const fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Resolve into concrete indices when complete
    pub const fn complete(&self) -> Option<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Some(QueueFamilies { graphics, present }),
            _ => None,
        }
    }

    /// Distinct found indices, in discovery order (graphics first)
    pub fn unique_indices(&self) -> Vec<u32> {
        let mut unique = Vec::with_capacity(2);
        for index in [self.graphics, self.present].into_iter().flatten() {
            if !unique.contains(&index) {
                unique.push(index);
            }
        }
        unique
    }
}

impl QueueFamilies {
    /// Distinct indices, graphics first
    pub fn unique_indices(&self) -> Vec<u32> {
        QueueFamilyIndices::from(*self).unique_indices()
    }
}

impl From<QueueFamilies> for QueueFamilyIndices {
    fn from(families: QueueFamilies) -> Self {
        Self {
            graphics: Some(families.graphics),
            present: Some(families.present),
        }
    }
}

/// Scan queue families in order until both roles are filled
///
/// A later family that has the capability replaces an earlier pick for as
/// long as the selection is incomplete, so a family offering both roles is
/// preferred when it is reached before completion.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> VulkanResult<bool>,
) -> VulkanResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in (0u32..).zip(families) {
        if indices.is_complete() {
            break;
        }
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }
        if supports_present(index)? {
            indices.present = Some(index);
        }
    }

    Ok(indices)
}

/// What a device must offer to be selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequirements {
    /// Only accept `DISCRETE_GPU` devices
    pub discrete_only: bool,
    /// Device extensions that must all be present
    pub extensions: Vec<String>,
}

impl DeviceRequirements {
    /// Requirements from renderer configuration
    pub fn from_config(config: &VulkanRendererConfig) -> Self {
        Self {
            discrete_only: config.require_discrete_gpu,
            extensions: config.device_extensions.clone(),
        }
    }

    /// Required extensions absent from `available`
    pub fn missing_extensions(&self, available: &[String]) -> Vec<String> {
        self.extensions
            .iter()
            .filter(|required| !available.contains(required))
            .cloned()
            .collect()
    }
}

/// Per-device queries the suitability check needs
pub trait DeviceProbe {
    /// Name, type and limits
    fn properties(&self) -> vk::PhysicalDeviceProperties;
    /// Optional feature support
    fn features(&self) -> vk::PhysicalDeviceFeatures;
    /// Queue family properties in index order
    fn queue_families(&self) -> Vec<vk::QueueFamilyProperties>;
    /// Whether a queue family can present to the target surface
    fn supports_present(&self, queue_family_index: u32) -> VulkanResult<bool>;
    /// Device extension names
    fn extension_names(&self) -> VulkanResult<Vec<String>>;
    /// Swapchain support for the target surface
    fn swapchain_support(&self) -> VulkanResult<SwapchainSupport>;

    /// Human readable device name
    fn name(&self) -> String {
        let properties = self.properties();
        unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Why a device was passed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Device type is not a discrete GPU
    NotDiscrete(vk::PhysicalDeviceType),
    /// A required feature is unsupported
    MissingFeature(&'static str),
    /// No graphics or no present queue family
    IncompleteQueueFamilies(QueueFamilyIndices),
    /// Required device extensions are absent
    MissingExtensions(Vec<String>),
    /// The surface offers no formats or no present modes
    InadequateSwapchain {
        /// Number of formats reported
        formats: usize,
        /// Number of present modes reported
        present_modes: usize,
    },
}

/// Outcome of checking one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suitability {
    /// Every requirement holds
    Suitable(QueueFamilies),
    /// At least one requirement failed; the first failure is reported
    Rejected(Rejection),
}

/// Check one device against the requirements
///
/// Swapchain support is only queried once the extension check has passed.
pub fn check_device<P: DeviceProbe + ?Sized>(
    probe: &P,
    requirements: &DeviceRequirements,
) -> VulkanResult<Suitability> {
    let properties = probe.properties();
    if requirements.discrete_only && properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Ok(Suitability::Rejected(Rejection::NotDiscrete(properties.device_type)));
    }

    if probe.features().geometry_shader != vk::TRUE {
        return Ok(Suitability::Rejected(Rejection::MissingFeature("geometryShader")));
    }

    let indices = find_queue_families(&probe.queue_families(), |index| probe.supports_present(index))?;
    let Some(families) = indices.complete() else {
        return Ok(Suitability::Rejected(Rejection::IncompleteQueueFamilies(indices)));
    };

    let missing = requirements.missing_extensions(&probe.extension_names()?);
    if !missing.is_empty() {
        return Ok(Suitability::Rejected(Rejection::MissingExtensions(missing)));
    }

    let support = probe.swapchain_support()?;
    if !support.is_adequate() {
        return Ok(Suitability::Rejected(Rejection::InadequateSwapchain {
            formats: support.formats.len(),
            present_modes: support.present_modes.len(),
        }));
    }

    Ok(Suitability::Suitable(families))
}

/// Pick the first suitable candidate
///
/// Returns the candidate's position alongside its queue families.
pub fn select_device<P: DeviceProbe>(
    candidates: &[P],
    requirements: &DeviceRequirements,
) -> VulkanResult<(usize, QueueFamilies)> {
    for (position, candidate) in candidates.iter().enumerate() {
        match check_device(candidate, requirements)? {
            Suitability::Suitable(families) => {
                log::info!("Device {} is suitable", candidate.name());
                return Ok((position, families));
            }
            Suitability::Rejected(reason) => {
                log::debug!("Device {} rejected: {:?}", candidate.name(), reason);
            }
        }
    }

    Err(VulkanError::NoSuitableDevice {
        examined: candidates.len(),
    })
}

/// [`DeviceProbe`] backed by a live instance and surface
pub struct AshDeviceProbe<'a> {
    instance: &'a Instance,
    surface: &'a Surface,
    device: vk::PhysicalDevice,
}

impl<'a> AshDeviceProbe<'a> {
    /// Probe `device` against `surface`
    pub const fn new(instance: &'a Instance, surface: &'a Surface, device: vk::PhysicalDevice) -> Self {
        Self {
            instance,
            surface,
            device,
        }
    }
}

impl DeviceProbe for AshDeviceProbe<'_> {
    fn properties(&self) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(self.device) }
    }

    fn features(&self) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.get_physical_device_features(self.device) }
    }

    fn queue_families(&self) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(self.device)
        }
    }

    fn supports_present(&self, queue_family_index: u32) -> VulkanResult<bool> {
        self.surface.supports_present(self.device, queue_family_index)
    }

    fn extension_names(&self) -> VulkanResult<Vec<String>> {
        let extensions = unsafe {
            self.instance
                .enumerate_device_extension_properties(self.device)
                .map_err(VulkanError::Api)?
        };
        Ok(extensions
            .iter()
            .map(|ext| {
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect())
    }

    fn swapchain_support(&self) -> VulkanResult<SwapchainSupport> {
        self.surface.swapchain_support(self.device)
    }
}

/// Selected physical device
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue families chosen during selection
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    /// Enumerate physical devices and keep the first suitable one
    pub fn select(
        instance: &Instance,
        surface: &Surface,
        requirements: &DeviceRequirements,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };
        if devices.is_empty() {
            log::error!("No GPU with Vulkan support found");
        }

        let probes: Vec<AshDeviceProbe<'_>> = devices
            .iter()
            .map(|&device| AshDeviceProbe::new(instance, surface, device))
            .collect();
        let (position, queue_families) = select_device(&probes, requirements)?;
        let chosen = &probes[position];

        log::info!(
            "Selected GPU: {} (graphics family {}, present family {})",
            chosen.name(),
            queue_families.graphics,
            queue_families.present
        );

        Ok(Self {
            device: chosen.device,
            properties: chosen.properties(),
            queue_families,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Queue families the queues were taken from
    pub queue_families: QueueFamilies,
    /// Vulkan logical device handle
    pub device: Device,
}

impl LogicalDevice {
    /// Create a logical device with one queue per distinct family
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDeviceInfo,
        requirements: &DeviceRequirements,
    ) -> VulkanResult<Self> {
        let families = physical_device.queue_families;
        let priorities = [1.0_f32];

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique_indices()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names = to_cstrings(&requirements.extensions)?;
        let extensions: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::info!("Logical device created with {} queue(s)", queue_infos.len());

        Ok(Self {
            swapchain_loader,
            graphics_queue,
            present_queue,
            queue_families: families,
            device,
        })
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Ensure device is idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    struct MockDevice {
        device_type: vk::PhysicalDeviceType,
        geometry_shader: bool,
        families: Vec<vk::QueueFamilyProperties>,
        present_families: Vec<u32>,
        extensions: Vec<String>,
        support: SwapchainSupport,
        support_queries: Cell<usize>,
    }

    impl MockDevice {
        fn good() -> Self {
            Self {
                device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
                geometry_shader: true,
                families: vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)],
                present_families: vec![0],
                extensions: vec!["VK_KHR_swapchain".to_string(), "VK_KHR_maintenance1".to_string()],
                support: SwapchainSupport {
                    capabilities: vk::SurfaceCapabilitiesKHR::default(),
                    formats: vec![vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    }],
                    present_modes: vec![vk::PresentModeKHR::FIFO],
                },
                support_queries: Cell::new(0),
            }
        }
    }

    impl DeviceProbe for MockDevice {
        fn properties(&self) -> vk::PhysicalDeviceProperties {
            vk::PhysicalDeviceProperties {
                device_type: self.device_type,
                ..Default::default()
            }
        }

        fn features(&self) -> vk::PhysicalDeviceFeatures {
            vk::PhysicalDeviceFeatures {
                geometry_shader: if self.geometry_shader { vk::TRUE } else { vk::FALSE },
                ..Default::default()
            }
        }

        fn queue_families(&self) -> Vec<vk::QueueFamilyProperties> {
            self.families.clone()
        }

        fn supports_present(&self, queue_family_index: u32) -> VulkanResult<bool> {
            Ok(self.present_families.contains(&queue_family_index))
        }

        fn extension_names(&self) -> VulkanResult<Vec<String>> {
            Ok(self.extensions.clone())
        }

        fn swapchain_support(&self) -> VulkanResult<SwapchainSupport> {
            self.support_queries.set(self.support_queries.get() + 1);
            Ok(self.support.clone())
        }
    }

    fn requirements() -> DeviceRequirements {
        DeviceRequirements {
            discrete_only: true,
            extensions: vec!["VK_KHR_swapchain".to_string()],
        }
    }

    #[test]
    fn test_unique_indices_shared_family() {
        let indices = QueueFamilyIndices { graphics: Some(2), present: Some(2) };
        assert_eq!(indices.unique_indices(), vec![2]);
    }

    #[test]
    fn test_unique_indices_distinct_families_keep_discovery_order() {
        let indices = QueueFamilyIndices { graphics: Some(1), present: Some(3) };
        assert_eq!(indices.unique_indices(), vec![1, 3]);

        let families = QueueFamilies { graphics: 3, present: 1 };
        assert_eq!(families.unique_indices(), vec![3, 1]);
    }

    #[test]
    fn test_unique_indices_skip_missing() {
        let indices = QueueFamilyIndices { graphics: None, present: Some(4) };
        assert_eq!(indices.unique_indices(), vec![4]);
        assert!(QueueFamilyIndices::default().unique_indices().is_empty());
        assert!(indices.complete().is_none());
    }

    #[test]
    fn test_find_queue_families_separate_roles() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families, |i| Ok(i == 3)).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(1), present: Some(3) });
        assert!(indices.is_complete());
    }

    #[test]
    fn test_find_queue_families_prefers_later_shared_family_before_completion() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(indices.complete(), Some(QueueFamilies { graphics: 1, present: 1 }));
    }

    #[test]
    fn test_find_queue_families_stops_once_complete() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::GRAPHICS)];
        let mut asked = Vec::new();
        let indices = find_queue_families(&families, |i| {
            asked.push(i);
            Ok(true)
        })
        .unwrap();
        assert_eq!(indices.complete(), Some(QueueFamilies { graphics: 0, present: 0 }));
        assert_eq!(asked, vec![0]);
    }

    #[test]
    fn test_find_queue_families_propagates_query_errors() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = find_queue_families(&families, |_| Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))));
    }

    #[test]
    fn test_good_device_is_suitable() {
        let device = MockDevice::good();
        assert_eq!(
            check_device(&device, &requirements()).unwrap(),
            Suitability::Suitable(QueueFamilies { graphics: 0, present: 0 })
        );
    }

    #[test]
    fn test_device_missing_extension_is_rejected() {
        let mut device = MockDevice::good();
        device.extensions = vec!["VK_KHR_maintenance1".to_string()];
        assert_eq!(
            check_device(&device, &requirements()).unwrap(),
            Suitability::Rejected(Rejection::MissingExtensions(vec!["VK_KHR_swapchain".to_string()]))
        );
        assert_eq!(device.support_queries.get(), 0);
    }

    #[test]
    fn test_device_without_surface_formats_is_rejected() {
        let mut device = MockDevice::good();
        device.support.formats.clear();
        assert_eq!(
            check_device(&device, &requirements()).unwrap(),
            Suitability::Rejected(Rejection::InadequateSwapchain { formats: 0, present_modes: 1 })
        );
    }

    #[test]
    fn test_integrated_device_is_rejected_unless_allowed() {
        let mut device = MockDevice::good();
        device.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert_eq!(
            check_device(&device, &requirements()).unwrap(),
            Suitability::Rejected(Rejection::NotDiscrete(vk::PhysicalDeviceType::INTEGRATED_GPU))
        );

        let relaxed = DeviceRequirements { discrete_only: false, ..requirements() };
        assert!(matches!(check_device(&device, &relaxed).unwrap(), Suitability::Suitable(_)));
    }

    #[test]
    fn test_device_without_geometry_shader_is_rejected() {
        let mut device = MockDevice::good();
        device.geometry_shader = false;
        assert_eq!(
            check_device(&device, &requirements()).unwrap(),
            Suitability::Rejected(Rejection::MissingFeature("geometryShader"))
        );
    }

    #[test]
    fn test_device_without_present_queue_is_rejected() {
        let mut device = MockDevice::good();
        device.present_families.clear();
        assert_eq!(
            check_device(&device, &requirements()).unwrap(),
            Suitability::Rejected(Rejection::IncompleteQueueFamilies(QueueFamilyIndices {
                graphics: Some(0),
                present: None,
            }))
        );
    }

    #[test]
    fn test_select_device_first_suitable_wins() {
        let mut integrated = MockDevice::good();
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        let mut split = MockDevice::good();
        split.families = vec![family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        split.present_families = vec![1];
        let candidates = vec![integrated, split, MockDevice::good()];

        let (position, families) = select_device(&candidates, &requirements()).unwrap();
        assert_eq!(position, 1);
        assert_eq!(families, QueueFamilies { graphics: 0, present: 1 });
    }

    #[test]
    fn test_select_device_fails_fast_without_candidates() {
        let mut bad = MockDevice::good();
        bad.support.present_modes.clear();
        let candidates = vec![bad];
        assert!(matches!(
            select_device(&candidates, &requirements()),
            Err(VulkanError::NoSuitableDevice { examined: 1 })
        ));

        let empty: Vec<MockDevice> = Vec::new();
        assert!(matches!(
            select_device(&empty, &requirements()),
            Err(VulkanError::NoSuitableDevice { examined: 0 })
        ));
    }

    #[test]
    fn test_requirements_from_config() {
        let config = VulkanRendererConfig::default().allow_any_gpu();
        let reqs = DeviceRequirements::from_config(&config);
        assert!(!reqs.discrete_only);
        assert_eq!(reqs.extensions, vec!["VK_KHR_swapchain".to_string()]);
        assert!(reqs.missing_extensions(&["VK_KHR_swapchain".to_string()]).is_empty());
    }
}
