//! Triangle renderer
//!
//! Owns every Vulkan object the program creates and runs the frame cycle.
//! Fields are declared in reverse creation order, so dropping the renderer
//! tears the context down dependents-first; a failure part way through
//! [`TriangleRenderer::new`] releases what was built the same way through
//! local drop order.

use ash::vk;
use std::path::Path;

use crate::core::config::VulkanRendererConfig;
use crate::render::vulkan::commands::{record_triangle, CommandPool, CommandRecorder, TriangleTarget};
use crate::render::vulkan::context::{load_entry, VulkanInstance};
use crate::render::vulkan::device::{DeviceRequirements, LogicalDevice, PhysicalDeviceInfo};
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::shader::GraphicsPipeline;
use crate::render::vulkan::surface::Surface;
use crate::render::vulkan::swapchain::{Swapchain, SwapchainPlan};
use crate::render::vulkan::sync::{FrameCounter, FrameSync, Semaphore};
use crate::render::vulkan::{VulkanError, VulkanResult, Window};

/// What one [`TriangleRenderer::draw_frame`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and presented
    Presented,
    /// The swapchain was rebuilt; no frame or a stale frame was shown
    SwapchainRecreated,
    /// Nothing to draw into (minimized window)
    Skipped,
}

/// Create one semaphore per swapchain image
fn image_semaphores(device: &ash::Device, count: usize) -> VulkanResult<Vec<Semaphore>> {
    (0..count).map(|_| Semaphore::new(device.clone())).collect()
}

/// Vulkan context plus the state of the frame loop
pub struct TriangleRenderer {
    frame_counter: FrameCounter,
    pending_resize: bool,
    clear_color: [f32; 4],
    frames: Vec<FrameSync>,
    render_finished: Vec<Semaphore>,
    recorders: Vec<CommandRecorder>,
    command_pool: CommandPool,
    swapchain: Swapchain,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    surface: Surface,
    instance: VulkanInstance,
}

impl TriangleRenderer {
    /// Bring up the whole context for `window`
    pub fn new(window: &mut Window, config: &VulkanRendererConfig) -> VulkanResult<Self> {
        config.validate().map_err(VulkanError::InitializationFailed)?;

        let entry = load_entry()?;
        let window_extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(entry, &window_extensions, config)?;

        let surface = Surface::new(&instance, window)?;

        let requirements = DeviceRequirements::from_config(config);
        let physical_device = PhysicalDeviceInfo::select(&instance.instance, &surface, &requirements)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device, &requirements)?;

        let support = surface.swapchain_support(physical_device.device)?;
        let plan = SwapchainPlan::negotiate(&support, window.framebuffer_size(), physical_device.queue_families)?;
        let mut swapchain = Swapchain::new(
            &device.device,
            device.swapchain_loader.clone(),
            surface.handle(),
            plan,
            vk::SwapchainKHR::null(),
        )?;

        let render_pass = RenderPass::new(device.device.clone(), swapchain.format().format)?;
        let pipeline = GraphicsPipeline::new(
            device.device.clone(),
            render_pass.handle(),
            Path::new(&config.shaders.vertex_shader_path),
            Path::new(&config.shaders.fragment_shader_path),
        )?;
        swapchain.attach_framebuffers(&device.device, &render_pass)?;

        let command_pool = CommandPool::new(device.device.clone(), physical_device.queue_families.graphics)?;

        let frame_counter = FrameCounter::new(config.max_frames_in_flight)?;
        let slots = u32::try_from(frame_counter.frames_in_flight()).map_err(|_| {
            VulkanError::InitializationFailed("Too many frames in flight".to_string())
        })?;
        let recorders = command_pool
            .allocate_command_buffers(slots)?
            .into_iter()
            .map(|command_buffer| CommandRecorder::new(command_buffer, device.device.clone()))
            .collect();
        let frames = (0..frame_counter.frames_in_flight())
            .map(|_| FrameSync::new(device.device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        let render_finished = image_semaphores(&device.device, swapchain.image_count())?;

        log::info!(
            "Renderer ready: {} frame(s) in flight, {} swapchain image(s)",
            frame_counter.frames_in_flight(),
            swapchain.image_count()
        );

        Ok(Self {
            frame_counter,
            pending_resize: false,
            clear_color: config.clear_color,
            frames,
            render_finished,
            recorders,
            command_pool,
            swapchain,
            pipeline,
            render_pass,
            device,
            physical_device,
            surface,
            instance,
        })
    }

    /// Record the triangle pass for one swapchain image into a frame slot
    pub fn record_triangle(&mut self, slot: usize, image_index: u32) -> VulkanResult<vk::CommandBuffer> {
        let target = TriangleTarget {
            render_pass: self.render_pass.handle(),
            framebuffer: self.swapchain.framebuffer(image_index)?.handle(),
            extent: self.swapchain.extent(),
            pipeline: self.pipeline.handle(),
            clear_color: self.clear_color,
        };

        let recorder = self
            .recorders
            .get_mut(slot)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No command buffer for frame slot {slot}"),
            })?;
        recorder.reset()?;
        record_triangle(recorder, &target)
    }

    /// Acquire, record, submit and present one frame
    pub fn draw_frame(&mut self, window: &Window) -> VulkanResult<FrameStatus> {
        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            return Ok(FrameStatus::Skipped);
        }

        let slot = self.frame_counter.current();
        let image_available = self.frames[slot].image_available.handle();
        let in_flight = self.frames[slot].in_flight.handle();

        self.frames[slot].in_flight.wait(u64::MAX)?;

        let acquired = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        let (image_index, acquire_suboptimal) = match acquired {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date during acquire");
                self.recreate_swapchain(window)?;
                return Ok(FrameStatus::SwapchainRecreated);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        // Only reset once work is certain to be submitted
        self.frames[slot].in_flight.reset()?;

        let command_buffer = self.record_triangle(slot, image_index)?;

        let render_finished = self
            .render_finished
            .get(image_index as usize)
            .map(Semaphore::handle)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No render semaphore for swapchain image {image_index}"),
            })?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], in_flight)
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.device.present_queue, &present_info)
        };
        let out_of_date = match presented {
            Ok(present_suboptimal) => acquire_suboptimal || present_suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(VulkanError::Api(e)),
        };

        self.frame_counter.advance();

        if out_of_date || self.pending_resize {
            self.recreate_swapchain(window)?;
            return Ok(FrameStatus::SwapchainRecreated);
        }

        Ok(FrameStatus::Presented)
    }

    /// Mark the swapchain stale after a framebuffer resize
    pub fn notify_resized(&mut self) {
        self.pending_resize = true;
    }

    /// Rebuild the swapchain and its framebuffers for the current window size
    ///
    /// Returns `false` without touching anything while the framebuffer is
    /// 0x0. The render pass and pipeline are kept, which requires the new
    /// swapchain to keep the same image format.
    pub fn recreate_swapchain(&mut self, window: &Window) -> VulkanResult<bool> {
        let framebuffer_size = window.framebuffer_size();
        if framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
            log::debug!("Framebuffer is 0x0, postponing swapchain recreation");
            return Ok(false);
        }

        self.device.wait_idle()?;

        let support = self.surface.swapchain_support(self.physical_device.device)?;
        let plan = SwapchainPlan::negotiate(&support, framebuffer_size, self.physical_device.queue_families)?;
        if plan.format.format != self.render_pass.color_format() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Surface format changed from {:?} to {:?}",
                    self.render_pass.color_format(),
                    plan.format.format
                ),
            });
        }

        let mut swapchain = Swapchain::new(
            &self.device.device,
            self.device.swapchain_loader.clone(),
            self.surface.handle(),
            plan,
            self.swapchain.handle(),
        )?;
        swapchain.attach_framebuffers(&self.device.device, &self.render_pass)?;
        self.swapchain = swapchain;

        if self.render_finished.len() != self.swapchain.image_count() {
            self.render_finished = image_semaphores(&self.device.device, self.swapchain.image_count())?;
        }

        self.pending_resize = false;
        Ok(true)
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// Current swapchain extent
    pub const fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Whether the debug messenger is active
    pub const fn diagnostics_enabled(&self) -> bool {
        self.instance.has_debug_messenger()
    }

    /// The selected physical device
    pub const fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Frame slot arithmetic
    pub const fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    /// The command pool shared by all frame slots
    pub const fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

impl Drop for TriangleRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait failed during teardown: {}", e);
        }
        log::info!("Tearing down Vulkan context");
    }
}
