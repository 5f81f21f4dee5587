//! Command buffer management
//!
//! Type-safe command buffer recording. Recording state is tracked so misuse
//! is reported as an error instead of reaching the driver, and the render
//! pass scope is closed when [`ActiveRenderPass`] drops.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the command pool handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Frees every buffer allocated from the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Recording state of a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    /// Not recording
    #[default]
    Idle,
    /// Between begin and end
    Recording,
}

impl RecordingState {
    /// Transition into recording
    pub fn begin(&mut self) -> VulkanResult<()> {
        if *self == Self::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }
        *self = Self::Recording;
        Ok(())
    }

    /// Require an open recording
    pub fn ensure_recording(self) -> VulkanResult<()> {
        if self == Self::Recording {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            })
        }
    }

    /// Transition out of recording
    pub fn end(&mut self) -> VulkanResult<()> {
        self.ensure_recording()?;
        *self = Self::Idle;
        Ok(())
    }
}

/// Viewport covering `extent` with depth 0..1
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`
pub const fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Type-safe command buffer recorder
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    state: RecordingState,
}

impl CommandRecorder {
    /// Wrap a command buffer that is not currently recording
    pub fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            state: RecordingState::Idle,
        }
    }

    /// Return the buffer to the initial state
    pub fn reset(&mut self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }
        self.state = RecordingState::Idle;
        Ok(())
    }

    /// Begin command recording
    pub fn begin(&mut self) -> VulkanResult<&mut Self> {
        self.state.begin()?;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let result = unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
        };
        if let Err(e) = result {
            self.state = RecordingState::Idle;
            return Err(VulkanError::Api(e));
        }

        Ok(self)
    }

    /// Begin a render pass with inline contents
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        self.state.ensure_recording()?;

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// End command recording
    pub fn end(&mut self) -> VulkanResult<vk::CommandBuffer> {
        self.state.end()?;

        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        Ok(self.command_buffer)
    }

    /// Current recording state
    pub const fn state(&self) -> RecordingState {
        self.state
    }

    /// Get the command buffer handle
    pub const fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

/// Open render pass scope, ended on drop
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl ActiveRenderPass<'_> {
    /// Set viewport 0
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) {
        unsafe {
            self.recorder
                .device
                .cmd_set_viewport(self.recorder.command_buffer, 0, &[*viewport]);
        }
    }

    /// Set scissor 0
    pub fn set_scissor(&mut self, scissor: &vk::Rect2D) {
        unsafe {
            self.recorder
                .device
                .cmd_set_scissor(self.recorder.command_buffer, 0, &[*scissor]);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Non-indexed draw
    pub fn cmd_draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.recorder.device.cmd_draw(
                self.recorder.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder
                .device
                .cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

/// What one triangle draw renders into
#[derive(Debug, Clone, Copy)]
pub struct TriangleTarget {
    /// Render pass to begin
    pub render_pass: vk::RenderPass,
    /// Framebuffer of the acquired image
    pub framebuffer: vk::Framebuffer,
    /// Framebuffer extent
    pub extent: vk::Extent2D,
    /// Triangle pipeline
    pub pipeline: vk::Pipeline,
    /// RGBA clear color
    pub clear_color: [f32; 4],
}

/// Record a full triangle pass into an idle recorder
pub fn record_triangle(recorder: &mut CommandRecorder, target: &TriangleTarget) -> VulkanResult<vk::CommandBuffer> {
    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: target.clear_color,
        },
    }];

    recorder.begin()?;
    {
        let mut pass = recorder.begin_render_pass(
            target.render_pass,
            target.framebuffer,
            full_scissor(target.extent),
            &clear_values,
        )?;
        pass.bind_graphics_pipeline(target.pipeline);
        pass.set_viewport(&full_viewport(target.extent));
        pass.set_scissor(&full_scissor(target.extent));
        pass.cmd_draw(3, 1, 0, 0);
    }
    recorder.end()
}
