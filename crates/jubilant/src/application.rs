//! Application lifecycle: window, renderer and the main loop

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::config::AppConfig;
use crate::render::{FrameStatus, TriangleRenderer, VulkanError, Window, WindowError};

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Vulkan bring-up or frame failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Main loop statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames submitted and presented
    pub frames_presented: u64,
    /// Swapchain rebuilds
    pub swapchain_recreations: u64,
}

impl RunSummary {
    /// Account for one frame result
    pub fn record(&mut self, status: FrameStatus) {
        match status {
            FrameStatus::Presented => self.frames_presented += 1,
            FrameStatus::SwapchainRecreated => self.swapchain_recreations += 1,
            FrameStatus::Skipped => {}
        }
    }
}

/// The triangle program
///
/// The renderer is declared first so every Vulkan object is gone before the
/// window and GLFW are torn down.
pub struct TriangleApp {
    renderer: TriangleRenderer,
    window: Window,
}

impl TriangleApp {
    /// Validate configuration, open the window and bring up Vulkan
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        config.validate()?;

        let mut window = Window::new(&config.window)?;
        let renderer = TriangleRenderer::new(&mut window, &config.renderer)?;

        Ok(Self { renderer, window })
    }

    /// Run until the window is closed
    pub fn run(&mut self) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary::default();

        while !self.window.should_close() {
            self.window.poll_events();
            let events = self.window.drain_events();
            if events.close_requested {
                break;
            }
            if events.resized {
                self.renderer.notify_resized();
            }

            let status = self.renderer.draw_frame(&self.window)?;
            summary.record(status);
            if status == FrameStatus::Skipped {
                // Minimized; sleep until something changes
                self.window.wait_events();
            }
        }

        self.renderer.wait_idle()?;
        log::info!(
            "Main loop finished: {} frame(s) presented, {} swapchain recreation(s)",
            summary.frames_presented,
            summary.swapchain_recreations
        );
        Ok(summary)
    }

    /// The renderer
    pub const fn renderer(&self) -> &TriangleRenderer {
        &self.renderer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_statuses() {
        let mut summary = RunSummary::default();
        summary.record(FrameStatus::Presented);
        summary.record(FrameStatus::Presented);
        summary.record(FrameStatus::Skipped);
        summary.record(FrameStatus::SwapchainRecreated);
        assert_eq!(
            summary,
            RunSummary {
                frames_presented: 2,
                swapchain_recreations: 1,
            }
        );
    }

    #[test]
    fn test_error_conversions() {
        let err: AppError = VulkanError::NoSuitableDevice { examined: 0 }.into();
        assert!(err.to_string().starts_with("Vulkan error"));
        let err: AppError = WindowError::VulkanUnsupported.into();
        assert!(err.to_string().contains("not supported"));
        let err: AppError = ConfigError::Invalid("bad".to_string()).into();
        assert!(matches!(err, AppError::Config(_)));
    }
}
