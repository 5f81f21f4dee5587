//! Vulkan synchronization primitives
//!
//! RAII semaphores and fences, the per-slot [`FrameSync`] set and the
//! [`FrameCounter`] that cycles through slots.

use ash::{vk, Device};

use crate::core::config::MAX_SUPPORTED_FRAMES_IN_FLIGHT;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame slot
pub struct FrameSync {
    /// Signaled when the acquired image is ready
    pub image_available: Semaphore,
    /// Signaled when the slot's submission completes
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create a slot with its fence already signaled
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            in_flight,
        })
    }
}

/// Cycles through frame slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    current: usize,
    frames_in_flight: usize,
}

impl FrameCounter {
    /// Counter over `frames_in_flight` slots, starting at slot 0
    pub fn new(frames_in_flight: usize) -> VulkanResult<Self> {
        if !(1..=MAX_SUPPORTED_FRAMES_IN_FLIGHT).contains(&frames_in_flight) {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "frames in flight must be in 1..={MAX_SUPPORTED_FRAMES_IN_FLIGHT}, got {frames_in_flight}"
                ),
            });
        }
        Ok(Self {
            current: 0,
            frames_in_flight,
        })
    }

    /// Slot used by the frame being built
    pub const fn current(&self) -> usize {
        self.current
    }

    /// Number of slots
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Move to the next slot, wrapping around
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.frames_in_flight;
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_wraps() {
        let mut counter = FrameCounter::new(2).unwrap();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.frames_in_flight(), 2);
    }

    #[test]
    fn test_single_slot_stays_put() {
        let mut counter = FrameCounter::new(1).unwrap();
        for _ in 0..4 {
            assert_eq!(counter.advance(), 0);
        }
    }

    #[test]
    fn test_counter_visits_every_slot() {
        let mut counter = FrameCounter::new(MAX_SUPPORTED_FRAMES_IN_FLIGHT).unwrap();
        let mut seen = vec![counter.current()];
        for _ in 1..MAX_SUPPORTED_FRAMES_IN_FLIGHT {
            seen.push(counter.advance());
        }
        assert_eq!(seen, (0..MAX_SUPPORTED_FRAMES_IN_FLIGHT).collect::<Vec<_>>());
    }

    #[test]
    fn test_counter_rejects_out_of_range() {
        assert!(FrameCounter::new(0).is_err());
        assert!(FrameCounter::new(MAX_SUPPORTED_FRAMES_IN_FLIGHT + 1).is_err());
    }
}
