// Synchronization primitives
//
// A single pair of binary semaphores reused every frame: acquire signals
// image_available, submit waits on it and signals render_finished, present
// waits on render_finished. The present-queue idle wait after each frame
// is what makes reusing one pair safe; there are no per-frame fences.

use anyhow::Result;
use ash::vk;

use super::VulkanDevice;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_semaphore(self.image_available, None);
        }
    }
}
