// Camera - owns the model/view/projection uniform buffer
//
// The buffer is host-visible and rewritten every tick. Its lifetime is
// independent of the swapchain; only the aspect ratio follows resizes.

use anyhow::Result;
use ash::vk;
use glam::{Mat4, Vec3};
use serde::Deserialize;

use super::buffer::{create_buffer, write_memory};
use super::VulkanDevice;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

/// Per-frame motion policy. Pan tracks a key-driven horizontal offset;
/// Spin rotates the quad about the Z axis over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    #[default]
    Pan,
    Spin,
}

pub struct Camera {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    mode: CameraMode,
    width: u32,
    height: u32,
    x: f32,
}

impl Camera {
    pub fn new(device: &VulkanDevice, mode: CameraMode) -> Result<Self> {
        let (buffer, memory) = create_buffer(
            device,
            std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            memory,
            mode,
            width: 1,
            height: 1,
            x: 0.0,
        })
    }

    /// Track the current swapchain extent for the projection aspect
    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    /// Compute this tick's matrices. `time` is seconds since startup,
    /// `offset_x` the pan step produced by input this tick.
    pub fn matrices(&mut self, time: f32, offset_x: f32) -> UniformBufferObject {
        self.x += offset_x;

        let model = match self.mode {
            CameraMode::Pan => Mat4::IDENTITY,
            CameraMode::Spin => Mat4::from_rotation_z(time * 90f32.to_radians()),
        };

        let eye = Vec3::new(self.x, 0.0, 2.0);
        let target = Vec3::new(self.x, 0.0, 0.0);
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);

        let aspect = self.width as f32 / self.height as f32;
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        UniformBufferObject { model, view, proj }
    }

    /// Write this tick's matrices into the uniform buffer
    pub fn update(&mut self, device: &VulkanDevice, time: f32, offset_x: f32) -> Result<()> {
        let ubo = self.matrices(time, offset_x);
        write_memory(device, self.memory, &[ubo])
    }

    pub fn buffer_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::builder()
            .buffer(self.buffer)
            .offset(0)
            .range(std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize)
            .build()
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera(mode: CameraMode) -> Camera {
        Camera {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            mode,
            width: 1280,
            height: 720,
            x: 0.0,
        }
    }

    #[test]
    fn ubo_holds_three_column_major_matrices() {
        assert_eq!(
            std::mem::size_of::<UniformBufferObject>(),
            3 * 16 * std::mem::size_of::<f32>()
        );
    }

    #[test]
    fn pan_offsets_accumulate_across_ticks() {
        let mut camera = test_camera(CameraMode::Pan);

        let first = camera.matrices(0.0, 0.1);
        let second = camera.matrices(0.1, 0.1);
        let still = camera.matrices(0.2, 0.0);

        // The eye translates along X, so the view translation changes
        // with each nonzero offset and holds steady without one
        assert_ne!(first.view, second.view);
        assert_eq!(second.view, still.view);
        assert_eq!(camera.x, 0.2);
    }

    #[test]
    fn pan_mode_keeps_the_model_fixed() {
        let mut camera = test_camera(CameraMode::Pan);
        let ubo = camera.matrices(1.5, 0.0);
        assert_eq!(ubo.model, Mat4::IDENTITY);
    }

    #[test]
    fn spin_mode_rotates_with_time() {
        let mut camera = test_camera(CameraMode::Spin);
        let early = camera.matrices(0.0, 0.0);
        let late = camera.matrices(1.0, 0.0);
        assert_eq!(early.model, Mat4::IDENTITY);
        assert_ne!(late.model, Mat4::IDENTITY);
    }

    #[test]
    fn projection_flips_y_for_vulkan_clip_space() {
        let mut camera = test_camera(CameraMode::Pan);
        let ubo = camera.matrices(0.0, 0.0);
        assert!(ubo.proj.y_axis.y < 0.0);
    }

    #[test]
    fn aspect_follows_the_tracked_extent() {
        let mut wide = test_camera(CameraMode::Pan);
        wide.set_extent(1600, 800);
        let mut narrow = test_camera(CameraMode::Pan);
        narrow.set_extent(800, 800);

        let wide_proj = wide.matrices(0.0, 0.0).proj;
        let narrow_proj = narrow.matrices(0.0, 0.0).proj;
        assert!(wide_proj.x_axis.x < narrow_proj.x_axis.x);
    }
}
