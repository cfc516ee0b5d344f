// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash; ownership is strictly hierarchical and every
// handle is destroyed exactly once, in reverse dependency order.

pub mod buffer;
pub mod camera;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod geometry;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use device::VulkanDevice;
pub use swapchain::{ImageViewPool, Swapchain};
