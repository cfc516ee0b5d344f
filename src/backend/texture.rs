// Sampled texture - image, view and sampler
//
// Pixel data is decoded externally to RGBA8, staged into a host-visible
// buffer and copied into a device-local image that moves through
// preinitialized -> transfer-dst -> shader-read-only layouts.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::buffer::{create_buffer, create_image, write_memory};
use super::commands::{transition_image_layout, OneTimeCommands};
use super::VulkanDevice;

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl Texture {
    /// Decode the image file and upload it as a sampled texture
    pub fn load(
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        path: &Path,
    ) -> Result<Self> {
        let decoded = image::open(path)
            .with_context(|| format!("Failed to load texture image: {}", path.display()))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let pixels = decoded.into_raw();

        log::info!("Loaded texture {} ({}x{})", path.display(), width, height);

        Self::from_rgba8(device, command_pool, &pixels, width, height)
    }

    /// Upload raw RGBA8 pixel bytes of the given dimensions
    pub fn from_rgba8(
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let (staging_buffer, staging_memory) = create_buffer(
            device,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        write_memory(device, staging_memory, pixels)?;

        let (image, memory) = create_image(
            device,
            width,
            height,
            TEXTURE_FORMAT,
            vk::ImageLayout::PREINITIALIZED,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        transition_image_layout(
            device,
            command_pool,
            image,
            TEXTURE_FORMAT,
            vk::ImageLayout::PREINITIALIZED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        copy_buffer_to_image(device, command_pool, staging_buffer, image, width, height)?;

        transition_image_layout(
            device,
            command_pool,
            image,
            TEXTURE_FORMAT,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        unsafe {
            device.device.destroy_buffer(staging_buffer, None);
            device.device.free_memory(staging_memory, None);
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .device
                .create_image_view(&view_info, None)
                .context("Failed to create texture image view")?
        };

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(16.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        let sampler = unsafe {
            device
                .device
                .create_sampler(&sampler_info, None)
                .context("Failed to create texture sampler")?
        };

        Ok(Self {
            image,
            memory,
            view,
            sampler,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

fn copy_buffer_to_image(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> Result<()> {
    let cmd = OneTimeCommands::begin(device, command_pool)?;

    let region = vk::BufferImageCopy::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        });

    unsafe {
        device.device.cmd_copy_buffer_to_image(
            cmd.buffer(),
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region.build()],
        );
    }

    cmd.submit()
}
