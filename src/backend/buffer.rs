// Buffer and image allocation helpers
//
// Staging buffers are host-visible+coherent; destinations are device-local
// and filled through a one-time transfer command. Memory types are picked
// by a lowest-index-first scan, no scoring.

use anyhow::{Context, Result};
use ash::vk;

use super::commands::OneTimeCommands;
use super::VulkanDevice;

/// Lowest index whose bit is set in the type filter AND whose property
/// flags are a superset of the requested ones. Failing to find one is
/// fatal, even if some index satisfies one of the two tests alone.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..memory_properties.memory_type_count {
        let type_matches = (type_filter & (1 << i)) != 0;
        let property_matches = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if type_matches && property_matches {
            return Ok(i);
        }
    }

    anyhow::bail!("Failed to find suitable memory type")
}

/// Create a buffer and bind freshly allocated memory to it
pub fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe {
        device
            .device
            .create_buffer(&buffer_info, None)
            .context("Failed to create buffer")?
    };

    let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let memory_type_index =
        find_memory_type(&device.memory_properties, requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device
            .device
            .allocate_memory(&alloc_info, None)
            .context("Failed to allocate buffer memory")?
    };

    unsafe {
        device
            .device
            .bind_buffer_memory(buffer, memory, 0)
            .context("Failed to bind buffer memory")?;
    }

    Ok((buffer, memory))
}

/// Map, copy, unmap into host-visible memory
pub fn write_memory<T: Copy>(
    device: &VulkanDevice,
    memory: vk::DeviceMemory,
    data: &[T],
) -> Result<()> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    unsafe {
        let ptr = device
            .device
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())? as *mut T;
        ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
        device.device.unmap_memory(memory);
    }

    Ok(())
}

/// Upload a slice into a new device-local buffer through a staging buffer.
/// The staging buffer lives only for the duration of the transfer.
pub fn create_device_local_buffer<T: Copy>(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let (staging_buffer, staging_memory) = create_buffer(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    write_memory(device, staging_memory, data)?;

    let (buffer, memory) = create_buffer(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    copy_buffer(device, command_pool, staging_buffer, buffer, size)?;

    unsafe {
        device.device.destroy_buffer(staging_buffer, None);
        device.device.free_memory(staging_memory, None);
    }

    Ok((buffer, memory))
}

fn copy_buffer(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let cmd = OneTimeCommands::begin(device, command_pool)?;

    let region = vk::BufferCopy::builder().src_offset(0).dst_offset(0).size(size);
    unsafe {
        device
            .device
            .cmd_copy_buffer(cmd.buffer(), src, dst, &[region.build()]);
    }

    cmd.submit()
}

/// Create a 2D optimal-tiling image and bind device-local memory to it
pub fn create_image(
    device: &VulkanDevice,
    width: u32,
    height: u32,
    format: vk::Format,
    initial_layout: vk::ImageLayout,
    usage: vk::ImageUsageFlags,
) -> Result<(vk::Image, vk::DeviceMemory)> {
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(initial_layout)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1);

    let image = unsafe {
        device
            .device
            .create_image(&image_info, None)
            .context("Failed to create image")?
    };

    let requirements = unsafe { device.device.get_image_memory_requirements(image) };

    let memory_type_index = find_memory_type(
        &device.memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device
            .device
            .allocate_memory(&alloc_info, None)
            .context("Failed to allocate image memory")?
    };

    unsafe {
        device
            .device
            .bind_image_memory(image, memory, 0)
            .context("Failed to bind image memory")?;
    }

    Ok((image, memory))
}

/// The single depth attachment shared by every framebuffer
pub struct DepthResource {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl DepthResource {
    /// Allocate the depth image/view sized to the swapchain extent and
    /// transition it to its attachment layout
    pub fn new(
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let format = device.depth_format;

        let (image, memory) = create_image(
            device,
            extent.width,
            extent.height,
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .device
                .create_image_view(&view_info, None)
                .context("Failed to create depth image view")?
        };

        super::commands::transition_image_layout(
            device,
            command_pool,
            image,
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        Ok(Self {
            image,
            memory,
            view,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = flags;
        }
        props
    }

    #[test]
    fn memory_type_picks_lowest_matching_index() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &props,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn memory_type_requires_filter_bit() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // Index 0 has the right flags but is masked out of the filter
        let index =
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn memory_type_needs_full_property_superset() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);

        let result = find_memory_type(
            &props,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(result.is_err());
    }

    #[test]
    fn memory_type_fails_when_tests_only_pass_separately() {
        // Index 0 passes the filter but not the flags; index 1 passes the
        // flags but not the filter
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        let result = find_memory_type(&props, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(result.is_err());
    }
}
