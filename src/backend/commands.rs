// Command pool, one-time transfer commands, layout transitions and the
// pre-recorded per-image draw sequence

use anyhow::{Context, Result};
use ash::vk;

use super::descriptor::DescriptorResources;
use super::geometry::QuadMesh;
use super::swapchain::Swapchain;
use super::VulkanDevice;

pub fn create_command_pool(device: &VulkanDevice) -> Result<vk::CommandPool> {
    let pool_info =
        vk::CommandPoolCreateInfo::builder().queue_family_index(device.graphics_family);

    unsafe {
        device
            .device
            .create_command_pool(&pool_info, None)
            .context("Failed to create command pool")
    }
}

/// A primary command buffer recording one-shot work. `begin` allocates and
/// starts recording; `submit` ends, submits to the graphics queue, waits
/// for the queue to drain and frees the buffer. The transfer is complete
/// before `submit` returns.
pub struct OneTimeCommands<'a> {
    device: &'a VulkanDevice,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl<'a> OneTimeCommands<'a> {
    pub fn begin(device: &'a VulkanDevice, command_pool: vk::CommandPool) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(command_pool)
            .command_buffer_count(1);

        let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate one-time command buffer")?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        // Return the allocation to the pool if recording cannot start;
        // submit(self) is the only other release path
        if let Err(e) = unsafe {
            device
                .device
                .begin_command_buffer(command_buffer, &begin_info)
        } {
            unsafe {
                device
                    .device
                    .free_command_buffers(command_pool, &[command_buffer]);
            }
            return Err(e).context("Failed to begin one-time command buffer");
        }

        Ok(Self {
            device,
            command_pool,
            command_buffer,
        })
    }

    pub fn buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn submit(self) -> Result<()> {
        let command_buffers = [self.command_buffer];

        unsafe {
            self.device.device.end_command_buffer(self.command_buffer)?;

            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    vk::Fence::null(),
                )
                .context("Failed to submit one-time command buffer")?;
            self.device
                .device
                .queue_wait_idle(self.device.graphics_queue)?;

            self.device
                .device
                .free_command_buffers(self.command_pool, &command_buffers);
        }

        Ok(())
    }
}

/// Source/destination access masks for a supported layout transition.
/// This is a closed enumeration; any other pair is an unsupported
/// operation, not a case to solve generally.
pub fn transition_access_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(vk::AccessFlags, vk::AccessFlags)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::PREINITIALIZED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::HOST_WRITE,
            vk::AccessFlags::TRANSFER_WRITE,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ))
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok((vk::AccessFlags::empty(), vk::AccessFlags::TRANSFER_WRITE))
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )),
        _ => anyhow::bail!(
            "Unsupported layout transition: {:?} -> {:?}",
            old_layout,
            new_layout
        ),
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

/// Image aspect touched by a transition into the given layout
pub fn transition_aspect_mask(
    new_layout: vk::ImageLayout,
    format: vk::Format,
) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil_component(format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        aspect
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Insert a pipeline barrier moving the image between layouts, through a
/// synchronously waited one-time command
pub fn transition_image_layout(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    image: vk::Image,
    format: vk::Format,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let (src_access, dst_access) = transition_access_masks(old_layout, new_layout)?;
    let aspect_mask = transition_aspect_mask(new_layout, format);

    let cmd = OneTimeCommands::begin(device, command_pool)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device.device.cmd_pipeline_barrier(
            cmd.buffer(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }

    cmd.submit()
}

/// Allocate and pre-record one draw command buffer per framebuffer.
/// Every buffer binds the current pipeline, quad geometry and descriptor
/// set; they must be freed and re-recorded whenever any of those change.
#[allow(clippy::too_many_arguments)]
pub fn record_command_buffers(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    framebuffers: &[vk::Framebuffer],
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    swapchain: &Swapchain,
    descriptors: &DescriptorResources,
    mesh: &QuadMesh,
    clear_color: [f32; 4],
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(framebuffers.len() as u32);

    let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")?;

    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ];

    for (i, &cmd) in command_buffers.iter().enumerate() {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

        unsafe {
            device.device.begin_command_buffer(cmd, &begin_info)?;

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass)
                .framebuffer(framebuffers[i])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: swapchain.extent,
                })
                .clear_values(&clear_values);

            device
                .device
                .cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

            device
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);

            device
                .device
                .cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer], &[0]);
            device.device.cmd_bind_index_buffer(
                cmd,
                mesh.index_buffer,
                0,
                vk::IndexType::UINT32,
            );

            device.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                0,
                &[descriptors.set],
                &[],
            );

            device
                .device
                .cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);

            device.device.cmd_end_render_pass(cmd);
            device.device.end_command_buffer(cmd)?;
        }
    }

    Ok(command_buffers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_upload_transitions_are_supported() {
        let (src, dst) = transition_access_masks(
            vk::ImageLayout::PREINITIALIZED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src, vk::AccessFlags::HOST_WRITE);
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);

        let (src, dst) = transition_access_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn depth_transition_waits_on_nothing() {
        let (src, dst) = transition_access_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src, vk::AccessFlags::empty());
        assert!(dst.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn unknown_transition_pair_is_rejected() {
        let result = transition_access_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert!(result.is_err());
    }

    #[test]
    fn depth_aspect_includes_stencil_for_combined_formats() {
        let aspect = transition_aspect_mask(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::Format::D24_UNORM_S8_UINT,
        );
        assert!(aspect.contains(vk::ImageAspectFlags::DEPTH));
        assert!(aspect.contains(vk::ImageAspectFlags::STENCIL));

        let aspect = transition_aspect_mask(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::Format::D32_SFLOAT,
        );
        assert!(aspect.contains(vk::ImageAspectFlags::DEPTH));
        assert!(!aspect.contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn color_transitions_touch_the_color_aspect() {
        let aspect = transition_aspect_mask(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::Format::R8G8B8A8_UNORM,
        );
        assert_eq!(aspect, vk::ImageAspectFlags::COLOR);
    }
}
