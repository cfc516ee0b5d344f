// Quad geometry - the one piece of hard-coded scene data
//
// Four position+UV vertices and six indices forming two triangles,
// uploaded once into device-local buffers through staging.

use anyhow::Result;
use ash::vk;

use super::buffer::create_device_local_buffer;
use super::VulkanDevice;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-0.5, -0.5, 0.0],
        uv: [1.0, 0.0],
    },
    Vertex {
        position: [0.5, -0.5, 0.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5, 0.0],
        uv: [0.0, 1.0],
    },
    Vertex {
        position: [-0.5, 0.5, 0.0],
        uv: [1.0, 1.0],
    },
];

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(std::mem::size_of::<[f32; 3]>() as u32)
                .build(),
        ]
    }
}

/// Device-local vertex and index buffers for the textured quad
pub struct QuadMesh {
    pub vertex_buffer: vk::Buffer,
    pub vertex_memory: vk::DeviceMemory,
    pub index_buffer: vk::Buffer,
    pub index_memory: vk::DeviceMemory,
    pub index_count: u32,
}

impl QuadMesh {
    pub fn new(device: &VulkanDevice, command_pool: vk::CommandPool) -> Result<Self> {
        let (vertex_buffer, vertex_memory) = create_device_local_buffer(
            device,
            command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &QUAD_VERTICES,
        )?;

        let (index_buffer, index_memory) = create_device_local_buffer(
            device,
            command_pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &QUAD_INDICES,
        )?;

        Ok(Self {
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.vertex_buffer, None);
            device.free_memory(self.vertex_memory, None);
            device.destroy_buffer(self.index_buffer, None);
            device.free_memory(self.index_memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_interleaved_pos3_uv2() {
        assert_eq!(std::mem::size_of::<Vertex>(), 5 * std::mem::size_of::<f32>());

        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 20);

        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
    }

    #[test]
    fn quad_is_two_triangles_over_four_vertices() {
        assert_eq!(QUAD_VERTICES.len(), 4);
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }
}
