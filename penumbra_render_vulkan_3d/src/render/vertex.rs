use ash::vk;
use bytemuck::{Pod, Zeroable};
use penumbra_render_vulkan_core::gpu::{VertexAttribute, VertexLayout};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            normal,
        }
    }
}

const VERTEX_ATTRIBUTES: [VertexAttribute; 3] = [
    VertexAttribute {
        location: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: 0,
    },
    VertexAttribute {
        location: 1,
        format: vk::Format::R32G32_SFLOAT,
        offset: 12,
    },
    VertexAttribute {
        location: 2,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: 20,
    },
];

pub const VERTEX_LAYOUT: VertexLayout = VertexLayout {
    stride: size_of::<Vertex>() as u32,
    attributes: &VERTEX_ATTRIBUTES,
};

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn layout_matches_struct() {
        assert_eq!(VERTEX_LAYOUT.stride, 32);
        assert_eq!(VERTEX_LAYOUT.attributes[1].offset as usize, offset_of!(Vertex, uv));
        assert_eq!(
            VERTEX_LAYOUT.attributes[2].offset as usize,
            offset_of!(Vertex, normal)
        );
    }
}
