//! Byte layout of the push-constant block shared by every pipeline.
//!
//! | bytes      | contents                                  |
//! |------------|-------------------------------------------|
//! | `[0,144)`  | [`CameraPushConstant`]                    |
//! | `[144,160)`| [`LightInfo`]                             |
//! | `[160,224)`| per-object model matrix                   |

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

pub const LIGHT_INFO_OFFSET: u32 = size_of::<CameraPushConstant>() as u32;

/// First byte available to drawables for their own constants.
pub const PUSH_CONSTANT_START: u32 = LIGHT_INFO_OFFSET + size_of::<LightInfo>() as u32;

pub const MODEL_PUSH_SIZE: u32 = size_of::<ModelPushConstant>() as u32;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraPushConstant {
    pub position: [f32; 4],
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

impl CameraPushConstant {
    pub fn new(position: Vec3, projection: Mat4, view: Mat4) -> Self {
        Self {
            position: position.extend(0.0).to_array(),
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightInfo {
    pub position: [f32; 4],
}

impl LightInfo {
    pub fn new(position: Vec4) -> Self {
        Self {
            position: position.to_array(),
        }
    }

    pub fn position(&self) -> Vec4 {
        Vec4::from_array(self.position)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelPushConstant {
    pub model: [[f32; 4]; 4],
}

impl ModelPushConstant {
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
        }
    }
}

pub fn push_constant_range(push_constant_start: u32) -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::ALL,
        offset: 0,
        size: push_constant_start + MODEL_PUSH_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn layout_is_byte_exact() {
        assert_eq!(size_of::<CameraPushConstant>(), 144);
        assert_eq!(offset_of!(CameraPushConstant, view), 80);
        assert_eq!(size_of::<LightInfo>(), 16);
        assert_eq!(size_of::<ModelPushConstant>(), 64);
        assert_eq!(LIGHT_INFO_OFFSET, 144);
        assert_eq!(PUSH_CONSTANT_START, 160);

        let range = push_constant_range(PUSH_CONSTANT_START);
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 224);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::ALL);
    }

    #[test]
    fn camera_position_is_padded_with_zero() {
        let camera = CameraPushConstant::new(Vec3::new(1.0, 2.0, 3.0), Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(camera.position, [1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn identical_inputs_give_identical_bytes() {
        let build = || {
            CameraPushConstant::new(
                Vec3::new(0.0, 1.0, 6.0),
                Mat4::perspective_rh(45f32.to_radians(), 4.0 / 3.0, 0.1, 100.0),
                Mat4::look_at_rh(Vec3::new(0.0, 1.0, 6.0), Vec3::ZERO, Vec3::Y),
            )
        };
        assert_eq!(bytemuck::bytes_of(&build()), bytemuck::bytes_of(&build()));

        let light = LightInfo::new(Vec4::new(5.0, 3.0, 5.0, 0.0));
        assert_eq!(light.position(), Vec4::new(5.0, 3.0, 5.0, 0.0));
        assert_eq!(&bytemuck::bytes_of(&light)[..4], &5.0f32.to_ne_bytes());
    }
}
