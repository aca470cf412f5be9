use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Up vector the light looks along while aiming at the scene origin.
pub const LIGHT_UP: Vec3 = Vec3::new(0.0, 20.0, 0.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub position: Vec4,
    pub projection: Mat4,
    pub view: Mat4,
}

impl DirectionalLight {
    pub fn orthographic(
        position: Vec4,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let mut light = Self {
            position,
            projection: Mat4::orthographic_rh(left, right, bottom, top, near, far),
            view: Mat4::IDENTITY,
        };
        light.aim_at_origin(position);
        light
    }

    pub fn aim_at_origin(&mut self, position: Vec4) {
        self.position = position;
        self.view = Mat4::look_at_rh(position.truncate(), Vec3::ZERO, LIGHT_UP);
    }

    pub fn light_space_matrix(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn push_constant(&self) -> DirectionalLightPush {
        DirectionalLightPush {
            position: self.position.to_array(),
            projection: self.projection.to_cols_array_2d(),
            view: self.view.to_cols_array_2d(),
        }
    }
}

/// GPU image of [`DirectionalLight`], pushed by the shadow pass at offset 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightPush {
    pub position: [f32; 4],
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}
