use ash::vk;
use penumbra_render_vulkan_core::gpu::GpuDevice;
use tracing::info;

use crate::render::drawable::{Drawable, DrawableContext, DrawableError};

/// Ordered set of drawables, drawn once per pass in insertion order.
pub struct Scene<D: GpuDevice> {
    drawables: Vec<Box<dyn Drawable<D>>>,
}

impl<D: GpuDevice> Default for Scene<D> {
    fn default() -> Self {
        Self {
            drawables: Vec::new(),
        }
    }
}

impl<D: GpuDevice> Scene<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, drawable: impl Drawable<D> + 'static) -> usize {
        self.drawables.push(Box::new(drawable));
        self.drawables.len() - 1
    }

    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Drawable<D> + 'static)> {
        self.drawables.get_mut(index).map(|d| d.as_mut())
    }

    pub fn create_all(
        &mut self,
        ctx: &DrawableContext<D>,
        color_format: vk::Format,
        push_constant_start: u32,
    ) -> Result<(), DrawableError> {
        for drawable in &mut self.drawables {
            drawable.create(ctx, color_format, push_constant_start)?;
        }
        info!(drawables = self.drawables.len(), "Scene created");
        Ok(())
    }

    pub fn draw_all(&self, command_buffer: vk::CommandBuffer, bind_pipeline: bool) {
        for drawable in &self.drawables {
            drawable.draw(command_buffer, bind_pipeline);
        }
    }

    pub fn destroy_all(&mut self) {
        for drawable in &mut self.drawables {
            drawable.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use penumbra_render_vulkan_core::testing::{RecordedCommand, ResourceKind, TrackingDevice};

    use super::*;
    use crate::{
        render::{drawable::MeshObject, push_constants::PUSH_CONSTANT_START, vertex::Vertex},
        shader::{SPIRV_MAGIC, ShaderProgram},
    };

    fn mesh(name: &'static str, vertex_count: usize) -> MeshObject<TrackingDevice> {
        MeshObject::new(
            name,
            vec![Vertex::new([0.0; 3], [0.0; 2], [0.0, 1.0, 0.0]); vertex_count],
            ShaderProgram {
                vertex: vec![SPIRV_MAGIC],
                fragment: vec![SPIRV_MAGIC],
            },
        )
    }

    #[test]
    fn draws_in_insertion_order() {
        let device = Arc::new(TrackingDevice::new());
        let mut scene = Scene::new();
        assert_eq!(scene.push(mesh("ground", 6)), 0);
        assert_eq!(scene.push(mesh("cube", 36)), 1);
        scene
            .create_all(
                &DrawableContext {
                    device: device.clone(),
                    depth_format: vk::Format::D32_SFLOAT,
                },
                vk::Format::B8G8R8A8_SRGB,
                PUSH_CONSTANT_START,
            )
            .unwrap();
        device.clear_commands();

        scene.draw_all(device.fake_command_buffer(), false);
        let draws: Vec<u32> = device
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCommand::Draw { vertex_count } => Some(vertex_count),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![6, 36]);

        scene.destroy_all();
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn failed_create_leaves_nothing_after_drop() {
        let device = Arc::new(TrackingDevice::new());
        let mut scene = Scene::new();
        scene.push(mesh("ground", 6));
        scene.push(mesh("cube", 36));
        device.fail_next(ResourceKind::Buffer);
        device.fail_next(ResourceKind::Buffer);

        let result = scene.create_all(
            &DrawableContext {
                device: device.clone(),
                depth_format: vk::Format::D32_SFLOAT,
            },
            vk::Format::B8G8R8A8_SRGB,
            PUSH_CONSTANT_START,
        );
        assert!(result.is_err());
        drop(scene);
        assert_eq!(device.live_count(), 0);
    }
}
