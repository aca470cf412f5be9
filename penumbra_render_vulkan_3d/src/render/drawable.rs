use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use penumbra_render_vulkan_core::{
    gpu::{BlendMode, GpuBuffer, GpuDevice, GpuError, GraphicsPipelineDesc},
    handle::{self, Owned},
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    render::{
        push_constants::{ModelPushConstant, push_constant_range},
        vertex::{VERTEX_LAYOUT, Vertex},
    },
    shader::ShaderProgram,
};

#[derive(Debug, Error)]
pub enum DrawableError {
    #[error("Failed to create drawable resources: {0}")]
    CreateFailed(#[from] GpuError),

    #[error("Drawable {0} is already created")]
    AlreadyCreated(&'static str),
}

pub struct DrawableContext<D: GpuDevice> {
    pub device: Arc<D>,
    pub depth_format: vk::Format,
}

/// Passes bind their own pipeline and call [`Drawable::draw`] with
/// `bind_pipeline = false`; the drawable then only pushes its model matrix at
/// `push_constant_start`, binds its vertices and draws.
pub trait Drawable<D: GpuDevice> {
    fn create(
        &mut self,
        ctx: &DrawableContext<D>,
        color_format: vk::Format,
        push_constant_start: u32,
    ) -> Result<(), DrawableError>;

    fn draw(&self, command_buffer: vk::CommandBuffer, bind_pipeline: bool);

    /// Releases GPU resources. The drawable may be created again afterwards.
    fn destroy(&mut self);

    fn set_position(&mut self, position: Mat4);

    fn set_rotation(&mut self, rotation: Mat4);
}

struct MeshResources<D: GpuDevice> {
    device: Arc<D>,
    pipeline: Owned<D, vk::Pipeline>,
    layout: Owned<D, vk::PipelineLayout>,
    vertex_buffer: Owned<D, GpuBuffer>,
    push_constant_start: u32,
}

pub struct MeshObject<D: GpuDevice> {
    name: &'static str,
    vertices: Vec<Vertex>,
    program: ShaderProgram,
    position: Mat4,
    rotation: Mat4,
    resources: Option<MeshResources<D>>,
}

impl<D: GpuDevice> MeshObject<D> {
    pub fn new(name: &'static str, vertices: Vec<Vertex>, program: ShaderProgram) -> Self {
        Self {
            name,
            vertices,
            program,
            position: Mat4::IDENTITY,
            rotation: Mat4::IDENTITY,
            resources: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn model(&self) -> Mat4 {
        self.position * self.rotation
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn is_created(&self) -> bool {
        self.resources.is_some()
    }

    pub fn pipeline(&self) -> Option<vk::Pipeline> {
        self.resources.as_ref().map(|r| r.pipeline.get())
    }

    pub fn vertex_buffer(&self) -> Option<vk::Buffer> {
        self.resources.as_ref().map(|r| r.vertex_buffer.get().buffer)
    }
}

impl<D: GpuDevice> Drawable<D> for MeshObject<D> {
    fn create(
        &mut self,
        ctx: &DrawableContext<D>,
        color_format: vk::Format,
        push_constant_start: u32,
    ) -> Result<(), DrawableError> {
        if self.resources.is_some() {
            return Err(DrawableError::AlreadyCreated(self.name));
        }
        let device = &ctx.device;

        let bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let vertex_buffer = handle::buffer(
            device,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        device.write_buffer(&vertex_buffer.get(), bytes)?;

        let layout =
            handle::pipeline_layout(device, &[], &[push_constant_range(push_constant_start)])?;
        let color_formats = [color_format];
        let pipeline = handle::graphics_pipeline(
            device,
            &GraphicsPipelineDesc {
                layout: layout.get(),
                vertex_shader: &self.program.vertex,
                fragment_shader: &self.program.fragment,
                vertex_layout: VERTEX_LAYOUT,
                cull_mode: vk::CullModeFlags::NONE,
                front_face: vk::FrontFace::CLOCKWISE,
                depth_bias: None,
                depth_compare_op: vk::CompareOp::LESS,
                blend: BlendMode::Alpha,
                color_formats: &color_formats,
                depth_format: ctx.depth_format,
            },
        )?;

        debug!(name = self.name, vertices = self.vertices.len(), "Mesh created");
        self.resources = Some(MeshResources {
            device: device.clone(),
            pipeline,
            layout,
            vertex_buffer,
            push_constant_start,
        });
        Ok(())
    }

    fn draw(&self, command_buffer: vk::CommandBuffer, bind_pipeline: bool) {
        let Some(resources) = &self.resources else {
            warn!(name = self.name, "Skipping draw of a mesh that was never created");
            return;
        };
        let device = &resources.device;

        if bind_pipeline {
            device.cmd_bind_pipeline(command_buffer, resources.pipeline.get());
        }
        let model = ModelPushConstant::new(self.model());
        device.cmd_push_constants(
            command_buffer,
            resources.layout.get(),
            resources.push_constant_start,
            bytemuck::bytes_of(&model),
        );
        device.cmd_bind_vertex_buffer(command_buffer, resources.vertex_buffer.get().buffer);
        device.cmd_draw(command_buffer, self.vertex_count());
    }

    fn destroy(&mut self) {
        if self.resources.take().is_some() {
            debug!(name = self.name, "Mesh destroyed");
        }
    }

    fn set_position(&mut self, position: Mat4) {
        self.position = position;
    }

    fn set_rotation(&mut self, rotation: Mat4) {
        self.rotation = rotation;
    }
}
