use std::sync::Arc;

use ash::vk;
use penumbra_render_vulkan_core::{
    gpu::{
        AttachmentDesc, BlendMode, ClearValue, DescriptorWrite, GpuBuffer, GpuDevice, GpuError,
        GpuResult, GraphicsPipelineDesc, RenderingDesc, StageAccess,
    },
    handle::{self, Owned},
    renderer::FrameContext,
    texture::{RenderTarget, RenderTargetDesc},
};
use thiserror::Error;
use tracing::debug;

use crate::{
    render::{light::DirectionalLight, push_constants::push_constant_range, vertex::VERTEX_LAYOUT},
    shader::ShaderProgram,
};

const LIGHT_BUFFER_SIZE: vk::DeviceSize = size_of::<[f32; 16]>() as vk::DeviceSize;

/// Set index the light set is bound at; set 0 is reserved for per-material data.
const LIGHT_SET_INDEX: u32 = 1;

const TOP: StageAccess =
    StageAccess::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);
const COLOR_WRITE: StageAccess = StageAccess::new(
    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
    vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
);
const DEPTH_TESTS: StageAccess = StageAccess::new(
    vk::PipelineStageFlags2::from_raw(
        vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
            | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
    ),
    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
);
const TRANSFER_READ: StageAccess = StageAccess::new(
    vk::PipelineStageFlags2::TRANSFER,
    vk::AccessFlags2::TRANSFER_READ,
);

#[derive(Debug, Error)]
pub enum LightningPassError {
    #[error("Failed to create lightning pass resources: {0}")]
    CreateFailed(#[from] GpuError),

    #[error("Shadow map {0} has no sampler to read it through")]
    ShadowMapWithoutSampler(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Technique {
    Simple,
    #[default]
    ShadowMapped,
}

#[derive(Debug, Clone, Copy)]
pub struct LightningPassConfig {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub push_constant_start: u32,
    pub extent: vk::Extent2D,
}

pub struct LightningPassShaders<'a> {
    pub simple: &'a ShaderProgram,
    pub shadow_mapped: &'a ShaderProgram,
}

/// The light set (set 1) carries the light-space matrix at binding 0 and the
/// shadow map at binding 1. The color output ends every frame in `GENERAL`,
/// ready to be blitted.
pub struct LightningPass<D: GpuDevice> {
    device: Arc<D>,
    simple_pipeline: Owned<D, vk::Pipeline>,
    shadow_pipeline: Owned<D, vk::Pipeline>,
    layout: Owned<D, vk::PipelineLayout>,
    light_set: vk::DescriptorSet,
    _descriptor_pool: Owned<D, vk::DescriptorPool>,
    light_buffer: Owned<D, GpuBuffer>,
    _light_set_layout: Owned<D, vk::DescriptorSetLayout>,
    _base_set_layout: Owned<D, vk::DescriptorSetLayout>,
    color: RenderTarget<D>,
    depth: RenderTarget<D>,
    technique: Technique,
    extent: vk::Extent2D,
}

fn uniform_and_sampler_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::ALL),
        vk::DescriptorSetLayoutBinding::default()
            .binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::ALL),
    ]
}

impl<D: GpuDevice> LightningPass<D> {
    pub fn new(
        device: Arc<D>,
        config: &LightningPassConfig,
        shaders: LightningPassShaders<'_>,
        shadow_map: &RenderTarget<D>,
    ) -> Result<Self, LightningPassError> {
        let shadow_sampler = shadow_map
            .sampler()
            .ok_or(LightningPassError::ShadowMapWithoutSampler(shadow_map.name()))?;

        let color = RenderTarget::new(
            device.clone(),
            &RenderTargetDesc {
                name: "lightning color",
                format: config.color_format,
                extent: config.extent,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC,
                aspect: vk::ImageAspectFlags::COLOR,
                sampler: None,
            },
        )?;
        let depth = RenderTarget::new(
            device.clone(),
            &RenderTargetDesc {
                name: "lightning depth",
                format: config.depth_format,
                extent: config.extent,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::DEPTH,
                sampler: None,
            },
        )?;

        let bindings = uniform_and_sampler_bindings();
        let base_set_layout = handle::descriptor_set_layout(&device, &bindings)?;
        let light_set_layout = handle::descriptor_set_layout(&device, &bindings)?;

        let light_buffer = handle::buffer(
            &device,
            LIGHT_BUFFER_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        device.write_buffer(
            &light_buffer.get(),
            bytemuck::bytes_of(&glam::Mat4::IDENTITY.to_cols_array()),
        )?;

        let descriptor_pool = handle::descriptor_pool(
            &device,
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 1,
                },
            ],
            1,
        )?;
        let light_set =
            device.allocate_descriptor_set(descriptor_pool.get(), light_set_layout.get())?;
        device.write_descriptor_set(
            light_set,
            &[
                DescriptorWrite::UniformBuffer {
                    binding: 0,
                    buffer: light_buffer.get().buffer,
                    range: LIGHT_BUFFER_SIZE,
                },
                DescriptorWrite::CombinedImageSampler {
                    binding: 1,
                    view: shadow_map.view(),
                    sampler: shadow_sampler,
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            ],
        );

        let layout = handle::pipeline_layout(
            &device,
            &[base_set_layout.get(), light_set_layout.get()],
            &[push_constant_range(config.push_constant_start)],
        )?;

        let color_formats = [config.color_format];
        let build = |program: &ShaderProgram| {
            handle::graphics_pipeline(
                &device,
                &GraphicsPipelineDesc {
                    layout: layout.get(),
                    vertex_shader: &program.vertex,
                    fragment_shader: &program.fragment,
                    vertex_layout: VERTEX_LAYOUT,
                    cull_mode: vk::CullModeFlags::NONE,
                    front_face: vk::FrontFace::CLOCKWISE,
                    depth_bias: None,
                    depth_compare_op: vk::CompareOp::LESS,
                    blend: BlendMode::Alpha,
                    color_formats: &color_formats,
                    depth_format: config.depth_format,
                },
            )
        };
        let simple_pipeline = build(shaders.simple)?;
        let shadow_pipeline = build(shaders.shadow_mapped)?;

        debug!(
            width = config.extent.width,
            height = config.extent.height,
            format = ?config.color_format,
            "Lightning pass created"
        );

        Ok(Self {
            device,
            simple_pipeline,
            shadow_pipeline,
            layout,
            light_set,
            _descriptor_pool: descriptor_pool,
            light_buffer,
            _light_set_layout: light_set_layout,
            _base_set_layout: base_set_layout,
            color,
            depth,
            technique: Technique::default(),
            extent: config.extent,
        })
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn set_technique(&mut self, technique: Technique) {
        if self.technique != technique {
            debug!(?technique, "Lightning technique changed");
        }
        self.technique = technique;
    }

    pub fn simple_pipeline(&self) -> vk::Pipeline {
        self.simple_pipeline.get()
    }

    pub fn shadow_map_pipeline(&self) -> vk::Pipeline {
        self.shadow_pipeline.get()
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.layout.get()
    }

    pub fn light_buffer(&self) -> vk::Buffer {
        self.light_buffer.get().buffer
    }

    pub fn color_output(&self) -> &RenderTarget<D> {
        &self.color
    }

    /// Writes the light-space matrix into the light uniform. Call before
    /// [`LightningPass::begin_pass`] every frame.
    pub fn update_light_info(&self, light: &DirectionalLight) -> GpuResult<()> {
        let light_space = light.light_space_matrix().to_cols_array();
        self.device
            .write_buffer(&self.light_buffer.get(), bytemuck::bytes_of(&light_space))
    }

    pub fn begin_pass(&mut self, frame: &FrameContext) {
        let cmd = frame.command_buffer;
        self.color
            .discard_to(cmd, vk::ImageLayout::ATTACHMENT_OPTIMAL, TOP, COLOR_WRITE);
        self.depth
            .discard_to(cmd, vk::ImageLayout::ATTACHMENT_OPTIMAL, TOP, DEPTH_TESTS);

        self.device.cmd_begin_rendering(
            cmd,
            &RenderingDesc {
                extent: self.extent,
                color: Some(AttachmentDesc::cleared(
                    self.color.view(),
                    vk::ImageLayout::ATTACHMENT_OPTIMAL,
                    ClearValue::Color([0.0, 0.0, 0.0, 1.0]),
                )),
                depth: Some(AttachmentDesc::cleared(
                    self.depth.view(),
                    vk::ImageLayout::ATTACHMENT_OPTIMAL,
                    ClearValue::Depth(1.0),
                )),
            },
        );
        self.device.cmd_set_viewport_and_scissor(cmd, self.extent);

        let pipeline = match self.technique {
            Technique::Simple => self.simple_pipeline.get(),
            Technique::ShadowMapped => self.shadow_pipeline.get(),
        };
        self.device.cmd_bind_pipeline(cmd, pipeline);
        self.device.cmd_bind_descriptor_sets(
            cmd,
            self.layout.get(),
            LIGHT_SET_INDEX,
            &[self.light_set],
        );
    }

    pub fn end_pass(&mut self, frame: &FrameContext) {
        let cmd = frame.command_buffer;
        self.device.cmd_end_rendering(cmd);
        self.color
            .transition(cmd, vk::ImageLayout::GENERAL, COLOR_WRITE, TRANSFER_READ);
    }
}
