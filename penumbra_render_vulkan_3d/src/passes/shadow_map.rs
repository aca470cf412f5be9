use std::sync::Arc;

use ash::vk;
use penumbra_render_vulkan_core::{
    gpu::{
        AttachmentDesc, BlendMode, ClearValue, DepthBias, GpuDevice, GpuError,
        GraphicsPipelineDesc, RenderingDesc, SamplerDesc, StageAccess,
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

const DEPTH_BIAS: DepthBias = DepthBias {
    constant_factor: 0.5,
    clamp: 0.0,
    slope_factor: 1.75,
};

const BEGIN_SRC: StageAccess =
    StageAccess::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);
const DEPTH_WRITE: StageAccess = StageAccess::new(
    vk::PipelineStageFlags2::ALL_GRAPHICS,
    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
);
const FRAGMENT_READ: StageAccess = StageAccess::new(
    vk::PipelineStageFlags2::FRAGMENT_SHADER,
    vk::AccessFlags2::SHADER_READ,
);

#[derive(Debug, Error)]
pub enum ShadowMapError {
    #[error("Failed to create shadow map resources: {0}")]
    CreateFailed(#[from] GpuError),
}

#[derive(Debug, Clone, Copy)]
pub struct ShadowMapConfig {
    pub depth_format: vk::Format,
    pub push_constant_start: u32,
    pub extent: vk::Extent2D,
}

/// After [`ShadowMap::end_pass`] the depth texture is in
/// `SHADER_READ_ONLY_OPTIMAL` and may be sampled by later passes.
pub struct ShadowMap<D: GpuDevice> {
    device: Arc<D>,
    pipeline: Owned<D, vk::Pipeline>,
    layout: Owned<D, vk::PipelineLayout>,
    depth: RenderTarget<D>,
    extent: vk::Extent2D,
}

impl<D: GpuDevice> ShadowMap<D> {
    pub fn new(
        device: Arc<D>,
        config: &ShadowMapConfig,
        program: &ShaderProgram,
    ) -> Result<Self, ShadowMapError> {
        let depth = RenderTarget::new(
            device.clone(),
            &RenderTargetDesc {
                name: "shadow depth",
                format: config.depth_format,
                extent: config.extent,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::DEPTH,
                sampler: Some(SamplerDesc::default()),
            },
        )?;

        let layout = handle::pipeline_layout(
            &device,
            &[],
            &[push_constant_range(config.push_constant_start)],
        )?;

        let pipeline = handle::graphics_pipeline(
            &device,
            &GraphicsPipelineDesc {
                layout: layout.get(),
                vertex_shader: &program.vertex,
                fragment_shader: &program.fragment,
                vertex_layout: VERTEX_LAYOUT,
                cull_mode: vk::CullModeFlags::NONE,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth_bias: Some(DEPTH_BIAS),
                depth_compare_op: vk::CompareOp::LESS,
                blend: BlendMode::Opaque,
                color_formats: &[],
                depth_format: config.depth_format,
            },
        )?;

        debug!(
            width = config.extent.width,
            height = config.extent.height,
            "Shadow map created"
        );

        Ok(Self {
            device,
            pipeline,
            layout,
            depth,
            extent: config.extent,
        })
    }

    pub fn depth(&self) -> &RenderTarget<D> {
        &self.depth
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.layout.get()
    }

    pub fn begin_pass(&mut self, frame: &FrameContext) {
        let cmd = frame.command_buffer;
        self.depth
            .discard_to(cmd, vk::ImageLayout::ATTACHMENT_OPTIMAL, BEGIN_SRC, DEPTH_WRITE);

        self.device.cmd_begin_rendering(
            cmd,
            &RenderingDesc {
                extent: self.extent,
                color: None,
                depth: Some(AttachmentDesc::cleared(
                    self.depth.view(),
                    vk::ImageLayout::ATTACHMENT_OPTIMAL,
                    ClearValue::Depth(1.0),
                )),
            },
        );
        self.device.cmd_set_viewport_and_scissor(cmd, self.extent);
        self.device.cmd_bind_pipeline(cmd, self.pipeline.get());
    }

    pub fn update_light_info(&self, frame: &FrameContext, light: &DirectionalLight) {
        let push = light.push_constant();
        self.device.cmd_push_constants(
            frame.command_buffer,
            self.layout.get(),
            0,
            bytemuck::bytes_of(&push),
        );
    }

    pub fn end_pass(&mut self, frame: &FrameContext) {
        let cmd = frame.command_buffer;
        self.device.cmd_end_rendering(cmd);
        self.depth.transition(
            cmd,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            DEPTH_WRITE,
            FRAGMENT_READ,
        );
    }
}

#[cfg(test)]
mod tests {
    use penumbra_render_vulkan_core::testing::{RecordedCommand, ResourceKind, TrackingDevice};

    use super::*;
    use crate::{render::push_constants::PUSH_CONSTANT_START, shader::SPIRV_MAGIC};

    fn config() -> ShadowMapConfig {
        ShadowMapConfig {
            depth_format: vk::Format::D32_SFLOAT,
            push_constant_start: PUSH_CONSTANT_START,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
        }
    }

    fn program() -> ShaderProgram {
        ShaderProgram {
            vertex: vec![SPIRV_MAGIC, 1],
            fragment: vec![SPIRV_MAGIC, 2],
        }
    }

    fn frame(device: &TrackingDevice) -> FrameContext {
        FrameContext {
            command_buffer: device.fake_command_buffer(),
        }
    }

    #[test]
    fn pipeline_is_depth_only_with_bias() {
        let device = Arc::new(TrackingDevice::new());
        let shadow = ShadowMap::new(device.clone(), &config(), &program()).unwrap();

        let pipelines = device.pipelines();
        assert_eq!(pipelines.len(), 1);
        let record = &pipelines[0];
        assert!(record.color_formats.is_empty());
        assert_eq!(record.depth_bias, Some(DEPTH_BIAS));
        assert_eq!(record.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(record.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(record.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(record.vertex_stride, 32);

        let layout = device.pipeline_layout(shadow.pipeline_layout()).unwrap();
        assert!(layout.set_layouts.is_empty());
        assert_eq!(
            layout.push_constant_ranges,
            vec![(vk::ShaderStageFlags::ALL, 0, 224)]
        );
        assert!(shadow.depth().sampler().is_some());
    }

    #[test]
    fn pass_leaves_depth_readable() {
        let device = Arc::new(TrackingDevice::new());
        let mut shadow = ShadowMap::new(device.clone(), &config(), &program()).unwrap();
        let frame = frame(&device);

        shadow.begin_pass(&frame);
        assert_eq!(shadow.depth().layout(), vk::ImageLayout::ATTACHMENT_OPTIMAL);
        shadow.end_pass(&frame);
        assert_eq!(
            shadow.depth().layout(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );

        let barriers = device.barriers_for(shadow.depth().image());
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barriers[0].src, BEGIN_SRC);
        assert_eq!(barriers[0].dst, DEPTH_WRITE);
        assert_eq!(barriers[1].src, DEPTH_WRITE);
        assert_eq!(barriers[1].dst, FRAGMENT_READ);

        let began = device.commands().into_iter().find_map(|c| match c {
            RecordedCommand::BeginRendering(desc) => Some(desc),
            _ => None,
        });
        let began = began.unwrap();
        assert!(began.color.is_none());
        assert_eq!(began.depth.unwrap().clear, ClearValue::Depth(1.0));
    }

    #[test]
    fn light_info_is_pushed_at_offset_zero() {
        let device = Arc::new(TrackingDevice::new());
        let shadow = ShadowMap::new(device.clone(), &config(), &program()).unwrap();
        let light = DirectionalLight::orthographic(
            glam::Vec4::new(5.0, 3.0, 5.0, 0.0),
            -5.0,
            5.0,
            -5.0,
            5.0,
            0.1,
            10.0,
        );
        shadow.update_light_info(&frame(&device), &light);

        match device.commands().last() {
            Some(RecordedCommand::PushConstants {
                layout,
                offset,
                bytes,
            }) => {
                assert_eq!(*layout, shadow.pipeline_layout());
                assert_eq!(*offset, 0);
                assert_eq!(bytes.len(), 144);
            }
            other => panic!("expected push constants, got {other:?}"),
        }
    }

    #[test]
    fn drop_releases_every_handle() {
        let device = Arc::new(TrackingDevice::new());
        let shadow = ShadowMap::new(device.clone(), &config(), &program()).unwrap();
        assert_eq!(device.live_count_of(ResourceKind::Pipeline), 1);
        drop(shadow);
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.invalid_destroys(), 0);
    }

    #[test]
    fn failed_pipeline_releases_partial_state() {
        let device = Arc::new(TrackingDevice::new());
        device.fail_next(ResourceKind::Pipeline);
        assert!(ShadowMap::new(device.clone(), &config(), &program()).is_err());
        assert_eq!(device.live_count(), 0);
    }
}
