use std::sync::Arc;

use ash::vk;
use penumbra_render_vulkan_core::{
    command::CommandPool,
    gpu::{BlitDesc, GpuDevice, GpuError, ImageBarrier, Presenter, StageAccess},
    handle::{self, Owned},
    renderer::FrameContext,
    sync::{Fence, Semaphore},
    texture::LayoutError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    passes::{
        lightning_pass::{
            LightningPass, LightningPassConfig, LightningPassError, LightningPassShaders,
            Technique,
        },
        shadow_map::{ShadowMap, ShadowMapConfig, ShadowMapError},
    },
    render::{
        drawable::DrawableContext,
        light::DirectionalLight,
        push_constants::{
            CameraPushConstant, LIGHT_INFO_OFFSET, LightInfo, PUSH_CONSTANT_START,
            push_constant_range,
        },
        scene::Scene,
    },
    shader::ShaderLibrary,
};

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const TOP: StageAccess =
    StageAccess::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);
const TRANSFER_WRITE: StageAccess = StageAccess::new(
    vk::PipelineStageFlags2::TRANSFER,
    vk::AccessFlags2::TRANSFER_WRITE,
);
const PRESENT: StageAccess =
    StageAccess::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE);

#[derive(Debug, Error)]
pub enum FrameRendererError {
    #[error(transparent)]
    ShadowMap(#[from] ShadowMapError),

    #[error(transparent)]
    LightningPass(#[from] LightningPassError),

    #[error("Failed to create frame resources: {0}")]
    Gpu(#[from] GpuError),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame failed: {0}")]
    Gpu(#[from] GpuError),

    #[error("Frame recorded out of order: {0}")]
    Layout(#[from] LayoutError),

    #[error("No command buffer for swapchain image {0}")]
    MissingCommandBuffer(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The swapchain went out of date before an image could be acquired.
    Skipped,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub camera: CameraPushConstant,
    pub light_info: LightInfo,
    pub directional_light: &'a DirectionalLight,
}

/// Exactly one frame is in flight. The device is idle when
/// [`FrameRenderer::render_frame`] returns, which is what makes overwriting
/// the single light uniform every frame safe.
pub struct FrameRenderer<D: GpuDevice> {
    lightning_pass: LightningPass<D>,
    shadow_map: ShadowMap<D>,
    common_layout: Owned<D, vk::PipelineLayout>,
    command_pool: CommandPool<D>,
    present_semaphore: Semaphore<D>,
    acquire_fence: Fence<D>,
    device: Arc<D>,
    extent: vk::Extent2D,
    color_format: vk::Format,
    frame_number: u64,
    swapchain_out_of_date: bool,
}

impl<D: GpuDevice> FrameRenderer<D> {
    pub fn new(
        device: Arc<D>,
        presenter: &impl Presenter,
        shaders: &ShaderLibrary,
        technique: Technique,
    ) -> Result<Self, FrameRendererError> {
        let extent = presenter.extent();
        let color_format = presenter.format();

        let shadow_map = ShadowMap::new(
            device.clone(),
            &ShadowMapConfig {
                depth_format: DEPTH_FORMAT,
                push_constant_start: PUSH_CONSTANT_START,
                extent,
            },
            &shaders.shadow_map,
        )?;

        let mut lightning_pass = LightningPass::new(
            device.clone(),
            &LightningPassConfig {
                color_format,
                depth_format: DEPTH_FORMAT,
                push_constant_start: PUSH_CONSTANT_START,
                extent,
            },
            LightningPassShaders {
                simple: &shaders.lightning_simple,
                shadow_mapped: &shaders.lightning_shadowmap,
            },
            shadow_map.depth(),
        )?;
        lightning_pass.set_technique(technique);

        let common_layout =
            handle::pipeline_layout(&device, &[], &[push_constant_range(PUSH_CONSTANT_START)])?;
        let command_pool = CommandPool::new(device.clone(), presenter.image_count() as u32)?;
        let present_semaphore = Semaphore::new(device.clone())?;
        let acquire_fence = Fence::new(device.clone(), false)?;

        info!(
            width = extent.width,
            height = extent.height,
            images = presenter.image_count(),
            ?technique,
            "Frame renderer ready"
        );

        Ok(Self {
            lightning_pass,
            shadow_map,
            common_layout,
            command_pool,
            present_semaphore,
            acquire_fence,
            device,
            extent,
            color_format,
            frame_number: 0,
            swapchain_out_of_date: false,
        })
    }

    pub fn drawable_context(&self) -> DrawableContext<D> {
        DrawableContext {
            device: self.device.clone(),
            depth_format: DEPTH_FORMAT,
        }
    }

    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn technique(&self) -> Technique {
        self.lightning_pass.technique()
    }

    pub fn set_technique(&mut self, technique: Technique) {
        self.lightning_pass.set_technique(technique);
    }

    pub fn shadow_map(&self) -> &ShadowMap<D> {
        &self.shadow_map
    }

    pub fn lightning_pass(&self) -> &LightningPass<D> {
        &self.lightning_pass
    }

    pub fn common_layout(&self) -> vk::PipelineLayout {
        self.common_layout.get()
    }

    pub fn render_frame(
        &mut self,
        presenter: &mut impl Presenter,
        scene: &Scene<D>,
        inputs: &FrameInputs<'_>,
    ) -> Result<FrameOutcome, FrameError> {
        self.acquire_fence.reset()?;
        let image = match presenter.acquire_next_image(self.acquire_fence.handle()) {
            Ok(image) => image,
            Err(e) if e.is_out_of_date() => {
                if !self.swapchain_out_of_date {
                    warn!(frame = self.frame_number, "Swapchain out of date, skipping frames");
                    self.swapchain_out_of_date = true;
                }
                return Ok(FrameOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };
        if std::mem::take(&mut self.swapchain_out_of_date) {
            info!(frame = self.frame_number, "Swapchain usable again");
        }
        self.acquire_fence.wait(u64::MAX)?;

        self.lightning_pass
            .update_light_info(inputs.directional_light)?;

        let command_buffer = self
            .command_pool
            .command_buffer(image.index as usize)
            .ok_or(FrameError::MissingCommandBuffer(image.index))?;
        let frame = FrameContext { command_buffer };

        self.device.begin_command_buffer(command_buffer)?;
        let recorded = self
            .record_passes(&frame, scene, inputs)
            .and_then(|()| self.record_blit(&frame, image.image));
        if let Err(e) = recorded {
            self.abandon_recording(command_buffer, true);
            return Err(e);
        }
        if let Err(e) = self.device.end_command_buffer(command_buffer) {
            self.abandon_recording(command_buffer, false);
            return Err(e.into());
        }

        let present_semaphore = self.present_semaphore.handle();
        self.device
            .submit(command_buffer, &[present_semaphore], vk::Fence::null())?;

        match presenter.present(image, present_semaphore) {
            Ok(()) => {}
            Err(e) if e.is_out_of_date() => {
                warn!(frame = self.frame_number, "Swapchain out of date at present");
            }
            Err(e) => return Err(e.into()),
        }

        self.device.wait_idle()?;
        self.frame_number += 1;
        Ok(FrameOutcome::Presented)
    }

    /// Returns `command_buffer` to the initial state after a failed frame so
    /// the next frame on the same image can begin it again.
    fn abandon_recording(&self, command_buffer: vk::CommandBuffer, recording: bool) {
        if recording {
            if let Err(e) = self.device.end_command_buffer(command_buffer) {
                warn!("Failed to end abandoned command buffer: {e}");
            }
        }
        if let Err(e) = self.device.reset_command_buffer(command_buffer) {
            warn!("Failed to reset abandoned command buffer: {e}");
        }
    }

    fn record_passes(
        &mut self,
        frame: &FrameContext,
        scene: &Scene<D>,
        inputs: &FrameInputs<'_>,
    ) -> Result<(), FrameError> {
        let cmd = frame.command_buffer;

        self.shadow_map.begin_pass(frame);
        self.shadow_map
            .update_light_info(frame, inputs.directional_light);
        scene.draw_all(cmd, false);
        self.shadow_map.end_pass(frame);

        self.shadow_map
            .depth()
            .require_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
        self.lightning_pass.begin_pass(frame);

        let layout = self.common_layout.get();
        self.device
            .cmd_push_constants(cmd, layout, 0, bytemuck::bytes_of(&inputs.camera));
        self.device.cmd_push_constants(
            cmd,
            layout,
            LIGHT_INFO_OFFSET,
            bytemuck::bytes_of(&inputs.light_info),
        );
        scene.draw_all(cmd, false);
        self.lightning_pass.end_pass(frame);
        Ok(())
    }

    fn record_blit(&self, frame: &FrameContext, swapchain_image: vk::Image) -> Result<(), FrameError> {
        let cmd = frame.command_buffer;
        let color = self.lightning_pass.color_output();
        color.require_layout(vk::ImageLayout::GENERAL)?;

        self.device.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image: swapchain_image,
                aspect: vk::ImageAspectFlags::COLOR,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::GENERAL,
                src: TOP,
                dst: TRANSFER_WRITE,
            },
        );
        self.device.cmd_blit_image(
            cmd,
            &BlitDesc {
                src_image: color.image(),
                src_layout: vk::ImageLayout::GENERAL,
                dst_image: swapchain_image,
                dst_layout: vk::ImageLayout::GENERAL,
                extent: self.extent,
                filter: vk::Filter::LINEAR,
            },
        );
        self.device.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image: swapchain_image,
                aspect: vk::ImageAspectFlags::COLOR,
                old_layout: vk::ImageLayout::GENERAL,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                src: TRANSFER_WRITE,
                dst: PRESENT,
            },
        );
        Ok(())
    }
}

impl<D: GpuDevice> Drop for FrameRenderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle before teardown: {e}");
        }
        debug!(frames = self.frame_number, "Frame renderer dropped");
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3, Vec4};
    use penumbra_render_vulkan_core::testing::{
        DeviceCall, FakeSwapchain, RecordedCommand, TrackingDevice,
    };

    use super::*;
    use crate::{
        render::{drawable::MeshObject, vertex::Vertex},
        shader::{SPIRV_MAGIC, ShaderProgram},
    };

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };
    const FRAMES: usize = 3;

    fn program(tag: u32) -> ShaderProgram {
        ShaderProgram {
            vertex: vec![SPIRV_MAGIC, tag],
            fragment: vec![SPIRV_MAGIC, tag],
        }
    }

    fn shaders() -> ShaderLibrary {
        ShaderLibrary {
            shadow_map: program(1),
            lightning_simple: program(2),
            lightning_shadowmap: program(3),
            mesh: program(4),
        }
    }

    struct Harness {
        device: Arc<TrackingDevice>,
        swapchain: FakeSwapchain,
        renderer: FrameRenderer<TrackingDevice>,
        scene: Scene<TrackingDevice>,
        light: DirectionalLight,
    }

    impl Harness {
        fn new() -> Self {
            let device = Arc::new(TrackingDevice::new());
            let swapchain =
                FakeSwapchain::new(device.clone(), 3, EXTENT, vk::Format::B8G8R8A8_SRGB);
            let library = shaders();
            let renderer =
                FrameRenderer::new(device.clone(), &swapchain, &library, Technique::ShadowMapped)
                    .unwrap();

            let mut scene = Scene::new();
            let normal = [0.0, 1.0, 0.0];
            scene.push(MeshObject::new(
                "ground",
                vec![Vertex::new([0.0; 3], [0.0; 2], normal); 6],
                library.mesh.clone(),
            ));
            scene
                .create_all(
                    &renderer.drawable_context(),
                    renderer.color_format(),
                    PUSH_CONSTANT_START,
                )
                .unwrap();
            device.clear_commands();

            let light = DirectionalLight::orthographic(
                Vec4::new(5.0, 3.0, 5.0, 0.0),
                -5.0,
                5.0,
                -5.0,
                5.0,
                0.1,
                10.0,
            );

            Self {
                device,
                swapchain,
                renderer,
                scene,
                light,
            }
        }

        fn render(&mut self) -> FrameOutcome {
            self.try_render().unwrap()
        }

        fn try_render(&mut self) -> Result<FrameOutcome, FrameError> {
            let inputs = FrameInputs {
                camera: CameraPushConstant::new(
                    Vec3::new(0.0, 2.0, 6.0),
                    Mat4::perspective_rh(45f32.to_radians(), 800.0 / 600.0, 0.1, 100.0),
                    Mat4::look_at_rh(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y),
                ),
                light_info: LightInfo::new(self.light.position),
                directional_light: &self.light,
            };
            self.renderer
                .render_frame(&mut self.swapchain, &self.scene, &inputs)
        }
    }

    #[test]
    fn shadow_depth_transitions_twice_per_frame() {
        let mut harness = Harness::new();
        for _ in 0..FRAMES {
            assert_eq!(harness.render(), FrameOutcome::Presented);
        }

        let depth = harness.renderer.shadow_map().depth().image();
        let layouts: Vec<_> = harness
            .device
            .barriers_for(depth)
            .iter()
            .map(|b| b.new_layout)
            .collect();
        assert_eq!(layouts.len(), 2 * FRAMES);
        for pair in layouts.chunks(2) {
            assert_eq!(
                pair,
                [
                    vk::ImageLayout::ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                ]
            );
        }
    }

    #[test]
    fn color_output_is_released_once_before_each_blit() {
        let mut harness = Harness::new();
        for _ in 0..FRAMES {
            harness.render();
        }

        let color = harness.renderer.lightning_pass().color_output().image();
        let mut released = false;
        let mut blits = 0;
        for command in harness.device.commands() {
            match command {
                RecordedCommand::Barrier(b)
                    if b.image == color && b.new_layout == vk::ImageLayout::GENERAL =>
                {
                    assert!(!released, "color released twice in one frame");
                    assert_eq!(b.old_layout, vk::ImageLayout::ATTACHMENT_OPTIMAL);
                    released = true;
                }
                RecordedCommand::Blit(blit) => {
                    assert!(released, "blit before the color pass ended");
                    assert_eq!(blit.src_image, color);
                    assert_eq!(blit.filter, vk::Filter::LINEAR);
                    assert_eq!(blit.extent, EXTENT);
                    released = false;
                    blits += 1;
                }
                _ => {}
            }
        }
        assert_eq!(blits, FRAMES);
    }

    #[test]
    fn swapchain_image_goes_through_general_to_present() {
        let mut harness = Harness::new();
        harness.render();

        let image = harness.swapchain.images()[0];
        let barriers = harness.device.barriers_for(image);
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barriers[0].new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barriers[1].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn same_inputs_push_identical_bytes() {
        let mut harness = Harness::new();
        let common = harness.renderer.common_layout();

        let pushes_of_frame = |harness: &mut Harness| {
            harness.device.clear_commands();
            harness.render();
            harness
                .device
                .commands()
                .into_iter()
                .filter_map(|c| match c {
                    RecordedCommand::PushConstants {
                        layout,
                        offset,
                        bytes,
                    } if layout == common => Some((offset, bytes)),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };

        let first = pushes_of_frame(&mut harness);
        let second = pushes_of_frame(&mut harness);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].0, 0);
        assert_eq!(first[0].1.len(), 144);
        assert_eq!(first[1].0, 144);
        assert_eq!(first[1].1.len(), 16);
        assert_eq!(first, second);
    }

    #[test]
    fn frame_is_fully_serialized() {
        let mut harness = Harness::new();
        for _ in 0..FRAMES {
            harness.render();
        }

        let sync: Vec<&'static str> = harness
            .device
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::ResetFence(_) => Some("reset"),
                RecordedCommand::Acquire { .. } => Some("acquire"),
                RecordedCommand::WaitFence(_) => Some("wait"),
                RecordedCommand::Begin(_) => Some("begin"),
                RecordedCommand::End(_) => Some("end"),
                RecordedCommand::Submit { .. } => Some("submit"),
                RecordedCommand::Present { .. } => Some("present"),
                RecordedCommand::WaitIdle => Some("idle"),
                _ => None,
            })
            .collect();
        let one_frame = [
            "reset", "acquire", "wait", "begin", "end", "submit", "present", "idle",
        ];
        assert_eq!(sync, one_frame.repeat(FRAMES));
        assert_eq!(harness.renderer.frame_number(), FRAMES as u64);
    }

    #[test]
    fn submits_the_acquired_image_command_buffer() {
        let mut harness = Harness::new();
        for _ in 0..FRAMES {
            harness.render();
        }

        let commands = harness.device.commands();
        let mut submitted = Vec::new();
        for command in &commands {
            if let RecordedCommand::Submit {
                command_buffer,
                signal_semaphores,
                fence,
            } = command
            {
                assert_eq!(signal_semaphores.len(), 1);
                assert_eq!(*fence, vk::Fence::null());
                submitted.push(*command_buffer);
            }
        }
        submitted.dedup();
        assert_eq!(submitted.len(), FRAMES);

        let presented: Vec<u32> = commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::Present { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(presented, vec![0, 1, 2]);
    }

    #[test]
    fn every_drawable_is_drawn_once_per_pass() {
        let mut harness = Harness::new();
        harness.render();

        let commands = harness.device.commands();
        let draws = commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Draw { .. }))
            .count();
        assert_eq!(draws, 2);
        let binds = commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::BindPipeline(_)))
            .count();
        assert_eq!(binds, 2, "only the passes bind pipelines");
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let mut harness = Harness::new();
        harness.swapchain.out_of_date = true;
        assert_eq!(harness.render(), FrameOutcome::Skipped);
        assert!(
            !harness
                .device
                .commands()
                .iter()
                .any(|c| matches!(c, RecordedCommand::Submit { .. }))
        );
        assert_eq!(harness.render(), FrameOutcome::Presented);
    }

    #[test]
    fn out_of_date_is_tracked_until_an_image_is_acquired() {
        let mut harness = Harness::new();
        for _ in 0..2 {
            harness.swapchain.out_of_date = true;
            assert_eq!(harness.render(), FrameOutcome::Skipped);
            assert!(harness.renderer.swapchain_out_of_date);
        }
        assert_eq!(harness.render(), FrameOutcome::Presented);
        assert!(!harness.renderer.swapchain_out_of_date);
    }

    #[test]
    fn failed_light_write_records_nothing() {
        let mut harness = Harness::new();
        harness.device.fail_next_call(DeviceCall::WriteBuffer);

        let result = harness.try_render();
        assert!(matches!(result, Err(FrameError::Gpu(_))));
        assert!(
            !harness
                .device
                .commands()
                .iter()
                .any(|c| matches!(c, RecordedCommand::Begin(_) | RecordedCommand::Submit { .. }))
        );
        assert_eq!(harness.renderer.frame_number(), 0);

        assert_eq!(harness.render(), FrameOutcome::Presented);
    }

    #[test]
    fn failed_end_resets_the_command_buffer() {
        let mut harness = Harness::new();
        harness.device.fail_next_call(DeviceCall::EndCommandBuffer);

        assert!(harness.try_render().is_err());
        let commands = harness.device.commands();
        let Some(RecordedCommand::Begin(cmd)) = commands
            .iter()
            .find(|c| matches!(c, RecordedCommand::Begin(_)))
            .cloned()
        else {
            panic!("frame never began recording");
        };
        assert_eq!(commands.last(), Some(&RecordedCommand::Reset(cmd)));
        assert!(
            !commands
                .iter()
                .any(|c| matches!(c, RecordedCommand::End(_) | RecordedCommand::Submit { .. }))
        );

        harness.device.clear_commands();
        for _ in 0..FRAMES {
            assert_eq!(harness.render(), FrameOutcome::Presented);
        }
        let begins = harness
            .device
            .commands()
            .iter()
            .filter(|c| **c == RecordedCommand::Begin(cmd))
            .count();
        assert_eq!(begins, 1);
    }

    #[test]
    fn abandoned_recording_is_ended_then_reset() {
        let harness = Harness::new();
        let cmd = harness.device.fake_command_buffer();
        harness.device.begin_command_buffer(cmd).unwrap();

        harness.renderer.abandon_recording(cmd, true);
        assert_eq!(
            harness.device.commands(),
            vec![
                RecordedCommand::Begin(cmd),
                RecordedCommand::End(cmd),
                RecordedCommand::Reset(cmd),
            ]
        );
    }

    #[test]
    fn teardown_releases_every_handle() {
        let mut harness = Harness::new();
        harness.render();

        let Harness {
            device,
            swapchain,
            renderer,
            mut scene,
            ..
        } = harness;
        scene.destroy_all();
        drop(renderer);
        drop(swapchain);
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.invalid_destroys(), 0);
    }
}
