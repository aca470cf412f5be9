mod config;
mod controls;
mod logging;
mod scene_data;

use anyhow::Context;
use ash::vk;
use clap::Parser;
use glam::{Mat4, Vec3, Vec4};
use penumbra_render_vulkan_3d::{
    camera::Camera,
    render::{
        drawable::{Drawable, MeshObject},
        frame::{FrameInputs, FrameRenderer},
        light::DirectionalLight,
        push_constants::{CameraPushConstant, LightInfo, PUSH_CONSTANT_START},
        scene::Scene,
    },
    shader::ShaderLibrary,
};
use penumbra_render_vulkan_core::{
    context::GraphicsContext,
    vulkan::{device::VulkanDevice, swapchain::SwapchainManager},
};
use penumbra_window::{
    error::handle_fatal_error,
    input::InputState,
    window::{WindowEventHandler, WindowLifecycleManager, WindowSize},
};
use tracing::{debug, info};
use winit::{event::MouseButton, keyboard::KeyCode, window::Window};

use crate::{
    config::AppConfig,
    controls::{ControlAction, ControlContext, LightController},
};

const INITIAL_LIGHT_POSITION: Vec4 = Vec4::new(5.0, 3.0, 5.0, 0.0);

/// Everything that lives on the GPU, dropped renderer first, context last.
struct GpuState {
    frame_renderer: FrameRenderer<VulkanDevice>,
    scene: Scene<VulkanDevice>,
    swapchain: SwapchainManager,
    _context: GraphicsContext,
}

impl GpuState {
    fn new(window: &Window, config: &AppConfig, shaders: &ShaderLibrary) -> anyhow::Result<Self> {
        let context = GraphicsContext::new(window, &config.graphics_config())
            .context("Failed to create graphics context")?;
        let swapchain = context
            .create_swapchain(window)
            .context("Failed to create swapchain")?;
        let frame_renderer = FrameRenderer::new(
            context.device().clone(),
            &swapchain,
            shaders,
            config.technique.into(),
        )
        .context("Failed to create frame renderer")?;

        let mut ground = MeshObject::new("ground", scene_data::GROUND.to_vec(), shaders.mesh.clone());
        ground.set_position(Mat4::from_translation(Vec3::new(0.0, -0.5, 0.0)));
        let cube = MeshObject::new("cube", scene_data::CUBE.to_vec(), shaders.mesh.clone());

        let mut scene = Scene::new();
        scene.push(cube);
        scene.push(ground);
        scene
            .create_all(
                &frame_renderer.drawable_context(),
                frame_renderer.color_format(),
                PUSH_CONSTANT_START,
            )
            .context("Failed to create scene")?;

        Ok(Self {
            frame_renderer,
            scene,
            swapchain,
            _context: context,
        })
    }
}

struct App {
    config: AppConfig,
    shaders: ShaderLibrary,
    camera: Camera,
    light_info: LightInfo,
    directional_light: DirectionalLight,
    light_controller: LightController,
    input: InputState,
    exit_requested: bool,
    gpu: Option<GpuState>,
}

impl App {
    fn new(config: AppConfig, shaders: ShaderLibrary) -> Self {
        let camera = Camera::new(
            vk::Extent2D {
                width: config.width,
                height: config.height,
            },
            45.0,
            0.1,
            100.0,
        );
        let directional_light = DirectionalLight::orthographic(
            INITIAL_LIGHT_POSITION,
            -5.0,
            5.0,
            -5.0,
            5.0,
            0.1,
            10.0,
        );

        Self {
            light_controller: LightController::new(config.light_speed),
            config,
            shaders,
            camera,
            light_info: LightInfo::new(INITIAL_LIGHT_POSITION),
            directional_light,
            input: InputState::new(),
            exit_requested: false,
            gpu: None,
        }
    }

    fn controls(&mut self) -> ControlContext<'_> {
        ControlContext {
            camera: &mut self.camera,
            light_info: &mut self.light_info,
            input: &mut self.input,
        }
    }
}

impl WindowEventHandler for App {
    fn on_window_ready(&mut self, window: &Window) {
        match GpuState::new(window, &self.config, &self.shaders) {
            Ok(gpu) => {
                info!(
                    width = gpu.swapchain.image_extent.width,
                    height = gpu.swapchain.image_extent.height,
                    "Renderer ready"
                );
                self.gpu = Some(gpu);
            }
            Err(e) => handle_fatal_error(format!("{e:#}"), "Failed to initialize renderer"),
        }
    }

    fn on_window_lost(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            debug!(frames = gpu.frame_renderer.frame_number(), "Releasing renderer");
        }
    }

    fn on_window_resized(&mut self, size: WindowSize) {
        debug!(width = size.width, height = size.height, "Window resized");
    }

    fn on_keyboard_input(&mut self, key: KeyCode, pressed: bool) {
        if controls::handle_key(&mut self.controls(), key, pressed) == ControlAction::Exit {
            info!("Exit requested");
            self.exit_requested = true;
        }
    }

    fn on_cursor_moved(&mut self, x: f64, y: f64) {
        controls::handle_cursor(&mut self.controls(), x, y);
    }

    fn on_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        controls::handle_mouse_button(&mut self.controls(), button, pressed);
    }

    fn redraw(&mut self) {
        if self.gpu.is_none() || self.exit_requested {
            return;
        }

        let controller = self.light_controller;
        controller.step(&mut self.controls());
        self.camera.update();
        self.directional_light
            .aim_at_origin(self.light_info.position());

        let inputs = FrameInputs {
            camera: CameraPushConstant::new(
                self.camera.position(),
                self.camera.projection(),
                self.camera.view(),
            ),
            light_info: self.light_info,
            directional_light: &self.directional_light,
        };

        if let Some(gpu) = self.gpu.as_mut() {
            if let Err(e) = gpu
                .frame_renderer
                .render_frame(&mut gpu.swapchain, &gpu.scene, &inputs)
            {
                handle_fatal_error(e, "Failed to render frame");
            }
        }
    }

    fn should_exit(&self) -> bool {
        self.exit_requested
    }
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let config = AppConfig::parse();
    config.validate()?;

    let shaders = ShaderLibrary::load(&config.shader_dir).with_context(|| {
        format!(
            "Failed to load shaders from {} (compile them with glslc first)",
            config.shader_dir.display()
        )
    })?;

    info!(
        width = config.width,
        height = config.height,
        technique = ?config.technique,
        "Starting penumbra"
    );

    let mut manager = WindowLifecycleManager::new(config.window_config(), App::new(config, shaders));
    manager.start_event_loop()?;

    if let Some(gpu) = &manager.event_handler().gpu {
        info!(frames = gpu.frame_renderer.frame_number(), "Event loop finished");
    }
    Ok(())
}
