use penumbra_render_vulkan_3d::{camera::Camera, render::push_constants::LightInfo};
use penumbra_window::input::InputState;
use winit::{event::MouseButton, keyboard::KeyCode};

pub struct ControlContext<'a> {
    pub camera: &'a mut Camera,
    pub light_info: &'a mut LightInfo,
    pub input: &'a mut InputState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Continue,
    Exit,
}

pub fn handle_key(ctx: &mut ControlContext<'_>, key: KeyCode, pressed: bool) -> ControlAction {
    ctx.input.key_event(key, pressed);
    if !pressed {
        return ControlAction::Continue;
    }

    match key {
        KeyCode::Escape => return ControlAction::Exit,
        KeyCode::KeyW => ctx.camera.forward(),
        KeyCode::KeyS => ctx.camera.back(),
        KeyCode::KeyA => ctx.camera.left(),
        KeyCode::KeyD => ctx.camera.right(),
        _ => {}
    }
    ControlAction::Continue
}

pub fn handle_mouse_button(ctx: &mut ControlContext<'_>, button: MouseButton, pressed: bool) {
    ctx.input.mouse_button(button, pressed);
}

pub fn handle_cursor(ctx: &mut ControlContext<'_>, x: f64, y: f64) {
    if let Some((xoffset, yoffset)) = ctx.input.cursor_moved(x, y) {
        ctx.camera.process_mouse_movement(xoffset, yoffset);
    }
}

/// Moves the light with the arrow keys, one axis per frame.
#[derive(Debug, Clone, Copy)]
pub struct LightController {
    speed: f32,
}

impl LightController {
    pub fn new(speed: f32) -> Self {
        Self { speed }
    }

    pub fn step(&self, ctx: &mut ControlContext<'_>) {
        let delta = self.speed / 2.0;
        let position = &mut ctx.light_info.position;

        if ctx.input.is_pressed(KeyCode::ArrowLeft) {
            position[0] -= delta;
        } else if ctx.input.is_pressed(KeyCode::ArrowRight) {
            position[0] += delta;
        } else if ctx.input.is_pressed(KeyCode::ArrowUp) {
            position[2] += delta;
        } else if ctx.input.is_pressed(KeyCode::ArrowDown) {
            position[2] -= delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;
    use glam::Vec4;
    use penumbra_render_vulkan_3d::render::light::DirectionalLight;

    use super::*;

    struct Fixture {
        camera: Camera,
        light_info: LightInfo,
        input: InputState,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                camera: Camera::new(
                    vk::Extent2D {
                        width: 800,
                        height: 600,
                    },
                    45.0,
                    0.1,
                    100.0,
                ),
                light_info: LightInfo::new(Vec4::new(5.0, 3.0, 5.0, 0.0)),
                input: InputState::new(),
            }
        }

        fn ctx(&mut self) -> ControlContext<'_> {
            ControlContext {
                camera: &mut self.camera,
                light_info: &mut self.light_info,
                input: &mut self.input,
            }
        }
    }

    #[test]
    fn holding_left_moves_light_by_half_speed() {
        let mut fixture = Fixture::new();
        let controller = LightController::new(0.15);
        handle_key(&mut fixture.ctx(), KeyCode::ArrowLeft, true);

        for _ in 0..4 {
            controller.step(&mut fixture.ctx());
        }
        let x = fixture.light_info.position[0];
        assert!((x - (5.0 - 4.0 * 0.075)).abs() < 1e-5);
        assert_eq!(fixture.light_info.position[2], 5.0);

        handle_key(&mut fixture.ctx(), KeyCode::ArrowLeft, false);
        controller.step(&mut fixture.ctx());
        assert_eq!(fixture.light_info.position[0], x);
    }

    #[test]
    fn only_one_axis_moves_per_frame() {
        let mut fixture = Fixture::new();
        let controller = LightController::new(0.15);
        handle_key(&mut fixture.ctx(), KeyCode::ArrowUp, true);
        handle_key(&mut fixture.ctx(), KeyCode::ArrowRight, true);

        controller.step(&mut fixture.ctx());
        assert!((fixture.light_info.position[0] - 5.075).abs() < 1e-5);
        assert_eq!(fixture.light_info.position[2], 5.0);

        handle_key(&mut fixture.ctx(), KeyCode::ArrowRight, false);
        controller.step(&mut fixture.ctx());
        assert!((fixture.light_info.position[2] - 5.075).abs() < 1e-5);
    }

    #[test]
    fn moved_light_still_aims_cleanly() {
        let mut fixture = Fixture::new();
        let controller = LightController::new(0.15);
        handle_key(&mut fixture.ctx(), KeyCode::ArrowDown, true);
        controller.step(&mut fixture.ctx());

        let mut light = DirectionalLight::orthographic(
            Vec4::new(5.0, 3.0, 5.0, 0.0),
            -5.0,
            5.0,
            -5.0,
            5.0,
            0.1,
            10.0,
        );
        let before = light.light_space_matrix();
        light.aim_at_origin(fixture.light_info.position());
        assert!(!light.view.is_nan());
        assert_ne!(light.light_space_matrix(), before);
    }

    #[test]
    fn escape_requests_exit() {
        let mut fixture = Fixture::new();
        assert_eq!(
            handle_key(&mut fixture.ctx(), KeyCode::Escape, true),
            ControlAction::Exit
        );
        assert_eq!(
            handle_key(&mut fixture.ctx(), KeyCode::Escape, false),
            ControlAction::Continue
        );
    }

    #[test]
    fn wasd_moves_camera() {
        let mut fixture = Fixture::new();
        let start = fixture.camera.position();
        handle_key(&mut fixture.ctx(), KeyCode::KeyW, true);
        assert_ne!(fixture.camera.position(), start);
        handle_key(&mut fixture.ctx(), KeyCode::KeyS, true);
        assert!(fixture.camera.position().distance(start) < 1e-5);
    }

    #[test]
    fn drag_rotates_camera() {
        let mut fixture = Fixture::new();
        let before = fixture.camera.look_at_position();

        handle_cursor(&mut fixture.ctx(), 100.0, 100.0);
        fixture.camera.update();
        assert_eq!(fixture.camera.look_at_position(), before);

        handle_mouse_button(&mut fixture.ctx(), MouseButton::Left, true);
        handle_cursor(&mut fixture.ctx(), 100.0, 100.0);
        handle_cursor(&mut fixture.ctx(), 150.0, 100.0);
        fixture.camera.update();
        assert_ne!(fixture.camera.look_at_position(), before);
    }
}
