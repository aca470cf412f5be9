use ash::vk;
use glam::{Mat4, Vec3};

const WORLD_UP: Vec3 = Vec3::Y;
const PITCH_LIMIT: f32 = 89.0;

#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    /// Degrees.
    yaw: f32,
    /// Degrees.
    pitch: f32,
    speed: f32,
    sensitivity: f32,
    aspect: f32,
    fov_y: f32,
    near: f32,
    far: f32,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    pub fn new(extent: vk::Extent2D, fov_degrees: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, 2.0, 6.0),
            front: Vec3::NEG_Z,
            up: WORLD_UP,
            right: Vec3::X,
            yaw: -90.0,
            pitch: -15.0,
            speed: 0.125,
            sensitivity: 0.1,
            aspect: extent.width as f32 / extent.height.max(1) as f32,
            fov_y: fov_degrees.to_radians(),
            near,
            far,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.update();
        camera
    }

    pub fn update(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(WORLD_UP).normalize();
        self.up = self.right.cross(self.front).normalize();

        self.view = Mat4::look_at_rh(self.position, self.look_at_position(), self.up);

        let mut projection = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Vulkan clip space has Y pointing down.
        projection.y_axis.y *= -1.0;
        self.projection = projection;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn look_at_position(&self) -> Vec3 {
        self.position + self.front
    }

    pub fn forward(&mut self) {
        self.position += self.front * self.speed;
    }

    pub fn back(&mut self) {
        self.position -= self.front * self.speed;
    }

    pub fn left(&mut self) {
        self.position -= self.right * self.speed;
    }

    pub fn right(&mut self) {
        self.position += self.right * self.speed;
    }

    /// Offsets are in pixels, `yoffset` growing downwards like window
    /// coordinates.
    pub fn process_mouse_movement(&mut self, xoffset: f32, yoffset: f32) {
        self.yaw += xoffset * self.sensitivity;
        self.pitch = (self.pitch - yoffset * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            45.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn matrices_are_finite() {
        let camera = camera();
        assert!(camera.view().is_finite());
        assert!(camera.projection().is_finite());
        assert!(camera.projection().y_axis.y < 0.0);
    }

    #[test]
    fn forward_then_back_returns_home() {
        let mut camera = camera();
        let start = camera.position();
        camera.forward();
        assert!(camera.position().distance(start) > 0.0);
        camera.back();
        assert!(camera.position().distance(start) < 1e-5);
    }

    #[test]
    fn strafing_is_horizontal() {
        let mut camera = camera();
        let start = camera.position();
        camera.right();
        assert!((camera.position().y - start.y).abs() < 1e-6);
        camera.left();
        assert!(camera.position().distance(start) < 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = camera();
        camera.process_mouse_movement(0.0, -100_000.0);
        camera.update();
        assert!(camera.view().is_finite());
        assert!(camera.look_at_position().y > camera.position().y);

        camera.process_mouse_movement(0.0, 100_000.0);
        camera.update();
        assert!(camera.view().is_finite());
        assert!(camera.look_at_position().y < camera.position().y);
    }

    #[test]
    fn dragging_right_turns_right() {
        let mut camera = camera();
        let before = camera.look_at_position() - camera.position();
        camera.process_mouse_movement(100.0, 0.0);
        camera.update();
        let after = camera.look_at_position() - camera.position();
        assert!(before.cross(after).y < 0.0);
    }
}
