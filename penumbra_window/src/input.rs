use std::collections::HashSet;

use winit::{event::MouseButton, keyboard::KeyCode};

/// Cursor motion only counts while the left button is held; the first
/// position after a press anchors the drag so the camera does not jump.
#[derive(Debug)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
    left_button_down: bool,
    first_mouse: bool,
    last_x: f32,
    last_y: f32,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            pressed: HashSet::new(),
            left_button_down: false,
            first_mouse: true,
            last_x: 0.0,
            last_y: 0.0,
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_event(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.pressed.insert(key);
        } else {
            self.pressed.remove(&key);
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if button == MouseButton::Left {
            self.left_button_down = pressed;
            if !pressed {
                self.first_mouse = true;
            }
        }
    }

    pub fn left_button_down(&self) -> bool {
        self.left_button_down
    }

    /// Returns the drag offset `(x - last_x, y - last_y)` since the previous
    /// cursor event, or `None` when no drag is in progress.
    pub fn cursor_moved(&mut self, x: f64, y: f64) -> Option<(f32, f32)> {
        let (x, y) = (x as f32, y as f32);
        if !self.left_button_down {
            self.first_mouse = true;
            return None;
        }
        if self.first_mouse {
            self.last_x = x;
            self.last_y = y;
            self.first_mouse = false;
        }

        let offset = (x - self.last_x, y - self.last_y);
        self.last_x = x;
        self.last_y = y;
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_held_keys() {
        let mut input = InputState::new();
        input.key_event(KeyCode::ArrowLeft, true);
        assert!(input.is_pressed(KeyCode::ArrowLeft));
        input.key_event(KeyCode::ArrowLeft, false);
        assert!(!input.is_pressed(KeyCode::ArrowLeft));
    }

    #[test]
    fn hover_without_button_is_ignored() {
        let mut input = InputState::new();
        assert_eq!(input.cursor_moved(10.0, 10.0), None);
    }

    #[test]
    fn first_drag_event_anchors() {
        let mut input = InputState::new();
        input.mouse_button(MouseButton::Left, true);
        assert_eq!(input.cursor_moved(100.0, 50.0), Some((0.0, 0.0)));
        assert_eq!(input.cursor_moved(110.0, 45.0), Some((10.0, -5.0)));
    }

    #[test]
    fn release_resets_anchor() {
        let mut input = InputState::new();
        input.mouse_button(MouseButton::Left, true);
        input.cursor_moved(0.0, 0.0);
        input.mouse_button(MouseButton::Left, false);
        assert_eq!(input.cursor_moved(300.0, 300.0), None);

        input.mouse_button(MouseButton::Left, true);
        assert_eq!(input.cursor_moved(310.0, 290.0), Some((0.0, 0.0)));
    }

    #[test]
    fn other_buttons_do_not_drag() {
        let mut input = InputState::new();
        input.mouse_button(MouseButton::Right, true);
        assert!(!input.left_button_down());
        assert_eq!(input.cursor_moved(1.0, 1.0), None);
    }
}
