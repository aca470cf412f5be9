use thiserror::Error;
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, MouseButton, StartCause, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::error::handle_fatal_error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Failed to create event loop: {0}")]
    CreateEventLoopFailed(String),

    #[error("Event loop terminated with error: {0}")]
    EventLoopFailed(String),
}

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub resizable: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

pub trait WindowEventHandler {
    /// The window outlives every call on the handler, up to and including
    /// [`WindowEventHandler::on_window_lost`] and the handler's drop.
    fn on_window_ready(&mut self, window: &Window);
    fn on_window_lost(&mut self);
    fn on_window_resized(&mut self, size: WindowSize);
    fn redraw(&mut self);

    fn on_keyboard_input(&mut self, _key: KeyCode, _pressed: bool) {}
    fn on_cursor_moved(&mut self, _x: f64, _y: f64) {}
    fn on_mouse_button(&mut self, _button: MouseButton, _pressed: bool) {}

    /// Polled after every redraw; returning `true` ends the event loop.
    fn should_exit(&self) -> bool {
        false
    }
}

pub struct WindowLifecycleManager<E: WindowEventHandler> {
    config: WindowConfig,
    event_handler: E,
    window: Option<Window>,
    current_window_size: Option<WindowSize>,
}

impl<E: WindowEventHandler> WindowLifecycleManager<E> {
    pub fn new(config: WindowConfig, event_handler: E) -> Self {
        Self {
            config,
            event_handler,
            window: None,
            current_window_size: None,
        }
    }

    pub fn event_handler(&self) -> &E {
        &self.event_handler
    }

    fn handle_resize_event(&mut self, new_size: WindowSize) {
        if self.current_window_size != Some(new_size) {
            self.current_window_size = Some(new_size);
            self.event_handler.on_window_resized(new_size);
        }
    }

    pub fn start_event_loop(&mut self) -> Result<(), WindowError> {
        let event_loop =
            EventLoop::new().map_err(|e| WindowError::CreateEventLoopFailed(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop
            .run_app(self)
            .map_err(|e| WindowError::EventLoopFailed(e.to_string()))
    }
}

impl<E: WindowEventHandler> ApplicationHandler for WindowLifecycleManager<E> {
    fn new_events(&mut self, _: &ActiveEventLoop, cause: StartCause) {
        if let Some(window) = &self.window {
            if let StartCause::Poll = cause {
                window.request_redraw();
            }
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title(self.config.title.as_str())
                        .with_resizable(self.config.resizable)
                        .with_inner_size(LogicalSize::new(self.config.width, self.config.height)),
                )
                .unwrap_or_else(|e| handle_fatal_error(e, "Failed to create window"));

            info!(
                width = self.config.width,
                height = self.config.height,
                "Window created"
            );
            self.event_handler.on_window_ready(&window);

            self.window = Some(window);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                if let Some(window) = &self.window {
                    self.handle_resize_event(WindowSize {
                        width: size.width,
                        height: size.height,
                        scale_factor: window.scale_factor(),
                    });
                }
            }
            WindowEvent::CloseRequested => {
                debug!("Close requested");
                event_loop.exit();
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(window) = &self.window {
                    let inner = window.inner_size();
                    self.handle_resize_event(WindowSize {
                        width: inner.width,
                        height: inner.height,
                        scale_factor,
                    });
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.event_handler
                        .on_keyboard_input(code, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.event_handler.on_cursor_moved(position.x, position.y);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.event_handler
                    .on_mouse_button(button, state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => {
                self.event_handler.redraw();
                if self.event_handler.should_exit() {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn suspended(&mut self, _: &ActiveEventLoop) {
        self.event_handler.on_window_lost();
        self.window = None;
    }
}
