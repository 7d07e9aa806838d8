//! Stipple Desktop — interactive pixel scribble canvas powered by wgpu.
//!
//! Uses `winit` 0.30 for windowing and input and `stipple-render` for
//! the batched drawing engine. The redraw handler is the engine's frame
//! tick: deferred reads get serviced and any pending flush+present runs.
//!
//! Controls: left-drag draws, right-click inspects the pixel under the
//! cursor, 1/2/3 pick the pen shape, [ and ] resize it, B toggles the
//! blend mode, N toggles noise, C cycles the palette.

mod state;

use log::info;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalPosition},
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes, WindowId},
};

use state::AppState;
use stipple_core::PenShape;
use stipple_render::context::GpuContext;

/// Winit 0.30 application handler.
struct App {
    window: Option<Arc<Window>>,
    state: Option<AppState>,
    drawing: bool,
    last_cursor: (f64, f64),
    frame_count: u64,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            state: None,
            drawing: false,
            last_cursor: (0.0, 0.0),
            frame_count: 0,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized.
        }

        let attrs = WindowAttributes::default()
            .with_title("Stipple — Pixel Canvas")
            .with_inner_size(LogicalSize::new(960, 640))
            .with_min_inner_size(LogicalSize::new(320, 240));

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .expect("Failed to create window"),
        );

        let size = window.inner_size();

        let gpu = pollster::block_on(GpuContext::new_with_surface(
            window.clone(),
            size.width.max(1),
            size.height.max(1),
        ))
        .expect("Failed to initialize GPU");

        let mut app_state = AppState::new(gpu, size.width.max(1), size.height.max(1))
            .expect("Failed to create screen renderer");
        app_state.load_demo_scene();

        info!(
            "Stipple Desktop initialized: {}x{}, GPU: {:?}",
            size.width,
            size.height,
            app_state.gpu.adapter.get_info().name
        );

        self.state = Some(app_state);
        self.window = Some(window);
        self.window.as_ref().unwrap().request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let (Some(window), Some(state)) = (self.window.as_ref(), self.state.as_mut()) else {
            return;
        };

        match event {
            // ── Close / keyboard ────────────────────────────────
            WindowEvent::CloseRequested => {
                info!("Window closed after {} frames", self.frame_count);
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed =>
            {
                match event.logical_key.as_ref() {
                    Key::Named(NamedKey::Escape) => event_loop.exit(),
                    Key::Character("1") => state.set_shape(PenShape::Pixel),
                    Key::Character("2") => state.set_shape(PenShape::Square),
                    Key::Character("3") => state.set_shape(PenShape::Circle),
                    Key::Character("[") => state.adjust_size(-1),
                    Key::Character("]") => state.adjust_size(1),
                    Key::Character("b") => state.toggle_blend(),
                    Key::Character("n") => state.toggle_noise(),
                    Key::Character("c") => state.cycle_color(),
                    _ => {}
                }
                window.request_redraw();
            }

            // ── Resize ──────────────────────────────────────────
            WindowEvent::Resized(new_size) => {
                if let Err(e) = state.resize(new_size.width, new_size.height) {
                    log::error!("Resize failed: {e}");
                }
                window.request_redraw();
            }

            // ── Cursor → stroke ─────────────────────────────────
            WindowEvent::CursorMoved {
                position: PhysicalPosition { x, y },
                ..
            } => {
                if self.drawing {
                    state.stroke_to(x as i32, y as i32);
                    window.request_redraw();
                }
                self.last_cursor = (x, y);
            }

            // ── Mouse buttons ───────────────────────────────────
            WindowEvent::MouseInput { state: btn_state, button, .. } => {
                let (x, y) = (self.last_cursor.0 as i32, self.last_cursor.1 as i32);
                match (button, btn_state) {
                    (MouseButton::Left, ElementState::Pressed) => {
                        self.drawing = true;
                        state.begin_stroke(x, y);
                        window.request_redraw();
                    }
                    (MouseButton::Left, ElementState::Released) => {
                        self.drawing = false;
                        state.end_stroke();
                    }
                    (MouseButton::Right, ElementState::Pressed) => {
                        state.inspect(x, y);
                        window.request_redraw();
                    }
                    _ => {}
                }
            }

            // ── Redraw: the engine's frame tick ─────────────────
            WindowEvent::RedrawRequested => {
                match state.frame() {
                    Ok(rendered) => {
                        if rendered {
                            self.frame_count += 1;
                        }
                    }
                    Err(stipple_render::RenderError::Surface(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    )) => {
                        // Reconfigure on lost/outdated surfaces.
                        let size = window.inner_size();
                        let _ = state.resize(size.width, size.height);
                        window.request_redraw();
                    }
                    Err(e) => {
                        log::error!("Render error: {e}");
                    }
                }
                // Keep ticking while a stroke or readback is pending.
                if self.drawing || state.screen.is_dirty() {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}

fn main() {
    env_logger::init();

    info!("Starting Stipple Desktop...");

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new();
    event_loop.run_app(&mut app).expect("Event loop error");
}
