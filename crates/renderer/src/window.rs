use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use tracing::{debug, error, info, warn};

use crate::error::FrameError;
use crate::gpu::WgpuBackend;
use crate::input::InputCommand;
use crate::scene::Renderer;
use crate::texture::FileImageSource;
use crate::types::RendererConfig;

/// Scroll distance one wheel notch stands for, in pixels.
const LINE_PIXELS: f32 = 100.0;
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// What a key press asks the host loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Command(InputCommand),
    Close,
}

fn key_action(key: &Key) -> Option<KeyAction> {
    match key {
        Key::Named(NamedKey::Escape) => Some(KeyAction::Close),
        Key::Character(value) => match value.to_ascii_lowercase().as_str() {
            "1" => Some(KeyAction::Command(InputCommand::SelectSimpleBackground)),
            "2" => Some(KeyAction::Command(InputCommand::SelectRealisticBackground)),
            "o" => Some(KeyAction::Command(InputCommand::ToggleOrbit)),
            "r" => Some(KeyAction::Command(InputCommand::ResetView)),
            _ => None,
        },
        _ => None,
    }
}

/// Zoom change for a wheel event. Scrolling up zooms in.
fn zoom_delta(delta: MouseScrollDelta, sensitivity: f32) -> f32 {
    let pixels = match delta {
        MouseScrollDelta::LineDelta(_, lines) => lines * LINE_PIXELS,
        MouseScrollDelta::PixelDelta(position) => position.y as f32,
    };
    pixels * sensitivity
}

/// Opens a window and renders into it until the window is closed.
///
/// Fails before the first frame when the surface cannot be created or the
/// shaders do not compile and link.
pub fn run_window(config: RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(PhysicalSize::new(
            config.surface_size.0,
            config.surface_size.1,
        ))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let backend = WgpuBackend::new(Arc::clone(&window)).context("failed to initialise GPU")?;
    let images = Arc::new(FileImageSource::new(config.texture_root.clone()));
    let mut renderer = Renderer::initialize(backend, &config.shaders, images, &config.textures)
        .context("failed to initialise renderer")?;
    info!(
        width = config.surface_size.0,
        height = config.surface_size.1,
        textures = %config.texture_root.display(),
        "window renderer running"
    );

    let mut shown_fps = None;
    let mut last_stats = Instant::now();
    let mut stats_frames = renderer.frames_rendered();
    let mut result = Ok(());

    let run_result = event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);
        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state != ElementState::Pressed || event.repeat {
                        return;
                    }
                    match key_action(&event.logical_key) {
                        Some(KeyAction::Command(command)) => renderer.apply(command),
                        Some(KeyAction::Close) => elwt.exit(),
                        None => {}
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    let size = window.inner_size();
                    renderer
                        .state_mut()
                        .set_pointer_pixels(position.x, position.y, size.width, size.height);
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    renderer
                        .state_mut()
                        .adjust_zoom(zoom_delta(delta, config.zoom_sensitivity));
                }
                WindowEvent::RedrawRequested => {
                    renderer.pump_texture_loads();
                    match renderer.render_frame() {
                        Ok(_) => {}
                        Err(FrameError::SurfaceLost) => renderer.backend_mut().reconfigure(),
                        Err(FrameError::OutOfMemory) => {
                            error!("surface out of memory; exiting");
                            result = Err(anyhow!(FrameError::OutOfMemory));
                            elwt.exit();
                        }
                        Err(FrameError::ZeroSized) => {}
                        Err(err) => warn!(error = %err, "frame skipped; retrying next frame"),
                    }

                    let fps = renderer.displayed_fps();
                    if config.fps_in_title && shown_fps != Some(fps) {
                        window.set_title(&format!("{} - {fps} FPS", config.title));
                        shown_fps = Some(fps);
                    }
                    if last_stats.elapsed() >= STATS_INTERVAL {
                        let frames = renderer.frames_rendered();
                        debug!(
                            fps,
                            frames = frames - stats_frames,
                            time = renderer.clock().time(),
                            zoom = renderer.state().zoom(),
                            pending_textures = renderer.textures().pending(),
                            "render stats"
                        );
                        stats_frames = frames;
                        last_stats = Instant::now();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        }
    });

    if let Err(err) = run_result {
        result = Err(anyhow!("window event loop error: {err}"));
    }
    result
}
