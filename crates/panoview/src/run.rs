use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use equirect::{
    EquirectangularRenderer, FrameClock, FrameToken, PixelImage, TextureSource, TickOutcome,
    Viewport, ViewportEvents, WgpuBackend,
};
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::bootstrap::{load_config, resolve_settings, ViewerSettings};
use crate::cli::Args;
use crate::input::{wheel_zoom, CameraInput, DragTracker};
use crate::snapshot::write_snapshot;
use crate::source::{load_panorama, spawn_player, FrameSequence};

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let config = load_config(args.config.as_deref())?;
    let settings = resolve_settings(&args, &config);
    let frames = args
        .frames
        .as_deref()
        .map(FrameSequence::discover)
        .transpose()?;

    if let Some(output) = args.snapshot.as_ref() {
        let panorama = match (&args.image, &frames) {
            (Some(path), _) => load_panorama(path)?,
            (None, Some(frames)) => load_panorama(frames.first())?,
            (None, None) => bail!("--snapshot needs an IMAGE or --frames DIR to render"),
        };
        return write_snapshot(&panorama, &settings, output);
    }

    let initial = args.image.as_deref().map(load_panorama).transpose()?;
    if initial.is_none() && frames.is_none() {
        tracing::info!("no panorama given; showing the placeholder texture");
    }
    run_window(settings, initial, frames, args.fps)
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Turns viewport frame requests into winit redraw requests.
struct WinitFrameClock {
    window: Arc<Window>,
    next: u64,
    pending: Option<FrameToken>,
}

impl WinitFrameClock {
    fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            next: 0,
            pending: None,
        }
    }

    fn take_pending(&mut self) -> Option<FrameToken> {
        self.pending.take()
    }
}

impl FrameClock for WinitFrameClock {
    fn request_frame(&mut self) -> FrameToken {
        self.next += 1;
        let token = FrameToken(self.next);
        self.pending = Some(token);
        self.window.request_redraw();
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        if self.pending == Some(token) {
            self.pending = None;
        }
    }
}

fn run_window(
    settings: ViewerSettings,
    initial: Option<PixelImage>,
    frames: Option<FrameSequence>,
    fps: f32,
) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (width, height) = settings.window_size;
    let window = WindowBuilder::new()
        .with_title(settings.title.as_str())
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create viewer window: {err}"))?;
    let window = Arc::new(window);
    let window_id = window.id();

    let size = window.inner_size();
    let backend = WgpuBackend::new(window.clone(), (size.width, size.height), settings.surface)
        .context("failed to initialise GPU surface")?;
    tracing::info!(
        format = ?backend.surface_format(),
        width = size.width,
        height = size.height,
        "GPU surface ready"
    );

    let renderer = EquirectangularRenderer::new(backend, settings.renderer);
    let mut viewport = Viewport::new(renderer, WinitFrameClock::new(window.clone()));
    let events = viewport.events();
    if let Some(image) = initial {
        events.texture(TextureSource::Still(image));
    }
    viewport
        .start()
        .context("failed to initialise equirectangular renderer")?;

    if let Some(frames) = frames {
        spawn_player(frames, fps, viewport.events())?;
    }

    let mut drag = DragTracker::default();
    event_loop
        .run(move |event, elwt| {
            let Event::WindowEvent { window_id: id, event } = event else {
                return;
            };
            if id != window_id {
                return;
            }
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    viewport.stop();
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state == ElementState::Pressed
                        && matches!(event.logical_key, Key::Named(NamedKey::Escape))
                    {
                        viewport.stop();
                        elwt.exit();
                    }
                }
                WindowEvent::ModifiersChanged(modifiers) => {
                    drag.set_shift(modifiers.state().shift_key());
                }
                WindowEvent::MouseInput {
                    state,
                    button: MouseButton::Left,
                    ..
                } => drag.set_pressed(state == ElementState::Pressed),
                WindowEvent::CursorMoved { position, .. } => {
                    if let Some(input) = drag.cursor_moved(position.x, position.y) {
                        forward(&events, input);
                    }
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    let lines = match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(position) => position.y as f32,
                    };
                    if let Some(input) = wheel_zoom(lines) {
                        forward(&events, input);
                    }
                }
                WindowEvent::Resized(size) => {
                    events.resize(size.width, size.height);
                }
                WindowEvent::RedrawRequested => {
                    if let Some(token) = viewport.clock_mut().take_pending() {
                        if viewport.tick(token) == TickOutcome::Stopped {
                            elwt.exit();
                        }
                    }
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

fn forward(events: &ViewportEvents, input: CameraInput) {
    match input {
        CameraInput::Rotate { pitch, yaw, roll } => events.rotate(pitch, yaw, roll),
        CameraInput::Zoom(delta) => events.zoom(delta),
    };
}
