//! Frame loop for one viewport.
//!
//! ```text
//!   input / decoder ──▶ ViewportEvents ──▶ channel ─┐
//!                                                   ▼
//!   FrameClock ──token──▶ Viewport::tick ──▶ drain events ──▶ renderer.render()
//!        ▲                                                        │
//!        └──────────────────── request_frame() ◀──────────────────┘
//! ```
//!
//! Input handlers and frame sources never touch the renderer directly; they
//! post [`ViewportEvent`]s, and each tick applies everything queued so far
//! before drawing. A tick only counts when it carries the token of the
//! currently pending frame request, so a tick that arrives after
//! [`Viewport::stop`] (or after any cancelled request) does nothing.
//!
//! Texture content does not go through the queue. It lands in a single
//! latest-wins slot, so a window that stops ticking holds at most one
//! undisplayed frame and the next tick uploads only the newest one.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::equirect::{EquirectangularRenderer, RenderError};
use crate::gpu::GpuBackend;
use crate::texture::TextureSource;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewportEvent {
    Rotate { pitch: f32, yaw: f32, roll: f32 },
    Zoom(f32),
    Texture(TextureSource),
    Resize { width: u32, height: u32 },
    Stop,
}

type TextureSlot = Mutex<Option<TextureSource>>;

/// Cloneable sending side of a viewport's event queue.
#[derive(Debug, Clone)]
pub struct ViewportEvents {
    sender: Sender<ViewportEvent>,
    latest_texture: Weak<TextureSlot>,
}

impl ViewportEvents {
    /// Queues `event`. Returns `false` once the viewport is gone.
    pub fn send(&self, event: ViewportEvent) -> bool {
        match event {
            ViewportEvent::Texture(source) => self.texture(source),
            event => self.sender.send(event).is_ok(),
        }
    }

    pub fn rotate(&self, pitch: f32, yaw: f32, roll: f32) -> bool {
        self.send(ViewportEvent::Rotate { pitch, yaw, roll })
    }

    pub fn zoom(&self, delta: f32) -> bool {
        self.send(ViewportEvent::Zoom(delta))
    }

    /// Replaces any texture content not yet picked up by a tick.
    pub fn texture(&self, source: TextureSource) -> bool {
        let Some(slot) = self.latest_texture.upgrade() else {
            return false;
        };
        let replaced = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(source);
        if let Some(TextureSource::VideoFrame { sequence, .. }) = replaced {
            tracing::trace!(sequence, "dropping undisplayed video frame");
        }
        true
    }

    pub fn resize(&self, width: u32, height: u32) -> bool {
        self.send(ViewportEvent::Resize { width, height })
    }

    pub fn stop(&self) -> bool {
        self.send(ViewportEvent::Stop)
    }
}

/// Identifies one frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(pub u64);

/// The host's display-refresh subscription.
pub trait FrameClock {
    /// Asks for one more tick; the host later calls [`Viewport::tick`] with the token.
    fn request_frame(&mut self) -> FrameToken;
    fn cancel_frame(&mut self, token: FrameToken);
}

/// A clock that only records requests; the caller decides when ticks happen.
#[derive(Debug, Default)]
pub struct ManualFrameClock {
    next: u64,
    pending: Vec<FrameToken>,
    cancelled: Vec<FrameToken>,
}

impl ManualFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens requested and neither delivered nor cancelled.
    pub fn pending(&self) -> &[FrameToken] {
        &self.pending
    }

    pub fn cancelled(&self) -> &[FrameToken] {
        &self.cancelled
    }

    /// Removes and returns the oldest pending token, as the host would when
    /// its refresh callback fires.
    pub fn fire(&mut self) -> Option<FrameToken> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }
}

impl FrameClock for ManualFrameClock {
    fn request_frame(&mut self) -> FrameToken {
        self.next += 1;
        let token = FrameToken(self.next);
        self.pending.push(token);
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        self.pending.retain(|pending| *pending != token);
        self.cancelled.push(token);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportState {
    Idle,
    Running,
    Stopped,
}

/// What a call to [`Viewport::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    /// The draw failed; the next frame is already requested.
    DrawFailed,
    /// Stale or cancelled token, or the viewport is not running.
    Ignored,
    /// A queued stop event ended the loop during this tick.
    Stopped,
}

/// Owns one renderer, its event queue and its frame subscription.
pub struct Viewport<B: GpuBackend, C: FrameClock> {
    renderer: EquirectangularRenderer<B>,
    clock: C,
    sender: Sender<ViewportEvent>,
    receiver: Receiver<ViewportEvent>,
    latest_texture: Arc<TextureSlot>,
    pending: Option<FrameToken>,
    state: ViewportState,
}

impl<B: GpuBackend, C: FrameClock> Viewport<B, C> {
    pub fn new(renderer: EquirectangularRenderer<B>, clock: C) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            renderer,
            clock,
            sender,
            receiver,
            latest_texture: Arc::default(),
            pending: None,
            state: ViewportState::Idle,
        }
    }

    pub fn events(&self) -> ViewportEvents {
        ViewportEvents {
            sender: self.sender.clone(),
            latest_texture: Arc::downgrade(&self.latest_texture),
        }
    }

    /// Initialises the renderer and requests the first frame.
    pub fn start(&mut self) -> Result<(), RenderError> {
        if self.state != ViewportState::Idle {
            return Ok(());
        }
        self.renderer.initialize()?;
        self.state = ViewportState::Running;
        self.pending = Some(self.clock.request_frame());
        Ok(())
    }

    /// Runs one frame if `token` is the pending request.
    pub fn tick(&mut self, token: FrameToken) -> TickOutcome {
        if self.state != ViewportState::Running || self.pending != Some(token) {
            tracing::trace!(?token, "ignoring stale frame");
            return TickOutcome::Ignored;
        }
        self.pending = None;

        if !self.drain_events() {
            self.stop();
            return TickOutcome::Stopped;
        }

        let outcome = match self.renderer.render() {
            Ok(()) => TickOutcome::Rendered,
            Err(err) => {
                tracing::warn!(error = %err, "frame failed");
                TickOutcome::DrawFailed
            }
        };
        self.pending = Some(self.clock.request_frame());
        outcome
    }

    /// Applies every queued event, then the newest texture content.
    /// Returns `false` if a stop was requested.
    fn drain_events(&mut self) -> bool {
        loop {
            match self.receiver.try_recv() {
                Ok(ViewportEvent::Rotate { pitch, yaw, roll }) => {
                    self.renderer.rotate_camera(pitch, yaw, roll);
                }
                Ok(ViewportEvent::Zoom(delta)) => self.renderer.change_field_of_view(delta),
                Ok(ViewportEvent::Texture(source)) => {
                    self.renderer.update_texture_source(&source);
                }
                Ok(ViewportEvent::Resize { width, height }) => self.renderer.resize(width, height),
                Ok(ViewportEvent::Stop) => return false,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        let latest = self
            .latest_texture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(source) = latest {
            self.renderer.update_texture_source(&source);
        }
        true
    }

    /// Cancels the pending frame, then tears everything down once.
    pub fn stop(&mut self) {
        if let Some(token) = self.pending.take() {
            self.clock.cancel_frame(token);
        }
        if self.state != ViewportState::Stopped {
            self.renderer.cleanup();
            self.state = ViewportState::Stopped;
            tracing::debug!("viewport stopped");
        }
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn pending_frame(&self) -> Option<FrameToken> {
        self.pending
    }

    pub fn renderer(&self) -> &EquirectangularRenderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut EquirectangularRenderer<B> {
        &mut self.renderer
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

impl<B: GpuBackend, C: FrameClock> Drop for Viewport<B, C> {
    fn drop(&mut self) {
        self.stop();
    }
}
