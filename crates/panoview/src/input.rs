//! Pointer and wheel input mapped to camera deltas.

/// Degrees of roll per pixel of shift-drag, before the camera's roll sensitivity.
const ROLL_PER_PIXEL: f32 = 0.05;

/// Camera change produced by one input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraInput {
    Rotate { pitch: f32, yaw: f32, roll: f32 },
    Zoom(f32),
}

/// Tracks the drag state between cursor events.
#[derive(Debug, Default)]
pub struct DragTracker {
    pressed: bool,
    shift: bool,
    last: Option<(f64, f64)>,
}

impl DragTracker {
    pub fn set_pressed(&mut self, pressed: bool) {
        self.pressed = pressed;
        if !pressed {
            self.last = None;
        }
    }

    pub fn set_shift(&mut self, shift: bool) {
        self.shift = shift;
    }

    pub fn is_dragging(&self) -> bool {
        self.pressed
    }

    /// Returns the rotation for a cursor move, if a drag is in progress.
    ///
    /// Horizontal motion yaws and vertical motion pitches, one degree per
    /// pixel before the camera's sensitivities. With shift held the
    /// horizontal motion rolls instead.
    pub fn cursor_moved(&mut self, x: f64, y: f64) -> Option<CameraInput> {
        let previous = self.last.replace((x, y));
        if !self.pressed {
            return None;
        }
        let (px, py) = previous?;
        let dx = (x - px) as f32;
        let dy = (y - py) as f32;
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        if self.shift {
            Some(CameraInput::Rotate {
                pitch: 0.0,
                yaw: 0.0,
                roll: dx * ROLL_PER_PIXEL,
            })
        } else {
            Some(CameraInput::Rotate {
                pitch: dy,
                yaw: dx,
                roll: 0.0,
            })
        }
    }
}

/// Wheel up (positive) zooms in.
pub fn wheel_zoom(lines: f32) -> Option<CameraInput> {
    (lines != 0.0 && lines.is_finite()).then_some(CameraInput::Zoom(lines))
}
