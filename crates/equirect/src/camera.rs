use glam::Quat;

pub const MIN_FIELD_OF_VIEW: f32 = 5.0;
pub const MAX_FIELD_OF_VIEW: f32 = 179.0;
pub const MIN_PITCH: f32 = -89.0;
pub const MAX_PITCH: f32 = 89.0;

const DEFAULT_FIELD_OF_VIEW: f32 = 75.0;
const DEFAULT_ZOOM_SENSITIVITY: f32 = 5.0;
const DEFAULT_PITCH_SENSITIVITY: f32 = 0.5;
const DEFAULT_YAW_SENSITIVITY: f32 = 0.5;
const DEFAULT_ROLL_SENSITIVITY: f32 = 5.0;

/// Starting field of view and per-axis input sensitivities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    /// Initial field of view in degrees (clamped into the supported range).
    pub field_of_view: f32,
    /// Degrees of field of view removed per zoom step.
    pub zoom_sensitivity: f32,
    pub pitch_sensitivity: f32,
    pub yaw_sensitivity: f32,
    pub roll_sensitivity: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            field_of_view: DEFAULT_FIELD_OF_VIEW,
            zoom_sensitivity: DEFAULT_ZOOM_SENSITIVITY,
            pitch_sensitivity: DEFAULT_PITCH_SENSITIVITY,
            yaw_sensitivity: DEFAULT_YAW_SENSITIVITY,
            roll_sensitivity: DEFAULT_ROLL_SENSITIVITY,
        }
    }
}

/// Virtual camera looking out from the centre of the panorama sphere.
///
/// All angles are stored in degrees. Field of view and pitch are clamped after
/// every mutation; yaw and roll are wrapped into `[0, 360)`. Non-finite input
/// deltas are ignored so the invariants survive garbage from the input layer.
#[derive(Debug, Clone)]
pub struct Camera {
    field_of_view: f32,
    pitch: f32,
    yaw: f32,
    roll: f32,
    settings: CameraSettings,
}

impl Camera {
    pub fn new(settings: CameraSettings) -> Self {
        let field_of_view = if settings.field_of_view.is_finite() {
            settings
                .field_of_view
                .clamp(MIN_FIELD_OF_VIEW, MAX_FIELD_OF_VIEW)
        } else {
            DEFAULT_FIELD_OF_VIEW
        };
        Self {
            field_of_view,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            settings,
        }
    }

    /// Narrows or widens the field of view by one fixed zoom step.
    ///
    /// Only the sign of `delta` matters: every wheel tick moves the field of
    /// view by `zoom_sensitivity` degrees however far the wheel travelled.
    pub fn add_field_of_view(&mut self, delta: f32) {
        let step = if delta > 0.0 {
            1.0
        } else if delta < 0.0 {
            -1.0
        } else {
            return;
        };
        self.field_of_view = (self.field_of_view - step * self.settings.zoom_sensitivity)
            .clamp(MIN_FIELD_OF_VIEW, MAX_FIELD_OF_VIEW);
    }

    pub fn add_pitch(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        let contribution = delta * self.slowdown() * self.settings.pitch_sensitivity;
        self.pitch = (self.pitch + contribution).clamp(MIN_PITCH, MAX_PITCH);
    }

    pub fn add_yaw(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        let contribution = delta * self.slowdown() * self.settings.yaw_sensitivity;
        self.yaw = wrap_degrees(self.yaw + contribution);
    }

    /// Roll ignores the zoom slowdown; only the roll sensitivity applies.
    pub fn add_roll(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        self.roll = wrap_degrees(self.roll + delta * self.settings.roll_sensitivity);
    }

    /// Multiplier applied to pitch and yaw input: narrower fields of view turn slower.
    pub fn slowdown(&self) -> f32 {
        self.field_of_view / MAX_FIELD_OF_VIEW
    }

    /// Orientation of the camera as a unit quaternion.
    ///
    /// The Euler order is fixed: pitch about X is applied first, then yaw about
    /// Y, then roll about Z (`q = Rz(roll) * Ry(yaw) * Rx(pitch)`). The fragment
    /// stage rotates camera-space rays with exactly this quaternion.
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_z(self.roll.to_radians())
            * Quat::from_rotation_y(self.yaw.to_radians())
            * Quat::from_rotation_x(self.pitch.to_radians())
    }

    pub fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn roll(&self) -> f32 {
        self.roll
    }

    pub fn minimum_field_of_view(&self) -> f32 {
        MIN_FIELD_OF_VIEW
    }

    pub fn maximum_field_of_view(&self) -> f32 {
        MAX_FIELD_OF_VIEW
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraSettings::default())
    }
}

fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_with_fov(field_of_view: f32) -> Camera {
        Camera::new(CameraSettings {
            field_of_view,
            ..CameraSettings::default()
        })
    }

    #[test]
    fn field_of_view_stays_within_bounds() {
        let mut camera = Camera::default();
        for _ in 0..100 {
            camera.add_field_of_view(1.0);
            assert!(camera.field_of_view() >= MIN_FIELD_OF_VIEW);
        }
        assert_eq!(camera.field_of_view(), MIN_FIELD_OF_VIEW);

        for _ in 0..100 {
            camera.add_field_of_view(-250.0);
            assert!(camera.field_of_view() <= MAX_FIELD_OF_VIEW);
        }
        assert_eq!(camera.field_of_view(), MAX_FIELD_OF_VIEW);
    }

    #[test]
    fn zoom_steps_by_sign_not_magnitude() {
        let mut small = Camera::default();
        let mut large = Camera::default();
        small.add_field_of_view(0.01);
        large.add_field_of_view(900.0);
        assert_eq!(small.field_of_view(), 70.0);
        assert_eq!(large.field_of_view(), 70.0);

        small.add_field_of_view(0.0);
        assert_eq!(small.field_of_view(), 70.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = camera_with_fov(MAX_FIELD_OF_VIEW);
        camera.add_pitch(10_000.0);
        assert_eq!(camera.pitch(), MAX_PITCH);
        camera.add_pitch(-1.0e9);
        assert_eq!(camera.pitch(), MIN_PITCH);
    }

    #[test]
    fn yaw_and_roll_wrap_into_canonical_range() {
        let mut camera = camera_with_fov(MAX_FIELD_OF_VIEW);
        for delta in [-1.0e6, -725.0, -360.0, -0.001, 0.0, 359.999, 725.0, 1.0e7] {
            camera.add_yaw(delta);
            camera.add_roll(delta);
            assert!((0.0..360.0).contains(&camera.yaw()), "yaw {}", camera.yaw());
            assert!((0.0..360.0).contains(&camera.roll()), "roll {}", camera.roll());
        }
    }

    #[test]
    fn multi_turn_input_wraps() {
        // roll has no slowdown, 145 * 5.0 = 725 degrees
        let mut camera = Camera::default();
        camera.add_roll(145.0);
        assert!((camera.roll() - 5.0).abs() < 1e-3);

        camera.add_roll(-2.0);
        assert!((camera.roll() - 355.0).abs() < 1e-3);
    }

    #[test]
    fn narrow_field_of_view_rotates_slower() {
        let mut wide = camera_with_fov(MAX_FIELD_OF_VIEW);
        let mut narrow = camera_with_fov(MIN_FIELD_OF_VIEW);
        wide.add_pitch(20.0);
        narrow.add_pitch(20.0);
        assert!(wide.pitch() > narrow.pitch());

        wide.add_yaw(20.0);
        narrow.add_yaw(20.0);
        assert!(wide.yaw() > narrow.yaw());
    }

    #[test]
    fn yaw_scenario_at_widest_field_of_view() {
        let mut camera = camera_with_fov(MAX_FIELD_OF_VIEW);
        camera.add_yaw(400.0);
        assert!((camera.yaw() - 200.0).abs() < 1e-4);
    }

    #[test]
    fn pitch_scenario_at_narrowest_field_of_view() {
        let mut camera = camera_with_fov(MIN_FIELD_OF_VIEW);
        camera.add_pitch(300.0);
        let expected = 300.0 * (5.0 / 179.0) * 0.5;
        assert!((camera.pitch() - expected).abs() < 1e-4);
        assert!((camera.pitch() - 4.19).abs() < 0.01);
    }

    #[test]
    fn zero_angles_give_identity_rotation() {
        let camera = Camera::default();
        let rotation = camera.rotation();
        assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn rotation_applies_pitch_before_yaw() {
        let mut camera = camera_with_fov(MAX_FIELD_OF_VIEW);
        // 90 degrees of yaw at slowdown 1.0 and sensitivity 0.5
        camera.add_yaw(180.0);
        let forward = camera.rotation() * glam::Vec3::NEG_Z;
        assert!(forward.abs_diff_eq(glam::Vec3::NEG_X, 1e-5), "{forward:?}");

        camera.add_pitch(60.0);
        // pitch tilts the ray up before yaw swings it sideways
        let forward = camera.rotation() * glam::Vec3::NEG_Z;
        assert!(forward.y > 0.0);
        assert!(forward.z.abs() < 1e-5);
    }

    #[test]
    fn ignores_non_finite_input() {
        let mut camera = Camera::default();
        camera.add_pitch(f32::NAN);
        camera.add_yaw(f32::INFINITY);
        camera.add_roll(f32::NEG_INFINITY);
        camera.add_field_of_view(f32::NAN);
        assert_eq!(camera.pitch(), 0.0);
        assert_eq!(camera.yaw(), 0.0);
        assert_eq!(camera.roll(), 0.0);
        assert_eq!(camera.field_of_view(), 75.0);
    }
}
