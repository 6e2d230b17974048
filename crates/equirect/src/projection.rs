//! CPU mirror of the equirectangular fragment stage.
//!
//! The functions here follow `shaders/equirectangular.wgsl` step for step so
//! still frames can be produced without a GPU and so the projection maths can
//! be exercised in tests. Keep both in sync.

use glam::{Quat, Vec2, Vec3};
use image::{Rgba, RgbaImage};

use crate::camera::Camera;

/// `(1 / 2π, 1 / π)` rounded the same way the shader constant is.
pub const INV_ATAN: Vec2 = Vec2::new(0.1591, 0.3183);

/// Rotates `v` by the unit quaternion `q`.
///
/// `t = 2·(q.xyz × v); v' = v + q.w·t + q.xyz × t`
pub fn rotate_vector(v: Vec3, q: Quat) -> Vec3 {
    let axis = Vec3::new(q.x, q.y, q.z);
    let t = 2.0 * axis.cross(v);
    v + q.w * t + axis.cross(t)
}

/// World-space view ray for a normalised screen coordinate.
///
/// `uv` is in `[0, 1]²` with `(0, 0)` at the bottom-left of the render target.
pub fn ray_direction(uv: Vec2, field_of_view: f32, aspect_ratio: f32, rotation: Quat) -> Vec3 {
    let centered = uv * 2.0 - Vec2::ONE;
    let half_extent = (field_of_view * 0.5).to_radians().tan();
    let camera_ray = Vec3::new(
        centered.x * half_extent * aspect_ratio,
        centered.y * half_extent,
        -1.0,
    )
    .normalize();
    rotate_vector(camera_ray, rotation)
}

/// Texture coordinate of `direction` on an equirectangular map.
///
/// `u` follows longitude (`atan2(z, x)`), `v` follows latitude (`asin(y)`),
/// both remapped into `[0, 1]`.
pub fn spherical_uv(direction: Vec3) -> Vec2 {
    let angles = Vec2::new(
        direction.z.atan2(direction.x),
        direction.y.clamp(-1.0, 1.0).asin(),
    );
    angles * INV_ATAN + Vec2::splat(0.5)
}

/// Renders one view of `panorama` through `camera` into a `width`×`height` image.
///
/// Sampling is nearest-neighbour, wrapping horizontally and clamping
/// vertically. `panorama` is in top-down row order, as decoded images are.
pub fn render_view(panorama: &RgbaImage, width: u32, height: u32, camera: &Camera) -> RgbaImage {
    let width = width.max(1);
    let height = height.max(1);
    let aspect_ratio = width as f32 / height as f32;
    let rotation = camera.rotation();
    let field_of_view = camera.field_of_view();

    RgbaImage::from_fn(width, height, |x, y| {
        let uv = Vec2::new(
            (x as f32 + 0.5) / width as f32,
            1.0 - (y as f32 + 0.5) / height as f32,
        );
        let direction = ray_direction(uv, field_of_view, aspect_ratio, rotation);
        sample_nearest(panorama, spherical_uv(direction))
    })
}

fn sample_nearest(image: &RgbaImage, uv: Vec2) -> Rgba<u8> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Rgba([255, 0, 255, 255]);
    }
    let u = uv.x.rem_euclid(1.0);
    // v = 1 is the top of the sphere, which is row 0 of a decoded image
    let v = (1.0 - uv.y).clamp(0.0, 1.0);
    let column = ((u * width as f32) as u32).min(width - 1);
    let row = ((v * height as f32) as u32).min(height - 1);
    *image.get_pixel(column, row)
}
