//! Panorama texture: placeholder start, full re-uploads, mipmap policy.

use image::imageops::{self, flip_vertical_in_place, FilterType};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::gpu::{BackendError, GpuBackend};

/// The colour of a texture nobody has uploaded to yet.
pub const PLACEHOLDER_PIXEL: [u8; 4] = [255, 0, 255, 255];

/// Byte layout of pixels handed in by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    Bgra8,
    Luma8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 => 1,
        }
    }
}

/// Decoded pixels, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl PixelImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            pixels,
        }
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, PixelFormat::Rgba8, image.into_raw())
    }

    fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.format.bytes_per_pixel())
    }

    /// Converts to top-down RGBA8, rejecting empty or short buffers.
    pub fn to_rgba(&self) -> Result<RgbaImage, TextureError> {
        if self.width == 0 || self.height == 0 {
            return Err(TextureError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.expected_len().ok_or(TextureError::Empty {
            width: self.width,
            height: self.height,
        })?;
        if self.pixels.len() < expected {
            return Err(TextureError::ShortBuffer {
                expected,
                actual: self.pixels.len(),
            });
        }

        let pixels = self.pixels[..expected].to_vec();
        let short = || TextureError::ShortBuffer {
            expected,
            actual: self.pixels.len(),
        };
        let rgba = match self.format {
            PixelFormat::Rgba8 => RgbaImage::from_raw(self.width, self.height, pixels).ok_or_else(short)?,
            PixelFormat::Bgra8 => {
                let mut pixels = pixels;
                for texel in pixels.chunks_exact_mut(4) {
                    texel.swap(0, 2);
                }
                RgbaImage::from_raw(self.width, self.height, pixels).ok_or_else(short)?
            }
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
                RgbImage::from_raw(self.width, self.height, pixels).ok_or_else(short)?,
            )
            .to_rgba8(),
            PixelFormat::Luma8 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(self.width, self.height, pixels).ok_or_else(short)?,
            )
            .to_rgba8(),
        };
        Ok(rgba)
    }
}

/// Content for [`Texture::set_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    Still(PixelImage),
    /// One decoded frame of a playing video; `sequence` increases per frame.
    VideoFrame { frame: PixelImage, sequence: u64 },
}

impl TextureSource {
    pub fn image(&self) -> &PixelImage {
        match self {
            TextureSource::Still(image) => image,
            TextureSource::VideoFrame { frame, .. } => frame,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("texture source is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("texture source holds {actual} bytes, expected {expected}")]
    ShortBuffer { expected: usize, actual: usize },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Filtering, addressing, and mip generation chosen for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub mipmapped: bool,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
    pub address_u: wgpu::AddressMode,
    pub address_v: wgpu::AddressMode,
}

impl SamplingPolicy {
    /// Power-of-two sizes get a full mip chain with trilinear filtering and
    /// repeat addressing. Anything else is a single linear level clamped to
    /// the edge on both axes.
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if width.is_power_of_two() && height.is_power_of_two() {
            Self {
                mipmapped: true,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::FilterMode::Linear,
                address_u: wgpu::AddressMode::Repeat,
                address_v: wgpu::AddressMode::Repeat,
            }
        } else {
            Self::clamped()
        }
    }

    pub fn clamped() -> Self {
        Self {
            mipmapped: false,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            address_u: wgpu::AddressMode::ClampToEdge,
            address_v: wgpu::AddressMode::ClampToEdge,
        }
    }
}

/// Upload-ready RGBA8 pixel levels, bottom row first, level 0 first.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub levels: Vec<Vec<u8>>,
    pub sampling: SamplingPolicy,
}

impl TextureImage {
    pub fn placeholder(label: &str, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            width: 1,
            height: 1,
            format,
            levels: vec![PLACEHOLDER_PIXEL.to_vec()],
            sampling: SamplingPolicy::clamped(),
        }
    }

    /// Flips `image` so row 0 is the bottom and builds the mip chain the
    /// policy asks for.
    pub fn from_rgba(label: &str, mut image: RgbaImage, format: wgpu::TextureFormat) -> Self {
        let (width, height) = image.dimensions();
        let sampling = SamplingPolicy::for_dimensions(width, height);
        flip_vertical_in_place(&mut image);

        let levels = if sampling.mipmapped {
            mip_chain(image)
        } else {
            vec![image.into_raw()]
        };

        Self {
            label: label.to_string(),
            width,
            height,
            format,
            levels,
            sampling,
        }
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

/// Number of levels in a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

fn mip_chain(base: RgbaImage) -> Vec<Vec<u8>> {
    let count = mip_level_count(base.width(), base.height()) as usize;
    let mut levels = Vec::with_capacity(count);
    let mut current = base;
    for _ in 1..count {
        let next_width = (current.width() / 2).max(1);
        let next_height = (current.height() / 2).max(1);
        let next = imageops::resize(&current, next_width, next_height, FilterType::Triangle);
        levels.push(std::mem::replace(&mut current, next).into_raw());
    }
    levels.push(current.into_raw());
    levels
}

/// One GPU image plus the metadata of its last upload.
pub struct Texture<B: GpuBackend + ?Sized> {
    name: String,
    handle: B::Texture,
    initialized: bool,
    power_of_two: bool,
    width: u32,
    height: u32,
    sampling: SamplingPolicy,
    last_sequence: Option<u64>,
}

impl<B: GpuBackend + ?Sized> Texture<B> {
    /// Creates the 1x1 magenta placeholder so sampling never hits an unbound texture.
    pub(crate) fn placeholder(
        backend: &mut B,
        name: &str,
        format: wgpu::TextureFormat,
    ) -> Result<Self, BackendError> {
        let image = TextureImage::placeholder(name, format);
        let handle = backend.create_texture(&image)?;
        Ok(Self {
            name: name.to_string(),
            handle,
            initialized: false,
            power_of_two: false,
            width: 1,
            height: 1,
            sampling: image.sampling,
            last_sequence: None,
        })
    }

    /// Replaces the whole image with `source`.
    ///
    /// On error the previous content and metadata stay in place.
    pub fn set_content(
        &mut self,
        backend: &mut B,
        source: &TextureSource,
        internal_format: wgpu::TextureFormat,
    ) -> Result<(), TextureError> {
        let rgba = source.image().to_rgba()?;
        let image = TextureImage::from_rgba(&self.name, rgba, internal_format);
        backend.write_texture(&mut self.handle, &image)?;

        self.initialized = true;
        self.width = image.width;
        self.height = image.height;
        self.power_of_two = image.width.is_power_of_two() && image.height.is_power_of_two();
        self.sampling = image.sampling;
        if let TextureSource::VideoFrame { sequence, .. } = source {
            self.last_sequence = Some(*sequence);
        }
        tracing::trace!(
            texture = %self.name,
            width = self.width,
            height = self.height,
            levels = image.level_count(),
            "uploaded texture content"
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &B::Texture {
        &self.handle
    }

    /// `false` until the first successful [`set_content`](Self::set_content).
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Power-of-two status of the last uploaded content; `false` for the placeholder.
    pub fn is_power_of_two(&self) -> bool {
        self.power_of_two
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn sampling(&self) -> SamplingPolicy {
        self.sampling
    }

    /// Sequence number of the last video frame uploaded, if any.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    fn solid(width: u32, height: u32) -> TextureSource {
        TextureSource::Still(PixelImage::new(
            width,
            height,
            PixelFormat::Rgba8,
            vec![200; (width * height * 4) as usize],
        ))
    }

    #[test]
    fn power_of_two_sources_are_mipmapped_and_repeat() {
        let policy = SamplingPolicy::for_dimensions(256, 256);
        assert!(policy.mipmapped);
        assert_eq!(policy.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(policy.mipmap_filter, wgpu::FilterMode::Linear);
        assert_eq!(policy.address_u, wgpu::AddressMode::Repeat);
    }

    #[test]
    fn other_sources_are_linear_and_clamped() {
        let policy = SamplingPolicy::for_dimensions(300, 200);
        assert!(!policy.mipmapped);
        assert_eq!(policy.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(policy.mag_filter, wgpu::FilterMode::Linear);
        assert_eq!(policy.address_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(policy.address_v, wgpu::AddressMode::ClampToEdge);

        // one power-of-two axis is not enough
        assert!(!SamplingPolicy::for_dimensions(256, 200).mipmapped);
    }

    #[test]
    fn mip_chain_reaches_one_texel() {
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(64, 16), 7);
        assert_eq!(mip_level_count(1, 1), 1);

        let image = TextureImage::from_rgba(
            "pano",
            RgbaImage::new(8, 4),
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let sizes: Vec<usize> = image.levels.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![8 * 4 * 4, 4 * 2 * 4, 2 * 4, 4]);
    }

    #[test]
    fn upload_flips_rows() {
        let mut top_red = RgbaImage::new(1, 2);
        top_red.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        top_red.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        let image = TextureImage::from_rgba("flip", top_red, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(&image.levels[0][..4], &[0, 0, 255, 255]);
        assert_eq!(&image.levels[0][4..], &[255, 0, 0, 255]);
    }

    #[test]
    fn pixel_formats_convert_to_rgba() {
        let bgra = PixelImage::new(1, 1, PixelFormat::Bgra8, vec![1, 2, 3, 4]);
        assert_eq!(bgra.to_rgba().unwrap().into_raw(), vec![3, 2, 1, 4]);

        let rgb = PixelImage::new(1, 1, PixelFormat::Rgb8, vec![9, 8, 7]);
        assert_eq!(rgb.to_rgba().unwrap().into_raw(), vec![9, 8, 7, 255]);

        let luma = PixelImage::new(1, 1, PixelFormat::Luma8, vec![42]);
        assert_eq!(luma.to_rgba().unwrap().into_raw(), vec![42, 42, 42, 255]);
    }

    #[test]
    fn placeholder_is_magenta_and_uninitialised() {
        let mut backend = HeadlessBackend::new(64, 64);
        let texture =
            Texture::placeholder(&mut backend, "pano", wgpu::TextureFormat::Rgba8Unorm).unwrap();
        assert!(!texture.is_initialized());
        assert!(!texture.is_power_of_two());
        assert_eq!(texture.sampling(), SamplingPolicy::clamped());
        assert_eq!(texture.handle().pixels(), Some(&PLACEHOLDER_PIXEL[..]));
    }

    #[test]
    fn set_content_tracks_policy_per_upload() {
        let mut backend = HeadlessBackend::new(64, 64);
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let mut texture = Texture::placeholder(&mut backend, "pano", format).unwrap();

        texture.set_content(&mut backend, &solid(256, 256), format).unwrap();
        assert!(texture.is_initialized());
        assert!(texture.is_power_of_two());
        assert!(texture.sampling().mipmapped);
        assert_eq!(texture.handle().level_count(), 9);

        texture.set_content(&mut backend, &solid(300, 200), format).unwrap();
        assert!(!texture.is_power_of_two());
        assert_eq!(texture.dimensions(), (300, 200));
        assert_eq!(texture.sampling().address_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(texture.handle().level_count(), 1);
    }

    #[test]
    fn rejected_sources_keep_previous_content() {
        let mut backend = HeadlessBackend::new(64, 64);
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let mut texture = Texture::placeholder(&mut backend, "pano", format).unwrap();
        texture.set_content(&mut backend, &solid(4, 4), format).unwrap();

        let short = TextureSource::VideoFrame {
            frame: PixelImage::new(8, 8, PixelFormat::Rgba8, vec![0; 10]),
            sequence: 3,
        };
        assert!(matches!(
            texture.set_content(&mut backend, &short, format),
            Err(TextureError::ShortBuffer { expected: 256, actual: 10 })
        ));
        let empty = TextureSource::Still(PixelImage::new(0, 4, PixelFormat::Rgba8, Vec::new()));
        assert!(matches!(
            texture.set_content(&mut backend, &empty, format),
            Err(TextureError::Empty { .. })
        ));

        assert_eq!(texture.dimensions(), (4, 4));
        assert_eq!(texture.last_sequence(), None);
    }
}
