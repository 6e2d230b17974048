use crate::camera::CameraSettings;

/// Output colour handling for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// Pass panorama bytes through untouched onto a non-sRGB surface.
    #[default]
    Gamma,
    /// Decode panorama texels from sRGB and let an sRGB surface re-encode them.
    Linear,
}

impl ColorSpaceMode {
    /// Texture format panorama uploads use under this mode.
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            ColorSpaceMode::Gamma => wgpu::TextureFormat::Rgba8Unorm,
            ColorSpaceMode::Linear => wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }
}

impl std::fmt::Display for ColorSpaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorSpaceMode::Gamma => f.write_str("gamma"),
            ColorSpaceMode::Linear => f.write_str("linear"),
        }
    }
}

/// Binding target of a vertex buffer. Only per-vertex attribute arrays exist here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferTarget {
    #[default]
    VertexAttributes,
}

/// Usage hint for a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    /// Written once at creation, never updated.
    #[default]
    Static,
}

/// Surface options for GPU-backed viewports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub color_space: ColorSpaceMode,
    /// Prefer a tear-free present mode.
    pub vsync: bool,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            color_space: ColorSpaceMode::default(),
            vsync: true,
        }
    }
}

/// Per-viewport renderer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    /// Colour the target is cleared to before the triangle is drawn.
    pub clear_color: wgpu::Color,
    pub color_space: ColorSpaceMode,
    pub camera: CameraSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: wgpu::Color::WHITE,
            color_space: ColorSpaceMode::default(),
            camera: CameraSettings::default(),
        }
    }
}
