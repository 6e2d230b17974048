//! The seam between resource bookkeeping and an actual GPU.
//!
//! Everything above this module (registry, programs, textures, the renderer)
//! is written against [`GpuBackend`]. Two implementations ship:
//! - `wgpu_backend` drives a real device and window surface; compile, link and
//!   draw run inside validation error scopes so driver-side failures come back
//!   as [`BackendError`] instead of aborting the process.
//! - `headless` keeps no GPU state at all. It hands out numbered handles,
//!   counts every creation and release, and records each draw. Tests run the
//!   whole pipeline against it.
//!
//! Handles are owned values; dropping one releases the GPU object behind it.

mod context;
mod headless;
mod wgpu_backend;

pub use headless::{
    HeadlessBackend, HeadlessBuffer, HeadlessProbe, HeadlessProgram, HeadlessShader,
    HeadlessStats, HeadlessTexture, Lifecycle, RecordedBinding, RecordedDraw, RECORDED_DRAW_LIMIT,
};
pub use wgpu_backend::WgpuBackend;

use crate::program::{AttributeSlot, ProgramLayout, UniformSlot};
use crate::shader::ShaderModule;
use crate::texture::TextureImage;
use crate::types::{BufferTarget, BufferUsage};

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("GPU validation failed: {0}")]
    Validation(String),
    #[error("GPU ran out of memory: {0}")]
    OutOfMemory(String),
    #[error("surface unavailable: {0}")]
    Surface(String),
    #[error("{what} exceeds the device limit of {limit} texels")]
    TooLarge { what: String, limit: u32 },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("no resource bound for group {group} binding {binding}")]
    MissingBinding { group: u32, binding: u32 },
}

impl From<wgpu::Error> for BackendError {
    fn from(error: wgpu::Error) -> Self {
        match error {
            wgpu::Error::OutOfMemory { .. } => BackendError::OutOfMemory(error.to_string()),
            other => BackendError::Validation(other.to_string()),
        }
    }
}

/// A resource value attached to one draw.
pub enum BindingValue<'a, B: GpuBackend + ?Sized> {
    /// Bytes written into the program-owned uniform buffer at `slot`.
    Uniform { slot: UniformSlot, bytes: &'a [u8] },
    /// The texture's view at `slot`.
    Texture {
        slot: UniformSlot,
        texture: &'a B::Texture,
    },
    /// The texture's sampler at `slot`.
    Sampler {
        slot: UniformSlot,
        texture: &'a B::Texture,
    },
}

/// One frame's worth of work: clear, then a single non-indexed draw.
pub struct DrawCall<'a, B: GpuBackend + ?Sized> {
    pub program: &'a B::Program,
    pub vertex_buffers: Vec<(AttributeSlot, &'a B::Buffer)>,
    pub bindings: Vec<BindingValue<'a, B>>,
    pub vertex_count: u32,
    pub clear_color: wgpu::Color,
}

/// GPU operations the rest of the crate needs.
///
/// Creation methods return owned handles; dropping a handle releases the
/// underlying object, so the owner of the handle decides its lifetime.
pub trait GpuBackend {
    type Shader;
    type Program;
    type Texture;
    type Buffer;

    /// Creates a GPU shader module from already-validated IR.
    fn create_shader(&mut self, module: &ShaderModule) -> Result<Self::Shader, BackendError>;

    /// Builds the pipeline for a program whose stages passed interface checks.
    fn link_program(
        &mut self,
        layout: &ProgramLayout,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, BackendError>;

    fn create_texture(&mut self, image: &TextureImage) -> Result<Self::Texture, BackendError>;

    /// Replaces every level of `texture` with `image`, reallocating when the
    /// dimensions, format or level count changed.
    fn write_texture(
        &mut self,
        texture: &mut Self::Texture,
        image: &TextureImage,
    ) -> Result<(), BackendError>;

    fn create_buffer(
        &mut self,
        label: &str,
        target: BufferTarget,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<Self::Buffer, BackendError>;

    /// Current render-target size in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Resizes the render target. Zero-sized requests are ignored.
    fn resize(&mut self, width: u32, height: u32);

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), BackendError>;
}
