//! Equirectangular panorama rendering on wgpu.
//!
//! A viewport draws one full-screen triangle per frame. Its fragment stage
//! casts a ray per pixel from the camera's field of view and orientation and
//! samples the panorama at the ray's longitude/latitude:
//!
//! ```text
//!   host input ──▶ ViewportEvents ──▶ Viewport::tick ──▶ EquirectangularRenderer
//!                                                         │      │
//!                                     Camera (pitch/yaw/roll/fov) │
//!                                                                ▼
//!                                   ResourceRegistry ──▶ GpuBackend (wgpu | headless)
//!                                   shaders · program · texture · buffer
//! ```
//!
//! `ResourceRegistry` owns every GPU object of a viewport under a
//! caller-chosen name and hands out typed ids. Shaders are parsed and
//! validated with naga before anything reaches the device, and programs
//! resolve attribute/uniform names from the reflected interface. The
//! `projection` module repeats the fragment-stage maths on the CPU for still
//! exports.

pub mod buffer;
pub mod camera;
pub mod equirect;
pub mod gpu;
pub mod program;
pub mod projection;
pub mod registry;
pub mod shader;
pub mod texture;
pub mod types;
pub mod viewport;

pub use camera::{Camera, CameraSettings, MAX_FIELD_OF_VIEW, MIN_FIELD_OF_VIEW};
pub use equirect::{EquirectangularRenderer, RenderError, ViewUniforms};
pub use gpu::{BackendError, GpuBackend, HeadlessBackend, WgpuBackend};
pub use program::{AttributeLocation, LinkError, LinkedProgram, UniformLocation};
pub use registry::{BufferId, ProgramId, ResourceRegistry, ShaderId, TextureId};
pub use shader::{ShaderError, ShaderLanguage, ShaderSource, ShaderStage};
pub use texture::{PixelFormat, PixelImage, Texture, TextureSource};
pub use types::{BufferTarget, BufferUsage, ColorSpaceMode, RendererSettings, SurfaceOptions};
pub use viewport::{
    FrameClock, FrameToken, ManualFrameClock, TickOutcome, Viewport, ViewportEvent,
    ViewportEvents, ViewportState,
};
