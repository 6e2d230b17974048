//! The equirectangular renderer: one camera, one texture, one triangle.

use bytemuck::{Pod, Zeroable};

use crate::camera::Camera;
use crate::gpu::GpuBackend;
use crate::program::{AttributeLocation, UniformLocation};
use crate::registry::{
    BufferId, DrawError, DrawRequest, ProgramId, ResourceRegistry, TextureId,
};
use crate::shader::ShaderStage;
use crate::texture::TextureSource;
use crate::types::{BufferTarget, BufferUsage, RendererSettings};

pub const FULLSCREEN_TRIANGLE_WGSL: &str = include_str!("shaders/fullscreen_triangle.wgsl");
pub const EQUIRECTANGULAR_WGSL: &str = include_str!("shaders/equirectangular.wgsl");

pub const VERTEX_SHADER_NAME: &str = "equirectangular_vertex";
pub const FRAGMENT_SHADER_NAME: &str = "equirectangular_fragment";
pub const PROGRAM_NAME: &str = "equirectangular";
pub const TEXTURE_NAME: &str = "equirectangular_output";
pub const BUFFER_NAME: &str = "fullscreen_triangle";

pub const POSITION_ATTRIBUTE: &str = "a_position";
pub const VIEW_UNIFORM: &str = "u_view";
pub const TEXTURE_UNIFORM: &str = "u_texture";
pub const SAMPLER_UNIFORM: &str = "u_sampler";

/// Two floats per vertex; the triangle overshoots the viewport so its
/// visible part is exactly the screen.
pub const FULLSCREEN_TRIANGLE: [f32; 6] = [-1.0, -1.0, 3.0, -1.0, -1.0, 3.0];
const VERTEX_COUNT: u32 = 3;

/// Matches `ViewUniforms` in `equirectangular.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewUniforms {
    /// `[x, y, z, w]`
    pub rotation: [f32; 4],
    /// Degrees.
    pub field_of_view: f32,
    pub aspect_ratio: f32,
    pub _padding: [f32; 2],
}

impl ViewUniforms {
    pub fn new(camera: &Camera, aspect_ratio: f32) -> Self {
        Self {
            rotation: camera.rotation().to_array(),
            field_of_view: camera.field_of_view(),
            aspect_ratio,
            _padding: [0.0; 2],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("renderer is not initialised")]
    Uninitialized,
    #[error("failed to set up {0}")]
    Setup(&'static str),
    #[error("program did not link: {log}")]
    ProgramNotLinked { log: String },
    #[error(transparent)]
    Draw(#[from] DrawError),
}

#[derive(Debug, Clone, Copy)]
struct Ready {
    program: ProgramId,
    texture: TextureId,
    buffer: BufferId,
    position: AttributeLocation,
    view: UniformLocation,
    texture_location: UniformLocation,
    sampler_location: UniformLocation,
}

/// Draws an equirectangular panorama through a [`Camera`].
///
/// Starts uninitialised; [`initialize`](Self::initialize) registers the
/// shaders, program, placeholder texture and triangle buffer, after which
/// [`render`](Self::render) draws one frame per call. Calling `render` before
/// that is rejected with [`RenderError::Uninitialized`].
pub struct EquirectangularRenderer<B: GpuBackend> {
    registry: ResourceRegistry<B>,
    camera: Camera,
    settings: RendererSettings,
    state: Option<Ready>,
}

impl<B: GpuBackend> EquirectangularRenderer<B> {
    pub fn new(backend: B, settings: RendererSettings) -> Self {
        let registry =
            ResourceRegistry::new(backend).with_texture_format(settings.color_space.texture_format());
        Self {
            registry,
            camera: Camera::new(settings.camera),
            settings,
            state: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Registers every resource the renderer draws with. Idempotent.
    pub fn initialize(&mut self) -> Result<(), RenderError> {
        if self.state.is_some() {
            return Ok(());
        }
        let registry = &mut self.registry;
        registry
            .register_shader(VERTEX_SHADER_NAME, ShaderStage::Vertex, FULLSCREEN_TRIANGLE_WGSL)
            .ok_or(RenderError::Setup("vertex shader"))?;
        registry
            .register_shader(FRAGMENT_SHADER_NAME, ShaderStage::Fragment, EQUIRECTANGULAR_WGSL)
            .ok_or(RenderError::Setup("fragment shader"))?;
        let program = registry
            .register_program(PROGRAM_NAME, &[VERTEX_SHADER_NAME, FRAGMENT_SHADER_NAME])
            .ok_or(RenderError::Setup("program"))?;
        let texture = registry
            .register_texture(TEXTURE_NAME)
            .ok_or(RenderError::Setup("texture"))?;
        let buffer = registry
            .register_buffer(
                BUFFER_NAME,
                BufferTarget::VertexAttributes,
                &FULLSCREEN_TRIANGLE,
                BufferUsage::Static,
            )
            .ok_or(RenderError::Setup("vertex buffer"))?;

        let linked = registry
            .program_mut(program)
            .ok_or(RenderError::Setup("program"))?;
        if let Some(log) = linked.failure_log() {
            return Err(RenderError::ProgramNotLinked {
                log: log.to_string(),
            });
        }
        let ready = Ready {
            program,
            texture,
            buffer,
            position: linked.with_attribute(POSITION_ATTRIBUTE),
            view: linked.with_uniform(VIEW_UNIFORM),
            texture_location: linked.with_uniform(TEXTURE_UNIFORM),
            sampler_location: linked.with_uniform(SAMPLER_UNIFORM),
        };
        self.state = Some(ready);
        tracing::info!(
            surface = ?self.registry.backend().surface_size(),
            "equirectangular renderer initialised"
        );
        Ok(())
    }

    /// Draws one frame.
    ///
    /// A failed draw is reported and nothing else changes; the next call
    /// simply tries again.
    pub fn render(&mut self) -> Result<(), RenderError> {
        let ready = self.state.ok_or(RenderError::Uninitialized)?;
        let uniforms = ViewUniforms::new(&self.camera, self.aspect_ratio());
        let request = DrawRequest {
            program: ready.program,
            attributes: vec![(ready.position, ready.buffer)],
            uniforms: vec![(ready.view, bytemuck::bytes_of(&uniforms))],
            textures: vec![(ready.texture_location, ready.sampler_location, ready.texture)],
            vertex_count: VERTEX_COUNT,
            clear_color: self.settings.clear_color,
        };
        self.registry.draw(&request)?;
        Ok(())
    }

    /// Releases every GPU resource and returns to the uninitialised state.
    pub fn cleanup(&mut self) {
        self.state = None;
        self.registry.teardown();
    }

    pub fn rotate_camera(&mut self, pitch_delta: f32, yaw_delta: f32, roll_delta: f32) {
        self.camera.add_pitch(pitch_delta);
        self.camera.add_yaw(yaw_delta);
        self.camera.add_roll(roll_delta);
    }

    pub fn change_field_of_view(&mut self, delta: f32) {
        self.camera.add_field_of_view(delta);
    }

    /// Uploads `source` into the panorama texture. Returns whether it was accepted.
    pub fn update_texture_source(&mut self, source: &TextureSource) -> bool {
        match self.state {
            Some(ready) => self.registry.update_texture_by_id(ready.texture, source),
            None => self.registry.update_texture(TEXTURE_NAME, source),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.registry.backend_mut().resize(width, height);
    }

    /// Width over height of the render target.
    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.registry.backend().surface_size();
        width.max(1) as f32 / height.max(1) as f32
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ResourceRegistry<B> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ResourceRegistry<B> {
        &mut self.registry
    }
}
