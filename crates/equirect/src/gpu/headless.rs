use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::program::ProgramLayout;
use crate::shader::{ResourceKind, ShaderModule};
use crate::texture::{SamplingPolicy, TextureImage};
use crate::types::{BufferTarget, BufferUsage};

use super::{BackendError, BindingValue, DrawCall, GpuBackend};

const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;
/// How many of the most recent draws [`HeadlessStats::draws`] keeps.
pub const RECORDED_DRAW_LIMIT: usize = 64;

/// Creation/release tally for one kind of resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub created: usize,
    pub released: usize,
}

impl Lifecycle {
    pub fn live(&self) -> usize {
        self.created.saturating_sub(self.released)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedBinding {
    Uniform {
        group: u32,
        binding: u32,
        bytes: Vec<u8>,
    },
    Texture {
        group: u32,
        binding: u32,
        texture: u64,
    },
    Sampler {
        group: u32,
        binding: u32,
        texture: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: u64,
    /// `(slot, buffer id)` pairs.
    pub vertex_buffers: Vec<(u32, u64)>,
    pub bindings: Vec<RecordedBinding>,
    pub vertex_count: u32,
    pub clear_color: wgpu::Color,
    pub surface_size: (u32, u32),
}

/// Everything a [`HeadlessBackend`] has observed so far.
#[derive(Debug, Clone, Default)]
pub struct HeadlessStats {
    pub shaders: Lifecycle,
    pub programs: Lifecycle,
    pub textures: Lifecycle,
    pub buffers: Lifecycle,
    pub texture_writes: usize,
    /// The newest draws, oldest first, at most [`RECORDED_DRAW_LIMIT`].
    pub draws: VecDeque<RecordedDraw>,
    /// Every successful draw, including those no longer in `draws`.
    pub draw_count: usize,
    pub failed_draws: usize,
}

impl HeadlessStats {
    fn lifecycle_mut(&mut self, kind: Kind) -> &mut Lifecycle {
        match kind {
            Kind::Shader => &mut self.shaders,
            Kind::Program => &mut self.programs,
            Kind::Texture => &mut self.textures,
            Kind::Buffer => &mut self.buffers,
        }
    }

    /// Resources created and not yet dropped, across all kinds.
    pub fn live(&self) -> usize {
        self.shaders.live() + self.programs.live() + self.textures.live() + self.buffers.live()
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Shader,
    Program,
    Texture,
    Buffer,
}

type SharedStats = Rc<RefCell<HeadlessStats>>;

/// Counts the release of a headless handle when it is dropped.
#[derive(Debug)]
struct Release {
    id: u64,
    kind: Kind,
    stats: SharedStats,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.stats.borrow_mut().lifecycle_mut(self.kind).released += 1;
    }
}

#[derive(Debug)]
pub struct HeadlessShader {
    release: Release,
    entry_point: String,
}

impl HeadlessShader {
    pub fn id(&self) -> u64 {
        self.release.id
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

#[derive(Debug)]
pub struct HeadlessProgram {
    release: Release,
    layout: ProgramLayout,
}

impl HeadlessProgram {
    pub fn id(&self) -> u64 {
        self.release.id
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }
}

#[derive(Debug)]
pub struct HeadlessTexture {
    release: Release,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    levels: Vec<Vec<u8>>,
    sampling: SamplingPolicy,
}

impl HeadlessTexture {
    pub fn id(&self) -> u64 {
        self.release.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Level 0 as uploaded (bottom row first).
    pub fn pixels(&self) -> Option<&[u8]> {
        self.levels.first().map(Vec::as_slice)
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn sampling(&self) -> SamplingPolicy {
        self.sampling
    }
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    release: Release,
    contents: Vec<u8>,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.release.id
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

/// Read-only view of a backend's counters that outlives moving the backend.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    stats: SharedStats,
}

impl HeadlessProbe {
    pub fn stats(&self) -> HeadlessStats {
        self.stats.borrow().clone()
    }

    pub fn draw_count(&self) -> usize {
        self.stats.borrow().draw_count
    }

    pub fn last_draw(&self) -> Option<RecordedDraw> {
        self.stats.borrow().draws.back().cloned()
    }
}

/// A backend without a GPU.
///
/// Handles are numbered from 1 in creation order. Draws are checked the way a
/// real pipeline would check them (every texture and sampler the program
/// declares must be bound) and then recorded.
#[derive(Debug)]
pub struct HeadlessBackend {
    stats: SharedStats,
    next_id: u64,
    size: (u32, u32),
    max_texture_dimension: u32,
    fail_draws: bool,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            stats: SharedStats::default(),
            next_id: 1,
            size: (width.max(1), height.max(1)),
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            fail_draws: false,
        }
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            stats: Rc::clone(&self.stats),
        }
    }

    pub fn with_max_texture_dimension(mut self, limit: u32) -> Self {
        self.max_texture_dimension = limit;
        self
    }

    /// Makes every subsequent draw fail, as a lost device would.
    pub fn set_fail_draws(&mut self, fail: bool) {
        self.fail_draws = fail;
    }

    fn release(&mut self, kind: Kind) -> Release {
        let id = self.next_id;
        self.next_id += 1;
        self.stats.borrow_mut().lifecycle_mut(kind).created += 1;
        Release {
            id,
            kind,
            stats: Rc::clone(&self.stats),
        }
    }

    fn check_dimensions(&self, image: &TextureImage) -> Result<(), BackendError> {
        if image.width > self.max_texture_dimension || image.height > self.max_texture_dimension
        {
            return Err(BackendError::TooLarge {
                what: format!("texture '{}' ({}x{})", image.label, image.width, image.height),
                limit: self.max_texture_dimension,
            });
        }
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    type Shader = HeadlessShader;
    type Program = HeadlessProgram;
    type Texture = HeadlessTexture;
    type Buffer = HeadlessBuffer;

    fn create_shader(&mut self, module: &ShaderModule) -> Result<Self::Shader, BackendError> {
        Ok(HeadlessShader {
            release: self.release(Kind::Shader),
            entry_point: module.interface().entry_point.clone(),
        })
    }

    fn link_program(
        &mut self,
        layout: &ProgramLayout,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, BackendError> {
        if vertex.entry_point != layout.vertex_entry || fragment.entry_point != layout.fragment_entry
        {
            return Err(BackendError::Validation(format!(
                "entry points {}/{} do not match layout {}/{}",
                vertex.entry_point, fragment.entry_point, layout.vertex_entry, layout.fragment_entry
            )));
        }
        Ok(HeadlessProgram {
            release: self.release(Kind::Program),
            layout: layout.clone(),
        })
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<Self::Texture, BackendError> {
        self.check_dimensions(image)?;
        Ok(HeadlessTexture {
            release: self.release(Kind::Texture),
            width: image.width,
            height: image.height,
            format: image.format,
            levels: image.levels.clone(),
            sampling: image.sampling,
        })
    }

    fn write_texture(
        &mut self,
        texture: &mut Self::Texture,
        image: &TextureImage,
    ) -> Result<(), BackendError> {
        self.check_dimensions(image)?;
        texture.width = image.width;
        texture.height = image.height;
        texture.format = image.format;
        texture.levels = image.levels.clone();
        texture.sampling = image.sampling;
        self.stats.borrow_mut().texture_writes += 1;
        Ok(())
    }

    fn create_buffer(
        &mut self,
        _label: &str,
        _target: BufferTarget,
        _usage: BufferUsage,
        contents: &[u8],
    ) -> Result<Self::Buffer, BackendError> {
        Ok(HeadlessBuffer {
            release: self.release(Kind::Buffer),
            contents: contents.to_vec(),
        })
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), BackendError> {
        if self.fail_draws {
            self.stats.borrow_mut().failed_draws += 1;
            return Err(BackendError::Surface("draws disabled".to_string()));
        }

        let mut bindings = Vec::with_capacity(call.bindings.len());
        for binding in &call.bindings {
            bindings.push(match binding {
                BindingValue::Uniform { slot, bytes } => RecordedBinding::Uniform {
                    group: slot.group,
                    binding: slot.binding,
                    bytes: bytes.to_vec(),
                },
                BindingValue::Texture { slot, texture } => RecordedBinding::Texture {
                    group: slot.group,
                    binding: slot.binding,
                    texture: texture.id(),
                },
                BindingValue::Sampler { slot, texture } => RecordedBinding::Sampler {
                    group: slot.group,
                    binding: slot.binding,
                    texture: texture.id(),
                },
            });
        }

        let bound = |group: u32, binding: u32| {
            bindings.iter().any(|recorded| match recorded {
                RecordedBinding::Texture { group: g, binding: b, .. }
                | RecordedBinding::Sampler { group: g, binding: b, .. } => {
                    *g == group && *b == binding
                }
                RecordedBinding::Uniform { .. } => false,
            })
        };
        for resource in &call.program.layout.resources {
            let needs_binding = matches!(resource.kind, ResourceKind::Texture | ResourceKind::Sampler);
            if needs_binding && !bound(resource.group, resource.binding) {
                self.stats.borrow_mut().failed_draws += 1;
                return Err(BackendError::MissingBinding {
                    group: resource.group,
                    binding: resource.binding,
                });
            }
        }

        let draw = RecordedDraw {
            program: call.program.id(),
            vertex_buffers: call
                .vertex_buffers
                .iter()
                .map(|(attribute, buffer)| (attribute.slot, buffer.id()))
                .collect(),
            bindings,
            vertex_count: call.vertex_count,
            clear_color: call.clear_color,
            surface_size: self.size,
        };
        let mut stats = self.stats.borrow_mut();
        if stats.draws.len() == RECORDED_DRAW_LIMIT {
            stats.draws.pop_front();
        }
        stats.draws.push_back(draw);
        stats.draw_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_count_their_own_release() {
        let mut backend = HeadlessBackend::new(8, 8);
        let probe = backend.probe();
        let first = backend
            .create_buffer("a", BufferTarget::VertexAttributes, BufferUsage::Static, &[0; 8])
            .unwrap();
        let second = backend
            .create_buffer("b", BufferTarget::VertexAttributes, BufferUsage::Static, &[])
            .unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(probe.stats().buffers, Lifecycle { created: 2, released: 0 });

        drop(first);
        drop(second);
        assert_eq!(probe.stats().buffers, Lifecycle { created: 2, released: 2 });
        assert_eq!(probe.stats().live(), 0);
    }

    #[test]
    fn oversized_textures_are_rejected() {
        let mut backend = HeadlessBackend::new(8, 8).with_max_texture_dimension(16);
        let image = TextureImage::from_rgba(
            "big",
            image::RgbaImage::new(32, 8),
            wgpu::TextureFormat::Rgba8Unorm,
        );
        assert!(matches!(
            backend.create_texture(&image),
            Err(BackendError::TooLarge { limit: 16, .. })
        ));
        assert_eq!(backend.probe().stats().textures.created, 0);
    }

    #[test]
    fn zero_resize_is_ignored() {
        let mut backend = HeadlessBackend::new(640, 480);
        backend.resize(0, 100);
        assert_eq!(backend.surface_size(), (640, 480));
        backend.resize(800, 600);
        assert_eq!(backend.surface_size(), (800, 600));
    }

    #[test]
    fn draw_log_keeps_only_the_newest_draws() {
        let backend = HeadlessBackend::new(16, 16);
        let probe = backend.probe();
        let mut renderer = crate::equirect::EquirectangularRenderer::new(
            backend,
            crate::types::RendererSettings::default(),
        );
        renderer.initialize().unwrap();
        for _ in 0..100 {
            renderer.render().unwrap();
        }

        let stats = probe.stats();
        assert_eq!(probe.draw_count(), 100);
        assert_eq!(stats.draws.len(), RECORDED_DRAW_LIMIT);
        assert_eq!(probe.last_draw().as_ref(), stats.draws.back());
    }
}
